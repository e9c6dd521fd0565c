//! The persistent pool: one store or load session over one stream.
//!
//! A session starts by binding the pool to a file (or an in-memory buffer).
//! Opening for write emits the head metadata immediately; opening for read
//! decodes it immediately, so a caller can inspect [`HeadData`] and abandon
//! the file before paying for the graph. After that the caller stores or
//! loads its values, and the load sequence must mirror the store sequence
//! exactly: nothing in the stream describes what follows.

use std::any::{Any, TypeId};
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::{self, Rc};
use std::sync::{self, Arc};

use kiln_common::{ContentHash, InternalError, StringId};
use tracing::{debug, trace};

use crate::error::{PersistError, PersistResult};
use crate::head::HeadData;
use crate::identity::{IdentityTracker, Incoming, ObjectId, Slot, NULL_ID};
use crate::persist::Persist;
use crate::strings::{Interned, StringTable};

/// Default capacity of the write buffer, in bytes.
pub const DEFAULT_WRITE_BUFFER: usize = 64 * 1024;

/// Path reported for sessions that are not bound to a file.
const MEMORY_PATH: &str = "<memory>";

/// Destination of a write session.
enum Sink {
    File {
        path: PathBuf,
        writer: BufWriter<File>,
    },
    Memory(Vec<u8>),
}

/// The stream a pool is bound to.
enum Stream {
    Closed,
    Write(Sink),
    Read(Cursor<Vec<u8>>),
}

/// Coordinates one store or load session.
///
/// Holds the open stream, the head metadata, and the identity and string
/// tables that give the flat byte stream its reference-graph semantics.
/// Values go in and out through [`store`](Self::store) and
/// [`load`](Self::load), dispatched on their [`Persist`] implementation.
pub struct PersistentPool {
    stream: Stream,
    head: HeadData,
    objects: IdentityTracker,
    strings: StringTable,
    write_buffer: usize,
    span: tracing::Span,
}

impl PersistentPool {
    /// Creates a closed pool that logs under a `persistent_pool` span.
    pub fn new() -> Self {
        Self::with_span(tracing::debug_span!("persistent_pool"))
    }

    /// Creates a closed pool that logs under the given span.
    pub fn with_span(span: tracing::Span) -> Self {
        Self {
            stream: Stream::Closed,
            head: HeadData::default(),
            objects: IdentityTracker::default(),
            strings: StringTable::new(),
            write_buffer: DEFAULT_WRITE_BUFFER,
            span,
        }
    }

    /// Sets the capacity of the buffer used for file-backed write sessions.
    pub fn with_write_buffer(mut self, capacity: usize) -> Self {
        self.write_buffer = capacity.max(1);
        self
    }

    /// Returns the head metadata of the current or last session.
    pub fn head_data(&self) -> &HeadData {
        &self.head
    }

    /// Replaces the head metadata written by the next write session.
    pub fn set_head_data(&mut self, head: HeadData) {
        self.head = head;
    }

    /// Returns `true` while a stream is bound to the pool.
    pub fn is_open(&self) -> bool {
        !matches!(self.stream, Stream::Closed)
    }

    /// Binds the pool to a new file and writes the head metadata.
    ///
    /// An existing file at `path` is truncated.
    pub fn open_for_write(&mut self, path: impl AsRef<Path>) -> PersistResult<()> {
        let path = path.as_ref();
        self.ensure_closed()?;
        let head = self.head.encode()?;
        let file = File::create(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.stream = Stream::Write(Sink::File {
            path: path.to_path_buf(),
            writer: BufWriter::with_capacity(self.write_buffer, file),
        });
        let span = self.span.clone();
        let _enter = span.enter();
        debug!(path = %path.display(), "opened build graph for writing");
        self.write_head(&head)
    }

    /// Binds the pool to an in-memory buffer and writes the head metadata.
    ///
    /// Finish with [`finalize_to_bytes`](Self::finalize_to_bytes).
    pub fn open_for_write_in_memory(&mut self) -> PersistResult<()> {
        self.ensure_closed()?;
        let head = self.head.encode()?;
        self.stream = Stream::Write(Sink::Memory(Vec::new()));
        self.write_head(&head)
    }

    /// Flushes and closes the write stream.
    pub fn finalize_write(&mut self) -> PersistResult<()> {
        match std::mem::replace(&mut self.stream, Stream::Closed) {
            Stream::Write(Sink::File { path, mut writer }) => {
                writer
                    .flush()
                    .map_err(|source| PersistError::Io { path: path.clone(), source })?;
                let span = self.span.clone();
                let _enter = span.enter();
                debug!(
                    path = %path.display(),
                    objects = self.objects.stored_count(),
                    strings = self.strings.stored_count(),
                    "finalized build graph"
                );
                Ok(())
            }
            Stream::Write(Sink::Memory(_)) => Ok(()),
            other => {
                self.stream = other;
                Err(PersistError::NotOpen { expected: "writing" })
            }
        }
    }

    /// Closes an in-memory write session and returns the encoded bytes.
    pub fn finalize_to_bytes(&mut self) -> PersistResult<Vec<u8>> {
        match std::mem::replace(&mut self.stream, Stream::Closed) {
            Stream::Write(Sink::Memory(bytes)) => Ok(bytes),
            other => {
                self.stream = other;
                Err(PersistError::NotOpen {
                    expected: "in-memory writing",
                })
            }
        }
    }

    /// Binds the pool to an existing file and reads its head metadata.
    ///
    /// A missing, empty, or unreadable file yields
    /// [`PersistError::NoBuildGraph`].
    pub fn open_for_read(&mut self, path: impl AsRef<Path>) -> PersistResult<()> {
        let path = path.as_ref();
        self.ensure_closed()?;
        let bytes = match std::fs::read(path) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            _ => {
                return Err(PersistError::NoBuildGraph {
                    path: path.to_path_buf(),
                })
            }
        };
        let span = self.span.clone();
        let _enter = span.enter();
        debug!(path = %path.display(), len = bytes.len(), "opened build graph for reading");
        self.begin_read(bytes, path)
    }

    /// Binds the pool to an in-memory copy of a build graph file.
    pub fn open_for_read_bytes(&mut self, bytes: Vec<u8>) -> PersistResult<()> {
        self.ensure_closed()?;
        if bytes.is_empty() {
            return Err(PersistError::NoBuildGraph {
                path: PathBuf::from(MEMORY_PATH),
            });
        }
        self.begin_read(bytes, Path::new(MEMORY_PATH))
    }

    /// Releases the stream and the read-side object references.
    ///
    /// Safe to call on a pool that is already closed or was never opened.
    /// An unflushed file-backed write session is flushed on a best-effort
    /// basis; use [`finalize_write`](Self::finalize_write) to observe errors.
    pub fn close(&mut self) {
        if !self.is_open() {
            return;
        }
        self.stream = Stream::Closed;
        self.objects.release_loaded();
        let span = self.span.clone();
        let _enter = span.enter();
        debug!("closed persistent pool");
    }

    /// Resets every identity and string table.
    ///
    /// Used between unrelated sessions on a reused pool.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.strings.clear();
    }

    /// Stores one value.
    pub fn store<T: Persist>(&mut self, value: &T) -> PersistResult<()> {
        value.store(self)
    }

    /// Stores a string slice through the interning table.
    pub fn store_str(&mut self, s: &str) -> PersistResult<()> {
        match self.strings.intern(s) {
            Ok(Interned::Existing(id)) => self.write_raw(&id.as_raw().to_be_bytes()),
            Ok(Interned::New(id)) => {
                self.write_raw(&id.as_raw().to_be_bytes())?;
                self.write_len(s.len())?;
                self.write_raw(s.as_bytes())
            }
            Err(e) => Err(PersistError::unrepresentable(format!(
                "string table exhausted: {e}"
            ))),
        }
    }

    /// Loads one value of type `T`.
    pub fn load<T: Persist>(&mut self) -> PersistResult<T> {
        T::load(self)
    }

    /// Loads one value into existing storage, replacing its content.
    pub fn load_into<T: Persist>(&mut self, value: &mut T) -> PersistResult<()> {
        value.load_into(self)
    }

    /// Loads an interned string.
    pub fn load_string(&mut self) -> PersistResult<String> {
        let raw = u32::from_be_bytes(self.read_array()?);
        let id = StringId::from_raw(raw);
        if let Some(s) = self.strings.get(id) {
            return Ok(s.to_string());
        }
        if id.index() != self.strings.next_load_id() {
            return Err(self.corrupt(format!(
                "string id {raw} out of sequence (expected at most {})",
                self.strings.next_load_id()
            )));
        }
        let len = self.read_len()?;
        let bytes = self.read_vec(len)?;
        let s = String::from_utf8(bytes)
            .map_err(|e| self.corrupt(format!("string {raw} is not UTF-8: {e}")))?;
        self.strings.push_loaded(s.clone());
        Ok(s)
    }

    /// Writes a marker derived from `label`.
    ///
    /// Readers call [`expect_checkpoint`](Self::expect_checkpoint) with the
    /// same label at the same position; a store/load sequence that has
    /// drifted apart then fails there instead of decoding garbage.
    pub fn store_checkpoint(&mut self, label: &str) -> PersistResult<()> {
        let tag = ContentHash::from_bytes(label.as_bytes()).short_tag();
        self.write_raw(&tag.to_be_bytes())
    }

    /// Reads a marker written by [`store_checkpoint`](Self::store_checkpoint).
    pub fn expect_checkpoint(&mut self, label: &str) -> PersistResult<()> {
        let expected = ContentHash::from_bytes(label.as_bytes()).short_tag();
        let found = u32::from_be_bytes(self.read_array()?);
        if found != expected {
            return Err(PersistError::CheckpointMismatch { expected, found });
        }
        Ok(())
    }

    /// Builds a [`PersistError::Corrupt`] at the current read position.
    pub fn corrupt(&self, reason: impl Into<String>) -> PersistError {
        PersistError::Corrupt {
            offset: self.position(),
            reason: reason.into(),
        }
    }

    /// Number of distinct objects stored in this session.
    pub fn stored_object_count(&self) -> usize {
        self.objects.stored_count()
    }

    /// Number of distinct strings stored in this session.
    pub fn stored_string_count(&self) -> usize {
        self.strings.stored_count()
    }

    /// Number of distinct strings loaded in this session.
    pub fn loaded_string_count(&self) -> usize {
        self.strings.loaded_count()
    }

    /// Number of distinct object ids seen in this load session.
    pub fn loaded_object_count(&self) -> usize {
        self.objects.loaded_count()
    }

    // --- raw stream access -------------------------------------------------

    pub(crate) fn write_raw(&mut self, bytes: &[u8]) -> PersistResult<()> {
        match &mut self.stream {
            Stream::Write(Sink::File { path, writer }) => {
                writer.write_all(bytes).map_err(|source| PersistError::Io {
                    path: path.clone(),
                    source,
                })
            }
            Stream::Write(Sink::Memory(buf)) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            _ => Err(PersistError::NotOpen { expected: "writing" }),
        }
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> PersistResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn read_vec(&mut self, len: usize) -> PersistResult<Vec<u8>> {
        if len > self.remaining() {
            return Err(self.corrupt(format!(
                "length {len} exceeds the {} bytes left in the stream",
                self.remaining()
            )));
        }
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Writes a container length as a 32-bit count.
    pub(crate) fn write_len(&mut self, len: usize) -> PersistResult<()> {
        let len = u32::try_from(len).map_err(|_| {
            PersistError::unrepresentable(format!("length {len} does not fit in 32 bits"))
        })?;
        self.write_raw(&len.to_be_bytes())
    }

    pub(crate) fn read_len(&mut self) -> PersistResult<usize> {
        Ok(u32::from_be_bytes(self.read_array()?) as usize)
    }

    /// Upper bound for pre-allocating `count` decoded elements.
    pub(crate) fn capacity_hint(&self, count: usize) -> usize {
        count.min(self.remaining())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> PersistResult<()> {
        let Stream::Read(cursor) = &mut self.stream else {
            return Err(PersistError::NotOpen { expected: "reading" });
        };
        if cursor.read_exact(buf).is_err() {
            let len = buf.len();
            return Err(self.corrupt(format!("unexpected end of stream reading {len} bytes")));
        }
        Ok(())
    }

    fn position(&self) -> u64 {
        match &self.stream {
            Stream::Read(cursor) => cursor.position(),
            _ => 0,
        }
    }

    fn remaining(&self) -> usize {
        match &self.stream {
            Stream::Read(cursor) => {
                let len = cursor.get_ref().len() as u64;
                len.saturating_sub(cursor.position()) as usize
            }
            _ => 0,
        }
    }

    // --- session helpers ---------------------------------------------------

    fn ensure_closed(&self) -> PersistResult<()> {
        if self.is_open() {
            return Err(PersistError::AlreadyOpen);
        }
        Ok(())
    }

    fn write_head(&mut self, bytes: &[u8]) -> PersistResult<()> {
        if let Err(e) = self.write_raw(bytes) {
            self.stream = Stream::Closed;
            return Err(e);
        }
        Ok(())
    }

    fn begin_read(&mut self, bytes: Vec<u8>, path: &Path) -> PersistResult<()> {
        self.stream = Stream::Read(Cursor::new(bytes));
        match HeadData::decode(self) {
            Ok(head) => {
                trace!(path = %path.display(), keys = head.len(), "read head metadata");
                self.head = head;
                Ok(())
            }
            Err(e) => {
                self.stream = Stream::Closed;
                Err(e)
            }
        }
    }

    // --- identity ----------------------------------------------------------

    pub(crate) fn store_null(&mut self) -> PersistResult<()> {
        self.write_raw(&NULL_ID.to_be_bytes())
    }

    /// Stores an owning handle: always a fresh id followed by the body.
    pub(crate) fn store_owned(
        &mut self,
        body: impl FnOnce(&mut Self) -> PersistResult<()>,
    ) -> PersistResult<()> {
        let id = self
            .objects
            .fresh_id()
            .ok_or_else(|| PersistError::unrepresentable("object id space exhausted"))?;
        self.write_raw(&id.to_be_bytes())?;
        body(self)
    }

    /// Stores a shared handle to the instance of `T` at `addr`.
    ///
    /// The id is registered before the body is written, so a reference back
    /// to the same instance from inside the body writes only the id.
    pub(crate) fn store_shared<T: 'static>(
        &mut self,
        addr: *const T,
        body: impl FnOnce(&mut Self) -> PersistResult<()>,
    ) -> PersistResult<()> {
        let key = (addr as *const () as usize, TypeId::of::<T>());
        let (id, first) = self
            .objects
            .id_for(key)
            .ok_or_else(|| PersistError::unrepresentable("object id space exhausted"))?;
        self.write_raw(&id.to_be_bytes())?;
        if first {
            body(self)?;
        }
        Ok(())
    }

    /// Reads the next object id and classifies it.
    pub(crate) fn read_handle(&mut self) -> PersistResult<Incoming> {
        let id = ObjectId::from_be_bytes(self.read_array()?);
        let offset = self.position();
        self.objects
            .classify(id)
            .map_err(|reason| PersistError::Corrupt { offset, reason })
    }

    pub(crate) fn mark_moved(&mut self, id: ObjectId) -> PersistResult<()> {
        Ok(self.objects.fill(id, Slot::Moved)?)
    }

    pub(crate) fn register_rc<T: Any>(&mut self, id: ObjectId, rc: Rc<T>) -> PersistResult<()> {
        Ok(self.objects.fill(id, Slot::Local(rc))?)
    }

    pub(crate) fn register_arc<T: Any + Send + Sync>(
        &mut self,
        id: ObjectId,
        arc: Arc<T>,
    ) -> PersistResult<()> {
        Ok(self.objects.fill(id, Slot::Shared(arc))?)
    }

    pub(crate) fn register_rc_weak<T: Any>(
        &mut self,
        id: ObjectId,
        weak: rc::Weak<T>,
    ) -> PersistResult<()> {
        Ok(self.objects.fill(id, Slot::LocalWeak(Box::new(weak)))?)
    }

    pub(crate) fn register_arc_weak<T: Any + Send + Sync>(
        &mut self,
        id: ObjectId,
        weak: sync::Weak<T>,
    ) -> PersistResult<()> {
        Ok(self.objects.fill(id, Slot::SharedWeak(Box::new(weak)))?)
    }

    /// Returns the `Rc` already materialized for `id`.
    pub(crate) fn resolve_rc<T: Any>(&self, id: ObjectId) -> PersistResult<Rc<T>> {
        match self.objects.slot(id) {
            Some(Slot::Local(rc)) => Rc::clone(rc)
                .downcast::<T>()
                .map_err(|_| self.type_mismatch::<T>(id)),
            other => Err(self.unresolvable(id, other)),
        }
    }

    /// Returns the `Arc` already materialized for `id`.
    pub(crate) fn resolve_arc<T: Any + Send + Sync>(&self, id: ObjectId) -> PersistResult<Arc<T>> {
        match self.objects.slot(id) {
            Some(Slot::Shared(arc)) => Arc::clone(arc)
                .downcast::<T>()
                .map_err(|_| self.type_mismatch::<T>(id)),
            other => Err(self.unresolvable(id, other)),
        }
    }

    /// Returns a weak reference to the `Rc` of `id`, which may still be
    /// loading.
    pub(crate) fn resolve_rc_weak<T: Any>(&self, id: ObjectId) -> PersistResult<rc::Weak<T>> {
        match self.objects.slot(id) {
            Some(Slot::Local(rc)) => Rc::clone(rc)
                .downcast::<T>()
                .map(|rc| Rc::downgrade(&rc))
                .map_err(|_| self.type_mismatch::<T>(id)),
            Some(Slot::LocalWeak(weak)) => weak
                .downcast_ref::<rc::Weak<T>>()
                .cloned()
                .ok_or_else(|| self.type_mismatch::<T>(id)),
            other => Err(self.unresolvable(id, other)),
        }
    }

    /// Returns a weak reference to the `Arc` of `id`, which may still be
    /// loading.
    pub(crate) fn resolve_arc_weak<T: Any + Send + Sync>(
        &self,
        id: ObjectId,
    ) -> PersistResult<sync::Weak<T>> {
        match self.objects.slot(id) {
            Some(Slot::Shared(arc)) => Arc::clone(arc)
                .downcast::<T>()
                .map(|arc| Arc::downgrade(&arc))
                .map_err(|_| self.type_mismatch::<T>(id)),
            Some(Slot::SharedWeak(weak)) => weak
                .downcast_ref::<sync::Weak<T>>()
                .cloned()
                .ok_or_else(|| self.type_mismatch::<T>(id)),
            other => Err(self.unresolvable(id, other)),
        }
    }

    fn type_mismatch<T>(&self, id: ObjectId) -> PersistError {
        self.corrupt(format!(
            "object {id} was not loaded as {}",
            std::any::type_name::<T>()
        ))
    }

    fn unresolvable(&self, id: ObjectId, slot: Option<&Slot>) -> PersistError {
        match slot {
            Some(Slot::Pending) => self.corrupt(format!(
                "object {id} refers back to itself through a handle that cannot hold a partially loaded value"
            )),
            Some(Slot::Moved) => {
                self.corrupt(format!("object {id} is already owned by another handle"))
            }
            Some(Slot::LocalWeak(_) | Slot::SharedWeak(_)) => self.corrupt(format!(
                "object {id} is still loading; only a Weak handle can refer back to it"
            )),
            Some(Slot::Local(_)) => self.corrupt(format!("object {id} was loaded behind an Rc")),
            Some(Slot::Shared(_)) => self.corrupt(format!("object {id} was loaded behind an Arc")),
            None => InternalError::new(format!("object {id} has no identity slot")).into(),
        }
    }
}

impl Default for PersistentPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Stores each value in order, stopping at the first error.
///
/// `store!(pool, a, b, c)` is the same as calling
/// [`PersistentPool::store`] for `a`, `b` and `c` in turn.
#[macro_export]
macro_rules! store {
    ($pool:expr $(, $value:expr)* $(,)?) => {{
        #[allow(unused_variables)]
        let pool: &mut $crate::PersistentPool = $pool;
        #[allow(unused_mut)]
        let mut result: $crate::PersistResult<()> = Ok(());
        $(
            if result.is_ok() {
                result = pool.store(&$value);
            }
        )*
        result
    }};
}

/// Loads into each place in order, stopping at the first error.
///
/// The counterpart of [`store!`]: `load!(pool, a, b, c)` must follow a
/// `store!` of values with the same types in the same order.
#[macro_export]
macro_rules! load {
    ($pool:expr $(, $place:expr)* $(,)?) => {{
        #[allow(unused_variables)]
        let pool: &mut $crate::PersistentPool = $pool;
        #[allow(unused_mut)]
        let mut result: $crate::PersistResult<()> = Ok(());
        $(
            if result.is_ok() {
                result = pool.load_into(&mut $place);
            }
        )*
        result
    }};
}
