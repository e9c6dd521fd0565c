//! Object identity bookkeeping for shared and owning handles.
//!
//! On the write side every distinct heap instance gets an [`ObjectId`] the
//! first time it is stored; later stores of the same instance write only the
//! id. On the read side the ids are replayed in the same order, and the
//! tracker keeps one [`Slot`] per id so repeated ids resolve to the instance
//! that was materialized first.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use kiln_common::{InternalError, KilnResult};

/// Stream-level identity of a persisted object.
pub type ObjectId = i32;

/// The id written in place of a null handle.
pub const NULL_ID: ObjectId = -1;

/// Read-side state of one object id.
pub(crate) enum Slot {
    /// The id has been seen and its body is being loaded.
    Pending,
    /// Materialized behind an `Rc`.
    Local(Rc<dyn Any>),
    /// An `Rc` whose body is still loading, held as its `rc::Weak<T>`.
    LocalWeak(Box<dyn Any>),
    /// Materialized behind an `Arc`.
    Shared(Arc<dyn Any + Send + Sync>),
    /// An `Arc` whose body is still loading, held as its `sync::Weak<T>`.
    SharedWeak(Box<dyn Any + Send + Sync>),
    /// Loaded into an owning handle and handed to the caller.
    Moved,
}

/// What the next id in the stream refers to.
pub(crate) enum Incoming {
    /// The null id.
    Null,
    /// An id that has been materialized (or is being materialized) already.
    Seen(ObjectId),
    /// The first occurrence of an id; its body follows in the stream.
    New(ObjectId),
}

/// Write-side and read-side identity tables of one pool.
#[derive(Default)]
pub(crate) struct IdentityTracker {
    /// Instance address and type to assigned id.
    stored: HashMap<(usize, TypeId), ObjectId>,
    /// Next id to hand out on the write side.
    next_id: ObjectId,
    /// Id to materialized instance, indexed by id.
    loaded: Vec<Slot>,
}

impl IdentityTracker {
    /// Hands out the next id. Returns `None` once the id space is exhausted.
    pub(crate) fn fresh_id(&mut self) -> Option<ObjectId> {
        let id = self.next_id;
        self.next_id = id.checked_add(1)?;
        Some(id)
    }

    /// Returns the id already assigned to `key`, or assigns a fresh one.
    ///
    /// The boolean is `true` when the id was assigned by this call, meaning
    /// the body of the object has to follow in the stream.
    pub(crate) fn id_for(&mut self, key: (usize, TypeId)) -> Option<(ObjectId, bool)> {
        if let Some(&id) = self.stored.get(&key) {
            return Some((id, false));
        }
        let id = self.fresh_id()?;
        self.stored.insert(key, id);
        Some((id, true))
    }

    /// Classifies an id read from the stream.
    ///
    /// A new id must be exactly the next one in sequence, because the writer
    /// hands ids out in first-store order. A new id is reserved as
    /// [`Slot::Pending`] before this returns.
    pub(crate) fn classify(&mut self, id: ObjectId) -> Result<Incoming, String> {
        if id == NULL_ID {
            return Ok(Incoming::Null);
        }
        let index = usize::try_from(id).map_err(|_| format!("invalid object id {id}"))?;
        if index < self.loaded.len() {
            return Ok(Incoming::Seen(id));
        }
        if index == self.loaded.len() {
            self.loaded.push(Slot::Pending);
            return Ok(Incoming::New(id));
        }
        Err(format!(
            "object id {id} out of sequence (expected at most {})",
            self.loaded.len()
        ))
    }

    pub(crate) fn slot(&self, id: ObjectId) -> Option<&Slot> {
        usize::try_from(id).ok().and_then(|index| self.loaded.get(index))
    }

    /// Replaces the slot of an id that [`classify`](Self::classify) has
    /// already reserved.
    pub(crate) fn fill(&mut self, id: ObjectId, slot: Slot) -> KilnResult<()> {
        let entry = usize::try_from(id)
            .ok()
            .and_then(|index| self.loaded.get_mut(index))
            .ok_or_else(|| InternalError::new(format!("object {id} has no identity slot")))?;
        *entry = slot;
        Ok(())
    }

    /// Number of distinct objects stored so far.
    pub(crate) fn stored_count(&self) -> usize {
        self.next_id as usize
    }

    /// Number of distinct object ids seen while loading.
    pub(crate) fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Drops the read-side references so only the loaded graph keeps
    /// instances alive.
    pub(crate) fn release_loaded(&mut self) {
        self.loaded = Vec::new();
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}
