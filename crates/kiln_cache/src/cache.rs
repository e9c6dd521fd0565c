//! High-level build graph cache.
//!
//! [`BuildGraphCache`] owns one build graph file inside a cache directory.
//! Saving writes the current configuration snapshot as head metadata and the
//! graph after it. Loading compares the stored snapshot with the current one
//! first and only decodes the graph when they match.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use kiln_persist::{HeadData, Persist, PersistError, PersistentPool, Value, DEFAULT_WRITE_BUFFER};
use tracing::{debug, info, warn};

use crate::error::CacheError;

/// Head metadata key recording the layout of the cached graph.
pub const CACHE_FORMAT_KEY: &str = "kiln.cache_format";

/// Current value of [`CACHE_FORMAT_KEY`]. Bump when the graph layout changes.
pub const CACHE_FORMAT: i64 = 1;

/// Label of the checkpoint written between the head and the graph.
const GRAPH_CHECKPOINT: &str = "build-graph";

/// Outcome of [`BuildGraphCache::load`].
#[derive(Debug)]
pub enum CacheLoad<G> {
    /// No graph has been stored yet.
    Cold,
    /// A graph exists but cannot be reused.
    Stale(StaleReason),
    /// The stored graph matches the current configuration.
    Loaded(G),
}

impl<G> CacheLoad<G> {
    /// Returns the graph if it was loaded.
    pub fn into_loaded(self) -> Option<G> {
        match self {
            CacheLoad::Loaded(graph) => Some(graph),
            _ => None,
        }
    }
}

/// Why a stored graph was not reused.
#[derive(Debug, Clone, PartialEq)]
pub enum StaleReason {
    /// The configuration snapshot differs from the current one.
    HeadChanged {
        /// Top-level head keys that were added, removed, or changed.
        changed_keys: Vec<String>,
    },
    /// The file could not be decoded.
    Corrupt {
        /// Description of the decoding failure.
        reason: String,
    },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::HeadChanged { changed_keys } => {
                write!(f, "configuration changed ({})", changed_keys.join(", "))
            }
            StaleReason::Corrupt { reason } => write!(f, "unreadable build graph: {reason}"),
        }
    }
}

/// Freshness of the stored graph, decided from its head metadata alone.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheStatus {
    /// No graph is stored.
    Absent,
    /// The stored graph would not be reused.
    Stale(StaleReason),
    /// The stored graph was built with the current configuration.
    Fresh,
}

/// Stores and restores one build graph file.
pub struct BuildGraphCache {
    cache_dir: PathBuf,
    file_name: String,
    head: HeadData,
    write_buffer: usize,
}

impl BuildGraphCache {
    /// Creates a cache for `<cache_dir>/<file_name>`.
    ///
    /// `head` is the current configuration snapshot. It is written with every
    /// saved graph and compared against the stored one on load. The cache
    /// format key is added to it.
    pub fn new(cache_dir: &Path, file_name: &str, head: HeadData) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            file_name: file_name.to_string(),
            head: stamp(head),
            write_buffer: DEFAULT_WRITE_BUFFER,
        }
    }

    /// Sets the write buffer size used by [`save`](Self::save).
    pub fn with_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer = bytes;
        self
    }

    /// Path of the build graph file.
    pub fn graph_path(&self) -> PathBuf {
        self.cache_dir.join(&self.file_name)
    }

    /// The head metadata written by [`save`](Self::save).
    pub fn head(&self) -> &HeadData {
        &self.head
    }

    /// Writes `graph` to the cache.
    ///
    /// The file is written next to its final location and renamed over it
    /// once complete, so an interrupted save leaves the previous graph intact.
    pub fn save<G: Persist>(&self, graph: &G) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|source| CacheError::Io {
            path: self.cache_dir.clone(),
            source,
        })?;
        let path = self.graph_path();
        let tmp = self.cache_dir.join(format!("{}.tmp", self.file_name));

        let written = self
            .write_graph(&tmp, graph)
            .and_then(|()| self.head.fingerprint().map_err(CacheError::from));
        let fingerprint = match written {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                return Err(e);
            }
        };
        std::fs::rename(&tmp, &path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), head = %fingerprint, "saved build graph");
        Ok(())
    }

    fn write_graph<G: Persist>(&self, tmp: &Path, graph: &G) -> Result<(), CacheError> {
        let mut pool = self.pool().with_write_buffer(self.write_buffer);
        pool.set_head_data(self.head.clone());
        pool.open_for_write(tmp)?;
        pool.store_checkpoint(GRAPH_CHECKPOINT)?;
        pool.store(graph)?;
        pool.finalize_write()?;
        debug!(
            objects = pool.stored_object_count(),
            strings = pool.stored_string_count(),
            "wrote build graph"
        );
        Ok(())
    }

    /// Loads the stored graph if it is still valid.
    ///
    /// A missing file is [`CacheLoad::Cold`]. A changed configuration or a
    /// damaged file is [`CacheLoad::Stale`]. I/O and lifecycle errors are
    /// returned as errors.
    pub fn load<G: Persist>(&self) -> Result<CacheLoad<G>, CacheError> {
        let path = self.graph_path();
        let mut pool = self.pool();
        if let Err(e) = pool.open_for_read(&path) {
            return self.classify_failure(e);
        }

        let changed_keys = diff_keys(pool.head_data(), &self.head);
        if !changed_keys.is_empty() {
            let stored = pool.head_data().fingerprint().ok();
            pool.close();
            info!(
                path = %path.display(),
                changed = ?changed_keys,
                stored_head = ?stored,
                "build graph is stale"
            );
            return Ok(CacheLoad::Stale(StaleReason::HeadChanged { changed_keys }));
        }

        let loaded = pool
            .expect_checkpoint(GRAPH_CHECKPOINT)
            .and_then(|()| pool.load::<G>());
        let (objects, strings) = (pool.loaded_object_count(), pool.loaded_string_count());
        pool.close();
        match loaded {
            Ok(graph) => {
                debug!(path = %path.display(), objects, strings, "loaded build graph");
                Ok(CacheLoad::Loaded(graph))
            }
            Err(e) => self.classify_failure(e),
        }
    }

    fn classify_failure<G>(&self, e: PersistError) -> Result<CacheLoad<G>, CacheError> {
        if e.is_no_build_graph() {
            debug!(path = %self.graph_path().display(), "no stored build graph");
            return Ok(CacheLoad::Cold);
        }
        if e.is_corrupt() {
            warn!(path = %self.graph_path().display(), error = %e, "discarding unreadable build graph");
            return Ok(CacheLoad::Stale(StaleReason::Corrupt {
                reason: e.to_string(),
            }));
        }
        Err(e.into())
    }

    /// Compares the stored head metadata with the current one without
    /// decoding the graph.
    pub fn check(&self) -> Result<CacheStatus, CacheError> {
        let stored = match self.peek_head() {
            Ok(Some(stored)) => stored,
            Ok(None) => return Ok(CacheStatus::Absent),
            Err(CacheError::Persist(e)) if e.is_corrupt() => {
                return Ok(CacheStatus::Stale(StaleReason::Corrupt {
                    reason: e.to_string(),
                }))
            }
            Err(e) => return Err(e),
        };
        let changed_keys = diff_keys(&stored, &self.head);
        if changed_keys.is_empty() {
            Ok(CacheStatus::Fresh)
        } else {
            Ok(CacheStatus::Stale(StaleReason::HeadChanged { changed_keys }))
        }
    }

    /// Reads only the head metadata of the stored graph.
    ///
    /// Returns `None` when no graph is stored.
    pub fn peek_head(&self) -> Result<Option<HeadData>, CacheError> {
        read_head(&self.graph_path())
    }

    /// Deletes the stored graph. Returns `false` if there was none.
    pub fn remove(&self) -> Result<bool, CacheError> {
        let path = self.graph_path();
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "removed build graph");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    fn pool(&self) -> PersistentPool {
        PersistentPool::with_span(tracing::debug_span!(
            "build_graph_cache",
            file = %self.file_name
        ))
    }
}

/// Reads the head metadata of any build graph file.
///
/// Returns `None` for a missing or empty file.
pub fn read_head(path: &Path) -> Result<Option<HeadData>, CacheError> {
    let mut pool = PersistentPool::new();
    match pool.open_for_read(path) {
        Ok(()) => {
            let head = pool.head_data().clone();
            pool.close();
            Ok(Some(head))
        }
        Err(e) if e.is_no_build_graph() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn stamp(mut head: HeadData) -> HeadData {
    head.insert(CACHE_FORMAT_KEY, Value::Int(CACHE_FORMAT));
    head
}

/// Top-level keys whose values differ between two snapshots, in key order.
fn diff_keys(stored: &HeadData, current: &HeadData) -> Vec<String> {
    let keys: BTreeSet<&String> = stored
        .project_config
        .keys()
        .chain(current.project_config.keys())
        .collect();
    keys.into_iter()
        .filter(|key| stored.get(key) != current.get(key))
        .cloned()
        .collect()
}
