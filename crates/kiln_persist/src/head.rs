//! Head metadata written at the start of every build graph file.

use std::collections::BTreeMap;

use kiln_common::ContentHash;

use crate::error::PersistResult;
use crate::pool::PersistentPool;
use crate::value::{self, Value};

/// A configuration snapshot stored ahead of the graph.
///
/// Callers put whatever they need to decide whether the rest of the file is
/// still applicable (project configuration, tool version) here. The block is
/// self-contained, so it can be read without touching the graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadData {
    /// The configuration snapshot, ordered by key.
    pub project_config: BTreeMap<String, Value>,
}

impl HeadData {
    /// Creates empty head metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates head metadata from an existing configuration map.
    pub fn with_config(project_config: BTreeMap<String, Value>) -> Self {
        Self { project_config }
    }

    /// Sets `key` to `value`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.project_config.insert(key.into(), value.into())
    }

    /// Looks up a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.project_config.get(key)
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.project_config.len()
    }

    /// Returns `true` if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.project_config.is_empty()
    }

    /// Encodes the block exactly as it appears at the start of a file.
    pub fn encode(&self) -> PersistResult<Vec<u8>> {
        let mut out = Vec::new();
        out.push(value::TAG_MAP);
        value::encode_map_into(&self.project_config, &mut out, 0)?;
        Ok(out)
    }

    /// Hash of the encoded block.
    ///
    /// Two snapshots have the same fingerprint exactly when they hold the
    /// same keys and values, independent of insertion order.
    pub fn fingerprint(&self) -> PersistResult<ContentHash> {
        self.encode().map(|bytes| ContentHash::from_bytes(&bytes))
    }

    pub(crate) fn decode(pool: &mut PersistentPool) -> PersistResult<Self> {
        value::decode_tagged_map(pool).map(Self::with_config)
    }
}

impl From<HeadData> for Value {
    fn from(head: HeadData) -> Self {
        Value::Map(head.project_config)
    }
}
