//! String interning tables for one persistence session.

use kiln_common::StringId;
use lasso::Rodeo;

/// Deduplicates strings within a session.
///
/// The write side is a [`Rodeo`] whose dense keys double as the on-disk
/// string ids. The read side is a plain vector indexed by id, filled in the
/// order the ids first appear in the stream.
pub(crate) struct StringTable {
    stored: Rodeo<StringId>,
    loaded: Vec<String>,
}

/// Outcome of interning a string on the write side.
pub(crate) enum Interned {
    /// The string was stored before under this id.
    Existing(StringId),
    /// The string is new; its characters must follow the id.
    New(StringId),
}

impl StringTable {
    pub(crate) fn new() -> Self {
        Self {
            stored: Rodeo::new(),
            loaded: Vec::new(),
        }
    }

    pub(crate) fn intern(&mut self, s: &str) -> Result<Interned, lasso::LassoError> {
        if let Some(id) = self.stored.get(s) {
            return Ok(Interned::Existing(id));
        }
        self.stored.try_get_or_intern(s).map(Interned::New)
    }

    /// Returns the string previously loaded under `id`.
    pub(crate) fn get(&self, id: StringId) -> Option<&str> {
        self.loaded.get(id.index()).map(String::as_str)
    }

    /// The id the next first-sighting string must carry.
    pub(crate) fn next_load_id(&self) -> usize {
        self.loaded.len()
    }

    pub(crate) fn push_loaded(&mut self, s: String) {
        self.loaded.push(s);
    }

    pub(crate) fn stored_count(&self) -> usize {
        self.stored.len()
    }

    pub(crate) fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::new();
    }
}
