//! Dense string identifiers for per-session interning tables.

/// The id assigned to an interned string within one persistence session.
///
/// Ids are dense and assigned in first-intern order starting at zero, which
/// is exactly the order in which a [`lasso::Rodeo`] keyed by `StringId` hands
/// them out. That lets the write side of a persisted stream use the rodeo
/// index directly as the on-disk string id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct StringId(u32);

impl StringId {
    /// Creates a `StringId` from a raw `u32` index.
    ///
    /// Intended for decoding and testing. Ids for new strings come from the
    /// interning table.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw `u32` index of this id.
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns the id as a table index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// SAFETY: `StringId` wraps a `u32`, which always fits a `usize` on 32-bit and
// 64-bit platforms. `try_from_usize` rejects values that don't fit in `u32`,
// and `into_usize` returns exactly the value `try_from_usize` accepted.
unsafe impl lasso::Key for StringId {
    fn into_usize(self) -> usize {
        self.0 as usize
    }

    fn try_from_usize(int: usize) -> Option<Self> {
        u32::try_from(int).ok().map(StringId)
    }
}
