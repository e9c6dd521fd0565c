//! Sets of bit flags, stored as their raw 32-bit value.

use std::fmt;
use std::marker::PhantomData;

use crate::error::PersistResult;
use crate::persist::Persist;
use crate::pool::PersistentPool;

/// A single flag that occupies one or more bits of a [`FlagSet`].
pub trait Flag: Copy {
    /// The bits this flag sets.
    fn bits(self) -> u32;
}

/// A set of flags of type `F`.
///
/// Unknown bits read from a file are kept as they are, so a set survives a
/// load and store by a build that does not know every flag.
pub struct FlagSet<F> {
    bits: u32,
    _flag: PhantomData<F>,
}

impl<F: Flag> FlagSet<F> {
    /// The empty set.
    pub const fn empty() -> Self {
        Self::from_bits(0)
    }

    /// Creates a set from its raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            bits,
            _flag: PhantomData,
        }
    }

    /// Raw bits of the set.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Adds `flag`.
    pub fn insert(&mut self, flag: F) {
        self.bits |= flag.bits();
    }

    /// Removes `flag`.
    pub fn remove(&mut self, flag: F) {
        self.bits &= !flag.bits();
    }

    /// Returns `true` if every bit of `flag` is set.
    pub fn contains(&self, flag: F) -> bool {
        let bits = flag.bits();
        self.bits & bits == bits
    }

    /// Returns `true` if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Returns the set with `flag` added.
    pub fn with(mut self, flag: F) -> Self {
        self.insert(flag);
        self
    }
}

impl<F> Clone for FlagSet<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for FlagSet<F> {}

impl<F> PartialEq for FlagSet<F> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<F> Eq for FlagSet<F> {}

impl<F: Flag> Default for FlagSet<F> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<F> fmt::Debug for FlagSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlagSet({:#x})", self.bits)
    }
}

impl<F: Flag> From<F> for FlagSet<F> {
    fn from(flag: F) -> Self {
        Self::from_bits(flag.bits())
    }
}

impl<F: Flag> FromIterator<F> for FlagSet<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        let mut set = Self::empty();
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

impl<F: Flag> Persist for FlagSet<F> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        pool.store(&self.bits)
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        pool.load().map(Self::from_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug)]
    enum FileFlag {
        Generated = 0x1,
        AlwaysUpdated = 0x2,
        Installable = 0x8,
    }

    impl Flag for FileFlag {
        fn bits(self) -> u32 {
            self as u32
        }
    }

    #[test]
    fn insert_remove_contains() {
        let mut set = FlagSet::empty();
        assert!(set.is_empty());
        set.insert(FileFlag::Generated);
        set.insert(FileFlag::Installable);
        assert!(set.contains(FileFlag::Generated));
        assert!(!set.contains(FileFlag::AlwaysUpdated));
        assert_eq!(set.bits(), 0x9);
        set.remove(FileFlag::Generated);
        assert_eq!(set, FlagSet::from(FileFlag::Installable));
    }

    #[test]
    fn collect_from_flags() {
        let set: FlagSet<FileFlag> = [FileFlag::Generated, FileFlag::AlwaysUpdated]
            .into_iter()
            .collect();
        assert_eq!(set.bits(), 0x3);
        assert_eq!(format!("{set:?}"), "FlagSet(0x3)");
    }

    #[test]
    fn stored_as_raw_bits() {
        let set = FlagSet::empty()
            .with(FileFlag::AlwaysUpdated)
            .with(FileFlag::Installable);
        let mut pool = PersistentPool::new();
        pool.open_for_write_in_memory().unwrap();
        let head_len = pool.head_data().encode().unwrap().len();
        pool.store(&set).unwrap();
        let bytes = pool.finalize_to_bytes().unwrap();
        assert_eq!(&bytes[head_len..], &[0, 0, 0, 0xa]);

        let mut pool = PersistentPool::new();
        pool.open_for_read_bytes(bytes).unwrap();
        assert_eq!(pool.load::<FlagSet<FileFlag>>().unwrap(), set);
    }

    #[test]
    fn unknown_bits_survive() {
        let mut pool = PersistentPool::new();
        pool.open_for_write_in_memory().unwrap();
        pool.store(&0x8000_0001u32).unwrap();
        let bytes = pool.finalize_to_bytes().unwrap();

        let mut pool = PersistentPool::new();
        pool.open_for_read_bytes(bytes).unwrap();
        let set: FlagSet<FileFlag> = pool.load().unwrap();
        assert!(set.contains(FileFlag::Generated));
        assert_eq!(set.bits(), 0x8000_0001);
    }
}
