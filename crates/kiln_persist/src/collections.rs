//! Encodings for optional values, tuples, sequences, and maps.
//!
//! Sequences and maps are a 32-bit element count followed by the elements
//! (maps: each key immediately followed by its value). Tuples are their
//! elements in order. None of these carry identity: two equal vectors are
//! written twice.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::{BuildHasher, Hash};

use crate::error::PersistResult;
use crate::persist::Persist;
use crate::pool::PersistentPool;

impl<T: Persist> Persist for Option<T> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        T::store_optional(self.as_ref(), pool)
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        T::load_optional(pool)
    }
}

macro_rules! persist_tuple {
    ($($name:ident),+) => {
        impl<$($name: Persist),+> Persist for ($($name,)+) {
            #[allow(non_snake_case)]
            fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
                let ($($name,)+) = self;
                $( $name.store(pool)?; )+
                Ok(())
            }

            fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
                Ok(($($name::load(pool)?,)+))
            }
        }
    };
}

persist_tuple!(A);
persist_tuple!(A, B);
persist_tuple!(A, B, C);
persist_tuple!(A, B, C, D);

fn store_seq<'a, T: Persist + 'a>(
    pool: &mut PersistentPool,
    len: usize,
    items: impl Iterator<Item = &'a T>,
) -> PersistResult<()> {
    pool.write_len(len)?;
    for item in items {
        item.store(pool)?;
    }
    Ok(())
}

impl<T: Persist> Persist for Vec<T> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        store_seq(pool, self.len(), self.iter())
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        let count = pool.read_len()?;
        let mut items = Vec::with_capacity(pool.capacity_hint(count));
        for _ in 0..count {
            items.push(T::load(pool)?);
        }
        Ok(items)
    }
}

impl<T: Persist> Persist for VecDeque<T> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        store_seq(pool, self.len(), self.iter())
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        Vec::<T>::load(pool).map(VecDeque::from)
    }
}

impl<T: Persist + Ord> Persist for BTreeSet<T> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        store_seq(pool, self.len(), self.iter())
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        let count = pool.read_len()?;
        let mut set = BTreeSet::new();
        for _ in 0..count {
            set.insert(T::load(pool)?);
        }
        Ok(set)
    }
}

impl<T, S> Persist for HashSet<T, S>
where
    T: Persist + Eq + Hash,
    S: BuildHasher + Default,
{
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        store_seq(pool, self.len(), self.iter())
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        let count = pool.read_len()?;
        let mut set = HashSet::with_capacity_and_hasher(pool.capacity_hint(count), S::default());
        for _ in 0..count {
            set.insert(T::load(pool)?);
        }
        Ok(set)
    }
}

fn store_map<'a, K: Persist + 'a, V: Persist + 'a>(
    pool: &mut PersistentPool,
    len: usize,
    entries: impl Iterator<Item = (&'a K, &'a V)>,
) -> PersistResult<()> {
    pool.write_len(len)?;
    for (key, value) in entries {
        key.store(pool)?;
        value.store(pool)?;
    }
    Ok(())
}

impl<K: Persist + Ord, V: Persist> Persist for BTreeMap<K, V> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        store_map(pool, self.len(), self.iter())
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        let count = pool.read_len()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = K::load(pool)?;
            let value = V::load(pool)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<K, V, S> Persist for HashMap<K, V, S>
where
    K: Persist + Eq + Hash,
    V: Persist,
    S: BuildHasher + Default,
{
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        store_map(pool, self.len(), self.iter())
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        let count = pool.read_len()?;
        let mut map = HashMap::with_capacity_and_hasher(pool.capacity_hint(count), S::default());
        for _ in 0..count {
            let key = K::load(pool)?;
            let value = V::load(pool)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}
