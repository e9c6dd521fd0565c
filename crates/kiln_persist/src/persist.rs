//! The [`Persist`] trait and helpers for implementing it.
//!
//! Every type that can travel through a [`PersistentPool`] implements
//! `Persist`. The crate provides implementations for primitives, strings,
//! time values, tuples, collections, maps, [`Value`](crate::Value), and
//! owning and shared handles; graph types implement it themselves, usually
//! through [`persist_struct!`](crate::persist_struct).

use std::rc::Rc;
use std::sync::Arc;

use crate::error::PersistResult;
use crate::identity::ObjectId;
use crate::pool::PersistentPool;

/// A type with a fixed encoding in the persisted stream.
///
/// Nothing in the stream records which type was written, so `load` must
/// consume exactly the bytes `store` produced.
pub trait Persist: Sized {
    /// Writes `self` to the pool without modifying it.
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()>;

    /// Reads a new value from the pool.
    fn load(pool: &mut PersistentPool) -> PersistResult<Self>;

    /// Reads a value into existing storage, replacing all of its content.
    fn load_into(&mut self, pool: &mut PersistentPool) -> PersistResult<()> {
        *self = Self::load(pool)?;
        Ok(())
    }

    /// Writes an optional value.
    ///
    /// The default writes a presence byte followed by the value. Handles
    /// override this to write the null object id instead.
    fn store_optional(value: Option<&Self>, pool: &mut PersistentPool) -> PersistResult<()> {
        match value {
            None => pool.store(&false),
            Some(value) => {
                pool.store(&true)?;
                value.store(pool)
            }
        }
    }

    /// Reads an optional value written by [`store_optional`](Self::store_optional).
    fn load_optional(pool: &mut PersistentPool) -> PersistResult<Option<Self>> {
        if pool.load::<bool>()? {
            Self::load(pool).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Materializes the body of a newly seen object behind an `Rc`.
    ///
    /// The default allocates with [`Rc::new_cyclic`] and registers the weak
    /// reference under `id` while the body loads, so `rc::Weak<Self>` fields
    /// inside the body may point back to it. A strong reference back to it
    /// is corrupt. Interior-mutable wrappers override this to register the
    /// `Rc` itself first, which lets strong cycles load too.
    ///
    /// If the body fails to load, a default value completes the allocation
    /// and is dropped with it.
    fn load_rc(pool: &mut PersistentPool, id: ObjectId) -> PersistResult<Rc<Self>>
    where
        Self: Default + 'static,
    {
        let mut failure = None;
        let rc = Rc::new_cyclic(|weak| {
            match pool
                .register_rc_weak(id, weak.clone())
                .and_then(|()| Self::load(pool))
            {
                Ok(value) => value,
                Err(e) => {
                    failure = Some(e);
                    Self::default()
                }
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        pool.register_rc(id, Rc::clone(&rc))?;
        Ok(rc)
    }

    /// Materializes the body of a newly seen object behind an `Arc`.
    ///
    /// Works like [`load_rc`](Self::load_rc) with `sync::Weak`.
    fn load_arc(pool: &mut PersistentPool, id: ObjectId) -> PersistResult<Arc<Self>>
    where
        Self: Default + Send + Sync + 'static,
    {
        let mut failure = None;
        let arc = Arc::new_cyclic(|weak| {
            match pool
                .register_arc_weak(id, weak.clone())
                .and_then(|()| Self::load(pool))
            {
                Ok(value) => value,
                Err(e) => {
                    failure = Some(e);
                    Self::default()
                }
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        pool.register_arc(id, Arc::clone(&arc))?;
        Ok(arc)
    }
}

/// Implements [`Persist`] for a struct by storing and loading the listed
/// fields in order.
///
/// Listing the fields once keeps the store and load sequences identical.
///
/// ```
/// use kiln_persist::{persist_struct, PersistentPool};
///
/// #[derive(Debug, Default, PartialEq)]
/// struct Artifact {
///     file_path: String,
///     tags: Vec<String>,
///     always_updated: bool,
/// }
///
/// persist_struct!(Artifact { file_path, tags, always_updated });
/// ```
#[macro_export]
macro_rules! persist_struct {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::Persist for $ty {
            #[allow(unused_variables)]
            fn store(&self, pool: &mut $crate::PersistentPool) -> $crate::PersistResult<()> {
                $( pool.store(&self.$field)?; )*
                Ok(())
            }

            #[allow(unused_variables)]
            fn load(pool: &mut $crate::PersistentPool) -> $crate::PersistResult<Self> {
                Ok($ty {
                    $( $field: pool.load()?, )*
                })
            }
        }
    };
}

/// Implements [`Persist`] for a fieldless enum through its integer
/// representation.
///
/// Loading a discriminant that matches no listed variant is reported as
/// corruption.
///
/// ```
/// use kiln_persist::persist_enum;
///
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// #[repr(u8)]
/// enum FileTag {
///     Source = 1,
///     Header = 2,
/// }
///
/// persist_enum!(FileTag as u8 { Source, Header });
/// ```
#[macro_export]
macro_rules! persist_enum {
    ($ty:ident as $repr:ty { $($variant:ident),+ $(,)? }) => {
        impl $crate::Persist for $ty {
            fn store(&self, pool: &mut $crate::PersistentPool) -> $crate::PersistResult<()> {
                let raw: $repr = match self {
                    $( $ty::$variant => $ty::$variant as $repr, )+
                };
                pool.store(&raw)
            }

            fn load(pool: &mut $crate::PersistentPool) -> $crate::PersistResult<Self> {
                let raw: $repr = pool.load()?;
                $(
                    if raw == $ty::$variant as $repr {
                        return Ok($ty::$variant);
                    }
                )+
                Err(pool.corrupt(format!(
                    "invalid {} discriminant {}",
                    stringify!($ty),
                    raw
                )))
            }
        }
    };
}
