//! Owning and shared handles.
//!
//! All handles share one encoding: the object id, or `-1` for null, and on
//! the first occurrence of an id the body of the object right after it.
//! What differs is ownership on the read side:
//!
//! - `Box<T>` moves the loaded value to its single owner. A second reference
//!   to the same id is rejected.
//! - `Rc<T>` and `Arc<T>` return the same allocation for every occurrence of
//!   an id. While the body of a plain value loads, only a `Weak` can refer
//!   back to it, which covers parent pointers.
//! - `Rc<RefCell<T>>` and `Arc<Mutex<T>>` register a default value before
//!   loading the body, so strong references back to an object that is still
//!   being loaded resolve to it.
//!
//! `rc::Weak<T>` and `sync::Weak<T>` store like the handle they point to.
//!
//! The pool's table of loaded objects is released on
//! [`close`](crate::PersistentPool::close).

use std::cell::RefCell;
use std::rc::{self, Rc};
use std::sync::{self, Arc, Mutex};

use crate::error::{PersistError, PersistResult};
use crate::identity::{Incoming, ObjectId};
use crate::persist::Persist;
use crate::pool::PersistentPool;

impl<T: Persist> Persist for Box<T> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        pool.store_owned(|pool| (**self).store(pool))
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        match Self::load_optional(pool)? {
            Some(value) => Ok(value),
            None => Err(pool.corrupt("null object id for a required owning handle")),
        }
    }

    fn store_optional(value: Option<&Self>, pool: &mut PersistentPool) -> PersistResult<()> {
        match value {
            Some(value) => value.store(pool),
            None => pool.store_null(),
        }
    }

    fn load_optional(pool: &mut PersistentPool) -> PersistResult<Option<Self>> {
        match pool.read_handle()? {
            Incoming::Null => Ok(None),
            Incoming::Seen(id) => {
                Err(pool.corrupt(format!("object {id} is owned by more than one handle")))
            }
            Incoming::New(id) => {
                let value = T::load(pool)?;
                pool.mark_moved(id)?;
                Ok(Some(Box::new(value)))
            }
        }
    }
}

impl<T: Persist + Default + 'static> Persist for Rc<T> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        pool.store_shared(Rc::as_ptr(self), |pool| (**self).store(pool))
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        match Self::load_optional(pool)? {
            Some(rc) => Ok(rc),
            None => Err(pool.corrupt("null object id for a required shared handle")),
        }
    }

    fn store_optional(value: Option<&Self>, pool: &mut PersistentPool) -> PersistResult<()> {
        match value {
            Some(value) => value.store(pool),
            None => pool.store_null(),
        }
    }

    fn load_optional(pool: &mut PersistentPool) -> PersistResult<Option<Self>> {
        match pool.read_handle()? {
            Incoming::Null => Ok(None),
            Incoming::Seen(id) => pool.resolve_rc(id).map(Some),
            Incoming::New(id) => T::load_rc(pool, id).map(Some),
        }
    }
}

impl<T: Persist + Default + Send + Sync + 'static> Persist for Arc<T> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        pool.store_shared(Arc::as_ptr(self), |pool| (**self).store(pool))
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        match Self::load_optional(pool)? {
            Some(arc) => Ok(arc),
            None => Err(pool.corrupt("null object id for a required shared handle")),
        }
    }

    fn store_optional(value: Option<&Self>, pool: &mut PersistentPool) -> PersistResult<()> {
        match value {
            Some(value) => value.store(pool),
            None => pool.store_null(),
        }
    }

    fn load_optional(pool: &mut PersistentPool) -> PersistResult<Option<Self>> {
        match pool.read_handle()? {
            Incoming::Null => Ok(None),
            Incoming::Seen(id) => pool.resolve_arc(id).map(Some),
            Incoming::New(id) => T::load_arc(pool, id).map(Some),
        }
    }
}

/// A dead weak reference stores as null and loads as an empty `Weak`.
impl<T: Persist + Default + 'static> Persist for rc::Weak<T> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        match self.upgrade() {
            Some(rc) => rc.store(pool),
            None => pool.store_null(),
        }
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        match pool.read_handle()? {
            Incoming::Null => Ok(rc::Weak::new()),
            Incoming::Seen(id) => pool.resolve_rc_weak(id),
            Incoming::New(id) => T::load_rc(pool, id).map(|rc| Rc::downgrade(&rc)),
        }
    }
}

impl<T: Persist + Default + Send + Sync + 'static> Persist for sync::Weak<T> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        match self.upgrade() {
            Some(arc) => arc.store(pool),
            None => pool.store_null(),
        }
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        match pool.read_handle()? {
            Incoming::Null => Ok(sync::Weak::new()),
            Incoming::Seen(id) => pool.resolve_arc_weak(id),
            Incoming::New(id) => T::load_arc(pool, id).map(|arc| Arc::downgrade(&arc)),
        }
    }
}

impl<T: Persist + Default + 'static> Persist for RefCell<T> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        let value = self.try_borrow().map_err(|_| {
            PersistError::unrepresentable("value is mutably borrowed while being stored")
        })?;
        value.store(pool)
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        T::load(pool).map(RefCell::new)
    }

    fn load_into(&mut self, pool: &mut PersistentPool) -> PersistResult<()> {
        self.get_mut().load_into(pool)
    }

    fn load_rc(pool: &mut PersistentPool, id: ObjectId) -> PersistResult<Rc<Self>>
    where
        Self: 'static,
    {
        let rc = Rc::new(RefCell::new(T::default()));
        pool.register_rc(id, Rc::clone(&rc))?;
        let body = T::load(pool)?;
        *rc.borrow_mut() = body;
        Ok(rc)
    }
}

impl<T: Persist + Default + Send + 'static> Persist for Mutex<T> {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        let value = self
            .lock()
            .map_err(|_| PersistError::unrepresentable("mutex poisoned while being stored"))?;
        value.store(pool)
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        T::load(pool).map(Mutex::new)
    }

    fn load_into(&mut self, pool: &mut PersistentPool) -> PersistResult<()> {
        match self.get_mut() {
            Ok(value) => value.load_into(pool),
            Err(poisoned) => poisoned.into_inner().load_into(pool),
        }
    }

    fn load_arc(pool: &mut PersistentPool, id: ObjectId) -> PersistResult<Arc<Self>>
    where
        Self: Send + Sync + 'static,
    {
        let arc = Arc::new(Mutex::new(T::default()));
        pool.register_arc(id, Arc::clone(&arc))?;
        let body = T::load(pool)?;
        match arc.lock() {
            Ok(mut guard) => *guard = body,
            Err(poisoned) => *poisoned.into_inner() = body,
        }
        Ok(arc)
    }
}
