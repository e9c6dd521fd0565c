//! Binary persistence of build graphs.
//!
//! A [`PersistentPool`] writes an object graph to a compact positional byte
//! stream and rebuilds it later, preserving shared references and reference
//! cycles and writing each distinct string only once. Every file starts with
//! [`HeadData`], a self-describing configuration snapshot that lets a caller
//! decide whether the rest of the file still applies before loading it.
//!
//! ```
//! use kiln_persist::{persist_struct, HeadData, PersistentPool};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Product {
//!     name: String,
//!     sources: Vec<String>,
//! }
//!
//! persist_struct!(Product { name, sources });
//!
//! let mut head = HeadData::new();
//! head.insert("profile", "release");
//!
//! let mut pool = PersistentPool::new();
//! pool.set_head_data(head.clone());
//! pool.open_for_write_in_memory()?;
//! let app = Product { name: "app".into(), sources: vec!["main.cpp".into()] };
//! pool.store(&app)?;
//! let bytes = pool.finalize_to_bytes()?;
//!
//! let mut pool = PersistentPool::new();
//! pool.open_for_read_bytes(bytes)?;
//! assert_eq!(pool.head_data(), &head);
//! assert_eq!(pool.load::<Product>()?, app);
//! pool.close();
//! # Ok::<(), kiln_persist::PersistError>(())
//! ```

#![warn(missing_docs)]

mod collections;
pub mod env;
pub mod error;
pub mod flags;
mod handle;
pub mod head;
mod identity;
pub mod persist;
pub mod pool;
mod primitive;
mod strings;
pub mod value;

pub use env::Environment;
pub use error::{PersistError, PersistResult};
pub use flags::{Flag, FlagSet};
pub use head::HeadData;
pub use identity::{ObjectId, NULL_ID};
pub use persist::Persist;
pub use pool::{PersistentPool, DEFAULT_WRITE_BUFFER};
pub use value::Value;
