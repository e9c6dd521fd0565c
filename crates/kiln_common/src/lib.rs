//! Shared foundational types used across the Kiln build tool.
//!
//! This crate provides content hashing for cache fingerprints, the key type
//! used by string interning tables, and common result types.

#![warn(missing_docs)]

pub mod hash;
pub mod ident;
pub mod result;

pub use hash::ContentHash;
pub use ident::StringId;
pub use result::{InternalError, KilnResult};
