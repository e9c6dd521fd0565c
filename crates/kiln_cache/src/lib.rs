//! Build graph cache management.
//!
//! This crate stores the build graph of a project between runs and decides on
//! the next run whether the stored graph can be reused. The decision is made
//! from the head metadata alone, so an outdated graph is never decoded.

#![warn(missing_docs)]

pub mod cache;
pub mod error;

pub use cache::{
    read_head, BuildGraphCache, CacheLoad, CacheStatus, StaleReason, CACHE_FORMAT,
    CACHE_FORMAT_KEY,
};
pub use error::CacheError;
