// src/cache/mod.rs

//! Hot task/job registry.
//!
//! - [`hot`] is the concurrent in-memory registry of live jobs and their
//!   tasks, indexed by id, by status and by owning job.
//! - [`persist`] mirrors status changes recorded by the registry into the
//!   durable store on a fixed interval.

pub mod hot;
pub mod persist;

pub use hot::{CacheUpdate, HotCache};
pub use persist::{DrainStats, PersistenceDrain};
