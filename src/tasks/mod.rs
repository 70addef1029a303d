//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is alive.
//!
//! # Tasks
//! - TTL Purge: Removes stale cache entries at configured intervals

mod purge;

pub use purge::spawn_purge_task;
