//! freshscore-core – the concurrency runtime shared by the freshscore
//! binaries.
//!
//! The crate currently exports a single primitive: [`WorkerPool`], the
//! bounded set of execution slots the server schedules detection work onto.

pub mod pool;

pub use pool::{PoolError, WorkerPool};
