//! Background batch deletion for the Pinhole storage layer.
//!
//! Delete calls are acknowledged before any tombstone is written. The
//! producer side enqueues [`BatchDeleteRequest`]s without blocking and the
//! sweeper turns them into low-frequency, batched soft-delete writes
//! against whichever engine backs the process.
//!
//! [`BatchDeleteRequest`]: pinhole_core::BatchDeleteRequest

pub mod config;
pub mod queue;
pub mod sweeper;

pub use config::SweeperConfig;
pub use queue::DeleteQueue;
pub use sweeper::{Sweeper, SweeperHandle};
