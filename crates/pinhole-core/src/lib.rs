//! Core types and traits for the Pinhole URL shortener.
//!
//! This crate provides the record model, the storage contract shared by
//! every engine, the common error vocabulary, and the deterministic
//! short-code derivation.

pub mod error;
pub mod model;
pub mod shortcode;
pub mod storage;

pub use error::{Result, StorageError};
pub use model::{BatchDeleteRequest, Stats, UrlRecord};
pub use storage::Storage;
