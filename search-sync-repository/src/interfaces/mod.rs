//! Interface definitions for index backends.
//!
//! This module defines the abstract `IndexBackend` trait that allows the
//! registry and the sync engine to run against swappable backends.

mod index_backend;

pub use index_backend::IndexBackend;
