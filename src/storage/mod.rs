//! Local persistence layer for Quote Sync.
//!
//! This module provides:
//! - A key-value store (SQLite with WAL, or in-memory)
//! - The quote cache on top of it, with self-healing loads
//!
//! # Submodules
//!
//! - [`cache`] - The `savedQuotes` record cache
//! - [`kv`] - Key-value store trait and implementations
//! - [`schema`] - Database schema definitions

pub mod cache;
pub mod kv;
pub mod schema;

pub use cache::{CacheLoad, DEFAULT_CACHE_KEY, LocalCache};
pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
