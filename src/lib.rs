//! Quote Sync - offline-first quote collection with server sync
//!
//! This crate provides the core functionality for the `qs` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Record, RecordPatch, Conflict)
//! - [`storage`] - Key-value store and the local record cache
//! - [`remote`] - Client for the server-side collection
//! - [`sync`] - Merge, request queue, retry and the sync orchestrator
//! - [`config`] - Configuration and persisted view state
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod validate;

pub use error::{Error, Result};
