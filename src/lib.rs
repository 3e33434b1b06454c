//! reelgrab - resolve Instagram posts into direct video links or hosted MP3s
//!
//! # Module Structure
//!
//! - `core`: HTTP API, configuration, errors, logging, rate limiting, metrics
//! - `download`: extraction, streaming download and request resolution
//! - `conversion`: FFmpeg audio transcoding
//! - `storage`: key-value store, resolution cache, object store, deferred cleanup
//! - `cli`: command-line interface

pub mod cli;
pub mod conversion;
pub mod core;
pub mod download;
pub mod storage;

pub use core::{AppError, AppResult, Config};
