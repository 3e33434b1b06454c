//! HTTP surface, configuration, errors and other shared plumbing

pub mod access;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod rate_limiter;
pub mod stats;
pub mod types;
pub mod validation;
pub mod web_server;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use logging::init_logger;
