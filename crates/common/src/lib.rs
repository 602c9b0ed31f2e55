//! Framecast Common Utilities
//!
//! Shared infrastructure for all Framecast crates:
//! - Error types and result aliases
//! - Run clock for elapsed-time reporting
//! - Tracing/logging initialization
//! - Configuration loading

pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use cancel::*;
pub use clock::*;
pub use config::*;
pub use error::*;
