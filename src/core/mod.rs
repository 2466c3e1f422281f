// Public modules
pub mod artifact;
pub mod cache;
pub mod command;
pub mod context;
pub mod defaults;
pub mod error;
pub mod executor;
pub mod log_sink;
pub mod paths;
pub mod secrets;
pub mod ssh;
pub mod template;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
