//! Generic utility primitives with zero domain knowledge.
//!
//! - `placeholder` - `{{name}}` placeholder rendering
//! - `redact` - Secret masking
//! - `shell` - Shell escaping and quoting
//! - `substitute` - `$VAR` expansion against a resolved environment

pub mod placeholder;
pub mod redact;
pub mod shell;
pub mod substitute;
