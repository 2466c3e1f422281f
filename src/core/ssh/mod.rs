mod client;

pub use client::{is_local_host, CommandOutput, SshClient};
pub(crate) use client::{capture, pipe, shell_command};
