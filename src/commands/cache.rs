use clap::{Args, Subcommand};
use serde::Serialize;

use courier::cache::{CacheStatus, EvictionReport};

use super::CmdResult;

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Run one eviction sweep now
    Evict,
    /// Show cache location and usage
    Status,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    eviction: Option<EvictionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<CacheStatus>,
}

pub fn run(args: CacheArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<CacheOutput> {
    let runtime = super::runtime()?;
    match args.command {
        CacheCommand::Evict => Ok((
            CacheOutput {
                command: "cache.evict".to_string(),
                eviction: Some(runtime.cache.evict()?),
                status: None,
            },
            0,
        )),
        CacheCommand::Status => Ok((
            CacheOutput {
                command: "cache.status".to_string(),
                eviction: None,
                status: Some(runtime.cache.status()?),
            },
            0,
        )),
    }
}
