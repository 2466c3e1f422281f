use clap::{Args, Subcommand};
use serde::Serialize;

use courier::error::codes;
use courier::error::help::{self, ErrorHelp, ErrorHelpSummary};

use super::CmdResult;

#[derive(Args)]
pub struct ErrorArgs {
    #[command(subcommand)]
    command: ErrorCommand,
}

#[derive(Subcommand)]
enum ErrorCommand {
    /// List every error code
    Codes,
    /// Explain one error code
    Explain {
        /// Error code (e.g. artifact.size_exceeded)
        code: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    codes: Option<Vec<ErrorHelpSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    help: Option<ErrorHelp>,
}

pub fn run(args: ErrorArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<ErrorOutput> {
    match args.command {
        ErrorCommand::Codes => Ok((
            ErrorOutput {
                command: "error.codes".to_string(),
                codes: Some(help::list()),
                help: None,
            },
            0,
        )),
        ErrorCommand::Explain { code } => {
            let parsed = codes::parse_code(&code).ok_or_else(|| {
                let known = codes::all_codes()
                    .iter()
                    .map(|c| c.as_str().to_string())
                    .collect();
                courier::Error::validation_invalid_argument(
                    "code",
                    format!("Unknown error code '{}'", code),
                    Some(code.clone()),
                    Some(known),
                )
            })?;
            Ok((
                ErrorOutput {
                    command: "error.explain".to_string(),
                    codes: None,
                    help: Some(help::explain(parsed)),
                },
                0,
            ))
        }
    }
}
