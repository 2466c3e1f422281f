use super::{codes, ErrorCode, Hint};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHelpSummary {
    pub code: String,
    pub summary: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHelp {
    pub code: String,
    pub summary: String,
    pub details_schema: serde_json::Value,
    pub hints: Vec<Hint>,
}

pub fn list() -> Vec<ErrorHelpSummary> {
    codes::all_codes()
        .iter()
        .copied()
        .map(|code| {
            let help = explain(code);
            ErrorHelpSummary {
                code: help.code,
                summary: help.summary,
            }
        })
        .collect()
}

fn help(code: ErrorCode, summary: &str, schema: serde_json::Value, hint: &str) -> ErrorHelp {
    ErrorHelp {
        code: code.as_str().to_string(),
        summary: summary.to_string(),
        details_schema: schema,
        hints: vec![Hint {
            message: hint.to_string(),
        }],
    }
}

fn taxonomy_schema() -> serde_json::Value {
    serde_json::json!({"explanation":"string","cause":"string?","subject":"string?"})
}

pub fn explain(code: ErrorCode) -> ErrorHelp {
    match code {
        ErrorCode::ConfigInvalidJson => help(
            code,
            "Configuration JSON is invalid",
            serde_json::json!({"path":"string","error":"string"}),
            "Fix JSON syntax in courier.json",
        ),
        ErrorCode::ConfigInvalidValue => help(
            code,
            "Configuration value is invalid",
            serde_json::json!({"key":"string","value":"string?","problem":"string"}),
            "Correct the config value or environment override to match the expected type",
        ),
        ErrorCode::ValidationMissingArgument => help(
            code,
            "Missing required CLI argument",
            serde_json::json!({"args":"string[]"}),
            "Rerun the command with the required argument(s)",
        ),
        ErrorCode::ValidationInvalidArgument => help(
            code,
            "Invalid argument or task parameters",
            serde_json::json!({"field":"string","problem":"string","id":"string?","tried":"string[]?"}),
            "Verify the argument value and try again",
        ),
        ErrorCode::ValidationInvalidJson => help(
            code,
            "Invalid JSON input",
            serde_json::json!({"error":"string","context":"string?","input":"string?"}),
            "Fix the JSON task spec",
        ),
        ErrorCode::ArtifactSizeExceeded => help(
            code,
            "Artifact is larger than the cache size limit",
            taxonomy_schema(),
            "Raise artifactFileSizeLimit or deploy a smaller artifact",
        ),
        ErrorCode::ArtifactTooLarge => help(
            code,
            "Artifact is larger than the handler ceiling",
            taxonomy_schema(),
            "Raise handlerMaxArtifactSize or unset it",
        ),
        ErrorCode::UnsupportedArtifactSource => help(
            code,
            "No handler for the artifact repository type",
            taxonomy_schema(),
            "Use a supported repository type or register a handler",
        ),
        ErrorCode::ArtifactNotConfigured => help(
            code,
            "Artifact configuration missing or of the wrong type",
            taxonomy_schema(),
            "Add a matching 'artifact' block to the task",
        ),
        ErrorCode::ArtifactPathMissing => help(
            code,
            "Artifact path or filter is blank",
            taxonomy_schema(),
            "Set the artifact path",
        ),
        ErrorCode::SizeQueryFailed => help(
            code,
            "Repository size query failed",
            taxonomy_schema(),
            "Check connector URL and credentials",
        ),
        ErrorCode::ArtifactDownloadFailed => help(
            code,
            "Repository download failed",
            taxonomy_schema(),
            "Check that the artifact exists and is readable",
        ),
        ErrorCode::ArtifactNotFound => help(
            code,
            "Artifact missing from cache after download",
            taxonomy_schema(),
            "Check cache directory space and permissions",
        ),
        ErrorCode::NoDestinationPathSpecified => help(
            code,
            "Copy step has no destination path",
            taxonomy_schema(),
            "Set destinationPath on the unit",
        ),
        ErrorCode::NoConfigFileProvided => help(
            code,
            "Config copy step has no files",
            taxonomy_schema(),
            "Add fileDelegateConfig to the task",
        ),
        ErrorCode::ScriptExecutionFailed => help(
            code,
            "Script exited non-zero",
            serde_json::json!({"unit":"string","exitCode":"number","stdout":"string","stderr":"string","target":"string"}),
            "Inspect stdout/stderr for failure details",
        ),
        ErrorCode::TransportFailure => help(
            code,
            "Target unreachable",
            taxonomy_schema(),
            "Check SSH connectivity and credentials",
        ),
        ErrorCode::TemplateRenderFailed => help(
            code,
            "Wrapper script rendering failed",
            taxonomy_schema(),
            "Report as a courier bug if persistent",
        ),
        ErrorCode::SecretDecryptionFailed => help(
            code,
            "Secret reference could not be resolved",
            taxonomy_schema(),
            "Export the referenced secret",
        ),
        ErrorCode::InternalIoError => help(
            code,
            "Internal IO error",
            serde_json::json!({"error":"string","context":"string?"}),
            "Report as a courier bug if persistent",
        ),
        ErrorCode::InternalJsonError => help(
            code,
            "Internal JSON error",
            serde_json::json!({"error":"string","context":"string?"}),
            "Report as a courier bug if persistent",
        ),
        ErrorCode::InternalUnexpected => help(
            code,
            "Unexpected internal error",
            serde_json::json!({}),
            "Report as a courier bug with steps to reproduce",
        ),
    }
}
