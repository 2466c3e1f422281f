use super::ErrorCode;

pub fn all_codes() -> &'static [ErrorCode] {
    &[
        ErrorCode::ConfigInvalidJson,
        ErrorCode::ConfigInvalidValue,
        ErrorCode::ValidationMissingArgument,
        ErrorCode::ValidationInvalidArgument,
        ErrorCode::ValidationInvalidJson,
        ErrorCode::ArtifactSizeExceeded,
        ErrorCode::ArtifactTooLarge,
        ErrorCode::UnsupportedArtifactSource,
        ErrorCode::ArtifactNotConfigured,
        ErrorCode::ArtifactPathMissing,
        ErrorCode::SizeQueryFailed,
        ErrorCode::ArtifactDownloadFailed,
        ErrorCode::ArtifactNotFound,
        ErrorCode::NoDestinationPathSpecified,
        ErrorCode::NoConfigFileProvided,
        ErrorCode::ScriptExecutionFailed,
        ErrorCode::TransportFailure,
        ErrorCode::TemplateRenderFailed,
        ErrorCode::SecretDecryptionFailed,
        ErrorCode::InternalIoError,
        ErrorCode::InternalJsonError,
        ErrorCode::InternalUnexpected,
    ]
}

pub fn parse_code(code: &str) -> Option<ErrorCode> {
    all_codes()
        .iter()
        .copied()
        .find(|candidate| candidate.as_str() == code)
}
