//! `{{name}}` placeholder rendering.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").unwrap());

pub struct TemplateVars;

impl TemplateVars {
    pub const ENV_EXPORTS: &'static str = "envExports";
    pub const WORKING_DIR: &'static str = "workingDir";
    pub const SCRIPT: &'static str = "script";
    pub const OUTPUT_CAPTURE: &'static str = "outputCapture";
    pub const TAIL_COMMANDS: &'static str = "tailCommands";
    pub const TAIL_WAITS: &'static str = "tailWaits";
    pub const EXECUTION_ID: &'static str = "executionId";
}

/// Replace every `{{name}}` in one pass. Values are inserted verbatim, so a
/// value that itself contains `{{...}}` is never expanded again.
///
/// Returns the names of placeholders with no matching variable as the error.
pub fn render_strict(
    template: &str,
    variables: &HashMap<String, String>,
) -> std::result::Result<String, Vec<String>> {
    let missing = placeholders(template)
        .into_iter()
        .filter(|name| !variables.contains_key(name))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(missing);
    }

    let rendered = PLACEHOLDER_PATTERN.replace_all(template, |caps: &Captures| {
        variables
            .get(&caps[1])
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    });
    Ok(rendered.into_owned())
}

/// Placeholder names in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER_PATTERN
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

pub fn is_present(template: &str, key: &str) -> bool {
    let placeholder = format!("{{{{{}}}}}", key);
    template.contains(&placeholder)
}
