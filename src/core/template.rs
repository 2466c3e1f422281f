//! Wrapper-script templates rendered by Init.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::placeholder::render_strict;

pub const BOOTSTRAP_TEMPLATE: &str = "bootstrap.sh";
pub const TAIL_WRAPPER_TEMPLATE: &str = "tail-wrapper.sh";

/// Exports the resolved environment, runs the unit's script in the working
/// directory, and prints declared output variables on exit (even on `exit N`).
const BOOTSTRAP: &str = r#"#!/bin/sh
# courier execution {{executionId}}
{{envExports}}
__courier_outputs() {
{{outputCapture}}
}
trap '__courier_rc=$?; __courier_outputs; exit $__courier_rc' EXIT
cd {{workingDir}} || exit 1
{{script}}
"#;

/// Runs a bootstrap script, then waits for each tail pattern to show up in the
/// lines its file gained while the script ran.
const TAIL_WRAPPER: &str = r#"#!/bin/sh
# courier execution {{executionId}}
{{tailCommands}}
sh {{script}}
__courier_rc=$?
{{tailWaits}}
exit $__courier_rc
"#;

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template_name: &str, params: &HashMap<String, String>) -> Result<String>;
}

/// Renders the two built-in templates.
#[derive(Debug, Default, Clone)]
pub struct BuiltinTemplates;

impl BuiltinTemplates {
    fn source(name: &str) -> Option<&'static str> {
        match name {
            BOOTSTRAP_TEMPLATE => Some(BOOTSTRAP),
            TAIL_WRAPPER_TEMPLATE => Some(TAIL_WRAPPER),
            _ => None,
        }
    }
}

impl TemplateRenderer for BuiltinTemplates {
    fn render(&self, template_name: &str, params: &HashMap<String, String>) -> Result<String> {
        let source = Self::source(template_name)
            .ok_or_else(|| Error::template_render_failed(template_name, "unknown template"))?;
        render_strict(source, params).map_err(|missing| {
            Error::template_render_failed(
                template_name,
                format!("missing variables: {}", missing.join(", ")),
            )
        })
    }
}
