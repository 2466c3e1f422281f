//! `$NAME` / `${NAME}` substitution against a resolved environment.

use std::collections::HashMap;

/// Expand `$NAME` and `${NAME}` using `env`. Unknown names are left as written.
pub fn substitute_vars(input: &str, env: &HashMap<String, String>) -> String {
    shellexpand::env_with_context_no_errors(input, |name: &str| env.get(name).map(String::as_str))
        .into_owned()
}

/// Substitute in place, returning true when the value changed.
pub fn substitute_in_place(value: &mut String, env: &HashMap<String, String>) -> bool {
    let expanded = substitute_vars(value, env);
    if expanded != *value {
        *value = expanded;
        true
    } else {
        false
    }
}
