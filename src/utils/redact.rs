//! Secret masking for log lines and error messages.

pub const MASK: &str = "**************";

/// Replace each non-empty secret occurring in `text` with [`MASK`].
/// Longer secrets are masked first so a secret that contains another is fully hidden.
pub fn mask<S: AsRef<str>>(text: &str, secrets: &[S]) -> String {
    let mut ordered: Vec<&str> = secrets
        .iter()
        .map(|s| s.as_ref())
        .filter(|s| !s.is_empty())
        .collect();
    ordered.sort_by_key(|s| std::cmp::Reverse(s.len()));

    let mut result = text.to_string();
    for secret in ordered {
        result = result.replace(secret, MASK);
    }
    result
}
