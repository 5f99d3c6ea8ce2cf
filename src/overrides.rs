//! Prompt override resolution.

/// Joins explicit override texts, then pre-joined file contents, into one
/// prompt. Blank pieces are dropped; `None` means no override applies.
#[must_use]
pub fn resolve_override(explicit: &[String], file_text: Option<&str>) -> Option<String> {
    let joined = explicit
        .iter()
        .map(|text| text.trim())
        .chain(file_text.map(str::trim))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Override text when present, otherwise the caller's default prompt.
#[must_use]
pub fn effective_prompt(
    explicit: &[String],
    file_text: Option<&str>,
    default_prompt: &str,
) -> String {
    resolve_override(explicit, file_text).unwrap_or_else(|| default_prompt.to_string())
}
