//! Ready-list normalization.

use std::collections::BTreeSet;

/// Normalize raw ready-list text into unique, non-blank, sorted plan ids.
///
/// Lines are trimmed, blank lines dropped, then sorted and deduplicated. The
/// function is idempotent: feeding its output back in yields the same list.
pub fn normalize_ready_list(raw: &str) -> Vec<String> {
    normalize_ids(raw.lines())
}

/// Same as [`normalize_ready_list`] for ids that are already split.
pub fn normalize_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ids.into_iter()
        .map(|id| id.as_ref().trim().to_string())
        .filter(|id| !id.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Render ids as ready-list file contents (one per line, trailing newline when non-empty).
pub fn render_ready_list(ids: &[String]) -> String {
    if ids.is_empty() {
        return String::new();
    }
    let mut out = ids.join("\n");
    out.push('\n');
    out
}
