//! Text normalisation shared by every indexed value.

/// Sentinel prefix marking an exact-match token.
pub const EXACT_PREFIX: &str = "EX__";
/// Sentinel suffix marking an exact-match token.
pub const EXACT_SUFFIX: &str = "__EX";

/// Normalises free text for indexing.
///
/// Lowercases, folds the joiners that appear inside package and command
/// names (`-`, `.`, `+`, `_`) into `_`, turns any other punctuation into
/// whitespace and collapses runs of whitespace. Applying it twice yields the
/// same string.
pub fn filter_search_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for c in raw.chars().flat_map(char::to_lowercase) {
        let mapped = if c.is_alphanumeric() {
            Some(c)
        } else if matches!(c, '-' | '.' | '+' | '_') {
            Some('_')
        } else {
            None
        };

        match mapped {
            Some(c) => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            }
            None => pending_space = true,
        }
    }

    out
}

/// Wraps an already filtered token in the exact-match sentinels.
pub fn exact_match(token: &str) -> String {
    format!("{EXACT_PREFIX}{token}{EXACT_SUFFIX}")
}
