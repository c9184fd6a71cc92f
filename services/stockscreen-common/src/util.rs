//! Utility functions shared by the config layer and the screener.

use std::collections::HashSet;
use std::path::PathBuf;

/// Normalize a list of instrument symbols.
///
/// Trims whitespace, upper-cases, drops blanks and keeps only the first
/// occurrence of each symbol. Input order is otherwise preserved.
pub fn normalize_symbols<I, S>(symbols: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .map(|s| s.as_ref().trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Split a comma- or newline-separated symbol list (e.g. "2330.TW, 2454.TW").
pub fn split_symbols(input: &str) -> Vec<String> {
    normalize_symbols(input.split([',', '\n']))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => directories::UserDirs::new()
            .map_or_else(|| PathBuf::from(path), |dirs| dirs.home_dir().join(rest)),
        None => PathBuf::from(path),
    }
}
