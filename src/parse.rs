use crate::config::HandleConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Textual forms of a handle that carry the bare `prefix/suffix` in group 1.
static IDENTIFIER_PATTERNS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"^hdl:(.+)$").expect("valid pattern"),
        Regex::new(r"^info:hdl/(.+)$").expect("valid pattern"),
        Regex::new(r"^https?://hdl\.handle\.net/(.+)$").expect("valid pattern"),
        Regex::new(r"^https?://.+/handle/(.+)$").expect("valid pattern"),
    ]
});

/// Parsed representation of a bare handle.
///
/// Format: `<prefix>/<suffix>`. The prefix may itself contain dots
/// (`1721.1/123`); the suffix may end in a `.N` version marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHandle {
    pub prefix: String,
    pub suffix: String,
}

impl ParsedHandle {
    /// Returns the version number if the suffix looks like `<base>.<digits>`.
    pub fn version(&self) -> Option<u32> {
        let (_, tail) = self.suffix.rsplit_once('.')?;
        if tail.is_empty() || !tail.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        tail.parse().ok()
    }

    pub fn is_versioned(&self) -> bool {
        self.version().is_some()
    }

    /// Formats this handle as `prefix/suffix`.
    pub fn to_handle_string(&self) -> String {
        compose(&self.prefix, &self.suffix)
    }
}

impl fmt::Display for ParsedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.suffix)
    }
}

/// Joins a prefix and suffix with a single `/`.
pub fn compose(prefix: &str, suffix: &str) -> String {
    if prefix.ends_with('/') {
        format!("{prefix}{suffix}")
    } else {
        format!("{prefix}/{suffix}")
    }
}

/// Splits a bare handle at its first `/`.
///
/// Returns `None` when there is no slash or either side is empty.
pub fn parse_parts(handle: &str) -> Option<ParsedHandle> {
    let (prefix, suffix) = handle.split_once('/')?;
    if prefix.is_empty() || suffix.is_empty() || prefix.chars().any(char::is_whitespace) {
        return None;
    }
    Some(ParsedHandle {
        prefix: prefix.to_string(),
        suffix: suffix.to_string(),
    })
}

/// Returns true if the string is a bare `prefix/suffix` handle.
pub fn is_valid_handle_format(handle: &str) -> bool {
    parse_parts(handle).is_some()
}

/// Reduces the accepted textual forms of a handle to bare `prefix/suffix`.
#[derive(Debug, Clone)]
pub struct HandleParser {
    prefix: String,
    canonical_prefix: String,
    additional_prefixes: Vec<String>,
}

impl HandleParser {
    pub fn new(config: &HandleConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            canonical_prefix: config.canonical_prefix.clone(),
            additional_prefixes: config.additional_prefixes.clone(),
        }
    }

    /// Parses an identifier into its bare handle form.
    ///
    /// Accepted, in order:
    /// - bare handle under the local prefix
    /// - the configured canonical prefix followed by a handle
    /// - `hdl:`, `info:hdl/`, `http(s)://hdl.handle.net/`, `http(s)://<host>/handle/`
    /// - bare handle under one of the additional prefixes
    ///
    /// `None` means the string is not a recognized identifier at all.
    pub fn parse_handle(&self, identifier: &str) -> Option<String> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }

        if starts_with_prefix(identifier, &self.prefix) {
            return Some(identifier.to_string());
        }

        if !self.canonical_prefix.is_empty() {
            if let Some(rest) = identifier.strip_prefix(self.canonical_prefix.as_str()) {
                let rest = rest.trim_start_matches('/');
                if is_valid_handle_format(rest) {
                    return Some(rest.to_string());
                }
            }
        }

        for pattern in IDENTIFIER_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(identifier) {
                return captures.get(1).map(|m| m.as_str().to_string());
            }
        }

        self.additional_prefixes
            .iter()
            .any(|additional| starts_with_prefix(identifier, additional))
            .then(|| identifier.to_string())
    }

    /// Prepends the canonical resolver base to a bare handle.
    pub fn canonical_form(&self, handle: &str) -> String {
        format!("{}{}", self.canonical_prefix, handle)
    }
}

fn starts_with_prefix(identifier: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    !prefix.is_empty()
        && identifier
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.len() > 1 && rest.starts_with('/'))
}
