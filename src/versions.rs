/// Versioned handle helpers.
///
/// A versioned handle appends `.N` to the suffix of a base handle, for example
/// `versioned_handle("123456789/42", 2)` returns `"123456789/42.2"`. The
/// unversioned form is the one cited, so it is preferred when a resource
/// carries both.
use crate::parse::parse_parts;

/// Creates a versioned handle from a base handle and version number.
///
/// # Examples
///
/// ```
/// use handlekit::versions::versioned_handle;
///
/// assert_eq!(versioned_handle("123456789/42", 1), "123456789/42.1");
/// ```
pub fn versioned_handle(base: &str, version: u32) -> String {
    format!("{base}.{version}")
}

/// Checks if a handle has the `prefix/suffix.N` shape.
///
/// # Examples
///
/// ```
/// use handlekit::versions::is_versioned_handle;
///
/// assert!(!is_versioned_handle("123456789/42"));
/// assert!(is_versioned_handle("123456789/42.3"));
/// ```
pub fn is_versioned_handle(handle: &str) -> bool {
    parse_parts(handle).is_some_and(|parsed| parsed.is_versioned())
}

/// Strips a trailing `.N` version marker, if any.
pub fn base_handle(handle: &str) -> &str {
    if is_versioned_handle(handle) {
        handle.rsplit_once('.').map_or(handle, |(base, _)| base)
    } else {
        handle
    }
}

/// Picks the handle to cite among those bound to one resource.
///
/// Returns the first unversioned handle, or the first handle of any shape if
/// all are versioned. `None` only for an empty list.
pub fn preferred_handle<S: AsRef<str>>(handles: &[S]) -> Option<&str> {
    handles
        .iter()
        .map(AsRef::as_ref)
        .find(|h| !is_versioned_handle(h))
        .or_else(|| handles.first().map(AsRef::as_ref))
}
