//! URL utilities for consistent endpoint handling
//!
//! Endpoints are full URLs (`…/chat/completions`) configured by the user.
//! Comparisons against the built-in official endpoints go through
//! [`normalize_endpoint`] so stray whitespace or a trailing slash does not
//! defeat them.

/// Normalize an endpoint URL by trimming whitespace and trailing slashes
///
/// # Examples
///
/// ```
/// use chatpilot::utils::url::normalize_endpoint;
///
/// assert_eq!(normalize_endpoint(" https://api.example.com/v1/chat/completions/ "), "https://api.example.com/v1/chat/completions");
/// assert_eq!(normalize_endpoint("https://api.example.com/v1///"), "https://api.example.com/v1");
/// ```
pub fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}

/// Compare two endpoints after normalization
pub fn same_endpoint(a: &str, b: &str) -> bool {
    normalize_endpoint(a) == normalize_endpoint(b)
}

/// Treat empty or whitespace-only strings as absent
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
