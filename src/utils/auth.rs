//! Authentication utilities for API requests
//!
//! Adds the credential headers for a resolved route to an HTTP request.

/// Header carrying the key for versioned (Azure-style) deployments.
pub const API_KEY_HEADER: &str = "api-key";
/// Query parameter naming the deployment API version.
pub const API_VERSION_PARAM: &str = "api-version";

/// Add authentication to an HTTP request
///
/// - With an API version: the key goes in an `api-key` header and the
///   version is appended as an `api-version` query parameter
/// - Otherwise: standard `Authorization: Bearer` header
/// - Without a key, no credential header is added (keyless proxies)
pub fn add_auth_headers(
    request: reqwest::RequestBuilder,
    api_key: Option<&str>,
    api_version: Option<&str>,
) -> reqwest::RequestBuilder {
    match (api_key, api_version) {
        (Some(key), Some(version)) => request
            .header(API_KEY_HEADER, key)
            .query(&[(API_VERSION_PARAM, version)]),
        (None, Some(version)) => request.query(&[(API_VERSION_PARAM, version)]),
        (Some(key), None) => request.header("Authorization", format!("Bearer {key}")),
        (None, None) => request,
    }
}
