//! Endpoint URL helpers.
//!
//! Base URLs come from user configuration and may carry trailing slashes or
//! bare IPv6 literals; these helpers keep endpoint construction uniform.

/// Builds `scheme://host:port`, bracketing IPv6 literals.
///
/// ```
/// use lazylms::utils::url::format_base_url;
///
/// assert_eq!(format_base_url("http", "localhost", 1234), "http://localhost:1234");
/// assert_eq!(format_base_url("HTTP", "::1", 1234), "http://[::1]:1234");
/// ```
pub fn format_base_url(scheme: &str, host: &str, port: u16) -> String {
    let scheme = scheme.to_ascii_lowercase();
    if host.contains(':') && !host.starts_with('[') {
        format!("{scheme}://[{host}]:{port}")
    } else {
        format!("{scheme}://{host}:{port}")
    }
}

/// Removes trailing slashes.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Joins a base URL and an endpoint path with exactly one slash.
///
/// ```
/// use lazylms::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:1234/v1/", "/responses"),
///     "http://localhost:1234/v1/responses"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{normalized_base}/{endpoint}")
}
