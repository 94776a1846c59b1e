use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur while validating the API base URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain HTTP to a non-loopback host would leak the bearer token.
    #[error("Insecure base URL: HTTPS required (except loopback hosts)")]
    InsecureScheme,
    /// The URL cannot have paths joined onto it (e.g. `mailto:`-style URLs).
    #[error("URL cannot be used as a base")]
    CannotBeABase,
}

/// Validates the news API base URL and normalizes it for joining.
///
/// - Only `http` and `https` schemes are accepted.
/// - `http` is allowed only for loopback hosts (`localhost`, `127.0.0.0/8`, `::1`),
///   which is what local mock servers bind to.
/// - The returned URL always ends with `/` so that `Url::join("news")` appends
///   instead of replacing the last path segment.
///
/// # Examples
///
/// ```
/// use matchday::util::validate_base_url;
///
/// let url = validate_base_url("https://api.example.com/v1").unwrap();
/// assert_eq!(url.as_str(), "https://api.example.com/v1/");
///
/// assert!(validate_base_url("http://api.example.com").is_err());
/// assert!(validate_base_url("http://127.0.0.1:8080").is_ok());
/// ```
pub fn validate_base_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let mut url = Url::parse(url_str)?;

    if url.cannot_be_a_base() {
        return Err(UrlValidationError::CannotBeABase);
    }

    match url.scheme() {
        "https" => {}
        "http" => {
            if !url.host_str().is_some_and(is_loopback_host) {
                return Err(UrlValidationError::InsecureScheme);
            }
            tracing::warn!(base_url = %url, "Using non-HTTPS API base URL (loopback only)");
        }
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn is_loopback_host(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    host_for_parse
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}
