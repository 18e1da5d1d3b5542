use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Substrings that mark an image URL as a tracking beacon rather than artwork.
const TRACKING_MARKERS: [&str; 2] = ["pixel", "track"];

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a URL string for use as a registry feed URL.
///
/// Rejects non-HTTP(S) schemes, localhost and private/link-local address
/// ranges, so a configured registry cannot point the proxies at internal hosts.
///
/// # Examples
///
/// ```
/// use scruper::util::validate_url;
///
/// assert!(validate_url("https://bensbites.substack.com/feed").is_ok());
/// assert!(validate_url("http://localhost/feed").is_err());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;
    ensure_http_scheme(&url)?;

    let Some(host) = url.host_str() else {
        return Ok(url);
    };
    if host == "localhost" {
        return Err(UrlValidationError::Localhost);
    }

    let bare_host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if let Ok(ip) = bare_host.parse::<IpAddr>() {
        if ip.is_loopback() {
            return Err(UrlValidationError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateIp(ip.to_string()));
        }
    }

    Ok(url)
}

/// Returns `true` when `candidate` is usable as an article image: an absolute
/// http(s) URL that does not look like a tracking pixel.
pub fn is_acceptable_image_url(candidate: &str) -> bool {
    let lowered = candidate.to_ascii_lowercase();
    if TRACKING_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return false;
    }
    Url::parse(candidate)
        .map(|url| ensure_http_scheme(&url).is_ok())
        .unwrap_or(false)
}

fn ensure_http_scheme(url: &Url) -> Result<(), UrlValidationError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            v6.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}
