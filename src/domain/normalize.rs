use url::Url;

/// Characters besides alphanumerics allowed in a `host[:port]` entry
const HOST_PUNCTUATION: &[char] = &['.', '-', '_', ':'];

/// Normalizes a raw peer entry into a domain
///
/// Peer lists come straight from remote servers, so entries are trimmed,
/// lower-cased, and stripped of a single trailing dot. No other
/// canonicalization happens: `www.example.com` and `example.com` stay distinct.
///
/// Only a bare `host[:port]` is accepted. Anything carrying a path, query,
/// fragment or userinfo is rejected, since the domain is substituted into
/// the peers endpoint URL.
///
/// # Arguments
///
/// * `raw` - The peer string as reported by a server
///
/// # Returns
///
/// * `Some(String)` - The normalized domain
/// * `None` - If nothing usable remains (blank, or not a bare host name)
///
/// # Examples
///
/// ```
/// use fedimap::domain::normalize_domain;
///
/// assert_eq!(normalize_domain(" Mastodon.Social "), Some("mastodon.social".to_string()));
/// assert_eq!(normalize_domain("example.com."), Some("example.com".to_string()));
/// assert_eq!(normalize_domain(""), None);
/// assert_eq!(normalize_domain("example.com/other"), None);
/// ```
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);

    if trimmed.is_empty()
        || trimmed.ends_with(':')
        || !trimmed
            .chars()
            .all(|c| c.is_alphanumeric() || HOST_PUNCTUATION.contains(&c))
    {
        return None;
    }

    let domain = trimmed.to_lowercase();
    if is_bare_host(&domain) {
        Some(domain)
    } else {
        None
    }
}

/// True if `https://<domain>/` parses to exactly that host and optional port
fn is_bare_host(domain: &str) -> bool {
    let Ok(url) = Url::parse(&format!("https://{}/", domain)) else {
        return false;
    };

    url.host_str().is_some_and(|host| !host.is_empty())
        && url.username().is_empty()
        && url.password().is_none()
        && url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none()
}
