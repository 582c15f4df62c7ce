use url::Url;

/// Extracts the rate-limiting domain key from a URL
///
/// The key is the lower-cased host, followed by `:port` when the URL carries
/// an explicit non-default port. Two servers on the same host but different
/// ports are separate sites for politeness purposes.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_gather::url::domain_key;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(domain_key(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/a").unwrap();
/// assert_eq!(domain_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn domain_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();

    // Url::port() is None when the port is the scheme default
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}
