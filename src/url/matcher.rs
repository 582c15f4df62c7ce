/// Checks if a host matches a site pattern
///
/// Patterns name a registrable site and cover its subdomains:
/// - `"youtube.com"` matches `youtube.com`, `m.youtube.com`, `www.youtube.com`
/// - `"*.youtube.com"` is accepted as an explicit spelling of the same rule
///
/// Both sides are compared case-insensitively.
///
/// # Examples
///
/// ```
/// use sumi_gather::url::host_matches;
///
/// assert!(host_matches("youtube.com", "m.youtube.com"));
/// assert!(host_matches("*.x.com", "x.com"));
/// assert!(!host_matches("x.com", "box.com"));
/// ```
pub fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    let host = host.to_lowercase();
    let base = pattern.strip_prefix("*.").unwrap_or(&pattern);

    if base.is_empty() {
        return false;
    }

    host == base || host.ends_with(&format!(".{}", base))
}

/// Returns true when the host matches any pattern in the list
pub fn matches_any<S: AsRef<str>>(patterns: &[S], host: &str) -> bool {
    patterns.iter().any(|p| host_matches(p.as_ref(), host))
}
