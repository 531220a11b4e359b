use url::Url;

/// Extracts the lowercase host of a URL
///
/// The port is not part of the domain, so `a.test:8080` and `a.test`
/// share politeness buckets, robots rules and domain policy.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_swarm::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM:8443/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Parses `url` and returns its origin domain, if it has one
pub fn origin_domain(url: &str) -> Option<String> {
    Url::parse(url).ok().as_ref().and_then(extract_domain)
}
