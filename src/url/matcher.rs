/// Checks whether a domain falls under a policy pattern
///
/// A pattern covers the domain itself and every subdomain below it, so
/// `ads.test` matches `ads.test` and `cdn.ads.test` but not `badads.test`.
/// The `*.` prefix is accepted and means the same thing. Patterns and
/// candidates compare case-insensitively.
///
/// # Examples
///
/// ```
/// use sumi_swarm::url::matches_domain;
///
/// assert!(matches_domain("example.com", "example.com"));
/// assert!(matches_domain("example.com", "blog.example.com"));
/// assert!(matches_domain("*.example.com", "api.v2.example.com"));
/// assert!(!matches_domain("example.com", "notexample.com"));
/// ```
pub fn matches_domain(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    let base = pattern
        .strip_prefix("*.")
        .or_else(|| pattern.strip_prefix('.'))
        .unwrap_or(&pattern);

    if base.is_empty() {
        return false;
    }

    let candidate = candidate.to_lowercase();
    candidate == base || candidate.ends_with(&format!(".{}", base))
}
