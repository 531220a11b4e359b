use crate::UrlError;
use url::form_urlencoded;
use url::Url;

/// Query parameters that never change page content and are dropped
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Canonicalizes a URL into the single form used as the dedup key
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject anything that is not http or https
/// 2. Lowercase the host (default ports are elided by the parser)
/// 3. Normalize the path:
///    - Resolve dot segments (. and ..)
///    - Collapse repeated slashes
///    - Remove the trailing slash (except for the root /)
/// 4. Remove the fragment
/// 5. Remove tracking query parameters (`utm_*`, `fbclid`, `gclid`, `mc_eid`)
/// 6. Sort the remaining query parameters by key, then value
/// 7. Remove an empty query string
///
/// The scheme is preserved: `http://a.test/` and `https://a.test/` are
/// different canonical URLs.
///
/// # Examples
///
/// ```
/// use sumi_swarm::url::canonicalize;
///
/// let url = canonicalize("http://A.TEST/page/?b=2&a=1#top").unwrap();
/// assert_eq!(url.as_str(), "http://a.test/page?a=1&b=2");
/// ```
pub fn canonicalize(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_lowercase(),
        _ => return Err(UrlError::MissingDomain),
    };
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let path = normalize_path(url.path());
    url.set_path(&path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish();
            url.set_query(Some(&query));
        }
    }

    Ok(url)
}

/// Canonicalizes `href` after resolving it against `base`
pub fn canonicalize_relative(base: &Url, href: &str) -> Result<Url, UrlError> {
    let joined = base
        .join(href.trim())
        .map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize(joined.as_str())
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_is_preserved() {
        assert_eq!(
            canonicalize("http://a.test/page").unwrap().as_str(),
            "http://a.test/page"
        );
        assert_eq!(
            canonicalize("https://a.test/page").unwrap().as_str(),
            "https://a.test/page"
        );
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = canonicalize("https://example.com/page/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keep_root_slash() {
        assert_eq!(
            canonicalize("https://example.com").unwrap().as_str(),
            "https://example.com/"
        );
        assert_eq!(
            canonicalize("https://example.com/").unwrap().as_str(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_remove_fragment() {
        let result = canonicalize("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_sort_query_params() {
        let result = canonicalize("https://example.com/page?b=2&a=1&a=0").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page?a=0&a=1&b=2");
    }

    #[test]
    fn test_tracking_params_removed() {
        let result = canonicalize(
            "https://example.com/page?keep=yes&utm_medium=email&fbclid=123&utm_custom=x",
        )
        .unwrap();
        assert_eq!(result.as_str(), "https://example.com/page?keep=yes");
    }

    #[test]
    fn test_query_values_stay_encoded() {
        let result = canonicalize("https://example.com/s?q=a%26b&z=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/s?q=a%26b&z=1");
    }

    #[test]
    fn test_lowercase_host_keeps_path_case() {
        let result = canonicalize("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_dot_segments_and_slashes() {
        let result = canonicalize("https://example.com///a/../b/./c//").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_default_port_elided() {
        let result = canonicalize("http://a.test:80/x").unwrap();
        assert_eq!(result.as_str(), "http://a.test/x");
    }

    #[test]
    fn test_equivalent_forms_share_a_key() {
        let a = canonicalize("http://A.test/x/?b=1&a=2#frag").unwrap();
        let b = canonicalize("http://a.test/x?a=2&b=1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_scheme() {
        let result = canonicalize("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(canonicalize("not a url").is_err());
    }

    #[test]
    fn test_relative_resolution() {
        let base = Url::parse("http://a.test/dir/page").unwrap();
        let result = canonicalize_relative(&base, "../other/?x=1#y").unwrap();
        assert_eq!(result.as_str(), "http://a.test/other?x=1");
    }
}
