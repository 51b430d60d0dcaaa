// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Query parameters that only carry referral or campaign tracking.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "dclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "ref",
    "source",
    "lang",
    "_ga",
    "igshid",
    "si",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm") || key.starts_with("ref_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Canonicalize an event URL so equivalent links compare equal.
///
/// Drops the fragment, the default port and tracking parameters, sorts the
/// remaining query pairs and trims a trailing slash. Scheme and host come
/// back lowercase from `Url::parse`. Returns `None` for anything that is
/// not an absolute http(s) URL.
///
/// # Examples
/// ```
/// use hackathon_monitor::utils::url::normalize;
///
/// assert_eq!(
///     normalize("HTTPS://X.com/e1/?utm=fb#top").as_deref(),
///     Some("https://x.com/e1")
/// );
/// ```
pub fn normalize(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }

    parsed.set_fragment(None);
    if matches!(
        (parsed.scheme(), parsed.port()),
        ("http", Some(80)) | ("https", Some(443))
    ) {
        let _ = parsed.set_port(None);
    }

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    if params.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(&params);
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    let mut out = parsed.to_string();
    // A bare host serializes as "https://x.com/"
    if parsed.path() == "/" && parsed.query().is_none() {
        out.pop();
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://devpost.com/hackathons?page=2").unwrap();
        assert_eq!(
            resolve_url(&base, "/software/x"),
            "https://devpost.com/software/x"
        );
        assert_eq!(
            resolve_url(&base, "https://other.devpost.com/"),
            "https://other.devpost.com/"
        );
    }

    #[test]
    fn test_normalize_strips_tracking() {
        assert_eq!(
            normalize("https://x.com/e1?utm=fb").as_deref(),
            Some("https://x.com/e1")
        );
        assert_eq!(
            normalize("https://x.com/e1?utm_source=tw&utm_medium=social&fbclid=abc").as_deref(),
            Some("https://x.com/e1")
        );
    }

    #[test]
    fn test_normalize_keeps_meaningful_params_sorted() {
        assert_eq!(
            normalize("https://x.com/e?b=2&ref=nav&a=1").as_deref(),
            Some("https://x.com/e?a=1&b=2")
        );
    }

    #[test]
    fn test_normalize_case_slash_port_fragment() {
        let expected = Some("https://x.com/Events/e1".to_string());
        assert_eq!(normalize("HTTPS://X.COM:443/Events/e1/"), expected);
        assert_eq!(normalize("  https://x.com/Events/e1#details  "), expected);
    }

    #[test]
    fn test_normalize_bare_host() {
        assert_eq!(normalize("https://Hack.io/").as_deref(), Some("https://hack.io"));
    }

    #[test]
    fn test_normalize_rejects_non_http() {
        assert_eq!(normalize("javascript:void(0)"), None);
        assert_eq!(normalize("/relative/path"), None);
        assert_eq!(normalize("mailto:team@x.com"), None);
    }
}
