//! URL canonicalization and link classification.
//!
//! Every URL entering the frontier or the visited set goes through
//! [`canonicalize`] first, so dedup operates on one spelling per page:
//! tracking parameters stripped, fragments dropped, trailing slash
//! normalized.

use url::Url;

/// Query parameters that never change page identity.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "srsltid", "ref", "mc_cid", "mc_eid"];

/// Resolve `raw` against `base` and normalize it. Returns `None` for
/// links that cannot name a crawlable page (mailto:, javascript:, bad
/// syntax, other hosts).
pub fn canonicalize(raw: &str, base: &Url) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.starts_with("mailto:")
        || trimmed.starts_with("tel:")
        || trimmed.starts_with("javascript:")
    {
        return None;
    }

    let mut url = base.join(trimmed).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if url.host_str() != base.host_str() {
        return None;
    }

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        drop(pairs);
    }

    // Trailing slash carries no identity outside the root path.
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url.to_string())
}

/// Category pages live under `/cat/`; the A-Z medicine index pages under
/// `/atozmedicine/` behave like categories too.
pub fn is_category_link(url: &str) -> bool {
    match Url::parse(url) {
        Ok(u) => {
            let p = u.path();
            p.contains("/cat/") || p.contains("/atozmedicine/")
        }
        Err(_) => false,
    }
}

/// Product pages live under `/p/`.
pub fn is_product_link(url: &str) -> bool {
    match Url::parse(url) {
        Ok(u) => u.path().contains("/p/"),
        Err(_) => false,
    }
}

/// Last non-empty path segment, used as the slug for categories and
/// products alike.
pub fn slug_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segs| segs.filter(|s| !s.is_empty()).next_back().map(String::from))
        })
        .unwrap_or_default()
}

/// The URL for page `page` of a listing. Page 1 is the bare category URL;
/// later pages carry an explicit `page` query parameter.
pub fn with_page(url: &str, page: u32) -> String {
    if page <= 1 {
        return url.to_string();
    }
    match Url::parse(url) {
        Ok(mut u) => {
            let kept: Vec<(String, String)> = u
                .query_pairs()
                .filter(|(k, _)| k != "page")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            {
                let mut pairs = u.query_pairs_mut();
                pairs.clear();
                for (k, v) in &kept {
                    pairs.append_pair(k, v);
                }
                pairs.append_pair("page", &page.to_string());
            }
            u.to_string()
        }
        Err(_) => format!("{url}?page={page}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.dvago.pk").unwrap()
    }

    #[test]
    fn canonicalize_resolves_relative_links() {
        assert_eq!(
            canonicalize("/cat/pain-relief", &base()).as_deref(),
            Some("https://www.dvago.pk/cat/pain-relief")
        );
    }

    #[test]
    fn canonicalize_strips_tracking_params_and_fragment() {
        assert_eq!(
            canonicalize(
                "https://www.dvago.pk/p/panadol?utm_source=x&utm_medium=y&fbclid=z#reviews",
                &base()
            )
            .as_deref(),
            Some("https://www.dvago.pk/p/panadol")
        );
    }

    #[test]
    fn canonicalize_keeps_meaningful_params() {
        assert_eq!(
            canonicalize("/cat/vitamins?page=3&utm_campaign=a", &base()).as_deref(),
            Some("https://www.dvago.pk/cat/vitamins?page=3")
        );
    }

    #[test]
    fn canonicalize_normalizes_trailing_slash() {
        let a = canonicalize("/cat/vitamins/", &base());
        let b = canonicalize("/cat/vitamins", &base());
        assert_eq!(a, b);
        // the bare root keeps its slash
        assert_eq!(
            canonicalize("https://www.dvago.pk/", &base()).as_deref(),
            Some("https://www.dvago.pk/")
        );
    }

    #[test]
    fn canonicalize_rejects_foreign_and_non_http() {
        assert_eq!(canonicalize("https://evil.example/cat/a", &base()), None);
        assert_eq!(canonicalize("mailto:info@dvago.pk", &base()), None);
        assert_eq!(canonicalize("javascript:void(0)", &base()), None);
        assert_eq!(canonicalize("#top", &base()), None);
    }

    #[test]
    fn link_classification() {
        assert!(is_category_link("https://www.dvago.pk/cat/pain-relief"));
        assert!(is_category_link("https://www.dvago.pk/atozmedicine/a"));
        assert!(!is_category_link("https://www.dvago.pk/p/panadol"));
        assert!(is_product_link("https://www.dvago.pk/p/panadol"));
        assert!(!is_product_link("https://www.dvago.pk/cat/pain-relief"));
    }

    #[test]
    fn slug_is_last_segment() {
        assert_eq!(slug_from_url("https://www.dvago.pk/cat/pain-relief"), "pain-relief");
        assert_eq!(slug_from_url("https://www.dvago.pk/p/panadol-500mg"), "panadol-500mg");
    }

    #[test]
    fn with_page_appends_and_replaces() {
        let u = "https://www.dvago.pk/cat/vitamins";
        assert_eq!(with_page(u, 1), u);
        assert_eq!(with_page(u, 2), format!("{u}?page=2"));
        assert_eq!(
            with_page("https://www.dvago.pk/cat/vitamins?page=2", 3),
            "https://www.dvago.pk/cat/vitamins?page=3"
        );
    }
}
