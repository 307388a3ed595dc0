use crate::metabook::WikiConf;
use url::Url;

/// Extracts the lowercase host from a URL string
///
/// # Examples
///
/// ```
/// use wiki_bundler::url::extract_domain;
///
/// assert_eq!(
///     extract_domain("https://EN.wikipedia.org/w"),
///     Some("en.wikipedia.org".to_string())
/// );
/// assert_eq!(extract_domain("not a url"), None);
/// ```
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|h| h.to_lowercase())
}

/// Domain a wiki is served from
///
/// An explicit `domain` wins; otherwise the host of `baseurl`.
pub fn wiki_domain(wiki: &WikiConf) -> Option<String> {
    wiki.domain
        .clone()
        .or_else(|| wiki.baseurl.as_deref().and_then(extract_domain))
}
