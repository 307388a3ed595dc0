//! Parsoid HTML result parser
//!
//! This module extracts from a Parsoid document:
//! - The RDF `about` URL and the revision id it ends in
//! - The `dc:isVersionOf` link
//! - The redirect target, if the page is a redirect
//! - Media references from image figures

use crate::api::{absolute, Site};
use crate::url::{resolve_title, ArticlePath};
use crate::Result;
use scraper::{Html, Selector};
use url::Url;

/// Image nodes carrying a `resource` attribute
const IMAGE_SELECTOR: &str = concat!(
    "figure > * > img[resource], ",
    "[typeof~=\"mw:Image\"] > * > img[resource], ",
    "[typeof~=\"mw:Image/Thumb\"] > * > img[resource], ",
    "[typeof~=\"mw:File\"] > * > img[resource], ",
    "[typeof~=\"mw:File/Thumb\"] > * > img[resource]"
);

/// A media resource referenced by an article
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Index of the wiki whose article referenced it
    pub wiki: usize,
    /// Page title of the media (e.g. `File:Foo.jpg`)
    pub short: String,
    /// Absolute resource URL, the deduplication key
    pub resource: String,
    /// Absolute render URL (thumbnail)
    pub src: String,
    /// Requested width in pixels
    pub imagesize: u32,
}

/// One fetched and parsed article
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub wiki: usize,
    /// Title the page was requested under
    pub title: String,
    /// Raw Parsoid HTML
    pub text: String,
    pub about: Option<String>,
    pub revision: Option<u64>,
    pub is_version_of: Option<String>,
    /// Target title when the page is a redirect
    pub redirect: Option<String>,
    pub media: Vec<MediaRef>,
}

impl ParsedPage {
    /// Parses Parsoid HTML fetched from `site`
    ///
    /// # Errors
    ///
    /// `BadResponse` if the page is a redirect whose target cannot be
    /// mapped to a title.
    pub fn parse(site: &Site, title: &str, text: String) -> Result<Self> {
        let document = Html::parse_document(&text);
        let articlepath = site.articlepath();

        let base = match extract_attr(&document, "head > base[href]", "href") {
            Some(href) => Url::parse(&absolute(&href))?,
            None => site.article_base()?,
        };

        let about = extract_attr(&document, "html[about]", "about");
        let revision = about.as_deref().and_then(revision_from_about);
        let is_version_of = extract_attr(&document, "link[rel=\"dc:isVersionOf\"]", "href");

        let redirect = match extract_attr(
            &document,
            "link[rel=\"mw:PageProp/redirect\"][href]",
            "href",
        ) {
            Some(href) => Some(resolve_title(&base, &href, &articlepath)?),
            None => None,
        };

        let media = extract_media(&document, &base, &articlepath, site);

        Ok(Self {
            wiki: site.index,
            title: title.to_string(),
            text,
            about,
            revision,
            is_version_of,
            redirect,
            media,
        })
    }
}

/// Revision id from an `about` URL ending in `/revision/N`
fn revision_from_about(about: &str) -> Option<u64> {
    let (_, tail) = about.rsplit_once("revision/")?;
    tail.parse().ok().filter(|&id| id != 0)
}

fn extract_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(|value| value.to_string())
}

fn extract_media(document: &Html, base: &Url, articlepath: &ArticlePath, site: &Site) -> Vec<MediaRef> {
    let Ok(selector) = Selector::parse(IMAGE_SELECTOR) else {
        return Vec::new();
    };

    let mut media = Vec::new();
    for img in document.select(&selector) {
        let Some(resource) = img.value().attr("resource") else {
            continue;
        };
        let src = img.value().attr("src").unwrap_or_default();

        match resolve_media(base, resource, src, articlepath) {
            Ok((short, resource, src)) => media.push(MediaRef {
                wiki: site.index,
                short,
                resource,
                src,
                imagesize: site.conf.imagesize,
            }),
            Err(e) => tracing::warn!("Skipping image reference {}: {}", resource, e),
        }
    }
    media
}

fn resolve_media(
    base: &Url,
    resource: &str,
    src: &str,
    articlepath: &ArticlePath,
) -> Result<(String, String, String)> {
    let short = resolve_title(base, resource, articlepath)?;
    let resource = base.join(resource)?.to_string();
    let src = base.join(&absolute(src))?.to_string();
    Ok((short, resource, src))
}
