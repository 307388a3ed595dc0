//! Content API client boundary
//!
//! The bundler talks to source wikis only through [`ContentApi`]. The
//! production implementation is [`HttpApi`]; tests substitute in-process
//! mocks.

mod cache;
mod http;
mod parsoid;
#[cfg(test)]
pub(crate) mod testing;

pub use cache::{SiteInfoCache, SiteMatrix, SiteMatrixCache};
pub use http::{build_http_client, HttpApi};
pub use parsoid::{MediaRef, ParsedPage};

use crate::metabook::{FileRepo, WikiConf};
use crate::url::ArticlePath;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::path::Path;
use url::Url;

/// General site information from `meta=siteinfo`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    #[serde(default = "default_articlepath")]
    pub articlepath: String,

    #[serde(default)]
    pub wikiid: Option<String>,

    #[serde(default)]
    pub lang: Option<String>,

    /// Server root, possibly protocol-relative (`//en.wikipedia.org`)
    #[serde(default)]
    pub server: Option<String>,

    #[serde(default)]
    pub sitename: Option<String>,
}

fn default_articlepath() -> String {
    "/wiki/$1".to_string()
}

impl Default for SiteInfo {
    fn default() -> Self {
        Self {
            articlepath: default_articlepath(),
            wikiid: None,
            lang: None,
            server: None,
            sitename: None,
        }
    }
}

/// One row of the Wikimedia site matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMatrixEntry {
    pub url: String,
    pub dbname: String,
}

/// A resolved source wiki: its index, endpoint configuration and site info
#[derive(Debug, Clone)]
pub struct Site {
    pub index: usize,
    pub conf: WikiConf,
    pub info: SiteInfo,
}

impl Site {
    pub fn new(index: usize, conf: WikiConf, info: SiteInfo) -> Self {
        Self { index, conf, info }
    }

    /// Database prefix, used in status messages
    pub fn prefix(&self) -> String {
        self.conf
            .prefix
            .clone()
            .or_else(|| self.info.wikiid.clone())
            .unwrap_or_else(|| format!("wiki{}", self.index))
    }

    pub fn articlepath(&self) -> ArticlePath {
        ArticlePath::new(&self.info.articlepath)
    }

    /// Base URL that article-path hrefs resolve against when a document
    /// carries no `<base>` of its own
    pub fn article_base(&self) -> Result<Url> {
        let path = self.articlepath();
        let root = match (&self.info.server, &self.conf.baseurl) {
            (Some(server), _) => Url::parse(&absolute(server))?,
            (None, Some(baseurl)) => Url::parse(baseurl)?,
            (None, None) => Url::parse("https://localhost/")?,
        };
        Ok(root.join(path.prefix())?)
    }

    /// Store key for per-revision or per-title records
    ///
    /// Site 0 uses the bare id; other sites prefix their index so keys
    /// stay unique across a multi-wiki collection.
    pub fn key(&self, id: impl Display) -> String {
        if self.index == 0 {
            id.to_string()
        } else {
            format!("{}|{}", self.index, id)
        }
    }
}

/// Turns protocol-relative URLs into https ones
pub(crate) fn absolute(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

/// Media metadata as stored in `imageinfo.db`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumburl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptionurl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    pub resource: String,
    pub short: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mediatype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<bool>,
    /// File repository serving the media (`local`, `shared`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub licenseshortname: Option<String>,
}

impl ImageInfo {
    /// A record for media the wiki does not know about
    pub fn missing(media: &MediaRef) -> Self {
        Self {
            resource: media.resource.clone(),
            short: media.short.clone(),
            thumburl: Some(media.src.clone()),
            missing: Some(true),
            ..Self::default()
        }
    }

    pub fn is_missing(&self) -> bool {
        self.missing.unwrap_or(false)
    }

    /// Whether the media is a kind the bundle carries bytes for
    pub fn is_renderable(&self) -> bool {
        matches!(
            self.mediatype.as_deref(),
            Some("BITMAP") | Some("DRAWING") | Some("VIDEO")
        ) || self.mime.as_deref() == Some("application/pdf")
    }

    /// URL to download: the scaled rendition when there is one
    pub fn download_url(&self) -> Option<&str> {
        self.thumburl.as_deref().or(self.url.as_deref())
    }
}

/// Raw wikitext of one page revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pageid: Option<u64>,
    #[serde(default)]
    pub ns: i64,
    pub title: String,
    pub revid: u64,
    /// Index of the wiki the text came from
    #[serde(default)]
    pub wiki: usize,
    pub text: String,
}

/// Source wiki operations the bundler depends on
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// General site info (`meta=siteinfo&siprop=general`)
    async fn site_info(&self, wiki: &WikiConf) -> Result<SiteInfo>;

    /// File repositories the wiki draws media from
    async fn file_repos(&self, wiki: &WikiConf) -> Result<Vec<FileRepo>>;

    /// Every wiki in the site matrix
    async fn site_matrix(&self) -> Result<Vec<SiteMatrixEntry>>;

    /// Parsoid HTML for `title`, at `revision` or the latest revision
    ///
    /// A single request: redirects are reported, not followed.
    async fn fetch_parsed(&self, site: &Site, title: &str, revision: Option<u64>)
        -> Result<ParsedPage>;

    /// PHP parser output (`action=parse`)
    async fn fetch_rendered_html(&self, site: &Site, title: &str, revision: u64) -> Result<Value>;

    /// Module and JS config data for the page
    async fn fetch_module_data(&self, site: &Site, title: &str, revision: u64) -> Result<Value>;

    /// Contributor metadata for the page
    async fn fetch_authorship(&self, site: &Site, title: &str, revision: u64) -> Result<Value>;

    /// Media metadata; unknown media yield a record with `missing` set
    async fn fetch_media_metadata(&self, site: &Site, media: &MediaRef) -> Result<ImageInfo>;

    /// Downloads `url` into `dest`, returning the bytes written
    async fn fetch_media_bytes(&self, url: &str, dest: &Path) -> Result<u64>;

    /// Raw wikitext, or `None` if the page or revision does not exist
    async fn fetch_raw_revision(
        &self,
        site: &Site,
        title: &str,
        revision: Option<u64>,
    ) -> Result<Option<RevisionRecord>>;
}
