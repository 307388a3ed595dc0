//! Minimal in-process `ContentApi` for unit tests

use crate::api::{
    ContentApi, ImageInfo, MediaRef, ParsedPage, RevisionRecord, Site, SiteInfo, SiteMatrixEntry,
};
use crate::metabook::{FileRepo, WikiConf};
use crate::{BundlerError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers the site-level queries; content calls report not-found
#[derive(Default)]
pub struct StubApi {
    site_info_calls: AtomicUsize,
    site_matrix_calls: AtomicUsize,
}

impl StubApi {
    pub fn site_info_calls(&self) -> usize {
        self.site_info_calls.load(Ordering::SeqCst)
    }

    pub fn site_matrix_calls(&self) -> usize {
        self.site_matrix_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentApi for StubApi {
    async fn site_info(&self, _wiki: &WikiConf) -> Result<SiteInfo> {
        self.site_info_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SiteInfo {
            wikiid: Some("enwiki".to_string()),
            lang: Some("en".to_string()),
            server: Some("//en.wikipedia.org".to_string()),
            ..SiteInfo::default()
        })
    }

    async fn file_repos(&self, _wiki: &WikiConf) -> Result<Vec<FileRepo>> {
        Ok(serde_json::from_str(
            r#"[{"name": "local", "local": ""},
                {"name": "shared", "scriptDirUrl": "//commons.wikimedia.org/w"}]"#,
        )?)
    }

    async fn site_matrix(&self) -> Result<Vec<SiteMatrixEntry>> {
        self.site_matrix_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(vec![
            SiteMatrixEntry {
                url: "https://en.wikipedia.org".to_string(),
                dbname: "enwiki".to_string(),
            },
            SiteMatrixEntry {
                url: "https://de.wikipedia.org".to_string(),
                dbname: "dewiki".to_string(),
            },
        ])
    }

    async fn fetch_parsed(&self, _site: &Site, title: &str, _: Option<u64>) -> Result<ParsedPage> {
        Err(BundlerError::NotFound(title.to_string()))
    }

    async fn fetch_rendered_html(&self, _site: &Site, title: &str, _: u64) -> Result<Value> {
        Err(BundlerError::NotFound(title.to_string()))
    }

    async fn fetch_module_data(&self, _site: &Site, title: &str, _: u64) -> Result<Value> {
        Err(BundlerError::NotFound(title.to_string()))
    }

    async fn fetch_authorship(&self, _site: &Site, title: &str, _: u64) -> Result<Value> {
        Err(BundlerError::NotFound(title.to_string()))
    }

    async fn fetch_media_metadata(&self, _site: &Site, media: &MediaRef) -> Result<ImageInfo> {
        Ok(ImageInfo::missing(media))
    }

    async fn fetch_media_bytes(&self, url: &str, _dest: &Path) -> Result<u64> {
        Err(BundlerError::NotFound(url.to_string()))
    }

    async fn fetch_raw_revision(
        &self,
        _site: &Site,
        _title: &str,
        _: Option<u64>,
    ) -> Result<Option<RevisionRecord>> {
        Ok(None)
    }
}
