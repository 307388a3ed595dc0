//! Content fetchers
//!
//! Each fetcher wraps one [`ContentApi`] call in the concurrency guard of
//! its resource class and reports one status unit from inside the guard,
//! so queued work does not flood the progress stream.
//!
//! The parsed-content fetcher also resolves redirects. The guarded entry
//! point ([`Fetchers::parsed`]) holds one slot for the whole chain; every
//! hop after the first goes through the unguarded [`Fetchers::resolve`],
//! so a chain longer than the guard limit cannot deadlock.

use crate::api::{ContentApi, ImageInfo, MediaRef, ParsedPage, RevisionRecord, Site};
use crate::bundler::{ConcurrencyGuard, StatusReporter};
use crate::config::LimitsConfig;
use crate::Result;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Guarded access to every content API call the pipeline makes
pub struct Fetchers {
    api: Arc<dyn ContentApi>,
    parsoid: ConcurrencyGuard,
    html: ConcurrencyGuard,
    modules: ConcurrencyGuard,
    authors: ConcurrencyGuard,
    images: ConcurrencyGuard,
    revisions: ConcurrencyGuard,
}

fn revision_label(revision: Option<u64>) -> String {
    match revision {
        Some(id) => format!("revision {}", id),
        None => "latest revision".to_string(),
    }
}

impl Fetchers {
    /// Creates one guard per resource class, all sharing `cancel`
    pub fn new(api: Arc<dyn ContentApi>, limits: &LimitsConfig, cancel: &CancellationToken) -> Self {
        Self {
            api,
            parsoid: ConcurrencyGuard::new("parsoid", limits.parsoid, cancel.clone()),
            html: ConcurrencyGuard::new("html", limits.html, cancel.clone()),
            modules: ConcurrencyGuard::new("modules", limits.modules, cancel.clone()),
            authors: ConcurrencyGuard::new("authors", limits.authors, cancel.clone()),
            images: ConcurrencyGuard::new("images", limits.images, cancel.clone()),
            revisions: ConcurrencyGuard::new("revisions", limits.revisions, cancel.clone()),
        }
    }

    /// Fetches parsed content, following at most `hops` redirects
    pub async fn parsed(
        &self,
        site: &Site,
        title: &str,
        revision: Option<u64>,
        hops: u32,
        status: &StatusReporter,
    ) -> Result<ParsedPage> {
        self.parsoid
            .run(async {
                status.report(&format!(
                    "{}:{} [Parsoid, {}]",
                    site.prefix(),
                    title,
                    revision_label(revision)
                ));
                self.resolve(site, title, revision, hops).await
            })
            .await
    }

    /// Fetches and follows a redirect chain without taking a guard slot
    ///
    /// Only call this from inside a slot already held for the chain.
    /// Stops at the first non-redirect page, after `hops` re-fetches, or
    /// when a title repeats; the last page fetched is returned as-is.
    pub async fn resolve(
        &self,
        site: &Site,
        title: &str,
        revision: Option<u64>,
        hops: u32,
    ) -> Result<ParsedPage> {
        let mut page = self.api.fetch_parsed(site, title, revision).await?;
        let mut remaining = hops;
        let mut seen = HashSet::from([title.to_string()]);

        while let Some(target) = page.redirect.clone() {
            if remaining == 0 {
                tracing::debug!(title = %page.title, %target, "redirect not followed");
                break;
            }
            if !seen.insert(target.clone()) {
                tracing::warn!(title = %page.title, %target, "redirect loop");
                break;
            }
            remaining -= 1;
            tracing::debug!(from = %page.title, to = %target, "following redirect");
            page = self.api.fetch_parsed(site, &target, None).await?;
        }

        Ok(page)
    }

    /// PHP parser output for the compatibility HTML store
    pub async fn html(
        &self,
        site: &Site,
        title: &str,
        revision: u64,
        status: &StatusReporter,
    ) -> Result<Value> {
        self.html
            .run(async {
                status.report(&format!(
                    "{}:{} [PHP, revision {}]",
                    site.prefix(),
                    title,
                    revision
                ));
                self.api.fetch_rendered_html(site, title, revision).await
            })
            .await
    }

    /// Module data; not a status unit of its own
    pub async fn modules(&self, site: &Site, title: &str, revision: u64) -> Result<Value> {
        self.modules
            .run(self.api.fetch_module_data(site, title, revision))
            .await
    }

    pub async fn authors(
        &self,
        site: &Site,
        title: &str,
        revision: u64,
        status: &StatusReporter,
    ) -> Result<Value> {
        self.authors
            .run(async {
                status.report(&format!("{}:{} [authors]", site.prefix(), title));
                self.api.fetch_authorship(site, title, revision).await
            })
            .await
    }

    pub async fn media_metadata(
        &self,
        site: &Site,
        media: &MediaRef,
        status: &StatusReporter,
    ) -> Result<ImageInfo> {
        self.images
            .run(async {
                status.report(&format!("{} [metadata]", media.short));
                self.api.fetch_media_metadata(site, media).await
            })
            .await
    }

    pub async fn media_bytes(
        &self,
        short: &str,
        url: &str,
        dest: &Path,
        status: &StatusReporter,
    ) -> Result<u64> {
        self.images
            .run(async {
                status.report(&format!("{} [downloading]", short));
                self.api.fetch_media_bytes(url, dest).await
            })
            .await
    }

    /// Raw wikitext, retried once on `fallback` if `site` lacks the page
    ///
    /// Both lookups happen under one slot. The returned record's `wiki`
    /// is the index of the site that had it.
    pub async fn revision(
        &self,
        site: &Site,
        fallback: Option<&Site>,
        title: &str,
        revision: Option<u64>,
        status: &StatusReporter,
    ) -> Result<Option<RevisionRecord>> {
        self.revisions
            .run(async {
                status.report(&format!("{}:{}", site.prefix(), title));
                let found = not_found_as_none(self.api.fetch_raw_revision(site, title, revision).await)?;
                if let Some(mut record) = found {
                    record.wiki = site.index;
                    return Ok(Some(record));
                }

                let Some(fallback) = fallback else {
                    return Ok(None);
                };
                tracing::debug!("Looking for {} on {}", title, fallback.prefix());
                let found =
                    not_found_as_none(self.api.fetch_raw_revision(fallback, title, revision).await)?;
                Ok(found.map(|mut record| {
                    record.wiki = fallback.index;
                    record
                }))
            })
            .await
    }
}

fn not_found_as_none<T>(result: Result<Option<T>>) -> Result<Option<T>> {
    match result {
        Err(e) if e.is_not_found() => Ok(None),
        other => other,
    }
}
