//! Bundle coordinator - per-run state and the parsed-content stage
//!
//! A [`Run`] carries everything the fetch stages share:
//! - The guarded fetchers and the resolved sites
//! - The size budget every write passes through
//! - The stores and the accumulator of sources and media
//! - The cancellation token fatal failures trip
//!
//! The media and revision stages live in their own modules as further
//! `impl Run` blocks.

use crate::api::{ContentApi, Site, SiteInfoCache};
use crate::bundler::fetchers::Fetchers;
use crate::bundler::{SizeBudget, SizeClass, StatusReporter};
use crate::config::Config;
use crate::metabook::{repair, walk_mut, Article, Metabook};
use crate::output::{self, Attribution, ATTRIBUTION_HTML, ATTRIBUTION_WT, METABOOK_JSON, NFO_JSON};
use crate::state::Accumulator;
use crate::storage::{KvStore, Stores};
use crate::{BundlerError, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// First failure of a stage
///
/// A fatal failure cancels the outstanding work of the run. A real error
/// always replaces a `Cancelled` recorded before it.
pub(crate) struct Failures {
    first: Option<BundlerError>,
    count: usize,
    cancel: CancellationToken,
}

impl Failures {
    pub(crate) fn new(cancel: &CancellationToken) -> Self {
        Self {
            first: None,
            count: 0,
            cancel: cancel.clone(),
        }
    }

    pub(crate) fn record(&mut self, err: BundlerError) {
        if err.is_fatal() {
            self.cancel.cancel();
        }
        let replace = match &self.first {
            None => true,
            Some(BundlerError::Cancelled) => !matches!(err, BundlerError::Cancelled),
            Some(_) => false,
        };
        if !matches!(err, BundlerError::Cancelled) {
            self.count += 1;
        }
        if replace {
            self.first = Some(err);
        }
    }

    pub(crate) fn finish(self, stage: &str) -> Result<()> {
        match self.first {
            Some(err) => {
                if self.count > 1 {
                    tracing::error!("{} failures while {}", self.count, stage);
                }
                Err(err)
            }
            None => Ok(()),
        }
    }
}

/// Repairs the metabook and loads site info for every wiki
///
/// Reports one unit per wiki and one for the Commons step (from repair),
/// then one per wiki and one on completion here.
pub async fn resolve(
    metabook: &mut Metabook,
    api: &dyn ContentApi,
    siteinfo: &SiteInfoCache,
    config: &Config,
    status: &StatusReporter,
) -> Result<Vec<Site>> {
    repair(metabook, api, siteinfo, config, status).await?;

    let mut sites = Vec::with_capacity(metabook.wikis.len());
    for (index, wiki) in metabook.wikis.iter().enumerate() {
        let info = siteinfo.get(api, wiki).await?;
        let site = Site::new(index, wiki.clone(), info);
        status.report(&format!("{} [siteinfo]", site.prefix()));
        sites.push(site);
    }
    status.report("");

    tracing::info!("Resolved {} wikis", sites.len());
    Ok(sites)
}

/// State shared by the fetch stages of one run
pub(crate) struct Run<'a> {
    pub(crate) config: &'a Config,
    pub(crate) fetchers: Fetchers,
    pub(crate) budget: &'a SizeBudget,
    pub(crate) status: &'a StatusReporter,
    pub(crate) stores: &'a Stores,
    pub(crate) accumulator: Accumulator,
    pub(crate) sites: Vec<Site>,
    pub(crate) root: &'a Path,
    pub(crate) cancel: CancellationToken,
}

impl<'a> Run<'a> {
    pub(crate) fn site(&self, index: usize) -> Result<&Site> {
        self.sites
            .get(index)
            .ok_or_else(|| BundlerError::Metabook(format!("no wiki with index {}", index)))
    }

    /// Charges `value` against the budget, then stores it
    pub(crate) fn put(&self, store: &dyn KvStore, key: &str, value: &str) -> Result<()> {
        self.budget.charge(value.len() as u64, SizeClass::Data)?;
        store.put(key, value)?;
        Ok(())
    }

    /// Charges `contents` against the budget, then writes it to the bundle
    pub(crate) async fn write_file(&self, name: &str, contents: &str) -> Result<()> {
        self.budget.charge(contents.len() as u64, SizeClass::Data)?;
        output::write_file(self.root, name, contents).await?;
        Ok(())
    }

    /// Units each article contributes to the parsed-content stage
    fn units_per_item(&self) -> u64 {
        // Parsoid, authors and completion, plus PHP HTML in compat mode
        if self.config.bundle.compat {
            4
        } else {
            3
        }
    }

    /// Fetches every article in the tree
    ///
    /// Articles run concurrently under the fetcher guards. A failed article
    /// does not stop its siblings, but fails the stage once they finish;
    /// a fatal failure cancels them.
    ///
    /// Returns the number of distinct sources recorded.
    pub(crate) async fn fetch_parsed(&self, metabook: &mut Metabook) -> Result<usize> {
        let per_item = self.units_per_item();
        self.status.create_stage(
            per_item * metabook.count_items() as u64,
            "Fetching parsed articles",
        );

        // Containers count as fetched straight away
        let status = self.status;
        status.report_n(per_item - 1, &format!("{} {}", metabook.kind, metabook.title));
        let mut articles = Vec::new();
        walk_mut(
            &mut metabook.items,
            &mut |chapter| status.report_n(per_item - 1, &format!("chapter {}", chapter.title)),
            &mut articles,
        );

        tracing::info!("Fetching {} articles", articles.len());

        let mut tasks: FuturesUnordered<_> = articles
            .into_iter()
            .map(|article| self.process_article(article))
            .collect();

        let mut failures = Failures::new(&self.cancel);
        while let Some(result) = tasks.next().await {
            if let Err(e) = result {
                if !matches!(e, BundlerError::Cancelled) {
                    tracing::error!("Article failed: {}", e);
                }
                failures.record(e);
            }
        }
        failures.finish("fetching articles")?;

        Ok(self.accumulator.source_count())
    }

    /// Processes one article chain
    ///
    /// Parsed content first (with redirects), then HTML and module data,
    /// then authorship. In save-redirects mode a redirect page is stored
    /// as-is and the chain restarts under its target title.
    async fn process_article(&self, article: &mut Article) -> Result<()> {
        let save_redirects = self.config.bundle.save_redirects;
        let mut remaining = self.config.bundle.redirect_hops();

        loop {
            let site = self.site(article.wiki)?;
            let hops = if save_redirects { 0 } else { remaining };

            let page = self
                .fetchers
                .parsed(site, &article.title, article.revision, hops, self.status)
                .await?;
            let revision = page.revision.ok_or_else(|| BundlerError::MissingRevision {
                title: page.title.clone(),
            })?;

            article.title = page.title.clone();
            article.revision = Some(revision);
            article.about = page.about.clone();
            article.is_version_of = page.is_version_of.clone();

            if !self.accumulator.add_source(&page, revision) {
                tracing::debug!(title = %page.title, revision, "revision already fetched");
            }

            let key = site.key(revision);
            self.put(self.stores.parsoid.as_ref(), &key, &page.text)?;

            if let Some(store) = &self.stores.html {
                let html = self
                    .fetchers
                    .html(site, &article.title, revision, self.status)
                    .await?;
                self.put(store.as_ref(), &key, &html.to_string())?;
            }

            if let Some(store) = &self.stores.modules {
                match self.fetchers.modules(site, &article.title, revision).await {
                    Ok(modules) => self.put(store.as_ref(), &key, &modules.to_string())?,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => tracing::warn!("No module data for {}: {}", article.title, e),
                }
            }

            match self
                .fetchers
                .authors(site, &article.title, revision, self.status)
                .await
            {
                Ok(authors) => self.put(
                    self.stores.authors.as_ref(),
                    &site.key(&article.title),
                    &authors.to_string(),
                )?,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!("No authorship data for {}: {}", article.title, e),
            }

            if save_redirects && remaining > 0 {
                if let Some(target) = page.redirect {
                    tracing::debug!(from = %article.title, to = %target, "saved redirect");
                    article.title = target;
                    article.revision = None;
                    remaining -= 1;
                    continue;
                }
            }

            self.status
                .report(&format!("{}:{} [complete]", site.prefix(), article.title));
            return Ok(());
        }
    }

    /// Writes the attribution documents
    pub(crate) async fn write_attribution(&self, metabook: &Metabook) -> Result<()> {
        self.status.create_stage(1, "Writing attribution");

        let Attribution { html, wikitext } = output::attribution::generate(
            metabook,
            self.stores.authors.as_ref(),
            self.stores.imageinfo.as_ref(),
        )?;
        self.write_file(ATTRIBUTION_HTML, &html).await?;
        if self.config.bundle.compat {
            self.write_file(ATTRIBUTION_WT, &wikitext).await?;
        }

        self.status.report(ATTRIBUTION_HTML);
        Ok(())
    }

    /// Writes `metabook.json`, plus `nfo.json` in compat mode
    pub(crate) async fn write_descriptors(&self, metabook: &Metabook) -> Result<()> {
        self.write_file(METABOOK_JSON, &serde_json::to_string(metabook)?)
            .await?;
        if self.config.bundle.compat {
            self.write_file(NFO_JSON, &output::nfo_json(metabook)?)
                .await?;
        }
        Ok(())
    }
}
