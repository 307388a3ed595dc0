//! Bundle assembly pipeline
//!
//! This module drives a whole run:
//! - Creating the output directory and opening the stores
//! - Resolving the metabook's wikis
//! - Fetching parsed articles, media and (in compat mode) raw revisions
//!   under per-class concurrency guards and a running size budget
//! - Writing attribution and descriptor files
//! - Committing the output as a directory or a zip archive
//!
//! Any failure removes the partially written output directory.

mod budget;
mod coordinator;
mod fetchers;
mod guard;
mod media;
mod revisions;
mod status;

pub use budget::{Charge, SizeBudget, SizeClass};
pub use coordinator::resolve;
pub use fetchers::Fetchers;
pub use guard::ConcurrencyGuard;
pub use media::{media_filename, MediaResult};
pub use status::{StatusEvent, StatusReporter, StatusSink};

use crate::api::{ContentApi, SiteInfoCache};
use crate::config::Config;
use crate::metabook::Metabook;
use crate::output::{
    commit_archive, make_readable, sync_dir, BundleSummary, OutputDir, IMAGES_DIR,
};
use crate::state::{Accumulator, MediaState};
use crate::storage::Stores;
use crate::Result;
use chrono::Utc;
use coordinator::Run;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Counts gathered before the commit
struct Assembled {
    articles: usize,
    media: HashMap<MediaState, usize>,
    revisions: usize,
}

/// Builds bundles from metabooks
pub struct Bundler {
    config: Config,
    api: Arc<dyn ContentApi>,
    sink: Option<StatusSink>,
    siteinfo: SiteInfoCache,
    total_limit: Option<u64>,
    image_limit: Option<u64>,
    cancel: CancellationToken,
}

impl Bundler {
    /// Creates a bundler; size ceilings come from `config`
    pub fn new(config: Config, api: Arc<dyn ContentApi>) -> Self {
        let total_limit = config.bundle.bundle_ceiling();
        let image_limit = config.bundle.image_ceiling();
        Self {
            config,
            api,
            sink: None,
            siteinfo: SiteInfoCache::new(),
            total_limit,
            image_limit,
            cancel: CancellationToken::new(),
        }
    }

    /// Forwards status events to `sink`
    pub fn with_status(mut self, sink: StatusSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Overrides the size ceilings; `None` disables a ceiling
    ///
    /// Unlike the configuration values, `Some(0)` here is a real ceiling.
    pub fn with_size_limits(mut self, total: Option<u64>, image: Option<u64>) -> Self {
        self.total_limit = total;
        self.image_limit = image;
        self
    }

    /// Token that aborts outstanding work when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of stages a run reports
    fn stage_count(&self) -> usize {
        // resolve, parsed, media, attribution, commit; plus revisions
        if self.config.bundle.compat {
            6
        } else {
            5
        }
    }

    /// Builds a bundle for `metabook` at `output`
    ///
    /// `output` must not exist. It becomes a directory in nozip mode and a
    /// zip archive otherwise. On failure nothing is left at `output`.
    pub async fn run(&self, mut metabook: Metabook, output: &Path) -> Result<BundleSummary> {
        let started_at = Utc::now();
        metabook.check()?;

        let status = StatusReporter::new(self.stage_count(), self.sink.clone());
        let budget = SizeBudget::new(self.total_limit, self.image_limit);

        let dir = OutputDir::create(output)?;
        tracing::info!(
            "Bundling {} items from {} wikis into {}",
            metabook.count_items(),
            metabook.wikis.len(),
            output.display()
        );

        let assembled = match self.assemble(&mut metabook, dir.path(), &status, &budget).await {
            Ok(assembled) => assembled,
            Err(e) => {
                tracing::error!("Bundle failed: {}", e);
                if let Err(cleanup) = dir.remove() {
                    tracing::warn!("Failed to remove {}: {}", output.display(), cleanup);
                }
                return Err(e);
            }
        };

        status.create_stage(0, "Creating bundle");
        let (path, output_bytes) = self.commit(dir).await?;
        status.finish(&format!("Done ({} bytes)", output_bytes));

        let finished_at = Utc::now();
        tracing::info!(
            "Wrote {} ({} bytes) in {} seconds",
            path.display(),
            output_bytes,
            (finished_at - started_at).num_seconds()
        );

        Ok(BundleSummary {
            output: path,
            archived: !self.config.bundle.nozip,
            started_at,
            finished_at,
            articles: assembled.articles,
            media: assembled.media,
            revisions: assembled.revisions,
            budget_bytes: budget.total(),
            output_bytes,
        })
    }

    /// Runs every stage up to the commit
    ///
    /// Stores are closed on every path out of here.
    async fn assemble(
        &self,
        metabook: &mut Metabook,
        root: &Path,
        status: &StatusReporter,
        budget: &SizeBudget,
    ) -> Result<Assembled> {
        let bundle = &self.config.bundle;
        let stores = Stores::open(root, bundle.compat, bundle.fetch_modules)?;
        tokio::fs::create_dir(root.join(IMAGES_DIR)).await?;

        status.create_stage(
            2 * (metabook.wikis.len() as u64 + 1),
            "Resolving wikis",
        );
        let sites = resolve(metabook, self.api.as_ref(), &self.siteinfo, &self.config, status).await?;

        let cancel = self.cancel.child_token();
        let run = Run {
            config: &self.config,
            fetchers: Fetchers::new(self.api.clone(), &self.config.limits, &cancel),
            budget,
            status,
            stores: &stores,
            accumulator: Accumulator::new(),
            sites,
            root,
            cancel,
        };

        let articles = run.fetch_parsed(metabook).await?;
        let media = run.fetch_media().await?;
        let revisions = if bundle.compat {
            run.fetch_revisions(metabook, &media).await?
        } else {
            0
        };
        run.write_attribution(metabook).await?;
        run.write_descriptors(metabook).await?;
        drop(run);

        stores.close_all();
        sync_dir(&root.join(IMAGES_DIR))?;
        sync_dir(root)?;

        let mut tally = HashMap::new();
        for result in &media {
            *tally.entry(result.state).or_insert(0) += 1;
        }

        Ok(Assembled {
            articles,
            media: tally,
            revisions,
        })
    }

    /// Leaves the directory in place or replaces it with an archive
    ///
    /// Returns the final path and its size on disk.
    async fn commit(&self, dir: OutputDir) -> Result<(PathBuf, u64)> {
        if self.config.bundle.nozip {
            make_readable(dir.path())?;
            let size = directory_size(dir.path());
            return Ok((dir.keep(), size));
        }

        let path = dir.path().to_path_buf();
        let store_db_uncompressed = self.config.bundle.store_db_uncompressed;
        let size = tokio::task::spawn_blocking(move || commit_archive(dir, store_db_uncompressed))
            .await
            .map_err(std::io::Error::from)??;
        Ok((path, size))
    }
}

fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok())
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
        .sum()
}

/// Builds a bundle with a fresh [`Bundler`]
///
/// # Arguments
///
/// * `metabook` - Content tree to bundle
/// * `output` - Path of the bundle; must not exist yet
/// * `config` - Run configuration
/// * `api` - Source wiki client
/// * `sink` - Optional receiver of status events
///
/// # Returns
///
/// * `Ok(BundleSummary)` - The bundle was committed
/// * `Err(BundlerError)` - The run failed; `exit_code()` classifies it
pub async fn bundle(
    metabook: Metabook,
    output: &Path,
    config: Config,
    api: Arc<dyn ContentApi>,
    sink: Option<StatusSink>,
) -> Result<BundleSummary> {
    let mut bundler = Bundler::new(config, api);
    if let Some(sink) = sink {
        bundler = bundler.with_status(sink);
    }
    bundler.run(metabook, output).await
}
