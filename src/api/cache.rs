//! Lazily-initialized lookups shared across a run
//!
//! Concurrent first callers share one in-flight request; later callers get
//! the cached value. Both caches are plain values handed to whoever needs
//! them, so tests can inject pre-filled or fresh instances.

use crate::api::{ContentApi, SiteInfo, SiteMatrixEntry};
use crate::metabook::WikiConf;
use crate::url::extract_domain;
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Site info, fetched at most once per wiki
#[derive(Default)]
pub struct SiteInfoCache {
    cells: Mutex<HashMap<String, Arc<OnceCell<SiteInfo>>>>,
}

impl SiteInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the site info for `wiki`, fetching it on first use
    pub async fn get(&self, api: &dyn ContentApi, wiki: &WikiConf) -> Result<SiteInfo> {
        let key = wiki.baseurl.clone().unwrap_or_default();
        let cell = {
            let mut cells = match self.cells.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(cells.entry(key).or_default())
        };
        let info = cell.get_or_try_init(|| api.site_info(wiki)).await?;
        Ok(info.clone())
    }
}

/// The Wikimedia site matrix indexed by database name and by host
#[derive(Debug, Default)]
pub struct SiteMatrix {
    by_prefix: HashMap<String, SiteMatrixEntry>,
    by_host: HashMap<String, SiteMatrixEntry>,
}

impl SiteMatrix {
    pub fn new(entries: Vec<SiteMatrixEntry>) -> Self {
        let mut matrix = Self::default();
        for entry in entries {
            if let Some(host) = extract_domain(&entry.url) {
                matrix.by_host.insert(host, entry.clone());
            }
            matrix.by_prefix.insert(entry.dbname.clone(), entry);
        }
        matrix
    }

    /// Looks up a wiki by database name (e.g. `enwiki`)
    pub fn by_prefix(&self, prefix: &str) -> Option<&SiteMatrixEntry> {
        self.by_prefix.get(prefix)
    }

    /// Looks up a wiki by host (e.g. `en.wikipedia.org`)
    pub fn by_host(&self, host: &str) -> Option<&SiteMatrixEntry> {
        self.by_host.get(&host.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.by_prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_prefix.is_empty()
    }
}

/// Site matrix, fetched at most once per cache instance
#[derive(Default)]
pub struct SiteMatrixCache {
    cell: OnceCell<Arc<SiteMatrix>>,
}

impl SiteMatrixCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache that never hits the network
    pub fn with_entries(entries: Vec<SiteMatrixEntry>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Arc::new(SiteMatrix::new(entries)))),
        }
    }

    pub async fn get(&self, api: &dyn ContentApi) -> Result<Arc<SiteMatrix>> {
        let matrix = self
            .cell
            .get_or_try_init(|| async {
                let entries = api.site_matrix().await?;
                tracing::debug!(wikis = entries.len(), "Loaded site matrix");
                Ok::<_, crate::BundlerError>(Arc::new(SiteMatrix::new(entries)))
            })
            .await?;
        Ok(Arc::clone(matrix))
    }
}
