//! Storage module for the bundle's key/value stores
//!
//! A bundle carries several independent stores (parsed content, HTML,
//! authorship, media metadata, module data, raw revisions). Each is a
//! SQLite file with one `kv_table`, opened at the start of a run and
//! closed before the output is committed.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteKv;
pub use traits::{KvStore, StorageError, StorageResult};

use std::path::Path;
use std::sync::Arc;

/// Store file names inside the bundle
pub const PARSOID_DB: &str = "parsoid.db";
pub const HTML_DB: &str = "html.db";
pub const AUTHORS_DB: &str = "authors.db";
pub const IMAGEINFO_DB: &str = "imageinfo.db";
pub const MODULES_DB: &str = "modules.db";
pub const REVISIONS_DB: &str = "revisions.db";

/// Opens a store at the given path
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Arc<dyn KvStore>)` - Successfully opened store
/// * `Err(StorageError)` - Failed to open store
pub fn open_store(path: &Path) -> StorageResult<Arc<dyn KvStore>> {
    Ok(Arc::new(SqliteKv::open(path)?))
}

/// The set of stores written during one run
///
/// Optional stores are only present when their mode is enabled.
pub struct Stores {
    pub parsoid: Arc<dyn KvStore>,
    pub authors: Arc<dyn KvStore>,
    pub imageinfo: Arc<dyn KvStore>,
    pub html: Option<Arc<dyn KvStore>>,
    pub modules: Option<Arc<dyn KvStore>>,
    pub revisions: Option<Arc<dyn KvStore>>,
}

impl Stores {
    /// Opens every store needed for a run under `dir`
    pub fn open(dir: &Path, compat: bool, modules: bool) -> StorageResult<Self> {
        Ok(Self {
            parsoid: open_store(&dir.join(PARSOID_DB))?,
            authors: open_store(&dir.join(AUTHORS_DB))?,
            imageinfo: open_store(&dir.join(IMAGEINFO_DB))?,
            html: compat
                .then(|| open_store(&dir.join(HTML_DB)))
                .transpose()?,
            modules: modules
                .then(|| open_store(&dir.join(MODULES_DB)))
                .transpose()?,
            revisions: compat
                .then(|| open_store(&dir.join(REVISIONS_DB)))
                .transpose()?,
        })
    }

    /// Closes every store, logging and swallowing failures
    pub fn close_all(&self) {
        let all = [
            Some(&self.parsoid),
            Some(&self.authors),
            Some(&self.imageinfo),
            self.html.as_ref(),
            self.modules.as_ref(),
            self.revisions.as_ref(),
        ];
        for store in all.into_iter().flatten() {
            if let Err(e) = store.close() {
                tracing::warn!("Failed to close store: {}", e);
            }
        }
    }
}

impl Drop for Stores {
    fn drop(&mut self) {
        self.close_all();
    }
}
