//! Output module for writing the bundle
//!
//! This module handles:
//! - Top-level descriptor files (`metabook.json`, `nfo.json`)
//! - The attribution documents
//! - The legacy concatenated revision stream
//! - Committing the output directory (sync, archive, replace)
//! - The run summary

pub mod attribution;
pub mod commit;
mod revisions_txt;
mod summary;

pub use attribution::Attribution;
pub use commit::{commit_archive, create_archive, make_readable, sync_dir, OutputDir};
pub use revisions_txt::{page_header, RevisionWriter};
pub use summary::{print_summary, BundleSummary};

use crate::metabook::Metabook;
use crate::Result;
use serde_json::Value;
use std::path::Path;

pub const METABOOK_JSON: &str = "metabook.json";
pub const NFO_JSON: &str = "nfo.json";
pub const ATTRIBUTION_HTML: &str = "attribution.html";
pub const ATTRIBUTION_WT: &str = "attribution.wt";
pub const REVISIONS_TXT: &str = "revisions-1.txt";
pub const IMAGES_DIR: &str = "images";

/// Writes a file inside the output directory, returning its size
pub async fn write_file(dir: &Path, name: &str, contents: &str) -> Result<u64> {
    tokio::fs::write(dir.join(name), contents).await?;
    Ok(contents.len() as u64)
}

/// Legacy single-site descriptor: the first wiki with `baseurl` renamed
pub fn nfo_json(metabook: &Metabook) -> Result<String> {
    let mut nfo = match metabook.wikis.first() {
        Some(wiki) => serde_json::to_value(wiki)?,
        None => Value::Object(Default::default()),
    };
    if let Some(obj) = nfo.as_object_mut() {
        if let Some(baseurl) = obj.remove("baseurl") {
            obj.insert("base_url".to_string(), baseurl);
        }
    }
    Ok(serde_json::to_string(&nfo)?)
}
