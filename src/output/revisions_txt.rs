//! Legacy concatenated revision stream (`revisions-1.txt`)
//!
//! Each page is written as a form-feed separated header line carrying the
//! page's JSON metadata, followed by its raw wikitext. Pages appear in the
//! order their fetches complete.

use crate::api::RevisionRecord;
use crate::Result;
use serde_json::json;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Header marker preceding each page
const PAGE_MARKER: &str = "\n\u{c} --page-- ";

/// Formats the header line for one page
pub fn page_header(record: &RevisionRecord) -> String {
    let meta = json!({
        "expanded": 0,
        "ns": record.ns,
        "revid": record.revid,
        "title": record.title,
        "wiki": record.wiki,
    });
    format!("{}{}\n", PAGE_MARKER, meta)
}

/// Appends pages to the stream; safe to share between tasks
pub struct RevisionWriter {
    file: Mutex<Option<File>>,
}

impl RevisionWriter {
    pub async fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).await?;
        Ok(Self {
            file: Mutex::new(Some(file)),
        })
    }

    /// Appends one page as a single contiguous write
    pub async fn append(&self, record: &RevisionRecord) -> Result<()> {
        let mut chunk = page_header(record);
        chunk.push_str(&record.text);

        let mut guard = self.file.lock().await;
        if let Some(file) = guard.as_mut() {
            file.write_all(chunk.as_bytes()).await?;
        }
        Ok(())
    }

    /// Flushes and closes the stream
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.file.lock().await;
        if let Some(mut file) = guard.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}
