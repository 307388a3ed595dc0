//! Run summary
//!
//! Returned by a successful run and printed by the CLI.

use crate::state::MediaState;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

/// Summary statistics for one bundle
#[derive(Debug, Clone)]
pub struct BundleSummary {
    /// Final output path (archive or directory)
    pub output: PathBuf,

    /// Whether the output is a zip archive
    pub archived: bool,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Articles whose parsed content was stored
    pub articles: usize,

    /// Media outcomes by state
    pub media: HashMap<MediaState, usize>,

    /// Raw revisions stored (compat mode)
    pub revisions: usize,

    /// Bytes counted against the size budget
    pub budget_bytes: u64,

    /// Size of the output on disk
    pub output_bytes: u64,
}

impl BundleSummary {
    /// Wall-clock duration of the run in seconds
    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }

    /// Total media references processed
    pub fn media_total(&self) -> usize {
        self.media.values().sum()
    }

    /// Count of media in the given state
    pub fn media_in(&self, state: MediaState) -> usize {
        self.media.get(&state).copied().unwrap_or(0)
    }
}

/// Prints a summary to stdout in a formatted manner
pub fn print_summary(summary: &BundleSummary) {
    println!("=== Bundle Summary ===\n");

    println!("Output:");
    println!(
        "  {} ({})",
        summary.output.display(),
        if summary.archived { "zip" } else { "directory" }
    );
    println!("  Size on disk: {} bytes", summary.output_bytes);
    println!("  Budgeted bytes: {}", summary.budget_bytes);
    println!();

    println!("Content:");
    println!("  Articles: {}", summary.articles);
    println!("  Revisions: {}", summary.revisions);
    println!("  Media: {}", summary.media_total());

    let mut states: Vec<_> = summary.media.iter().collect();
    states.sort_by(|a, b| b.1.cmp(a.1));
    for (state, count) in states {
        println!("    {:?}: {}", state, count);
    }
    println!();

    println!(
        "Finished {} ({} seconds)",
        summary.finished_at.to_rfc3339(),
        summary.duration_seconds()
    );
}
