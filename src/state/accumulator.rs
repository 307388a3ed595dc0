use crate::api::{MediaRef, ParsedPage};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// One successfully fetched article
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub wiki: usize,
    pub title: String,
    pub revision: u64,
    pub page: ParsedPage,
}

/// Sources and media gathered during the parsed-content stage
///
/// Sources are keyed by `(wiki, revision)`; media by resource URL. Both
/// keep the first record inserted under a key.
#[derive(Debug, Default)]
pub struct Accumulator {
    sources: Mutex<BTreeMap<(usize, u64), SourceRecord>>,
    media: Mutex<BTreeMap<String, MediaRef>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fetched article and the media it references
    ///
    /// Returns false if the revision was already recorded; its media are
    /// merged either way.
    pub fn add_source(&self, page: &ParsedPage, revision: u64) -> bool {
        {
            let mut media = lock(&self.media);
            for reference in &page.media {
                media
                    .entry(reference.resource.clone())
                    .or_insert_with(|| reference.clone());
            }
        }

        let mut sources = lock(&self.sources);
        let key = (page.wiki, revision);
        if sources.contains_key(&key) {
            return false;
        }
        sources.insert(
            key,
            SourceRecord {
                wiki: page.wiki,
                title: page.title.clone(),
                revision,
                page: page.clone(),
            },
        );
        true
    }

    /// All sources, ordered by `(wiki, revision)`
    pub fn sources(&self) -> Vec<SourceRecord> {
        lock(&self.sources).values().cloned().collect()
    }

    /// All distinct media references, ordered by resource URL
    pub fn media(&self) -> Vec<MediaRef> {
        lock(&self.media).values().cloned().collect()
    }

    pub fn source_count(&self) -> usize {
        lock(&self.sources).len()
    }

    pub fn media_count(&self) -> usize {
        lock(&self.media).len()
    }
}
