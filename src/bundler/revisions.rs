//! Revision stage (compat mode)
//!
//! Fetches the raw wikitext of every fetched article and of every media
//! file's description page, storing each in `revisions.db` and appending
//! it to `revisions-1.txt`.

use crate::bundler::coordinator::{Failures, Run};
use crate::bundler::media::MediaResult;
use crate::bundler::SizeClass;
use crate::metabook::{Metabook, COMMONS_PREFIX};
use crate::output::{page_header, RevisionWriter, REVISIONS_TXT};
use crate::state::MediaState;
use crate::url::canonical_file_title;
use crate::Result;
use futures::stream::{FuturesUnordered, StreamExt};

/// One page whose wikitext goes into the bundle
#[derive(Debug, Clone, PartialEq, Eq)]
struct RevisionTitle {
    wiki: usize,
    title: String,
    /// Title to query with, when it differs from `title`
    canonical: Option<String>,
    /// Media pages always use the latest revision
    revision: Option<u64>,
}

impl RevisionTitle {
    fn query_title(&self) -> &str {
        self.canonical.as_deref().unwrap_or(&self.title)
    }
}

/// Lists the pages to fetch: sources first, then media pages
///
/// A media page is fetched from the wiki whose file repository served it.
/// Missing media and media from repositories no wiki in the collection
/// serves are left out.
fn revision_titles(run: &Run<'_>, metabook: &Metabook, media: &[MediaResult]) -> Vec<RevisionTitle> {
    let mut titles: Vec<RevisionTitle> = run
        .accumulator
        .sources()
        .into_iter()
        .map(|source| RevisionTitle {
            wiki: source.wiki,
            title: source.title,
            canonical: None,
            revision: Some(source.revision),
        })
        .collect();

    for result in media {
        if result.state == MediaState::Missing {
            continue;
        }
        let Some(wiki) = metabook.wikis.get(result.media.wiki) else {
            continue;
        };
        let served_by = match &result.repository {
            Some(name) => wiki
                .filerepos
                .iter()
                .flatten()
                .find(|repo| &repo.name == name)
                .and_then(|repo| repo.wiki),
            None => Some(result.media.wiki),
        };
        let Some(index) = served_by.filter(|i| *i < metabook.wikis.len()) else {
            tracing::debug!("No wiki serves {}", result.media.short);
            continue;
        };
        titles.push(RevisionTitle {
            wiki: index,
            title: result.media.short.clone(),
            canonical: Some(canonical_file_title(&result.media.short)),
            revision: None,
        });
    }

    titles
}

impl Run<'_> {
    /// Fetches and writes the raw wikitext of every page in the bundle
    ///
    /// Returns the number of revisions written.
    pub(crate) async fn fetch_revisions(
        &self,
        metabook: &Metabook,
        media: &[MediaResult],
    ) -> Result<usize> {
        let titles = revision_titles(self, metabook, media);
        self.status
            .create_stage(titles.len() as u64, "Fetching wikitext");
        tracing::info!("Fetching {} revisions", titles.len());

        let writer = RevisionWriter::create(&self.root.join(REVISIONS_TXT)).await?;

        let mut tasks: FuturesUnordered<_> = titles
            .iter()
            .map(|title| self.process_revision(title, &writer))
            .collect();

        let mut written = 0;
        let mut failures = Failures::new(&self.cancel);
        while let Some(result) = tasks.next().await {
            match result {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => failures.record(e),
            }
        }
        drop(tasks);

        writer.close().await?;
        failures.finish("fetching revisions")?;
        Ok(written)
    }

    /// Fetches one page; returns false if it was skipped
    async fn process_revision(&self, title: &RevisionTitle, writer: &RevisionWriter) -> Result<bool> {
        let site = self.site(title.wiki)?;

        let commons = self
            .sites
            .iter()
            .find(|s| s.index != site.index && s.prefix() == COMMONS_PREFIX);

        let record = match self
            .fetchers
            .revision(site, commons, title.query_title(), title.revision, self.status)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!("Revision not found for {}", title.title);
                return Ok(false);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!("Failed to fetch wikitext for {}: {}", title.title, e);
                return Ok(false);
            }
        };

        let record_site = self.site(record.wiki)?;
        if let Some(store) = &self.stores.revisions {
            let json = serde_json::to_string(&record)?;
            self.put(store.as_ref(), &record_site.key(record.revid), &json)?;
        }

        let bytes = page_header(&record).len() + record.text.len();
        self.budget.charge(bytes as u64, SizeClass::Data)?;
        writer.append(&record).await?;
        Ok(true)
    }
}
