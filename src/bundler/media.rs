//! Media stage
//!
//! Runs after every article has been fetched, over the distinct media
//! references the articles produced. Each reference costs two status
//! units: metadata, then download or skip.

use crate::api::{ImageInfo, MediaRef};
use crate::bundler::coordinator::{Failures, Run};
use crate::bundler::{Charge, SizeClass};
use crate::output::IMAGES_DIR;
use crate::state::MediaState;
use crate::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use sha2::{Digest, Sha256};

/// Outcome of one media reference
#[derive(Debug, Clone)]
pub struct MediaResult {
    pub media: MediaRef,
    pub state: MediaState,
    /// File repository the metadata named, if any
    pub repository: Option<String>,
}

/// Bundle file name for a media resource
///
/// A hash of the resource URL, keeping the extension of the file that was
/// downloaded.
pub fn media_filename(resource: &str, download_url: &str) -> String {
    let digest = hex::encode(Sha256::digest(resource.as_bytes()));
    match extension(download_url) {
        Some(ext) => format!("{}.{}", digest, ext),
        None => digest,
    }
}

fn extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    let valid = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

impl Run<'_> {
    /// Fetches metadata for every discovered media reference and
    /// downloads the renderable ones the budget accepts
    pub(crate) async fn fetch_media(&self) -> Result<Vec<MediaResult>> {
        let media = self.accumulator.media();
        self.status
            .create_stage(2 * media.len() as u64, "Fetching media");
        tracing::info!("Fetching {} media files", media.len());

        let mut tasks: FuturesUnordered<_> = media
            .into_iter()
            .map(|reference| async move {
                let outcome = self.process_media(&reference).await;
                (reference, outcome)
            })
            .collect();

        let mut results = Vec::new();
        let mut failures = Failures::new(&self.cancel);
        while let Some((media, outcome)) = tasks.next().await {
            match outcome {
                Ok((state, repository)) => results.push(MediaResult {
                    media,
                    state,
                    repository,
                }),
                Err(e) => failures.record(e),
            }
        }
        failures.finish("fetching media")?;

        Ok(results)
    }

    /// Handles one reference; only fatal errors escape
    async fn process_media(&self, media: &MediaRef) -> Result<(MediaState, Option<String>)> {
        let site = self.site(media.wiki)?;

        let (mut info, state, attempted) =
            match self.fetchers.media_metadata(site, media, self.status).await {
                Ok(mut info) => {
                    let (state, attempted) = if info.is_missing() {
                        (MediaState::Missing, false)
                    } else if !info.is_renderable() {
                        (MediaState::Unsupported, false)
                    } else {
                        self.download(media, &mut info).await?
                    };
                    (info, state, attempted)
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("No metadata for {}: {}", media.short, e);
                    let info = ImageInfo {
                        resource: media.resource.clone(),
                        short: media.short.clone(),
                        ..ImageInfo::default()
                    };
                    (info, MediaState::Failed, false)
                }
            };

        // A download attempt already reported this reference's second unit
        if !attempted {
            self.status
                .report(&format!("{} {}", media.short, state.label()));
        }

        // The record keeps the render URL the article used
        info.thumburl = Some(media.src.clone());
        let record = serde_json::to_string(&info)?;
        self.put(self.stores.imageinfo.as_ref(), &media.resource, &record)?;

        Ok((state, info.repository.clone()))
    }

    /// Charges the declared size, downloads, then corrects the charge
    ///
    /// The flag is true once a download was attempted.
    async fn download(&self, media: &MediaRef, info: &mut ImageInfo) -> Result<(MediaState, bool)> {
        let declared = info.size.unwrap_or(0);
        if self.budget.charge(declared, SizeClass::Image)? == Charge::Skipped {
            return Ok((MediaState::TooLarge, false));
        }

        let Some(url) = info.download_url().map(str::to_string) else {
            tracing::warn!("No download URL for {}", media.short);
            self.budget.adjust(-(declared as i64), SizeClass::Image)?;
            return Ok((MediaState::Failed, false));
        };

        let filename = media_filename(&media.resource, &url);
        let dest = self.root.join(IMAGES_DIR).join(&filename);
        let written = match self
            .fetchers
            .media_bytes(&media.short, &url, &dest, self.status)
            .await
        {
            Ok(written) => written,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!("Failed to download {}: {}", media.short, e);
                self.budget.adjust(-(declared as i64), SizeClass::Image)?;
                return Ok((MediaState::Failed, true));
            }
        };

        let delta = written as i64 - declared as i64;
        if self.budget.adjust(delta, SizeClass::Image)? == Charge::Skipped {
            tracing::info!("{} is larger than declared, dropping it", media.short);
            tokio::fs::remove_file(&dest).await?;
            self.budget.adjust(-(declared as i64), SizeClass::Image)?;
            return Ok((MediaState::TooLarge, true));
        }

        tracing::debug!(file = %filename, bytes = written, "downloaded {}", media.short);
        info.filename = Some(format!("{}/{}", IMAGES_DIR, filename));
        info.size = Some(written);
        Ok((MediaState::Downloaded, true))
    }
}
