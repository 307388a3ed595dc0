//! Running size budget
//!
//! Tracks total bundle bytes against a hard ceiling and image bytes
//! against a soft ceiling. Image bytes always count toward the total as
//! well. Exceeding the hard ceiling is fatal for the run; exceeding the
//! soft ceiling only tells the caller to omit that image.

use crate::{BundlerError, Result};
use std::sync::Mutex;

/// Which counters a charge applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    /// Counts toward the total only
    Data,
    /// Counts toward both the image and the total counters
    Image,
}

/// Outcome of an accepted budget call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    Accepted,
    /// The soft image ceiling would be exceeded; nothing was counted
    Skipped,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    image: u64,
}

/// Byte accounting for one run
#[derive(Debug)]
pub struct SizeBudget {
    total_limit: Option<u64>,
    image_limit: Option<u64>,
    counters: Mutex<Counters>,
}

impl SizeBudget {
    /// Creates a budget; `None` disables the corresponding ceiling
    pub fn new(total_limit: Option<u64>, image_limit: Option<u64>) -> Self {
        Self {
            total_limit,
            image_limit,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Creates a budget with both ceilings disabled
    pub fn unlimited() -> Self {
        Self::new(None, None)
    }

    /// Counts `bytes` about to be written
    ///
    /// Returns `Skipped` (and counts nothing) if an image would push the
    /// image counter past its ceiling. Returns `SizeLimitExceeded` if the
    /// total passes the hard ceiling; the bytes stay counted, so every
    /// later charge fails too.
    pub fn charge(&self, bytes: u64, class: SizeClass) -> Result<Charge> {
        self.apply(i128::from(bytes), class)
    }

    /// Corrects an earlier estimate by `delta` bytes
    ///
    /// Positive deltas are checked against both ceilings exactly like
    /// `charge`. Negative deltas always succeed.
    pub fn adjust(&self, delta: i64, class: SizeClass) -> Result<Charge> {
        self.apply(i128::from(delta), class)
    }

    fn apply(&self, delta: i128, class: SizeClass) -> Result<Charge> {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if class == SizeClass::Image {
            let image = offset(counters.image, delta);
            if delta > 0 && exceeds(image, self.image_limit) {
                tracing::debug!(
                    image_bytes = image,
                    limit = ?self.image_limit,
                    "image ceiling reached"
                );
                return Ok(Charge::Skipped);
            }
            counters.image = image;
        }

        counters.total = offset(counters.total, delta);
        if delta >= 0 {
            if let Some(limit) = self.total_limit {
                if counters.total > limit {
                    return Err(BundlerError::SizeLimitExceeded {
                        size: counters.total,
                        limit,
                    });
                }
            }
        }

        Ok(Charge::Accepted)
    }

    /// Total bytes counted so far
    pub fn total(&self) -> u64 {
        self.counters.lock().map(|c| c.total).unwrap_or_default()
    }

    /// Image bytes counted so far
    pub fn image_total(&self) -> u64 {
        self.counters.lock().map(|c| c.image).unwrap_or_default()
    }
}

fn offset(value: u64, delta: i128) -> u64 {
    let next = i128::from(value) + delta;
    next.clamp(0, i128::from(u64::MAX)) as u64
}

fn exceeds(value: u64, limit: Option<u64>) -> bool {
    limit.map_or(false, |limit| value > limit)
}
