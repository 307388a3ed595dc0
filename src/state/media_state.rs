/// Media processing outcome definitions
use std::fmt;

/// Outcome of processing one media reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaState {
    /// Bytes downloaded into the bundle
    Downloaded,

    /// The wiki does not know the file
    Missing,

    /// Not a kind the bundle carries bytes for
    Unsupported,

    /// The image ceiling did not allow the download
    TooLarge,

    /// Metadata or download failed
    Failed,
}

impl MediaState {
    /// Suffix used in status messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::Downloaded => "[downloaded]",
            Self::Missing => "[missing]",
            Self::Unsupported => "[skipping]",
            Self::TooLarge => "[skipping, image too large]",
            Self::Failed => "[failed]",
        }
    }
}

impl fmt::Display for MediaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
