//! Wiki-Bundler: offline bundles for wiki collections
//!
//! This crate assembles a self-contained bundle (parsed article markup,
//! rendered HTML, media, authorship metadata and raw wikitext) from a
//! metabook content tree, fetching every artifact from the source wikis
//! under bounded concurrency and a running size budget.

pub mod api;
pub mod bundler;
pub mod config;
pub mod metabook;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Exit classification for generic failures
pub const EXIT_FAILURE: i32 = 1;

/// Exit classification for an exceeded bundle size limit
pub const EXIT_SIZE_LIMIT: i32 = 2;

/// Main error type for bundler operations
#[derive(Debug, Error)]
pub enum BundlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected API response from {url}: {message}")]
    BadResponse { url: String, message: String },

    #[error("No revision ID for {title}")]
    MissingRevision { title: String },

    #[error("Bundle size limit exceeded: {size}/{limit}")]
    SizeLimitExceeded { size: u64, limit: u64 },

    #[error("Invalid metabook: {0}")]
    Metabook(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl BundlerError {
    /// Returns the exit classification for this error
    ///
    /// `2` for an exceeded bundle size limit, `1` for every other failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SizeLimitExceeded { .. } => EXIT_SIZE_LIMIT,
            _ => EXIT_FAILURE,
        }
    }

    /// Returns true if the requested title, revision or file does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::HttpStatus { status: 404, .. })
    }

    /// Returns true if this error must abort the whole run
    ///
    /// Per-item failures (a single image, revision or author lookup) are
    /// skipped by the caller; these are not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SizeLimitExceeded { .. }
                | Self::MissingRevision { .. }
                | Self::Storage(_)
                | Self::Io(_)
                | Self::Archive(_)
                | Self::Cancelled
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for bundler operations
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use bundler::{bundle, Bundler, StatusEvent};
pub use config::Config;
pub use metabook::Metabook;
