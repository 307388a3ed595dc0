use clap::ValueEnum;
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for the bundler
///
/// Every section is optional in the TOML file; missing values fall back to
/// the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
}

/// Table-of-contents setting copied into the metabook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TocSetting {
    /// Leave whatever the metabook says
    #[default]
    Auto,
    Yes,
    No,
}

/// Bundle behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BundleConfig {
    /// Output path (directory in nozip mode, zip file otherwise)
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// Emit files compatible with the legacy bundle format
    /// (html.db, revisions.db, revisions-1.txt, nfo.json, attribution.wt)
    #[serde(default)]
    pub compat: bool,

    /// Follow redirects found in parsed articles
    #[serde(rename = "follow-redirects", default)]
    pub follow_redirects: bool,

    /// Store redirect pages themselves, then re-process under the target title
    #[serde(rename = "save-redirects", default)]
    pub save_redirects: bool,

    /// Fetch CSS/JS module data for each article
    #[serde(rename = "fetch-modules", default)]
    pub fetch_modules: bool,

    /// Leave the output as a directory instead of a zip archive
    #[serde(default)]
    pub nozip: bool,

    /// Store .db files uncompressed inside the archive
    #[serde(rename = "store-db-uncompressed", default)]
    pub store_db_uncompressed: bool,

    /// Maximum number of redirect hops followed per article
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Hard limit on total bundle size in bytes (0 disables)
    #[serde(rename = "bundle-size-limit", default)]
    pub bundle_size_limit: u64,

    /// Soft limit on total image bytes (0 disables)
    #[serde(rename = "image-size-limit", default)]
    pub image_size_limit: u64,

    /// Override of the per-wiki image width in pixels
    #[serde(rename = "image-size", default)]
    pub image_size: Option<u32>,

    /// Table of contents setting
    #[serde(default)]
    pub toc: TocSetting,

    /// Collection language override
    #[serde(default)]
    pub lang: Option<String>,
}

/// Per-resource-class concurrency limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_limit")]
    pub parsoid: usize,
    #[serde(default = "default_limit")]
    pub html: usize,
    #[serde(default = "default_limit")]
    pub modules: usize,
    #[serde(default = "default_limit")]
    pub authors: usize,
    #[serde(default = "default_limit")]
    pub images: usize,
    #[serde(default = "default_limit")]
    pub revisions: usize,
}

/// Which Parsoid/RESTBase API flavor to use for parsed content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    #[default]
    Auto,
    Restbase1,
    Parsoid1,
    Parsoid2,
    Parsoid3,
}

/// Upstream endpoint overrides
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(rename = "api-version", default)]
    pub api_version: ApiVersion,

    /// RESTBase endpoint used for wikis without one
    #[serde(rename = "restbase-api", default)]
    pub restbase_api: Option<String>,

    /// Parsoid endpoint used for wikis without one
    #[serde(rename = "parsoid-api", default)]
    pub parsoid_api: Option<String>,

    /// Action API base used when the site matrix has no entry
    #[serde(rename = "php-api", default)]
    pub php_api: Option<String>,

    /// Wiki whose action API serves the site matrix
    #[serde(rename = "sitematrix-api", default = "default_sitematrix_api")]
    pub sitematrix_api: String,
}

/// Retry backoff strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    #[default]
    Exponential,
}

/// HTTP client behavior
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "timeout-secs", default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default = "default_agent_version")]
    pub version: String,

    #[serde(rename = "contact-url", default)]
    pub contact_url: Option<String>,
}

fn default_max_redirects() -> u32 {
    5
}

fn default_limit() -> usize {
    5
}

fn default_sitematrix_api() -> String {
    "https://en.wikipedia.org/w".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_agent_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_agent_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            output: None,
            compat: false,
            follow_redirects: false,
            save_redirects: false,
            fetch_modules: false,
            nozip: false,
            store_db_uncompressed: false,
            max_redirects: default_max_redirects(),
            bundle_size_limit: 0,
            image_size_limit: 0,
            image_size: None,
            toc: TocSetting::Auto,
            lang: None,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            parsoid: default_limit(),
            html: default_limit(),
            modules: default_limit(),
            authors: default_limit(),
            images: default_limit(),
            revisions: default_limit(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_version: ApiVersion::Auto,
            restbase_api: None,
            parsoid_api: None,
            php_api: None,
            sitematrix_api: default_sitematrix_api(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            backoff: Backoff::Exponential,
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            version: default_agent_version(),
            contact_url: None,
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header value: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(url) => format!("{}/{} (+{})", self.name, self.version, url),
            None => format!("{}/{}", self.name, self.version),
        }
    }
}

impl BundleConfig {
    /// Bundle size ceiling, with the zero sentinel mapped to "disabled"
    pub fn bundle_ceiling(&self) -> Option<u64> {
        (self.bundle_size_limit != 0).then_some(self.bundle_size_limit)
    }

    /// Image size ceiling, with the zero sentinel mapped to "disabled"
    pub fn image_ceiling(&self) -> Option<u64> {
        (self.image_size_limit != 0).then_some(self.image_size_limit)
    }

    /// Redirect hops the resolver may follow for one article
    pub fn redirect_hops(&self) -> u32 {
        if self.follow_redirects {
            self.max_redirects
        } else {
            0
        }
    }
}
