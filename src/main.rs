//! Wiki-Bundler main entry point
//!
//! This is the command-line interface for building offline wiki bundles.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wiki_bundler::api::{ContentApi, HttpApi, SiteMatrixCache};
use wiki_bundler::bundler::{Bundler, StatusEvent, StatusSink};
use wiki_bundler::config::{load_config_with_hash, ApiVersion, Config, TocSetting};
use wiki_bundler::metabook::{from_articles, ArticleSpec, Metabook};
use wiki_bundler::output::print_summary;
use wiki_bundler::Result;

/// Wiki-Bundler: offline bundles for wiki collections
///
/// Fetches the parsed articles, media, authorship data and (in compat
/// mode) raw wikitext of a collection and packs them into a single zip
/// archive or directory.
#[derive(Parser, Debug)]
#[command(name = "wiki-bundler")]
#[command(version)]
#[command(about = "Builds offline bundles of wiki collections", long_about = None)]
struct Cli {
    /// Metabook JSON describing the collection
    #[arg(value_name = "METABOOK", required_unless_present = "article")]
    metabook: Option<PathBuf>,

    /// Bundle a single article, given as SITE|TITLE (repeatable)
    #[arg(short, long, value_name = "SITE|TITLE", conflicts_with = "metabook")]
    article: Vec<ArticleSpec>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Output path (zip file, or directory with --nozip)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit the legacy bundle files as well
    #[arg(long)]
    compat: bool,

    /// Follow redirects found in articles
    #[arg(long)]
    follow_redirects: bool,

    /// Store redirect pages, then their targets
    #[arg(long)]
    save_redirects: bool,

    /// Fetch module data for each article
    #[arg(long)]
    fetch_modules: bool,

    /// Leave the bundle as a directory
    #[arg(long)]
    nozip: bool,

    /// Do not compress .db files inside the archive
    #[arg(long)]
    store_db_uncompressed: bool,

    /// Maximum bundle size in bytes (0 disables)
    #[arg(long, value_name = "BYTES")]
    bundle_size_limit: Option<u64>,

    /// Maximum total image size in bytes (0 disables)
    #[arg(long, value_name = "BYTES")]
    image_size_limit: Option<u64>,

    /// Image width in pixels
    #[arg(long, value_name = "PIXELS")]
    image_size: Option<u32>,

    /// Table of contents setting
    #[arg(long, value_enum)]
    toc: Option<TocSetting>,

    /// Collection language
    #[arg(long)]
    lang: Option<String>,

    /// Parsed content API flavor
    #[arg(long, value_enum)]
    api_version: Option<ApiVersion>,

    /// RESTBase endpoint for wikis without one
    #[arg(long, value_name = "URL")]
    restbase_api: Option<String>,

    /// Parsoid endpoint for wikis without one
    #[arg(long, value_name = "URL")]
    parsoid_api: Option<String>,

    /// Action API base for wikis missing from the site matrix
    #[arg(long, value_name = "URL")]
    php_api: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration
    fn apply(&self, config: &mut Config) {
        let bundle = &mut config.bundle;
        if let Some(output) = &self.output {
            bundle.output = Some(output.clone());
        }
        bundle.compat |= self.compat;
        bundle.follow_redirects |= self.follow_redirects || self.save_redirects;
        bundle.save_redirects |= self.save_redirects;
        bundle.fetch_modules |= self.fetch_modules;
        bundle.nozip |= self.nozip;
        bundle.store_db_uncompressed |= self.store_db_uncompressed;
        if let Some(limit) = self.bundle_size_limit {
            bundle.bundle_size_limit = limit;
        }
        if let Some(limit) = self.image_size_limit {
            bundle.image_size_limit = limit;
        }
        if let Some(size) = self.image_size {
            bundle.image_size = Some(size);
        }
        if let Some(toc) = self.toc {
            bundle.toc = toc;
        }
        if let Some(lang) = &self.lang {
            bundle.lang = Some(lang.clone());
        }

        let api = &mut config.api;
        if let Some(version) = self.api_version {
            api.api_version = version;
        }
        if let Some(url) = &self.restbase_api {
            api.restbase_api = Some(url.clone());
        }
        if let Some(url) = &self.parsoid_api {
            api.parsoid_api = Some(url.clone());
        }
        if let Some(url) = &self.php_api {
            api.php_api = Some(url.clone());
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    if let Err(e) = handle_bundle(cli).await {
        tracing::error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("wiki_bundler=info,warn"),
            1 => EnvFilter::new("wiki_bundler=debug,info"),
            2 => EnvFilter::new("wiki_bundler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Logs status events as `[NN%] message: item`
fn log_status(event: &StatusEvent) {
    let item = match &event.item {
        Some(item) if !item.is_empty() => format!(": {}", item),
        _ => String::new(),
    };
    tracing::info!(
        "[{:.0}%] {}{}",
        event.fraction * 100.0,
        event.message,
        item
    );
}

/// Loads the configuration, builds the metabook and runs the bundler
async fn handle_bundle(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };
    cli.apply(&mut config);
    wiki_bundler::config::validate(&config)?;

    let output = config
        .bundle
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(if config.bundle.nozip { "bundle" } else { "bundle.zip" }));

    let api: Arc<dyn ContentApi> = Arc::new(HttpApi::new(&config)?);

    let metabook = match &cli.metabook {
        Some(path) => {
            tracing::info!("Reading metabook from: {}", path.display());
            let text = tokio::fs::read_to_string(path).await?;
            Metabook::from_json(&text)?
        }
        None => {
            tracing::info!("Building metabook for {} articles", cli.article.len());
            let matrix = SiteMatrixCache::new();
            from_articles(&cli.article, api.as_ref(), &matrix, &config).await?
        }
    };

    let sink: StatusSink = Arc::new(log_status);
    let bundler = Bundler::new(config, api).with_status(sink);

    let cancel = bundler.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, abandoning outstanding work");
            cancel.cancel();
        }
    });

    let summary = bundler.run(metabook, &output).await?;
    if !cli.quiet {
        print_summary(&summary);
    }
    Ok(())
}
