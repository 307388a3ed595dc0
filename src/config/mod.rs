//! Configuration module for the bundler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use wiki_bundler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("bundler.toml")).unwrap();
//! println!("Compat mode: {}", config.bundle.compat);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, ApiVersion, Backoff, BundleConfig, Config, HttpConfig, LimitsConfig, TocSetting,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
