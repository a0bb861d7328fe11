//! Shared types, error model, and configuration for sitecrawler.
//!
//! This crate is the foundation depended on by the crawler engine and the
//! CLI. It provides:
//! - [`SitecrawlerError`] — the unified error type
//! - Domain types ([`Status`], [`LinkReport`], [`normalized_path`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlConfig, DefaultsConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{FailureReason, Result, SitecrawlerError};
pub use types::{LinkReport, Status, normalized_path};
