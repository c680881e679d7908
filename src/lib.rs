//! rednote - Xiaohongshu signed API client and crawl orchestrator
//!
//! Crawls notes, comments and creator profiles from Xiaohongshu through its
//! signed web API, using a live browser page as the signing oracle.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`sign`] - Request signature construction (`X-s`, `X-t`, `x-s-common`)
//! - [`browser`] - Browser page abstraction and the signing oracle
//! - [`crawler`] - Signed client, traversals and crawl orchestration
//! - [`models`] - Core data structures and types
//! - [`storage`] - Result stores (JSON files, in-memory)
//! - [`utils`] - Common utilities, retry and cancellation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rednote::config::Config;
//! use rednote::crawler::Crawler;
//! use rednote::storage::JsonStore;
//! use rednote::utils::cancel::CancelToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let page = rednote::browser::launch(&config.browser).await?;
//!     let store = Arc::new(JsonStore::open(&config.storage.output_dir, config.write_timeout()).await?);
//!     let crawler = Crawler::start(&config, page, store, CancelToken::never()).await?;
//!     let stats = crawler.run().await?;
//!     println!("{} notes saved", stats.notes_saved);
//!     Ok(())
//! }
//! ```

pub mod browser;
pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod sign;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::api::PlatformApi;
    pub use crate::crawler::Crawler;
    pub use crate::error::{Error, ErrorCategory, RednoteErrorTrait, Result};
    pub use crate::models::{Comment, CrawlStats, CrawlerType, Creator, LoginType, Note};
    pub use crate::storage::{JsonStore, MemoryStore, Store};
    pub use crate::utils::cancel::CancelToken;
}

// Direct re-exports for convenience
pub use models::{Comment, CrawlStats, Creator, Note};
