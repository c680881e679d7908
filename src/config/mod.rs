//! Configuration management for the rednote crawler
//!
//! This module handles loading and validating configuration from environment
//! variables, TOML files and command-line overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::models::{CrawlBudget, CrawlerType, LoginType, SearchNoteType, SearchSortType};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Crawl behaviour
    pub crawler: CrawlerConfig,

    /// Browser and login
    pub browser: BrowserConfig,

    /// Output
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Crawler-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// `search`, `detail` or `creator`
    pub crawler_type: String,

    /// Keywords for search mode
    pub keywords: Vec<String>,

    /// Note URLs for detail mode
    pub note_urls: Vec<String>,

    /// Profile URLs for creator mode
    pub creator_urls: Vec<String>,

    /// Search ordering (`general`, `time_descending`, ...)
    pub sort_type: String,

    /// Search media filter (`all`, `video`, `image`)
    pub note_type: String,

    /// First search page actually fetched
    pub start_page: u32,

    /// Notes per keyword or creator
    pub max_notes: usize,

    /// Comments per note, replies included
    pub max_comments_per_note: usize,

    pub enable_comments: bool,

    pub enable_sub_comments: bool,

    /// Simultaneous comment walks
    pub max_concurrency: usize,

    /// Lower bound of the pause between pages, notes and keywords
    pub min_sleep_ms: u64,

    /// Upper bound of the pause between pages, notes and keywords
    pub max_sleep_ms: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Retries for transport failures
    pub max_retries: u32,

    /// Rate limit (requests per second)
    pub rate_limit: u32,
}

/// Browser and login configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,

    /// `cookie` or `qrcode`
    pub login_type: String,

    /// Cookie string for cookie login
    pub cookies: String,

    /// How long to wait for a QR scan
    pub qr_timeout_secs: u64,

    /// Chrome binary; autodetected when unset
    pub chrome_executable: Option<PathBuf>,

    /// Fixed user agent; a random one from the pool when unset
    pub user_agent: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the JSON output tree
    pub output_dir: PathBuf,

    /// Upper bound on a single file write
    pub write_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            crawler_type: String::from("search"),
            keywords: Vec::new(),
            note_urls: Vec::new(),
            creator_urls: Vec::new(),
            sort_type: String::from("general"),
            note_type: String::from("all"),
            start_page: 1,
            max_notes: 50,
            max_comments_per_note: 50,
            enable_comments: true,
            enable_sub_comments: true,
            max_concurrency: 1,
            min_sleep_ms: 1_000,
            max_sleep_ms: 2_000,
            request_timeout_secs: 10,
            max_retries: 3,
            rate_limit: 2,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            login_type: String::from("qrcode"),
            cookies: String::new(),
            qr_timeout_secs: 120,
            chrome_executable: None,
            user_agent: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/rednote"),
            write_timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Split a comma separated list, dropping empty items
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let crawler = &defaults.crawler;
        let browser = &defaults.browser;

        Ok(Self {
            crawler: CrawlerConfig {
                crawler_type: std::env::var("REDNOTE_CRAWLER_TYPE")
                    .unwrap_or_else(|_| crawler.crawler_type.clone()),
                keywords: std::env::var("REDNOTE_KEYWORDS")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
                note_urls: std::env::var("REDNOTE_NOTE_URLS")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
                creator_urls: std::env::var("REDNOTE_CREATOR_URLS")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
                sort_type: std::env::var("REDNOTE_SORT_TYPE")
                    .unwrap_or_else(|_| crawler.sort_type.clone()),
                note_type: std::env::var("REDNOTE_NOTE_TYPE")
                    .unwrap_or_else(|_| crawler.note_type.clone()),
                start_page: env_parse("REDNOTE_START_PAGE").unwrap_or(crawler.start_page),
                max_notes: env_parse("REDNOTE_MAX_NOTES").unwrap_or(crawler.max_notes),
                max_comments_per_note: env_parse("REDNOTE_MAX_COMMENTS")
                    .unwrap_or(crawler.max_comments_per_note),
                enable_comments: env_parse("REDNOTE_ENABLE_COMMENTS")
                    .unwrap_or(crawler.enable_comments),
                enable_sub_comments: env_parse("REDNOTE_ENABLE_SUB_COMMENTS")
                    .unwrap_or(crawler.enable_sub_comments),
                max_concurrency: env_parse("REDNOTE_MAX_CONCURRENCY")
                    .unwrap_or(crawler.max_concurrency),
                min_sleep_ms: env_parse("REDNOTE_MIN_SLEEP_MS").unwrap_or(crawler.min_sleep_ms),
                max_sleep_ms: env_parse("REDNOTE_MAX_SLEEP_MS").unwrap_or(crawler.max_sleep_ms),
                request_timeout_secs: env_parse("REDNOTE_REQUEST_TIMEOUT")
                    .unwrap_or(crawler.request_timeout_secs),
                max_retries: env_parse("REDNOTE_MAX_RETRIES").unwrap_or(crawler.max_retries),
                rate_limit: env_parse("REDNOTE_RATE_LIMIT").unwrap_or(crawler.rate_limit),
            },
            browser: BrowserConfig {
                headless: env_parse("REDNOTE_HEADLESS").unwrap_or(browser.headless),
                login_type: std::env::var("REDNOTE_LOGIN_TYPE")
                    .unwrap_or_else(|_| browser.login_type.clone()),
                cookies: std::env::var("REDNOTE_COOKIES").unwrap_or_default(),
                qr_timeout_secs: env_parse("REDNOTE_QR_TIMEOUT").unwrap_or(browser.qr_timeout_secs),
                chrome_executable: std::env::var("REDNOTE_CHROME").ok().map(PathBuf::from),
                user_agent: std::env::var("REDNOTE_USER_AGENT").ok(),
            },
            storage: StorageConfig {
                output_dir: std::env::var("REDNOTE_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.output_dir.clone()),
                write_timeout_secs: env_parse("REDNOTE_WRITE_TIMEOUT")
                    .unwrap_or(defaults.storage.write_timeout_secs),
            },
            logging: LoggingConfig {
                level: std::env::var("REDNOTE_LOG_LEVEL")
                    .unwrap_or_else(|_| defaults.logging.level.clone()),
                format: std::env::var("REDNOTE_LOG_FORMAT")
                    .unwrap_or_else(|_| defaults.logging.format.clone()),
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let crawler_type = self.crawler_type()?;
        self.login_type()?;
        self.sort_type()?;
        self.note_type()?;

        if self.crawler.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be greater than 0");
        }

        if self.crawler.rate_limit == 0 {
            anyhow::bail!("rate_limit must be greater than 0");
        }

        if self.crawler.min_sleep_ms > self.crawler.max_sleep_ms {
            anyhow::bail!(
                "min_sleep_ms ({}) must not exceed max_sleep_ms ({})",
                self.crawler.min_sleep_ms,
                self.crawler.max_sleep_ms
            );
        }

        if self.crawler.start_page == 0 {
            anyhow::bail!("start_page is 1-based");
        }

        match crawler_type {
            CrawlerType::Search if self.crawler.keywords.is_empty() => {
                anyhow::bail!("search mode needs at least one keyword")
            }
            CrawlerType::Detail if self.crawler.note_urls.is_empty() => {
                anyhow::bail!("detail mode needs at least one note URL")
            }
            CrawlerType::Creator if self.crawler.creator_urls.is_empty() => {
                anyhow::bail!("creator mode needs at least one creator URL")
            }
            _ => {}
        }

        Ok(())
    }

    pub fn crawler_type(&self) -> Result<CrawlerType> {
        self.crawler
            .crawler_type
            .parse()
            .map_err(|t| anyhow::anyhow!("unsupported crawler type: {t}"))
    }

    pub fn login_type(&self) -> Result<LoginType> {
        self.browser
            .login_type
            .parse()
            .map_err(|t| anyhow::anyhow!("unsupported login type: {t}"))
    }

    pub fn sort_type(&self) -> Result<SearchSortType> {
        self.crawler
            .sort_type
            .parse()
            .map_err(|t| anyhow::anyhow!("unsupported sort type: {t}"))
    }

    pub fn note_type(&self) -> Result<SearchNoteType> {
        self.crawler
            .note_type
            .parse()
            .map_err(|t| anyhow::anyhow!("unsupported note type: {t}"))
    }

    /// Ceilings for the crawl
    #[must_use]
    pub fn budget(&self) -> CrawlBudget {
        CrawlBudget {
            max_notes: self.crawler.max_notes,
            max_comments_per_note: self.crawler.max_comments_per_note,
            max_concurrency: self.crawler.max_concurrency.max(1),
            min_sleep: Duration::from_millis(self.crawler.min_sleep_ms),
            max_sleep: Duration::from_millis(self.crawler.max_sleep_ms),
        }
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.request_timeout_secs)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.write_timeout_secs)
    }

    #[must_use]
    pub fn qr_timeout(&self) -> Duration {
        Duration::from_secs(self.browser.qr_timeout_secs)
    }
}
