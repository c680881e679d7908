//! Tests for config loading from files

use rednote::config::Config;
use rednote::models::{CrawlerType, LoginType, SearchSortType};
use std::io::Write;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
[crawler]
crawler_type = "search"
keywords = ["咖啡", "旅行"]
sort_type = "popularity_descending"
max_notes = 40

[browser]
login_type = "cookie"
cookies = "a1=x; web_session=y"
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.crawler_type().unwrap(), CrawlerType::Search);
    assert_eq!(config.login_type().unwrap(), LoginType::Cookie);
    assert_eq!(config.sort_type().unwrap(), SearchSortType::MostLiked);
    assert_eq!(config.crawler.keywords.len(), 2);
    assert_eq!(config.budget().max_notes, 40);
    assert_eq!(config.crawler.max_retries, Config::default().crawler.max_retries);
}

#[test]
fn test_detail_mode_requires_urls() {
    let file = write_config(
        r#"
[crawler]
crawler_type = "detail"
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_unknown_mode_rejected() {
    let file = write_config(
        r#"
[crawler]
crawler_type = "homefeed"
keywords = ["x"]
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_malformed_file_is_error() {
    let file = write_config("[crawler\nkeywords = ");
    assert!(Config::from_file(file.path()).is_err());
}
