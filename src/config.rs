//! Configuration loading.
//! Reads `ald-crawler.toml` from the current directory, or the path in the
//! `ALD_CRAWLER_CONFIG` env var. Every field has a default, so a missing
//! default file simply yields the built-in configuration.

use crate::{error::ConfigError, page::ReadyStrategy, retry::RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_ENV: &str = "ALD_CRAWLER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "ald-crawler.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub page: PageConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_endpoint() -> String { "https://www.atomiclimits.com/alddatabase/api/processes.php".to_string() }
fn default_referer()      -> String { "https://www.atomiclimits.com/alddatabase/".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_user_agent()   -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            endpoint: default_api_endpoint(),
            referer: default_referer(),
            timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    #[serde(default = "default_page_url")]
    pub url: String,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "bool_true")]
    pub headless: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub ready_strategy: ReadyStrategy,
    #[serde(default = "default_table_selector")]
    pub table_selector: String,
    #[serde(default = "default_expected_title")]
    pub expected_title: String,
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_settle_timeout")]
    pub settle_timeout_secs: u64,
    /// Extra fixed pause after content readiness; zero disables it.
    #[serde(default)]
    pub settle_delay_ms: u64,
    #[serde(default = "bool_true")]
    pub capture_resources: bool,
}

fn default_page_url()       -> String { "https://www.atomiclimits.com/alddatabase/".to_string() }
fn default_webdriver_url()  -> String { "http://localhost:9515".to_string() }
fn default_table_selector() -> String { ".processList--table".to_string() }
fn default_expected_title() -> String { "Database of ALD processes".to_string() }
fn default_ready_timeout()  -> u64    { 30 }
fn default_poll_interval()  -> u64    { 500 }
fn default_settle_timeout() -> u64    { 15 }
fn bool_true()              -> bool   { true }

impl Default for PageConfig {
    fn default() -> Self {
        PageConfig {
            url: default_page_url(),
            webdriver_url: default_webdriver_url(),
            headless: true,
            user_agent: default_user_agent(),
            ready_strategy: ReadyStrategy::default(),
            table_selector: default_table_selector(),
            expected_title: default_expected_title(),
            ready_timeout_secs: default_ready_timeout(),
            poll_interval_ms: default_poll_interval(),
            settle_timeout_secs: default_settle_timeout(),
            settle_delay_ms: 0,
            capture_resources: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "bool_true")]
    pub excel: bool,
    #[serde(default = "bool_true")]
    pub statistics_sheet: bool,
    #[serde(default = "default_test_max_records")]
    pub test_max_records: usize,
}

fn default_data_dir()         -> PathBuf { PathBuf::from("data") }
fn default_test_max_records() -> usize   { 10 }

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            data_dir: default_data_dir(),
            excel: true,
            statistics_sheet: true,
            test_max_records: default_test_max_records(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_api_retry")]
    pub api: RetryPolicy,
    #[serde(default = "default_page_retry")]
    pub page: RetryPolicy,
}

fn default_api_retry()  -> RetryPolicy { RetryPolicy::new(3, 2000) }
fn default_page_retry() -> RetryPolicy { RetryPolicy::new(2, 2000) }

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            api: default_api_retry(),
            page: default_page_retry(),
        }
    }
}

impl Config {
    /// Load configuration, preferring `explicit`, then `ALD_CRAWLER_CONFIG`,
    /// then `ald-crawler.toml`. Only an explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(path) => (PathBuf::from(path), true),
                None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
            },
        };

        if !path.is_file() {
            if required {
                return Err(ConfigError::NotFound(path));
            }
            debug!("No {} found, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config =
            Config::from_toml(&content).map_err(|source| ConfigError::Parse { path, source })?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.output.test_max_records, 10);
        assert_eq!(config.page.table_selector, ".processList--table");
        assert_eq!(config.retry.api.attempts, 3);
        assert_eq!(config.retry.page.attempts, 2);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml(
            r#"
                [page]
                ready_strategy = "document"
                settle_delay_ms = 250

                [output]
                data_dir = "out"

                [retry.api]
                attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.page.ready_strategy, ReadyStrategy::DocumentComplete);
        assert_eq!(config.page.settle_delay_ms, 250);
        assert_eq!(config.page.ready_timeout_secs, 30);
        assert_eq!(config.output.data_dir, PathBuf::from("out"));
        assert!(config.output.excel);
        assert_eq!(config.retry.api, RetryPolicy::new(5, 2000));
        assert_eq!(config.retry.page, RetryPolicy::new(2, 2000));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn explicit_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ald.toml");
        std::fs::write(&path, "[api]\ntimeout_secs = 5\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.api.timeout_secs, 5);

        std::fs::write(&path, "[api\n").unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }
}
