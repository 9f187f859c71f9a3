use std::{fmt, path::PathBuf, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CrawlerError {
    pub fn stage(&self) -> Stage {
        match self {
            CrawlerError::Fetch(_) => Stage::Acquisition,
            CrawlerError::Extraction(_) => Stage::Extraction,
            CrawlerError::Persistence(_) => Stage::Persistence,
            CrawlerError::Config(_) => Stage::Configuration,
        }
    }

    /// Only failures a fresh attempt can plausibly cure.
    pub fn is_transient(&self) -> bool {
        match self {
            CrawlerError::Fetch(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status}")]
    Status { status: u16 },
    #[error("cannot decode payload")]
    Decode(#[source] serde_json::Error),
    #[error("payload reported failure")]
    Unsuccessful,
    #[error("timed out after {waited:?} waiting for {condition}")]
    Timeout {
        condition: &'static str,
        waited: Duration,
    },
    #[error("expected element `{selector}` not found")]
    MissingElement { selector: String },
    #[error("page rendered its JavaScript-required placeholder")]
    JavascriptRequired,
    #[error("webdriver error `{error}`: {message}")]
    WebDriver { error: String, message: String },
    #[error("cannot read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Timeout { .. } => true,
            FetchError::Status { status } => *status == 429 || *status >= 500,
            FetchError::WebDriver { error, .. } => error == "timeout",
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction produced no rows")]
    NoRows,
    #[error("malformed row projection")]
    Malformed(#[source] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("cannot write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot build workbook {path}: {message}")]
    Workbook { path: PathBuf, message: String },
    #[error("cannot read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} holds no process records")]
    NotProcessData { path: PathBuf },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("cannot read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid table selector `{0}`")]
    InvalidSelector(String),
    #[error("the snapshot source needs a saved page file")]
    MissingSnapshotFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquisition,
    Extraction,
    Persistence,
    Configuration,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Acquisition => "acquisition",
            Stage::Extraction => "extraction",
            Stage::Persistence => "persistence",
            Stage::Configuration => "configuration",
        };
        f.write_str(name)
    }
}
