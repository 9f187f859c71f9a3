use crate::{
    artifact::{write_json, DataLayout},
    error::{CrawlerError, PersistenceError},
    utils::{get_now, timestamp_slug},
    SourceReader,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{error, info, warn};

/// What a source looked like at one moment.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub url: String,
    pub title: String,
    pub markup: String,
    /// `html` for pages, `json` for API bodies.
    pub markup_extension: &'static str,
    pub screenshot: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub timestamp: String,
    pub url: String,
    pub title: String,
    pub page_source_length: usize,
    pub stage: String,
    pub reason: String,
}

/// Files written for one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugBundle {
    pub dir: PathBuf,
    pub markup: Option<PathBuf>,
    pub screenshot: Option<PathBuf>,
    pub info: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DiagnosticCapture {
    layout: DataLayout,
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    fs::write(path, bytes).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl DiagnosticCapture {
    pub fn new(layout: DataLayout) -> DiagnosticCapture {
        DiagnosticCapture { layout }
    }

    /// Snapshots `source` into the debug area. Never fails: problems while
    /// capturing are logged so the original error stays the one reported.
    pub async fn capture(
        &self,
        source: &mut dyn SourceReader,
        failure: &CrawlerError,
    ) -> Option<DebugBundle> {
        let snapshot = match source.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Cannot snapshot {} source: {}", source.name(), e);
                None
            }
        };
        match self.write_bundle(snapshot.as_ref(), failure, get_now()) {
            Ok(bundle) => {
                info!("Debug bundle saved to {}", bundle.dir.display());
                Some(bundle)
            }
            Err(e) => {
                error!("Cannot save debug bundle: {}", e);
                None
            }
        }
    }

    pub fn write_bundle(
        &self,
        snapshot: Option<&Snapshot>,
        failure: &CrawlerError,
        at: DateTime<FixedOffset>,
    ) -> Result<DebugBundle, PersistenceError> {
        let dir = self.layout.debug_dir();
        fs::create_dir_all(&dir).map_err(|source| PersistenceError::Io {
            path: dir.clone(),
            source,
        })?;
        let ts = timestamp_slug(&at);

        let mut markup = None;
        let mut screenshot = None;
        if let Some(snapshot) = snapshot {
            let path = dir.join(format!(
                "page_source_{}.{}",
                ts, snapshot.markup_extension
            ));
            write_bytes(&path, snapshot.markup.as_bytes())?;
            markup = Some(path);

            if let Some(png) = &snapshot.screenshot {
                let path = dir.join(format!("error_screenshot_{}.png", ts));
                write_bytes(&path, png)?;
                screenshot = Some(path);
            }
        }

        let info = DebugInfo {
            timestamp: at.to_rfc3339(),
            url: snapshot.map(|s| s.url.clone()).unwrap_or_default(),
            title: snapshot.map(|s| s.title.clone()).unwrap_or_default(),
            page_source_length: snapshot.map_or(0, |s| s.markup.len()),
            stage: failure.stage().to_string(),
            reason: failure.to_string(),
        };
        let info_path = dir.join(format!("debug_info_{}.json", ts));
        write_json(&info_path, &info)?;

        Ok(DebugBundle {
            dir,
            markup,
            screenshot,
            info: info_path,
        })
    }

    /// Keeps the page of a successful run under `resources/`.
    pub fn capture_resources(&self, snapshot: &Snapshot) -> Vec<PathBuf> {
        match self.write_resources(snapshot, get_now()) {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Cannot save page resources: {}", e);
                vec![]
            }
        }
    }

    fn write_resources(
        &self,
        snapshot: &Snapshot,
        at: DateTime<FixedOffset>,
    ) -> Result<Vec<PathBuf>, PersistenceError> {
        let dir = self.layout.resources_dir();
        fs::create_dir_all(&dir).map_err(|source| PersistenceError::Io {
            path: dir.clone(),
            source,
        })?;
        let ts = timestamp_slug(&at);

        let page = dir.join(format!("page_{}.{}", ts, snapshot.markup_extension));
        write_bytes(&page, snapshot.markup.as_bytes())?;
        let mut paths = vec![page];
        if let Some(png) = &snapshot.screenshot {
            let path = dir.join(format!("screenshot_{}.png", ts));
            write_bytes(&path, png)?;
            paths.push(path);
        }
        info!("Page resources saved to {}", dir.display());
        Ok(paths)
    }
}
