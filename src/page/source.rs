use super::{decode_rows, script, ReadyStrategy, JAVASCRIPT_PLACEHOLDER};
use crate::{
    browser::Browser,
    config::PageConfig,
    diagnostic::Snapshot,
    error::{CrawlerError, FetchError},
    RawPayload, SourceReader,
};
use serde_json::{json, Value};
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

/// Rendered strategy: drives a browser to the page and evaluates the row
/// projection against the live document.
pub struct RenderedSource<B> {
    browser: B,
    config: PageConfig,
}

impl<B: Browser> RenderedSource<B> {
    pub fn new(browser: B, config: PageConfig) -> RenderedSource<B> {
        RenderedSource { browser, config }
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }
}

/// Re-runs `script` until `accept` holds or `timeout` has passed.
async fn poll<B: Browser>(
    browser: &mut B,
    condition: &'static str,
    script: &str,
    args: Vec<Value>,
    timeout: Duration,
    interval: Duration,
    accept: fn(&Value) -> bool,
) -> Result<(), FetchError> {
    let started = Instant::now();
    loop {
        let value = browser.execute(script, args.clone()).await?;
        if accept(&value) {
            debug!("{} ready after {:?}", condition, started.elapsed());
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(FetchError::Timeout {
                condition,
                waited: started.elapsed(),
            });
        }
        sleep(interval).await;
    }
}

/// Waits until the table holds rows and the count stopped changing between
/// two polls. Gives up quietly at `timeout` and lets extraction judge.
async fn wait_for_content<B: Browser>(
    browser: &mut B,
    selector: &Value,
    timeout: Duration,
    interval: Duration,
) -> Result<u64, FetchError> {
    let started = Instant::now();
    let mut previous = None;
    loop {
        let count = browser
            .execute(script::ROW_COUNT, vec![selector.clone()])
            .await?
            .as_u64()
            .unwrap_or(0);
        if count > 0 && previous == Some(count) {
            return Ok(count);
        }
        if started.elapsed() >= timeout {
            warn!(
                "Table not settled after {:?} ({} rows), extracting anyway",
                started.elapsed(),
                count
            );
            return Ok(count);
        }
        previous = Some(count);
        sleep(interval).await;
    }
}

async fn placeholder_shown<B: Browser>(browser: &mut B) -> Result<bool, FetchError> {
    let body = browser.execute(script::BODY_TEXT, vec![]).await?;
    Ok(body
        .as_str()
        .map_or(false, |text| text.contains(JAVASCRIPT_PLACEHOLDER)))
}

#[async_trait::async_trait]
impl<B: Browser> SourceReader for RenderedSource<B> {
    fn name(&self) -> &'static str {
        "page"
    }

    async fn open(&mut self) -> Result<(), CrawlerError> {
        Ok(self.browser.start().await?)
    }

    #[tracing::instrument(skip(self), fields(url = %self.config.url))]
    async fn fetch(&mut self) -> Result<RawPayload, CrawlerError> {
        let config = &self.config;
        let browser = &mut self.browser;
        let selector = json!(config.table_selector);
        let interval = Duration::from_millis(config.poll_interval_ms);
        let ready_timeout = Duration::from_secs(config.ready_timeout_secs);

        info!("Visit {}", config.url);
        browser.goto(&config.url).await?;

        let ready = match config.ready_strategy {
            ReadyStrategy::Table => {
                poll(
                    browser,
                    "process table",
                    script::HAS_ELEMENT,
                    vec![selector.clone()],
                    ready_timeout,
                    interval,
                    |v| v.as_bool() == Some(true),
                )
                .await
            }
            ReadyStrategy::DocumentComplete => {
                poll(
                    browser,
                    "document ready state",
                    script::READY_STATE,
                    vec![],
                    ready_timeout,
                    interval,
                    |v| v.as_str() == Some("complete"),
                )
                .await
            }
        };
        // A placeholder page explains a timeout better than the timeout does.
        // Any other failure is reported as is.
        if matches!(ready, Ok(()) | Err(FetchError::Timeout { .. }))
            && placeholder_shown(browser).await?
        {
            return Err(FetchError::JavascriptRequired.into());
        }
        ready?;

        let title = browser.title().await?;
        if !title.contains(&config.expected_title) {
            warn!("Unexpected page title {:?}", title);
        }
        if config.settle_delay_ms > 0 {
            sleep(Duration::from_millis(config.settle_delay_ms)).await;
        }

        // A complete document may still be rendering the table.
        if matches!(config.ready_strategy, ReadyStrategy::DocumentComplete) {
            poll(
                browser,
                "process table",
                script::HAS_ELEMENT,
                vec![selector.clone()],
                ready_timeout,
                interval,
                |v| v.as_bool() == Some(true),
            )
            .await
            .map_err(|e| match e {
                FetchError::Timeout { .. } => FetchError::MissingElement {
                    selector: config.table_selector.clone(),
                },
                e => e,
            })?;
        }

        let settled = wait_for_content(
            browser,
            &selector,
            Duration::from_secs(config.settle_timeout_secs),
            interval,
        )
        .await?;
        debug!("Table holds {} rows", settled);

        let value = browser.execute(script::EXTRACT_ROWS, vec![selector]).await?;
        let rows = decode_rows(value)?;
        info!("Extracted {} raw rows", rows.len());
        Ok(RawPayload::Rendered(rows))
    }

    async fn snapshot(&mut self) -> Result<Option<Snapshot>, CrawlerError> {
        let markup = self.browser.page_source().await?;
        let url = self.browser.current_url().await?;
        let title = self.browser.title().await?;
        let screenshot = match self.browser.screenshot().await {
            Ok(png) => Some(png),
            Err(e) => {
                warn!("Screenshot failed: {}", e);
                None
            }
        };
        Ok(Some(Snapshot {
            url,
            title,
            markup,
            markup_extension: "html",
            screenshot,
        }))
    }

    async fn close(&mut self) -> Result<(), CrawlerError> {
        Ok(self.browser.quit().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    /// Scripted stand-in for a browser session.
    #[derive(Debug, Default)]
    pub(crate) struct FakeBrowser {
        pub table_after_polls: Option<usize>,
        pub ready_state: String,
        pub body_text: String,
        pub row_counts: VecDeque<u64>,
        pub rows: Value,
        pub title: String,
        pub started: bool,
        pub quit: bool,
        pub polls: usize,
        pub visited: Vec<String>,
        /// Scripts that fail, with the WebDriver error code they fail with.
        pub script_errors: Vec<(&'static str, &'static str)>,
    }

    impl FakeBrowser {
        pub(crate) fn serving(rows: Value) -> FakeBrowser {
            FakeBrowser {
                table_after_polls: Some(0),
                ready_state: "complete".to_string(),
                row_counts: VecDeque::from(vec![3, 3]),
                rows,
                title: "Database of ALD processes".to_string(),
                ..FakeBrowser::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl Browser for FakeBrowser {
        async fn start(&mut self) -> Result<(), FetchError> {
            self.started = true;
            Ok(())
        }

        async fn goto(&mut self, url: &str) -> Result<(), FetchError> {
            self.visited.push(url.to_string());
            Ok(())
        }

        async fn execute(&mut self, source: &str, _args: Vec<Value>) -> Result<Value, FetchError> {
            if let Some((_, code)) = self.script_errors.iter().find(|(s, _)| *s == source) {
                return Err(FetchError::WebDriver {
                    error: code.to_string(),
                    message: String::new(),
                });
            }
            Ok(match source {
                script::HAS_ELEMENT => {
                    self.polls += 1;
                    json!(self.table_after_polls.map_or(false, |n| self.polls > n))
                }
                script::READY_STATE => json!(self.ready_state),
                script::BODY_TEXT => json!(self.body_text),
                script::ROW_COUNT => json!(self.row_counts.pop_front().unwrap_or(3)),
                script::EXTRACT_ROWS => self.rows.clone(),
                _ => Value::Null,
            })
        }

        async fn title(&mut self) -> Result<String, FetchError> {
            Ok(self.title.clone())
        }

        async fn current_url(&mut self) -> Result<String, FetchError> {
            Ok(self.visited.last().cloned().unwrap_or_default())
        }

        async fn page_source(&mut self) -> Result<String, FetchError> {
            Ok(format!("<html><body>{}</body></html>", self.body_text))
        }

        async fn screenshot(&mut self) -> Result<Vec<u8>, FetchError> {
            Ok(vec![0x89, b'P', b'N', b'G'])
        }

        async fn quit(&mut self) -> Result<(), FetchError> {
            self.quit = true;
            Ok(())
        }
    }

    pub(crate) fn fast_config() -> PageConfig {
        PageConfig {
            url: "https://ald.test/".to_string(),
            ready_timeout_secs: 1,
            settle_timeout_secs: 1,
            poll_interval_ms: 1,
            ..PageConfig::default()
        }
    }

    fn two_rows() -> Value {
        json!([
            {"material": "Al2O3", "reactantA": "TMA", "reactantB": "H2O",
             "reactantC": "", "furtherReactants": "", "references": []},
            {"material": "ZnO", "reactantA": "DEZ", "reactantB": "H2O",
             "reactantC": "", "furtherReactants": "", "references": []}
        ])
    }

    #[tokio::test]
    async fn extracts_rows_once_table_appears() {
        let mut browser = FakeBrowser::serving(two_rows());
        browser.table_after_polls = Some(2);
        browser.row_counts = VecDeque::from(vec![0, 2, 3, 3]);
        let mut source = RenderedSource::new(browser, fast_config());

        source.open().await.unwrap();
        let RawPayload::Rendered(rows) = source.fetch().await.unwrap() else {
            unreachable!()
        };
        source.close().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].material, "ZnO");
        assert!(source.browser().started);
        assert!(source.browser().quit);
        assert_eq!(source.browser().visited, vec!["https://ald.test/".to_string()]);
        assert!(source.browser().row_counts.is_empty());
    }

    #[tokio::test]
    async fn placeholder_page_fails_fast() {
        let mut browser = FakeBrowser::serving(two_rows());
        browser.table_after_polls = None;
        browser.body_text = format!("{} to run this app.", JAVASCRIPT_PLACEHOLDER);
        let config = PageConfig {
            ready_timeout_secs: 0,
            ..fast_config()
        };
        let mut source = RenderedSource::new(browser, config);

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(
            err,
            CrawlerError::Fetch(FetchError::JavascriptRequired)
        ));
    }

    #[tokio::test]
    async fn table_wait_times_out() {
        let mut browser = FakeBrowser::serving(two_rows());
        browser.table_after_polls = None;
        let config = PageConfig {
            ready_timeout_secs: 0,
            ..fast_config()
        };
        let mut source = RenderedSource::new(browser, config);

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(
            err,
            CrawlerError::Fetch(FetchError::Timeout {
                condition: "process table",
                ..
            })
        ));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn document_strategy_reports_missing_table() {
        let mut browser = FakeBrowser::serving(two_rows());
        browser.table_after_polls = None;
        let config = PageConfig {
            ready_strategy: ReadyStrategy::DocumentComplete,
            ready_timeout_secs: 0,
            ..fast_config()
        };
        let mut source = RenderedSource::new(browser, config);

        let err = source.fetch().await.unwrap_err();
        let CrawlerError::Fetch(FetchError::MissingElement { selector }) = err else {
            unreachable!()
        };
        assert_eq!(selector, ".processList--table");
    }

    #[tokio::test]
    async fn document_strategy_waits_for_late_table() {
        let mut browser = FakeBrowser::serving(two_rows());
        browser.table_after_polls = Some(1);
        let config = PageConfig {
            ready_strategy: ReadyStrategy::DocumentComplete,
            settle_delay_ms: 5,
            ..fast_config()
        };
        let mut source = RenderedSource::new(browser, config);

        let RawPayload::Rendered(rows) = source.fetch().await.unwrap() else {
            unreachable!()
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(source.browser().polls, 2);
    }

    #[tokio::test]
    async fn ready_failure_is_not_masked_by_placeholder_check() {
        let mut browser = FakeBrowser::serving(two_rows());
        browser.script_errors = vec![
            (script::HAS_ELEMENT, "javascript error"),
            (script::BODY_TEXT, "no such window"),
        ];
        let mut source = RenderedSource::new(browser, fast_config());

        let err = source.fetch().await.unwrap_err();
        let CrawlerError::Fetch(FetchError::WebDriver { error, .. }) = err else {
            unreachable!()
        };
        assert_eq!(error, "javascript error");
    }

    #[tokio::test]
    async fn content_wait_ignores_empty_table() {
        let mut browser = FakeBrowser::serving(two_rows());
        browser.row_counts = VecDeque::from(vec![0, 0, 0, 5, 5]);

        let settled = wait_for_content(
            &mut browser,
            &json!(".processList--table"),
            Duration::from_secs(1),
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert_eq!(settled, 5);
        assert!(browser.row_counts.is_empty());
    }

    #[tokio::test]
    async fn zero_rows_is_an_extraction_failure() {
        let browser = FakeBrowser::serving(json!([]));
        let mut source = RenderedSource::new(browser, fast_config());

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(
            err,
            CrawlerError::Extraction(ExtractionError::NoRows)
        ));
    }

    #[tokio::test]
    async fn snapshot_carries_markup_and_screenshot() {
        let mut browser = FakeBrowser::serving(two_rows());
        browser.body_text = "hello".to_string();
        let mut source = RenderedSource::new(browser, fast_config());
        source.fetch().await.unwrap();

        let snapshot = source.snapshot().await.unwrap().unwrap();
        assert_eq!(snapshot.url, "https://ald.test/");
        assert_eq!(snapshot.title, "Database of ALD processes");
        assert!(snapshot.markup.contains("hello"));
        assert_eq!(snapshot.markup_extension, "html");
        assert_eq!(snapshot.screenshot.unwrap().len(), 4);
    }
}
