use super::Browser;
use crate::{config::PageConfig, error::FetchError};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Headroom over the page-load timeout before a driver call is abandoned.
const COMMAND_SLACK: Duration = Duration::from_secs(30);

/// Minimal W3C WebDriver client talking to a running driver such as
/// chromedriver.
pub struct WebDriver {
    client: reqwest::Client,
    server: String,
    capabilities: Value,
    session: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    value: Value,
}

impl WebDriver {
    pub fn new(config: &PageConfig) -> Result<WebDriver, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(command_timeout(config))
            .build()?;
        Ok(WebDriver {
            client,
            server: config.webdriver_url.trim_end_matches('/').to_string(),
            capabilities: chrome_capabilities(config),
            session: None,
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_deref()
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, FetchError> {
        let url = format!("{}/{}", self.server, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let reply: Reply = response.json().await?;

        if !status.is_success() {
            let field = |name: &str| {
                reply
                    .value
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            return Err(FetchError::WebDriver {
                error: field("error"),
                message: field("message"),
            });
        }
        Ok(reply.value)
    }

    fn session_path(&self, suffix: &str) -> Result<String, FetchError> {
        match &self.session {
            Some(id) if suffix.is_empty() => Ok(format!("session/{}", id)),
            Some(id) => Ok(format!("session/{}/{}", id, suffix)),
            None => Err(FetchError::WebDriver {
                error: "invalid session id".to_string(),
                message: "browser session was not started".to_string(),
            }),
        }
    }

    async fn get_string(&self, suffix: &str) -> Result<String, FetchError> {
        let path = self.session_path(suffix)?;
        let value = self.command(Method::GET, &path, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

/// Navigation may legitimately block for the whole page-load timeout, so
/// every command gets that plus some slack.
fn command_timeout(config: &PageConfig) -> Duration {
    Duration::from_secs(config.ready_timeout_secs) + COMMAND_SLACK
}

fn chrome_capabilities(config: &PageConfig) -> Value {
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--window-size=1920,1080".to_string(),
        format!("--user-agent={}", config.user_agent),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    let timeout_ms = config.ready_timeout_secs * 1000;

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args },
                "timeouts": { "pageLoad": timeout_ms, "script": timeout_ms }
            }
        }
    })
}

#[async_trait::async_trait]
impl Browser for WebDriver {
    async fn start(&mut self) -> Result<(), FetchError> {
        if self.session.is_some() {
            return Ok(());
        }
        let value = self
            .command(Method::POST, "session", Some(self.capabilities.clone()))
            .await?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::WebDriver {
                error: "session not created".to_string(),
                message: "reply carried no sessionId".to_string(),
            })?;
        info!("Browser session {} started", id);
        self.session = Some(id.to_string());
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<(), FetchError> {
        let path = self.session_path("url")?;
        debug!("Visit {}", url);
        self.command(Method::POST, &path, Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn execute(&mut self, script: &str, args: Vec<Value>) -> Result<Value, FetchError> {
        let path = self.session_path("execute/sync")?;
        self.command(
            Method::POST,
            &path,
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn title(&mut self) -> Result<String, FetchError> {
        self.get_string("title").await
    }

    async fn current_url(&mut self) -> Result<String, FetchError> {
        self.get_string("url").await
    }

    async fn page_source(&mut self) -> Result<String, FetchError> {
        self.get_string("source").await
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, FetchError> {
        let encoded = self.get_string("screenshot").await?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| FetchError::WebDriver {
                error: "invalid screenshot".to_string(),
                message: e.to_string(),
            })
    }

    async fn quit(&mut self) -> Result<(), FetchError> {
        if self.session.is_none() {
            return Ok(());
        }
        let path = self.session_path("")?;
        // Forget the session even if the driver already dropped it.
        let result = self.command(Method::DELETE, &path, None).await;
        if let Some(id) = self.session.take() {
            info!("Browser session {} closed", id);
        }
        result.map(|_| ())
    }
}
