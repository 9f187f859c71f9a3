use super::ApiPayload;
use crate::{
    config::ApiConfig,
    diagnostic::Snapshot,
    error::{CrawlerError, FetchError},
    RawPayload, SourceReader,
};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER};
use std::time::Duration;
use tracing::{debug, info};

/// Structured strategy: one GET against the processes endpoint.
pub struct ApiSource {
    client: reqwest::Client,
    endpoint: String,
    referer: String,
    last_body: Option<String>,
}

impl ApiSource {
    pub fn new(config: &ApiConfig) -> Result<ApiSource, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(ApiSource {
            client,
            endpoint: config.endpoint.clone(),
            referer: config.referer.clone(),
            last_body: None,
        })
    }
}

pub(crate) fn decode_payload(body: &str) -> Result<ApiPayload, FetchError> {
    let payload: ApiPayload = serde_json::from_str(body).map_err(FetchError::Decode)?;
    if !payload.success {
        return Err(FetchError::Unsuccessful);
    }
    Ok(payload)
}

#[async_trait::async_trait]
impl SourceReader for ApiSource {
    fn name(&self) -> &'static str {
        "api"
    }

    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch(&mut self) -> Result<RawPayload, CrawlerError> {
        debug!("Visit {}", self.endpoint);
        let response = self
            .client
            .get(&self.endpoint)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(REFERER, self.referer.as_str())
            .send()
            .await
            .map_err(FetchError::from)?;

        let status = response.status();
        let body = response.text().await.map_err(FetchError::from)?;
        let decoded = if status.is_success() {
            decode_payload(&body)
        } else {
            Err(FetchError::Status {
                status: status.as_u16(),
            })
        };
        self.last_body = Some(body);

        let payload = decoded?;
        info!(
            "Received {} processes and {} references",
            payload.processes.len(),
            payload.references.len()
        );
        Ok(RawPayload::Api(payload))
    }

    async fn snapshot(&mut self) -> Result<Option<Snapshot>, CrawlerError> {
        Ok(self.last_body.as_ref().map(|body| Snapshot {
            url: self.endpoint.clone(),
            title: String::new(),
            markup: body.clone(),
            markup_extension: "json",
            screenshot: None,
        }))
    }
}
