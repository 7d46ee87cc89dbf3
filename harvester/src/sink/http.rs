use super::RecordSink;
use crate::model::SinkRecord;
use async_trait::async_trait;
use harvester_core::backoff::{retry_with_backoff, RetryPolicy};
use harvester_core::config::SinkConfig;
use harvester_core::{Error, Result};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

/// Record sink backed by the storage service's REST API.
pub struct HttpSink {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl HttpSink {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        // Trailing slash so joined paths extend the base instead of replacing its last segment
        let base = if config.base_url.ends_with('/') {
            config.base_url.clone()
        } else {
            format!("{}/", config.base_url)
        };
        let base_url = Url::parse(&base)
            .map_err(|e| Error::Config(format!("sink.base_url '{}': {}", config.base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            retry: RetryPolicy::new(config.max_retries, config.retry_base_delay_ms),
        })
    }

    fn records_url(&self) -> Result<Url> {
        self.base_url
            .join("records")
            .map_err(|e| Error::Internal(e.to_string()))
    }

    fn record_url(&self, sink_id: &str) -> Result<Url> {
        let mut url = self.records_url()?;
        url.path_segments_mut()
            .map_err(|_| Error::Internal(format!("cannot extend sink url {}", self.base_url)))?
            .push(sink_id);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<()> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Sink(format!("{} failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Sink(format!("{} returned HTTP {}: {}", what, status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordSink for HttpSink {
    async fn upsert(&self, record: &SinkRecord) -> Result<()> {
        let url = self.records_url()?;
        let what = format!("upsert of {}", record.id);
        debug!(id = %record.id, origin = %record.origin, "Sending record to sink");

        retry_with_backoff(
            || self.send(self.client.post(url.clone()).json(record), &what),
            self.retry,
            "sink_upsert",
        )
        .await
    }

    async fn mark_deleted(&self, sink_id: &str) -> Result<()> {
        let url = self.record_url(sink_id)?;
        let what = format!("delete of {}", sink_id);
        debug!(id = %sink_id, "Marking record deleted in sink");

        retry_with_backoff(
            || self.send(self.client.delete(url.clone()), &what),
            self.retry,
            "sink_delete",
        )
        .await
    }
}
