use super::parse::parse_list_records;
use super::repair::repair_namespaces;
use super::RecordSource;
use crate::interval::Interval;
use crate::model::HarvestBatch;
use async_trait::async_trait;
use harvester_core::config::HttpConfig;
use harvester_core::telemetry::{BATCHES_FETCHED, FETCH_DURATION_MS};
use harvester_core::{Error, Result, Target};
use metrics::{counter, histogram};
use reqwest::Url;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Where the client is in a `ListRecords` pagination chain.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PageState {
    Fresh,
    Paging(String),
    Exhausted,
}

/// OAI-PMH `ListRecords` client for a single harvest. Not shared between jobs.
pub struct OaiClient {
    client: reqwest::Client,
    target: Target,
    interval: Interval,
    state: PageState,
    total_hint: Option<u64>,
}

impl OaiClient {
    pub fn new(target: Target, interval: Interval, http: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
            .read_timeout(Duration::from_secs(http.read_timeout_secs))
            .user_agent(http.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            target,
            interval,
            state: PageState::Fresh,
            total_hint: None,
        })
    }

    /// Request URL for the current state. Selector parameters are only sent on
    /// the first page; later pages carry nothing but the resumption token.
    pub fn request_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.target.base_url).map_err(|e| {
            Error::Config(format!(
                "target '{}' has invalid base_url '{}': {}",
                self.target.name, self.target.base_url, e
            ))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("verb", "ListRecords");
            match &self.state {
                PageState::Fresh => {
                    if let Some(prefix) = &self.target.metadata_prefix {
                        query.append_pair("metadataPrefix", prefix);
                    }
                    if let Some(set) = &self.target.set {
                        query.append_pair("set", set);
                    }
                    query.append_pair("from", self.interval.from());
                    if let Some(until) = self.interval.until() {
                        query.append_pair("until", until);
                    }
                }
                PageState::Paging(token) => {
                    query.append_pair("resumptionToken", token);
                }
                PageState::Exhausted => {
                    return Err(Error::Internal(format!(
                        "pagination of '{}' is already exhausted",
                        self.target.name
                    )));
                }
            }
        }

        Ok(url)
    }

    async fn fetch_body(&self, url: &Url) -> Result<String> {
        let mut request = self.client.get(url.clone());
        if let Some((user, password)) = self.target.credentials() {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await.map_err(|e| Error::HarvestFetch {
            url: url.to_string(),
            details: describe_reqwest_error(&e),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HarvestFetch {
                url: url.to_string(),
                details: format!("HTTP {}", status),
            });
        }

        response.text().await.map_err(|e| Error::HarvestFetch {
            url: url.to_string(),
            details: format!("failed to read body: {}", describe_reqwest_error(&e)),
        })
    }
}

#[async_trait]
impl RecordSource for OaiClient {
    #[instrument(skip(self), fields(target = %self.target.name))]
    async fn next_batch(&mut self) -> Result<HarvestBatch> {
        let url = self.request_url()?;
        let start = Instant::now();

        debug!(url = %url, "Fetching OAI-PMH page");
        let body = self.fetch_body(&url).await?;

        let repaired = repair_namespaces(&body);
        let page = parse_list_records(&repaired).map_err(|e| Error::HarvestFetch {
            url: url.to_string(),
            details: format!("unparsable XML: {}", e),
        })?;

        if let Some(error) = &page.error {
            if !error.is_no_records_match() {
                return Err(Error::HarvestFetch {
                    url: url.to_string(),
                    details: format!("OAI-PMH error {}: {}", error.code, error.message),
                });
            }
            debug!(url = %url, "Source reports no matching records");
        }

        if page.complete_list_size.is_some() {
            self.total_hint = page.complete_list_size;
        }

        self.state = match &page.resumption_token {
            Some(token) => PageState::Paging(token.clone()),
            None => PageState::Exhausted,
        };

        histogram!(FETCH_DURATION_MS).record(start.elapsed().as_millis() as f64);
        counter!(BATCHES_FETCHED, "target" => self.target.name.clone()).increment(1);

        debug!(
            records = page.records.len(),
            has_more = page.resumption_token.is_some(),
            total_hint = ?self.total_hint,
            "Fetched OAI-PMH page"
        );

        Ok(HarvestBatch {
            records: page.records,
            continuation_token: page.resumption_token,
            total_hint: self.total_hint,
        })
    }

    fn is_exhausted(&self) -> bool {
        self.state == PageState::Exhausted
    }

    fn source_id(&self) -> &str {
        &self.target.name
    }
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}
