use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::contacts::{self, ContactsError};
use crate::failover::{self, FailoverAggregator, PinnedEndpoint};
use crate::gateway::{GatewayError, HttpGateway, ListRequest, UpstreamGateway};
use crate::records::{FieldCatalog, Record, RecordPage};

pub const DEFAULT_MAX_PAGES: usize = 50;
pub const DEFAULT_TIMEOUT_SECONDS: usize = 30;

#[derive(Clone, Debug)]
pub struct Options {
    pub api_key: String,
    pub object_key: String,
    pub endpoints: Vec<String>,
    pub max_pages: usize,
    pub timeout_seconds: usize,
    pub proxy: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            object_key: String::new(),
            endpoints: failover::default_endpoints(),
            max_pages: DEFAULT_MAX_PAGES,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            proxy: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("apiKey and objectKey are required")]
    MissingCredentials,

    #[error("no upstream endpoints configured")]
    NoEndpoints,

    #[error("invalid max_pages {value}, expected positive integer")]
    InvalidMaxPages { value: usize },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Request failed ({status}): {body}")]
    PageFailed { page: usize, status: u16, body: String },

    #[error("page {page} returned malformed JSON: {source}")]
    MalformedPage {
        page: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Contacts(#[from] ContactsError),
}

/// Everything one fetch produced. `truncated` is set when the page ceiling
/// stopped the loop while the upstream still reported more pages.
#[derive(Clone, Debug)]
pub struct FetchResult {
    pub records: Vec<Record>,
    pub catalog: FieldCatalog,
    pub pages: usize,
    pub truncated: bool,
    pub endpoint: Option<String>,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pages {
    pub records: Vec<Record>,
    pub pages: usize,
    pub truncated: bool,
}

/// Follow continuation tokens until the upstream reports no next page or
/// `max_pages` pages have been read. Any failing page discards everything
/// gathered so far.
pub async fn fetch_all_records(
    failover: &FailoverAggregator,
    api_key: &str,
    object_key: &str,
    max_pages: usize,
    pb: &ProgressBar,
) -> Result<Pages, RunnerError> {
    let mut all: Vec<Record> = Vec::new();
    let mut continuation_token = String::new();
    let mut loops = 0usize;

    loop {
        loops += 1;
        if loops > max_pages {
            warn!(
                max_pages,
                records = all.len(),
                "page ceiling reached, returning partial result"
            );
            return Ok(Pages {
                records: all,
                pages: max_pages,
                truncated: true,
            });
        }

        let request = ListRequest {
            api_key,
            object_key,
            continuation_token: &continuation_token,
        };
        let resp = failover.list_records(&request).await;
        if !resp.is_ok() {
            return Err(RunnerError::PageFailed {
                page: loops,
                status: resp.status,
                body: resp.body,
            });
        }

        let page: RecordPage = serde_json::from_str(&resp.body)
            .map_err(|e| RunnerError::MalformedPage {
                page: loops,
                source: e,
            })?;
        debug!(
            page = loops,
            records = page.records.len(),
            more = page.next_token().is_some(),
            "fetched page"
        );

        let next = page.next_token().map(|t| t.to_string());
        all.extend(page.records);
        pb.set_message(format!("page {loops} :: {} records", all.len()));
        pb.tick();

        match next {
            Some(token) => continuation_token = token,
            None => {
                return Ok(Pages {
                    records: all,
                    pages: loops,
                    truncated: false,
                })
            }
        }
    }
}

pub struct Runner {
    options: Options,
    failover: FailoverAggregator,
}

impl Runner {
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        validate_options(&options)?;
        let gateway = HttpGateway::new(options.timeout_seconds, options.proxy.as_deref())?;
        Ok(Self::build(options, Arc::new(gateway), failover::shared_pin()))
    }

    /// Build a runner over a caller-supplied gateway and pin.
    pub fn with_gateway(
        options: Options,
        gateway: Arc<dyn UpstreamGateway>,
        pin: Arc<PinnedEndpoint>,
    ) -> Result<Self, RunnerError> {
        validate_options(&options)?;
        Ok(Self::build(options, gateway, pin))
    }

    fn build(options: Options, gateway: Arc<dyn UpstreamGateway>, pin: Arc<PinnedEndpoint>) -> Self {
        let endpoints = options
            .endpoints
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        let failover = FailoverAggregator::new(endpoints, gateway, pin);
        Self { options, failover }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn failover(&self) -> &FailoverAggregator {
        &self.failover
    }

    pub async fn run(&self) -> Result<FetchResult, RunnerError> {
        self.run_with_progress(&ProgressBar::hidden()).await
    }

    pub async fn run_with_progress(&self, pb: &ProgressBar) -> Result<FetchResult, RunnerError> {
        let started_at = Instant::now();
        let pages = fetch_all_records(
            &self.failover,
            self.options.api_key.trim(),
            self.options.object_key.trim(),
            self.options.max_pages,
            pb,
        )
        .await?;
        let catalog = FieldCatalog::from_records(&pages.records);
        Ok(FetchResult {
            records: pages.records,
            catalog,
            pages: pages.pages,
            truncated: pages.truncated,
            endpoint: self.failover.pin().get(),
            elapsed: started_at.elapsed(),
        })
    }

    /// Create a contact list from the given records' profile ids. Returns the
    /// number of profiles sent.
    pub async fn create_contact_list<'a>(
        &self,
        name: &str,
        records: impl IntoIterator<Item = &'a Record>,
    ) -> Result<usize, RunnerError> {
        let ids = contacts::distinct_user_profile_ids(records);
        let base = self
            .failover
            .preferred_endpoint()
            .ok_or(RunnerError::NoEndpoints)?;
        let sent = contacts::create_contact_list(
            self.failover.gateway().as_ref(),
            &base,
            self.options.api_key.trim(),
            name,
            ids,
        )
        .await?;
        Ok(sent)
    }
}

fn validate_options(options: &Options) -> Result<(), RunnerError> {
    if options.api_key.trim().is_empty() || options.object_key.trim().is_empty() {
        return Err(RunnerError::MissingCredentials);
    }
    if options.endpoints.iter().all(|e| e.trim().is_empty()) {
        return Err(RunnerError::NoEndpoints);
    }
    if options.max_pages == 0 {
        return Err(RunnerError::InvalidMaxPages {
            value: options.max_pages,
        });
    }
    Ok(())
}
