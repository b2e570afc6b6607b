use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub const API_KEY_HEADER: &str = "X-Sleekflow-Api-Key";

pub const RECORDS_PAGE_LIMIT: u32 = 1000;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid base endpoint '{base}': {reason}")]
    InvalidEndpoint { base: String, reason: String },

    #[error("request to {base} failed: {source}")]
    Transport {
        base: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Status and body exactly as the upstream sent them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ListRequest<'a> {
    pub api_key: &'a str,
    pub object_key: &'a str,
    pub continuation_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListBody<'a> {
    continuation_token: &'a str,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactListRequest {
    pub group_list_name: String,
    pub user_profile_ids: Vec<String>,
}

/// One upstream base endpoint's view of the API. Implementations perform a
/// single request and never retry.
#[async_trait]
pub trait UpstreamGateway: Send + Sync {
    /// Read one page of records. The continuation token travels in the body of
    /// a GET, which the upstream requires.
    async fn list_records(
        &self,
        base: &str,
        request: &ListRequest<'_>,
    ) -> Result<RawResponse, GatewayError>;

    async fn create_contact_list(
        &self,
        base: &str,
        api_key: &str,
        request: &ContactListRequest,
    ) -> Result<RawResponse, GatewayError>;
}

fn endpoint_url(base: &str, segments: &[&str]) -> Result<reqwest::Url, GatewayError> {
    let trimmed = base.trim().trim_end_matches('/');
    let mut url = reqwest::Url::parse(trimmed).map_err(|e| GatewayError::InvalidEndpoint {
        base: base.to_string(),
        reason: e.to_string(),
    })?;
    url.path_segments_mut()
        .map_err(|_| GatewayError::InvalidEndpoint {
            base: base.to_string(),
            reason: "cannot be a base URL".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub fn records_url(base: &str, object_key: &str) -> Result<reqwest::Url, GatewayError> {
    let mut url = endpoint_url(base, &["api", "customObjects", object_key, "records"])?;
    url.query_pairs_mut()
        .append_pair("limit", &RECORDS_PAGE_LIMIT.to_string());
    Ok(url)
}

pub fn contact_list_url(base: &str) -> Result<reqwest::Url, GatewayError> {
    endpoint_url(base, &["api", "contact", "list"])
}

#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(timeout_seconds: usize, proxy: Option<&str>) -> Result<Self, GatewayError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(concat!(
                "recordharvest/",
                env!("CARGO_PKG_VERSION")
            )),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let timeout = Duration::from_secs(timeout_seconds.try_into().unwrap_or(30));
        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout);

        if let Some(proxy) = proxy.filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| GatewayError::ProxySetup {
                proxy: proxy.to_string(),
                source: e,
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| GatewayError::ClientBuild { source: e })?;
        Ok(Self { client })
    }

    async fn send(
        &self,
        base: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<RawResponse, GatewayError> {
        let transport = |source| GatewayError::Transport {
            base: base.to_string(),
            source,
        };
        let resp = builder.send().await.map_err(transport)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(transport)?;
        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl UpstreamGateway for HttpGateway {
    async fn list_records(
        &self,
        base: &str,
        request: &ListRequest<'_>,
    ) -> Result<RawResponse, GatewayError> {
        let url = records_url(base, request.object_key)?;
        let payload = serde_json::to_string(&ListBody {
            continuation_token: request.continuation_token,
        })
        .unwrap_or_else(|_| "{}".to_string());
        debug!(%url, token_len = request.continuation_token.len(), "listing records");

        let builder = self
            .client
            .request(reqwest::Method::GET, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, request.api_key)
            .body(payload);
        self.send(base, builder).await
    }

    async fn create_contact_list(
        &self,
        base: &str,
        api_key: &str,
        request: &ContactListRequest,
    ) -> Result<RawResponse, GatewayError> {
        let url = contact_list_url(base)?;
        let payload = serde_json::to_string(request).unwrap_or_else(|_| "{}".to_string());
        debug!(%url, profiles = request.user_profile_ids.len(), "creating contact list");

        let builder = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, api_key)
            .body(payload);
        self.send(base, builder).await
    }
}
