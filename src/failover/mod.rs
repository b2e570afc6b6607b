use std::sync::{Arc, OnceLock, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::gateway::{ListRequest, RawResponse, UpstreamGateway};

pub const GATEWAY_FAILURE_STATUS: u16 = 502;

pub const DEFAULT_ENDPOINTS: [&str; 5] = [
    "https://api.sleekflow.io",
    "https://sleekflow-core-app-eus-production.azurewebsites.net",
    "https://sleekflow-core-app-seas-production.azurewebsites.net",
    "https://sleekflow-core-app-weu-production.azurewebsites.net",
    "https://sleekflow-core-app-uaen-production.azurewebsites.net",
];

pub fn default_endpoints() -> Vec<String> {
    DEFAULT_ENDPOINTS.iter().map(|e| e.to_string()).collect()
}

/// Single-slot cache of the base endpoint that last answered with success.
/// Concurrent pins are last-write-wins.
#[derive(Debug, Default)]
pub struct PinnedEndpoint {
    slot: RwLock<Option<String>>,
}

impl PinnedEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn pin(&self, base: &str) {
        let mut slot = self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_deref() != Some(base) {
            info!(base, "pinned upstream endpoint");
            *slot = Some(base.to_string());
        }
    }

    pub fn reset(&self) {
        *self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

/// The process-wide pin shared by every runner that is not handed its own.
pub fn shared_pin() -> Arc<PinnedEndpoint> {
    static SHARED: OnceLock<Arc<PinnedEndpoint>> = OnceLock::new();
    SHARED
        .get_or_init(|| Arc::new(PinnedEndpoint::new()))
        .clone()
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Attempt {
    Rejected {
        base: String,
        status: u16,
        body: String,
    },
    Failed {
        base: String,
        error: String,
    },
}

impl Attempt {
    pub fn base(&self) -> &str {
        match self {
            Attempt::Rejected { base, .. } | Attempt::Failed { base, .. } => base,
        }
    }
}

#[derive(Serialize)]
struct ExhaustedBody<'a> {
    error: &'static str,
    attempts: &'a [Attempt],
}

pub fn exhausted_response(attempts: &[Attempt]) -> RawResponse {
    let body = serde_json::to_string(&ExhaustedBody {
        error: "All base URLs failed",
        attempts,
    })
    .unwrap_or_else(|_| r#"{"error":"All base URLs failed"}"#.to_string());
    RawResponse {
        status: GATEWAY_FAILURE_STATUS,
        body,
    }
}

pub struct FailoverAggregator {
    endpoints: Vec<String>,
    gateway: Arc<dyn UpstreamGateway>,
    pin: Arc<PinnedEndpoint>,
}

impl FailoverAggregator {
    pub fn new(
        endpoints: Vec<String>,
        gateway: Arc<dyn UpstreamGateway>,
        pin: Arc<PinnedEndpoint>,
    ) -> Self {
        Self {
            endpoints,
            gateway,
            pin,
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn pin(&self) -> &Arc<PinnedEndpoint> {
        &self.pin
    }

    pub fn gateway(&self) -> &Arc<dyn UpstreamGateway> {
        &self.gateway
    }

    /// The endpoint a one-shot call should use: the pin when set, otherwise
    /// the highest-priority candidate.
    pub fn preferred_endpoint(&self) -> Option<String> {
        self.pin.get().or_else(|| self.endpoints.first().cloned())
    }

    /// List one page through the first endpoint that answers with success.
    ///
    /// With a pin in place only the pinned endpoint is tried and its failure
    /// is final. Exhaustion yields a synthetic 502 whose body lists every
    /// attempt.
    pub async fn list_records(&self, request: &ListRequest<'_>) -> RawResponse {
        let pinned = self.pin.get();
        let candidates: Vec<String> = match pinned.as_ref() {
            Some(base) => vec![base.clone()],
            None => self.endpoints.clone(),
        };

        let mut attempts: Vec<Attempt> = Vec::new();
        for base in candidates.iter() {
            match self.gateway.list_records(base, request).await {
                Ok(resp) if resp.is_ok() => {
                    self.pin.pin(base);
                    return resp;
                }
                Ok(resp) => {
                    debug!(base = %base, status = resp.status, "upstream rejected request");
                    attempts.push(Attempt::Rejected {
                        base: base.clone(),
                        status: resp.status,
                        body: resp.body,
                    });
                }
                Err(e) => {
                    debug!(base = %base, error = %e, "upstream unreachable");
                    attempts.push(Attempt::Failed {
                        base: base.clone(),
                        error: e.to_string(),
                    });
                }
            }
            if pinned.is_some() {
                break;
            }
        }

        warn!(attempts = attempts.len(), "all candidate endpoints failed");
        exhausted_response(&attempts)
    }
}
