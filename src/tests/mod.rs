use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::contacts::ContactsError;
use crate::failover::{FailoverAggregator, PinnedEndpoint, GATEWAY_FAILURE_STATUS};
use crate::filter::{FilterEngine, SelectionStyle};
use crate::gateway::{ContactListRequest, GatewayError, ListRequest, RawResponse, UpstreamGateway};
use crate::runner::{Options, Runner, RunnerError};

const A: &str = "https://a.example";
const B: &str = "https://b.example";

type Scripted = Result<RawResponse, String>;

// Answers from per-endpoint queues; once a queue is drained the endpoint's
// fallback (if any) repeats forever. Every call is logged.
#[derive(Default)]
struct ScriptedGateway {
    queues: Mutex<HashMap<String, VecDeque<Scripted>>>,
    fallback: Mutex<HashMap<String, RawResponse>>,
    list_calls: Mutex<Vec<(String, String)>>,
    contact_calls: Mutex<Vec<(String, String, ContactListRequest)>>,
    contact_reply: Mutex<Option<RawResponse>>,
}

impl ScriptedGateway {
    fn push(&self, base: &str, reply: Scripted) -> &Self {
        self.queues
            .lock()
            .unwrap()
            .entry(base.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    fn ok(&self, base: &str, page: Value) -> &Self {
        self.push(base, Ok(reply(200, &page.to_string())))
    }

    fn status(&self, base: &str, status: u16, body: &str) -> &Self {
        self.push(base, Ok(reply(status, body)))
    }

    fn unreachable(&self, base: &str) -> &Self {
        self.push(base, Err("connection refused".to_string()))
    }

    fn repeat(&self, base: &str, page: Value) {
        self.fallback
            .lock()
            .unwrap()
            .insert(base.to_string(), reply(200, &page.to_string()));
    }

    fn list_calls(&self) -> Vec<(String, String)> {
        self.list_calls.lock().unwrap().clone()
    }

    fn bases_called(&self) -> Vec<String> {
        self.list_calls().into_iter().map(|(b, _)| b).collect()
    }
}

fn reply(status: u16, body: &str) -> RawResponse {
    RawResponse {
        status,
        body: body.to_string(),
    }
}

#[async_trait]
impl UpstreamGateway for ScriptedGateway {
    async fn list_records(
        &self,
        base: &str,
        request: &ListRequest<'_>,
    ) -> Result<RawResponse, GatewayError> {
        self.list_calls
            .lock()
            .unwrap()
            .push((base.to_string(), request.continuation_token.to_string()));
        let next = self
            .queues
            .lock()
            .unwrap()
            .get_mut(base)
            .and_then(|q| q.pop_front());
        let next = match next {
            Some(next) => next,
            None => match self.fallback.lock().unwrap().get(base) {
                Some(resp) => Ok(resp.clone()),
                None => Ok(reply(404, "unscripted")),
            },
        };
        next.map_err(|reason| GatewayError::InvalidEndpoint {
            base: base.to_string(),
            reason,
        })
    }

    async fn create_contact_list(
        &self,
        base: &str,
        api_key: &str,
        request: &ContactListRequest,
    ) -> Result<RawResponse, GatewayError> {
        self.contact_calls.lock().unwrap().push((
            base.to_string(),
            api_key.to_string(),
            request.clone(),
        ));
        Ok(self
            .contact_reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| reply(200, "{}")))
    }
}

fn page(records: Value, next: &str) -> Value {
    json!({"records": records, "nextContinuationToken": next})
}

fn rows(n: usize, offset: usize) -> Value {
    Value::Array(
        (0..n)
            .map(|i| {
                json!({
                    "primaryPropertyValue": format!("r{}", offset + i),
                    "referencedUserProfileId": format!("u{}", (offset + i) % 3),
                    "createdAt": "2024-01-15T10:00:00Z",
                    "propertyValues": {"tier": if (offset + i) % 2 == 0 { "gold" } else { "silver" }}
                })
            })
            .collect(),
    )
}

fn options(endpoints: &[&str]) -> Options {
    Options {
        api_key: "key".to_string(),
        object_key: "orders".to_string(),
        endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
        ..Options::default()
    }
}

fn runner(gw: &Arc<ScriptedGateway>, endpoints: &[&str]) -> Runner {
    Runner::with_gateway(
        options(endpoints),
        gw.clone(),
        Arc::new(PinnedEndpoint::new()),
    )
    .unwrap()
}

fn request() -> ListRequest<'static> {
    ListRequest {
        api_key: "key",
        object_key: "orders",
        continuation_token: "",
    }
}

#[tokio::test]
async fn first_success_is_pinned() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.ok(A, page(rows(1, 0), ""));
    let pin = Arc::new(PinnedEndpoint::new());
    let agg = FailoverAggregator::new(vec![A.into(), B.into()], gw.clone(), pin.clone());

    let resp = agg.list_records(&request()).await;
    assert_eq!(resp.status, 200);
    assert_eq!(pin.get().as_deref(), Some(A));
    assert_eq!(gw.bases_called(), vec![A.to_string()]);
}

#[tokio::test]
async fn failover_pins_second_endpoint_and_pinned_failure_is_final() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.status(A, 500, "down").ok(B, page(rows(1, 0), ""));
    gw.status(B, 503, "busy");
    let pin = Arc::new(PinnedEndpoint::new());
    let agg = FailoverAggregator::new(vec![A.into(), B.into()], gw.clone(), pin.clone());

    let first = agg.list_records(&request()).await;
    assert_eq!(first.status, 200);
    assert_eq!(pin.get().as_deref(), Some(B));

    let second = agg.list_records(&request()).await;
    assert_eq!(second.status, GATEWAY_FAILURE_STATUS);
    let body: Value = serde_json::from_str(&second.body).unwrap();
    assert_eq!(
        body,
        json!({
            "error": "All base URLs failed",
            "attempts": [{"base": B, "status": 503, "body": "busy"}]
        })
    );
    assert_eq!(
        gw.bases_called(),
        vec![A.to_string(), B.to_string(), B.to_string()]
    );
    assert_eq!(pin.get().as_deref(), Some(B));
}

#[tokio::test]
async fn unreachable_pinned_endpoint_is_final() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.status(A, 500, "down").ok(B, page(rows(1, 0), ""));
    gw.unreachable(B);
    let pin = Arc::new(PinnedEndpoint::new());
    let agg = FailoverAggregator::new(vec![A.into(), B.into()], gw.clone(), pin.clone());

    assert_eq!(agg.list_records(&request()).await.status, 200);
    assert_eq!(pin.get().as_deref(), Some(B));

    let resp = agg.list_records(&request()).await;
    assert_eq!(resp.status, GATEWAY_FAILURE_STATUS);
    let body: Value = serde_json::from_str(&resp.body).unwrap();
    let attempts = body["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["base"], B);
    assert!(attempts[0]["error"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
    assert!(attempts[0].get("status").is_none());
    assert_eq!(
        gw.bases_called(),
        vec![A.to_string(), B.to_string(), B.to_string()]
    );
}

#[tokio::test]
async fn exhaustion_reports_every_attempt() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.status(A, 401, "bad key").unreachable(B);
    let pin = Arc::new(PinnedEndpoint::new());
    let agg = FailoverAggregator::new(vec![A.into(), B.into()], gw.clone(), pin.clone());

    let resp = agg.list_records(&request()).await;
    assert_eq!(resp.status, 502);
    let body: Value = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(body["error"], "All base URLs failed");
    let attempts = body["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0], json!({"base": A, "status": 401, "body": "bad key"}));
    assert_eq!(attempts[1]["base"], B);
    assert!(attempts[1]["error"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
    assert_eq!(pin.get(), None);
}

#[tokio::test]
async fn pages_are_followed_until_token_runs_out() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.ok(A, page(rows(2, 0), "t1"))
        .ok(A, page(rows(2, 2), "t2"))
        .ok(A, page(json!([]), ""));

    let result = runner(&gw, &[A, B]).run().await.unwrap();
    assert_eq!(result.records.len(), 4);
    assert_eq!(result.pages, 3);
    assert!(!result.truncated);
    assert_eq!(result.endpoint.as_deref(), Some(A));
    let tokens: Vec<String> = gw.list_calls().into_iter().map(|(_, t)| t).collect();
    assert_eq!(tokens, vec!["", "t1", "t2"]);
    assert_eq!(
        result.catalog.fields(),
        &[
            "primaryPropertyValue",
            "referencedUserProfileId",
            "createdAt",
            "updatedAt",
            "tier"
        ]
    );
}

#[tokio::test]
async fn missing_next_token_key_ends_the_walk() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.ok(A, json!({"records": rows(3, 0)}));

    let result = runner(&gw, &[A]).run().await.unwrap();
    assert_eq!(result.records.len(), 3);
    assert_eq!(gw.list_calls().len(), 1);
}

#[tokio::test]
async fn null_shapes_in_a_page_do_not_abort_the_fetch() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.ok(
        A,
        json!({
            "records": [{"primaryPropertyValue": "a", "propertyValues": null}],
            "nextContinuationToken": "t1"
        }),
    )
    .ok(A, json!({"records": null, "nextContinuationToken": null}));

    let result = runner(&gw, &[A]).run().await.unwrap();
    assert_eq!(result.records.len(), 1);
    assert_eq!(result.pages, 2);
    assert_eq!(result.catalog.len(), 4);
}

#[tokio::test]
async fn endless_tokens_stop_at_the_page_ceiling() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.repeat(A, page(rows(1, 0), "again"));

    let result = runner(&gw, &[A]).run().await.unwrap();
    assert_eq!(gw.list_calls().len(), 50);
    assert_eq!(result.records.len(), 50);
    assert_eq!(result.pages, 50);
    assert!(result.truncated);
}

#[tokio::test]
async fn failing_page_discards_partial_records() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.ok(A, page(rows(2, 0), "t1")).status(A, 500, "oops");

    let err = runner(&gw, &[A, B]).run().await.unwrap_err();
    match err {
        RunnerError::PageFailed { page, status, body } => {
            assert_eq!(page, 2);
            assert_eq!(status, GATEWAY_FAILURE_STATUS);
            assert!(body.contains("oops"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // B is never probed once A is pinned
    assert_eq!(gw.bases_called(), vec![A.to_string(), A.to_string()]);
}

#[tokio::test]
async fn malformed_page_is_an_error() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.status(A, 200, "<html>");

    let err = runner(&gw, &[A]).run().await.unwrap_err();
    assert!(matches!(err, RunnerError::MalformedPage { page: 1, .. }));
}

#[tokio::test]
async fn missing_credentials_make_no_calls() {
    let gw = Arc::new(ScriptedGateway::default());
    let mut opts = options(&[A]);
    opts.api_key = "  ".to_string();

    let err = Runner::with_gateway(opts, gw.clone(), Arc::new(PinnedEndpoint::new()))
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "apiKey and objectKey are required");
    assert!(gw.list_calls().is_empty());
}

#[tokio::test]
async fn contact_list_uses_pinned_endpoint_and_distinct_ids() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.unreachable(A).ok(B, page(rows(6, 0), ""));
    let runner = runner(&gw, &[A, B]);
    let fetched = runner.run().await.unwrap();

    let mut engine = FilterEngine::new(fetched.records, fetched.catalog, SelectionStyle::Multi);
    engine.select_field("tier").unwrap();
    engine.select_values(["gold"]).unwrap();
    assert_eq!(engine.filtered_len(), 3);

    let sent = runner
        .create_contact_list("  Gold members ", engine.filtered())
        .await
        .unwrap();
    // gold rows are r0, r2, r4 -> profiles u0, u2, u1
    assert_eq!(sent, 3);
    let calls = gw.contact_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let (base, api_key, req) = &calls[0];
    assert_eq!(base, B);
    assert_eq!(api_key, "key");
    assert_eq!(req.group_list_name, "Gold members");
    assert_eq!(req.user_profile_ids, vec!["u0", "u2", "u1"]);
    assert_eq!(
        serde_json::to_value(req).unwrap(),
        json!({"groupListName": "Gold members", "userProfileIds": ["u0", "u2", "u1"]})
    );
}

#[tokio::test]
async fn contact_list_surfaces_upstream_text() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.ok(A, page(rows(2, 0), ""));
    let runner = runner(&gw, &[A]);
    let fetched = runner.run().await.unwrap();

    *gw.contact_reply.lock().unwrap() = Some(reply(400, "Group name already exists"));
    let err = runner
        .create_contact_list("dupe", fetched.records.iter())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Group name already exists");

    *gw.contact_reply.lock().unwrap() = Some(reply(500, ""));
    let err = runner
        .create_contact_list("dupe", fetched.records.iter())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Request failed (500)");
    assert_eq!(gw.contact_calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn contact_list_validates_before_calling() {
    let gw = Arc::new(ScriptedGateway::default());
    let runner = runner(&gw, &[A]);
    let no_profile: Vec<crate::records::Record> =
        vec![serde_json::from_value(json!({"primaryPropertyValue": "x"})).unwrap()];

    let err = runner
        .create_contact_list("   ", no_profile.iter())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunnerError::Contacts(ContactsError::MissingName)
    ));

    let err = runner
        .create_contact_list("list", no_profile.iter())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "No referencedUserProfileId values found in filtered records."
    );
    assert!(gw.contact_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn fetched_records_filter_page_and_export() {
    let gw = Arc::new(ScriptedGateway::default());
    gw.ok(A, page(rows(30, 0), "t1"))
        .ok(A, page(rows(30, 30), ""));
    let fetched = runner(&gw, &[A]).run().await.unwrap();

    let mut engine = FilterEngine::new(fetched.records, fetched.catalog, SelectionStyle::Single);
    engine.set_page_size(crate::view::PageSize::new(25).unwrap());
    engine.select_field("tier").unwrap();
    engine.select_values(["silver"]).unwrap();
    assert_eq!(engine.status_message(), "Showing 30 of 60 records.");

    engine.goto_page(9);
    let (rows, meta) = engine.current_page();
    assert_eq!(rows.len(), 5);
    assert_eq!(meta.to_string(), "Showing 26-30 of 30 \u{2022} Page 2/2");

    let csv = crate::output::render_csv(engine.catalog().fields(), engine.filtered());
    assert_eq!(csv.split("\r\n").count(), 31);
    assert!(csv
        .split("\r\n")
        .skip(1)
        .all(|line| line.ends_with("\"silver\"")));
}
