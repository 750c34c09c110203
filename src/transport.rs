//! One synchronous request/response round trip against the GraphQL endpoint.
//!
//! Elapsed time covers sending the request and reading the response body.
//! Building the request and decoding JSON are outside the measured window.

use crate::error::{ClientError, HarnessError};
use crate::harness::measure;
use crate::query::GraphqlRequest;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;

/// Maximum number of body bytes quoted in a non-2xx error message.
const ERROR_BODY_SNIPPET: usize = 256;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphqlError {
    #[serde(default)]
    pub message: String,
}

/// Top-level GraphQL response envelope. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub errors: Option<Vec<GraphqlError>>,
}

impl GraphqlResponse {
    /// First message of the `errors` array, if the array is present.
    pub fn first_error(&self) -> Option<&str> {
        self.errors
            .as_ref()
            .map(|errs| errs.first().map(|e| e.message.as_str()).unwrap_or("unknown GraphQL error"))
    }
}

/// A decoded response and the wall-clock time of the round trip.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub response: GraphqlResponse,
    pub elapsed: Duration,
}

/// A failed round trip. `elapsed` is present whenever the request got as far
/// as the network; `status` whenever the endpoint answered at all.
#[derive(Debug, Clone)]
pub struct TransportFailure {
    pub error: ClientError,
    pub elapsed: Option<Duration>,
    pub status: Option<u16>,
}

pub trait Transport {
    fn execute(&self, request: &GraphqlRequest) -> Result<Exchange, TransportFailure>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &GraphqlRequest) -> Result<Exchange, TransportFailure> {
        (**self).execute(request)
    }
}

/// Blocking HTTP POST transport with a fixed per-request timeout.
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, HarnessError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &GraphqlRequest) -> Result<Exchange, TransportFailure> {
        let body = request.body();
        tracing::debug!(endpoint = %self.endpoint, bytes = body.len(), "POST");

        let timed = measure(|| {
            let resp = self
                .client
                .post(&self.endpoint)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()?;
            let status = resp.status();
            let bytes = resp.bytes()?;
            Ok::<_, reqwest::Error>((status, bytes))
        });
        let elapsed = timed.elapsed;

        let (status, bytes) = timed.value.map_err(|e| TransportFailure {
            error: ClientError::Transport(describe(&e)),
            elapsed: Some(elapsed),
            status: None,
        })?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            let snippet: String = text.chars().take(ERROR_BODY_SNIPPET).collect();
            return Err(TransportFailure {
                error: ClientError::Transport(format!("HTTP {status}: {snippet}")),
                elapsed: Some(elapsed),
                status: Some(status.as_u16()),
            });
        }

        let response: GraphqlResponse = serde_json::from_slice(&bytes).map_err(|e| TransportFailure {
            error: ClientError::Protocol(format!("malformed response body: {e}")),
            elapsed: Some(elapsed),
            status: Some(status.as_u16()),
        })?;

        Ok(Exchange { response, elapsed })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process stand-in for the service, driven by a responder closure.

    use super::*;
    use crate::Stage;
    use serde_json::{json, Value};
    use std::cell::RefCell;

    type Responder = Box<dyn Fn(usize, Stage, usize) -> Result<Exchange, TransportFailure>>;

    pub(crate) struct FakeService {
        pub(crate) calls: RefCell<Vec<GraphqlRequest>>,
        responder: Responder,
    }

    impl FakeService {
        /// `responder(call_index, stage, item_count)` produces each reply.
        pub(crate) fn new(
            responder: impl Fn(usize, Stage, usize) -> Result<Exchange, TransportFailure> + 'static,
        ) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                responder: Box::new(responder),
            }
        }

        /// A service that accepts every item.
        pub(crate) fn healthy() -> Self {
            Self::new(|_, stage, n| Ok(bulk_ok(stage, n, n)))
        }

        pub(crate) fn stages_called(&self) -> Vec<(Stage, usize)> {
            self.calls
                .borrow()
                .iter()
                .map(|r| (operation_of(&r.query), item_count(&r.query)))
                .collect()
        }
    }

    impl Transport for FakeService {
        fn execute(&self, request: &GraphqlRequest) -> Result<Exchange, TransportFailure> {
            let idx = self.calls.borrow().len();
            self.calls.borrow_mut().push(request.clone());
            (self.responder)(idx, operation_of(&request.query), item_count(&request.query))
        }
    }

    pub(crate) fn operation_of(query: &str) -> Stage {
        Stage::ALL
            .into_iter()
            .find(|s| query.contains(&format!("{}(", s.operation())))
            .expect("query names a known operation")
    }

    pub(crate) fn item_count(query: &str) -> usize {
        if query.contains("items: []") {
            0
        } else {
            query.matches("}, {").count() + 1
        }
    }

    pub(crate) fn exchange(body: Value) -> Exchange {
        Exchange {
            response: serde_json::from_value(body).expect("valid envelope"),
            elapsed: Duration::from_millis(5),
        }
    }

    /// Successful bulk result accepting `succeeded` of `requested` items.
    pub(crate) fn bulk_ok(stage: Stage, requested: usize, succeeded: usize) -> Exchange {
        let mut result = json!({
            "success": true,
            "totalRequested": requested,
            stage.count_field(): succeeded,
            "totalFailed": requested - succeeded,
            "errorMessage": null,
        });
        if let Some(field) = stage.id_field() {
            let items: Vec<Value> = (0..succeeded)
                .map(|i| match stage {
                    Stage::MicroCreate => json!({ field: format!("ms-{i:04}") }),
                    _ => json!({ field: 5000 + i as i64 }),
                })
                .collect();
            result["insertedItems"] = Value::Array(items);
        }
        exchange(json!({ "data": { stage.operation(): result } }))
    }

    pub(crate) fn unreachable() -> TransportFailure {
        TransportFailure {
            error: ClientError::Transport("connection failed: refused".to_string()),
            elapsed: None,
            status: None,
        }
    }

    /// The endpoint answered, but with a non-2xx status.
    pub(crate) fn http_status(code: u16) -> TransportFailure {
        TransportFailure {
            error: ClientError::Transport(format!("HTTP {code}: unavailable")),
            elapsed: Some(Duration::from_millis(3)),
            status: Some(code),
        }
    }
}
