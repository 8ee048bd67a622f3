//! HTTP polling transport.
//!
//! Talks to an ordered list of candidate endpoints. Each operation tries the
//! candidates in order and stops at the first success, so a deployment can
//! move its preferences route without breaking older clients. Requests
//! carry the account's credential as a bearer token.
//!
//! - `GET` answers `{"preferences": {...}}`, `{"data": {"preferences": {...}}}`
//!   or `{"data": {...}}`
//! - `PUT` sends `{"uid": ..., <record fields>}`

use std::time::Duration;

use async_trait::async_trait;
use prefsync_types::{extract_preferences, Identity, PreferenceRecord, PutPreferencesBody};
use serde_json::Value;

use super::{Transport, TransportError};

/// Per-request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Polling transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfig {
    /// Candidate endpoint URLs, tried in order.
    pub endpoints: Vec<String>,
    /// Timeout for each individual request.
    pub request_timeout: Duration,
}

impl PollingConfig {
    /// Configuration for the given candidates.
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

/// Pull/push over HTTP with endpoint fallback.
#[derive(Debug, Clone)]
pub struct PollingTransport {
    config: PollingConfig,
    client: reqwest::Client,
}

impl PollingTransport {
    /// Build a transport with its own HTTP client.
    pub fn new(config: PollingConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Candidate endpoints, in order.
    pub fn endpoints(&self) -> &[String] {
        &self.config.endpoints
    }

    async fn get_from(
        &self,
        endpoint: &str,
        identity: &Identity,
    ) -> Result<PreferenceRecord, TransportError> {
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(identity.auth_token())
            .send()
            .await
            .map_err(|e| request_error(endpoint, e))?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }

        let invalid = || TransportError::InvalidResponse {
            endpoint: endpoint.to_string(),
        };
        let payload: Value = response.json().await.map_err(|_| invalid())?;
        extract_preferences(&payload).ok_or_else(invalid)
    }

    async fn put_to(
        &self,
        endpoint: &str,
        identity: &Identity,
        record: &PreferenceRecord,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .put(endpoint)
            .bearer_auth(identity.auth_token())
            .json(&PutPreferencesBody::new(identity.uid(), record))
            .send()
            .await
            .map_err(|e| request_error(endpoint, e))?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

fn request_error(endpoint: &str, error: reqwest::Error) -> TransportError {
    TransportError::Request {
        endpoint: endpoint.to_string(),
        reason: error.to_string(),
    }
}

#[async_trait]
impl Transport for PollingTransport {
    fn name(&self) -> &'static str {
        "polling"
    }

    async fn pull(&self, identity: &Identity) -> Result<Option<PreferenceRecord>, TransportError> {
        let mut last = None;
        for endpoint in &self.config.endpoints {
            match self.get_from(endpoint, identity).await {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    tracing::debug!("GET candidate failed: {}", e);
                    last = Some(e);
                }
            }
        }

        match last {
            // Nothing configured means nothing remote
            None => Ok(None),
            Some(last) => Err(TransportError::AllCandidatesFailed {
                attempted: self.config.endpoints.len(),
                last: Box::new(last),
            }),
        }
    }

    async fn push(
        &self,
        identity: &Identity,
        record: &PreferenceRecord,
    ) -> Result<(), TransportError> {
        let mut last = None;
        for endpoint in &self.config.endpoints {
            match self.put_to(endpoint, identity, record).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!("PUT candidate failed: {}", e);
                    last = Some(e);
                }
            }
        }

        Err(match last {
            None => TransportError::NoEndpoints,
            Some(last) => TransportError::AllCandidatesFailed {
                attempted: self.config.endpoints.len(),
                last: Box::new(last),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct ServerState {
        stored: Option<Value>,
        puts: Vec<Value>,
        auth_headers: Vec<String>,
    }

    type Shared = Arc<Mutex<ServerState>>;

    fn record_auth(state: &Shared, headers: &HeaderMap) {
        if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            state.lock().unwrap().auth_headers.push(value.to_string());
        }
    }

    async fn get_prefs(State(state): State<Shared>, headers: HeaderMap) -> Json<Value> {
        record_auth(&state, &headers);
        let stored = state.lock().unwrap().stored.clone();
        Json(json!({ "preferences": stored }))
    }

    async fn get_nested(State(state): State<Shared>) -> Json<Value> {
        let stored = state.lock().unwrap().stored.clone();
        Json(json!({ "data": stored }))
    }

    async fn put_prefs(
        State(state): State<Shared>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        record_auth(&state, &headers);
        let mut state = state.lock().unwrap();
        state.stored = Some(body.clone());
        state.puts.push(body);
        StatusCode::OK
    }

    async fn unavailable() -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }

    async fn garbage() -> Json<Value> {
        Json(json!({ "prefs": { "language": "en" } }))
    }

    /// Serve the test routes on an ephemeral port and return the base URL.
    async fn spawn_server(state: Shared) -> String {
        let app = Router::new()
            .route("/prefs", get(get_prefs).put(put_prefs))
            .route("/nested", get(get_nested))
            .route("/down", get(unavailable).put(unavailable))
            .route("/garbage", get(garbage))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn identity() -> Identity {
        Identity::new("user-1", "secret-token").unwrap()
    }

    fn transport(base: &str, paths: &[&str]) -> PollingTransport {
        let endpoints: Vec<String> = paths.iter().map(|p| format!("{}{}", base, p)).collect();
        PollingTransport::new(PollingConfig::new(endpoints)).unwrap()
    }

    // ===========================================
    // Pull Tests
    // ===========================================

    #[tokio::test]
    async fn pull_reads_preferences_key() {
        let state = Shared::default();
        state.lock().unwrap().stored = Some(json!({ "language": "EN", "updatedAtMs": 200 }));
        let base = spawn_server(state.clone()).await;

        let record = transport(&base, &["/prefs"])
            .pull(&identity())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.language, "en");
        assert_eq!(record.updated_at_ms, 200);
        assert_eq!(
            state.lock().unwrap().auth_headers,
            vec!["Bearer secret-token".to_string()]
        );
    }

    #[tokio::test]
    async fn pull_falls_through_failing_candidates() {
        let state = Shared::default();
        state.lock().unwrap().stored = Some(json!({ "currency": "aed", "updatedAtMs": 9 }));
        let base = spawn_server(state).await;

        let record = transport(&base, &["/down", "/garbage", "/nested"])
            .pull(&identity())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(record.currency, "AED");
    }

    #[tokio::test]
    async fn pull_reports_all_candidates_failed() {
        let base = spawn_server(Shared::default()).await;

        let result = transport(&base, &["/down", "/garbage"])
            .pull(&identity())
            .await;

        match result {
            Err(TransportError::AllCandidatesFailed { attempted, last }) => {
                assert_eq!(attempted, 2);
                assert!(matches!(*last, TransportError::InvalidResponse { .. }));
            }
            other => panic!("expected AllCandidatesFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn null_preferences_count_as_failure() {
        // Server has nothing stored, so it answers {"preferences": null}
        let base = spawn_server(Shared::default()).await;
        let result = transport(&base, &["/prefs"]).pull(&identity()).await;
        assert!(matches!(
            result,
            Err(TransportError::AllCandidatesFailed { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_request_error() {
        let transport = PollingTransport::new(
            PollingConfig::new(["http://127.0.0.1:9/prefs"])
                .with_request_timeout(Duration::from_secs(2)),
        )
        .unwrap();

        match transport.pull(&identity()).await {
            Err(TransportError::AllCandidatesFailed { last, .. }) => {
                assert!(matches!(*last, TransportError::Request { .. }));
            }
            other => panic!("expected request failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn no_endpoints() {
        let transport = PollingTransport::new(PollingConfig::default()).unwrap();
        assert_eq!(transport.pull(&identity()).await.unwrap(), None);
        assert!(matches!(
            transport.push(&identity(), &PreferenceRecord::default()).await,
            Err(TransportError::NoEndpoints)
        ));
    }

    // ===========================================
    // Push Tests
    // ===========================================

    #[tokio::test]
    async fn push_sends_flattened_body() {
        let state = Shared::default();
        let base = spawn_server(state.clone()).await;
        let record = PreferenceRecord::new("ar", "aed", "metric", "Asia/Dubai", 500);

        transport(&base, &["/down", "/prefs"])
            .push(&identity(), &record)
            .await
            .unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.puts.len(), 1);
        assert_eq!(
            state.puts[0],
            json!({
                "uid": "user-1",
                "language": "ar",
                "currency": "AED",
                "metricSystem": "metric",
                "timezone": "asia/dubai",
                "updatedAtMs": 500
            })
        );
    }

    #[tokio::test]
    async fn push_then_pull_round_trips() {
        let base = spawn_server(Shared::default()).await;
        let transport = transport(&base, &["/prefs"]);
        let record = PreferenceRecord::new("en", "USD", "imperial", "utc", 42);

        transport.push(&identity(), &record).await.unwrap();
        assert_eq!(transport.pull(&identity()).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn push_reports_status_of_last_candidate() {
        let base = spawn_server(Shared::default()).await;
        let result = transport(&base, &["/down"])
            .push(&identity(), &PreferenceRecord::default())
            .await;

        match result {
            Err(TransportError::AllCandidatesFailed { attempted, last }) => {
                assert_eq!(attempted, 1);
                assert!(matches!(*last, TransportError::Status { status: 503, .. }));
            }
            other => panic!("expected status failure, got {:?}", other),
        }
    }
}
