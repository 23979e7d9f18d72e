//! HTTP front of the gateway.
//!
//! One POST endpoint accepting JSON-RPC, plus `/healthz`. The handler gates
//! every sponsorship-relevant item in a batch through the engine; the batch
//! is forwarded verbatim only when every item passes. Independent items are
//! validated concurrently, and the first denial in item order answers for
//! the whole batch.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::future;
use http::HeaderMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::SponsorshipEngine;
use crate::error::DenyReason;
use crate::metrics::Metrics;
use crate::rpc::{
    classify_method, deny_response, method_not_found, parse_error, parse_sponsorship_item,
    MethodClass, RpcBatch, SponsorshipItem,
};
use crate::session::Credentials;
use crate::upstream::SponsorClient;

pub const SESSION_ADDRESS_HEADER: &str = "x-session-address";
pub const DEPLOY_TOKEN_HEADER: &str = "x-deploy-session-token";
pub const DEPLOY_SIGNATURE_HEADER: &str = "x-deploy-session-signature";

#[derive(Clone)]
struct ServerState {
    engine: Arc<SponsorshipEngine>,
    upstream: SponsorClient,
    metrics: Arc<Metrics>,
}

/// The gateway HTTP server.
#[derive(Clone)]
pub struct Server {
    listen_addr: SocketAddr,
    engine: Arc<SponsorshipEngine>,
    upstream: SponsorClient,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen_addr", &self.listen_addr)
            .field("upstream", &self.upstream)
            .finish_non_exhaustive()
    }
}

impl Server {
    pub fn new(
        listen_addr: SocketAddr,
        engine: Arc<SponsorshipEngine>,
        upstream: SponsorClient,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            listen_addr,
            engine,
            upstream,
            metrics,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(healthz_handler))
            .route("/", post(rpc_handler))
            .with_state(ServerState {
                engine: self.engine.clone(),
                upstream: self.upstream.clone(),
                metrics: self.metrics.clone(),
            })
    }

    pub async fn listen(&self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_addr).await?;

        info!(address = %listener.local_addr()?, "starting gateway server");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(cancellation_token.cancelled_owned())
            .await?;

        Ok(())
    }
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn rpc_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    state.metrics.inflight_requests.increment(1.0);
    let _guard = InflightGuard(state.metrics.clone());
    let started = Instant::now();

    let Ok(batch) = serde_json::from_slice::<RpcBatch>(&body) else {
        return json_response(StatusCode::OK, parse_error());
    };

    // Method gating happens before credentials, params, or any chain read.
    let mut items: Vec<(Value, SponsorshipItem)> = Vec::new();
    for request in batch.requests() {
        let Some(class) = classify_method(&request.method) else {
            state.metrics.unknown_method_requests.increment(1);
            return json_response(StatusCode::OK, method_not_found(&request.id, &request.method));
        };
        if class == MethodClass::PassThrough {
            continue;
        }
        match parse_sponsorship_item(request, class) {
            Ok(item) => items.push((request.id.clone(), item)),
            Err(reason) => {
                record_denial(&state.metrics, &reason);
                return json_response(StatusCode::OK, deny_response(&request.id, &reason));
            }
        }
    }

    if !items.is_empty() {
        let credentials = match credentials_from_headers(&headers) {
            Ok(credentials) => credentials,
            Err(reason) => {
                record_denial(&state.metrics, &reason);
                return json_response(StatusCode::OK, deny_response(&items[0].0, &reason));
            }
        };

        let decisions = future::join_all(items.iter().map(|(_, item)| {
            state
                .engine
                .authorize(&item.op, item.entry_point, item.chain_id, &credentials)
        }))
        .await;
        state
            .metrics
            .decision_duration
            .record(started.elapsed().as_secs_f64());

        for ((id, item), decision) in items.iter().zip(decisions) {
            match decision {
                Ok(authorization) => {
                    state.metrics.accepted_operations.increment(1);
                    state.metrics.accepted_by_intent(authorization.intent);
                    info!(
                        session = %authorization.session,
                        sender = %item.op.sender,
                        intent = authorization.intent,
                        "operation authorized"
                    );
                }
                Err(reason) => {
                    record_denial(&state.metrics, &reason);
                    warn!(
                        sender = %item.op.sender,
                        reason = reason.reason(),
                        detail = %reason,
                        "operation denied"
                    );
                    return json_response(StatusCode::OK, deny_response(id, &reason));
                }
            }
        }
    }

    match state.upstream.forward(body.to_vec()).await {
        Ok(response) => {
            let status = if response.is_json() {
                StatusCode::OK
            } else {
                response.status
            };
            Response::builder()
                .status(status)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(response.body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => {
            state.metrics.upstream_errors.increment(1);
            warn!(error = %e, "sponsor backend unreachable");
            json_response(
                StatusCode::BAD_GATEWAY,
                crate::rpc::error_response(&Value::Null, -32010, "upstream unavailable", None),
            )
        }
    }
}

struct InflightGuard(Arc<Metrics>);

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.inflight_requests.decrement(1.0);
    }
}

fn json_response(status: StatusCode, body: Value) -> Response {
    (
        status,
        [(http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn credentials_from_headers(headers: &HeaderMap) -> Result<Credentials, DenyReason> {
    let text = |name: &str| -> Result<Option<String>, DenyReason> {
        match headers.get(name) {
            None => Ok(None),
            Some(value) => value.to_str().map(|s| Some(s.to_string())).map_err(|_| {
                DenyReason::MalformedRequest(format!("header {name} is not valid text"))
            }),
        }
    };

    let siwe_address = match text(SESSION_ADDRESS_HEADER)? {
        Some(raw) => Some(raw.parse().map_err(|e| {
            DenyReason::MalformedRequest(format!("{SESSION_ADDRESS_HEADER}: {e}"))
        })?),
        None => None,
    };

    Ok(Credentials {
        siwe_address,
        deploy_token: text(DEPLOY_TOKEN_HEADER)?,
        deploy_signature: text(DEPLOY_SIGNATURE_HEADER)?,
    })
}

fn record_denial(metrics: &Metrics, reason: &DenyReason) {
    metrics.denied_operations.increment(1);
    metrics.denied_by_reason(reason.reason());
    match reason {
        DenyReason::RateLimited => metrics.rate_limited_requests.increment(1),
        DenyReason::Unauthenticated(_) => metrics.unauthorized_requests.increment(1),
        DenyReason::StateUnavailable(_) => metrics.chain_read_failures.increment(1),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use http::HeaderValue;

    #[test]
    fn parses_credential_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            SESSION_ADDRESS_HEADER,
            HeaderValue::from_static("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
        );
        headers.insert(DEPLOY_TOKEN_HEADER, HeaderValue::from_static("tok-1"));

        let credentials = credentials_from_headers(&headers).unwrap();
        assert_eq!(
            credentials.siwe_address,
            Some(address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"))
        );
        assert_eq!(credentials.deploy_token.as_deref(), Some("tok-1"));
        assert_eq!(credentials.deploy_signature, None);
    }

    #[test]
    fn malformed_session_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_ADDRESS_HEADER, HeaderValue::from_static("not-hex"));

        assert!(matches!(
            credentials_from_headers(&headers).unwrap_err(),
            DenyReason::MalformedRequest(_)
        ));
    }

    #[test]
    fn missing_headers_mean_empty_credentials() {
        let credentials = credentials_from_headers(&HeaderMap::new()).unwrap();
        assert_eq!(credentials.siwe_address, None);
        assert_eq!(credentials.deploy_token, None);
    }
}
