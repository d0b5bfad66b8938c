//! Dispatch service routes

use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::{
    device::DeviceId,
    error::{ApiError, ApiResult, DispatchError},
    middleware::admin_middleware,
    models::{Command, CommandAction},
    service::{IssueRequest, PayloadFormat},
    state::AppState,
};

/// Create the router for the dispatch service
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/api/qr-sessions", post(create_session))
        .route("/api/qr/scan", get(scan_by_link).post(scan_by_body))
        .route("/api/lockers/:locker_id/next-command", get(next_command))
        .route("/api/commands/:id/ack", post(acknowledge_command));

    if state.admin_token.is_some() {
        let admin_routes = Router::new()
            .route("/api/lockers/:locker_id/commands", post(enqueue_command))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            ));
        router = router.merge(admin_routes);
    }

    router.with_state(state)
}

/// Request body for issuing a scan session
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(alias = "lockerId")]
    pub device_id: Option<String>,
    #[serde(alias = "empresaId")]
    pub tenant_id: Option<String>,
    #[serde(alias = "expiresInMs")]
    pub validity_ms: Option<i64>,
    #[serde(default, alias = "asUrl")]
    pub want_url: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub ok: bool,
    pub session_id: Uuid,
    pub device_id: DeviceId,
    pub validity_ms: i64,
    pub expires_at: DateTime<Utc>,
    pub payload: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    #[serde(alias = "code")]
    pub c: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub ok: bool,
    pub command_id: Uuid,
    pub device_id: DeviceId,
    pub action: CommandAction,
}

/// Command as seen by the polling locker
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandView {
    pub id: Uuid,
    pub device_id: DeviceId,
    pub action: CommandAction,
}

impl From<Command> for CommandView {
    fn from(command: Command) -> Self {
        Self {
            id: command.id,
            device_id: command.device_id,
            action: command.action,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NextCommandResponse {
    pub ok: bool,
    pub command: Option<CommandView>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AckRequest {
    /// Whether the physical action worked; absent counts as a failure
    #[serde(default)]
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub ok: bool,
    pub success: bool,
    pub already_acknowledged: bool,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub action: CommandAction,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state.service.health_check().await {
        Ok(true) => "ok",
        _ => "unavailable",
    };

    Json(json!({
        "status": "ok",
        "service": "dispatch-service",
        "store": store
    }))
}

/// Issue a scan session for a locker
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let device = payload.device_id.ok_or(DispatchError::InvalidDevice)?;

    let format = if payload.want_url {
        match state
            .public_base_url
            .clone()
            .or_else(|| request_base_url(&headers))
        {
            Some(base) => PayloadFormat::Url(base),
            None => {
                warn!("No base URL for scan link, returning the raw code");
                PayloadFormat::Code
            }
        }
    } else {
        PayloadFormat::Code
    };

    let session = state
        .service
        .issue_session(IssueRequest {
            device,
            tenant_id: payload.tenant_id,
            validity_ms: payload.validity_ms,
            payload: format,
        })
        .await?;

    Ok(Json(SessionResponse {
        ok: true,
        session_id: session.session_id,
        device_id: session.device_id,
        validity_ms: session.validity_ms,
        expires_at: session.expires_at,
        payload: session.payload,
    }))
}

/// Scan through the link encoded in the QR code
pub async fn scan_by_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<ScanQuery>,
) -> ApiResult<Response> {
    let client = client_key(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.trust_forwarded,
    );
    scan(&state, &client, query.c).await
}

/// Scan by posting the raw code
pub async fn scan_by_body(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Option<Json<ScanRequest>>,
) -> ApiResult<Response> {
    let client = client_key(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.trust_forwarded,
    );
    scan(&state, &client, payload.and_then(|Json(body)| body.code)).await
}

async fn scan(state: &AppState, client: &str, code: Option<String>) -> ApiResult<Response> {
    let code = code.unwrap_or_default();
    if code.trim().is_empty() {
        return Err(DispatchError::MissingCode.into());
    }

    if !state.throttle.check(client).await {
        return Err(ApiError::RateLimited);
    }

    match state.service.consume(&code).await {
        Ok(receipt) => Ok(Json(ScanResponse {
            ok: true,
            command_id: receipt.command_id,
            device_id: receipt.device_id,
            action: receipt.action,
        })
        .into_response()),
        Err(DispatchError::TokenRejected(rejection)) => Ok(Json(json!({
            "ok": false,
            "error": rejection.reason_code(state.conceal_reuse),
        }))
        .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// Oldest pending command for a locker
pub async fn next_command(
    State(state): State<AppState>,
    Path(locker_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let command = state.service.next_command(&locker_id).await?;

    Ok(Json(NextCommandResponse {
        ok: true,
        command: command.map(CommandView::from),
    }))
}

/// Acknowledge a delivered command
pub async fn acknowledge_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<AckRequest>>,
) -> ApiResult<impl IntoResponse> {
    let success = payload.is_some_and(|Json(body)| body.success);
    let outcome = state.service.acknowledge(&id, success).await?;

    Ok(Json(AckResponse {
        ok: true,
        success,
        already_acknowledged: outcome.was_repeat(),
    }))
}

/// Queue a command without a scan
pub async fn enqueue_command(
    State(state): State<AppState>,
    Path(locker_id): Path<String>,
    Json(payload): Json<EnqueueRequest>,
) -> ApiResult<impl IntoResponse> {
    let command = state.service.enqueue(&locker_id, payload.action).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ok": true,
            "command": command,
        })),
    ))
}

/// Throttle key: the peer address, or the first `X-Forwarded-For` hop when
/// the proxy in front is trusted to set it
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    let forwarded = if trust_forwarded {
        first_header_value(headers, "x-forwarded-for")
    } else {
        None
    };

    forwarded
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Base URL the client reached us on, from `X-Forwarded-Proto` and `Host`
fn request_base_url(headers: &HeaderMap) -> Option<Url> {
    let host = headers.get(header::HOST)?.to_str().ok()?.trim();
    if host.is_empty() {
        return None;
    }
    let scheme = match first_header_value(headers, "x-forwarded-proto") {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    };
    Url::parse(&format!("{}://{}/", scheme, host)).ok()
}

fn first_header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_key_uses_forwarded_for_only_when_trusted() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.1.5:4000".parse().unwrap();
        assert_eq!(client_key(&headers, Some(peer), true), "192.168.1.5");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_key(&headers, Some(peer), true), "203.0.113.7");
        assert_eq!(client_key(&headers, Some(peer), false), "192.168.1.5");
        assert_eq!(client_key(&headers, None, false), "unknown");
    }

    #[test]
    fn test_request_base_url() {
        let mut headers = HeaderMap::new();
        assert!(request_base_url(&headers).is_none());

        headers.insert(header::HOST, HeaderValue::from_static("lockers.example:5000"));
        assert_eq!(
            request_base_url(&headers).unwrap().as_str(),
            "http://lockers.example:5000/"
        );

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(
            request_base_url(&headers).unwrap().as_str(),
            "https://lockers.example:5000/"
        );
    }

    #[test]
    fn test_session_request_aliases() {
        let request: CreateSessionRequest = serde_json::from_value(json!({
            "lockerId": "7",
            "empresaId": "acme",
            "expiresInMs": 5000,
            "asUrl": true
        }))
        .unwrap();
        assert_eq!(request.device_id.as_deref(), Some("7"));
        assert_eq!(request.tenant_id.as_deref(), Some("acme"));
        assert_eq!(request.validity_ms, Some(5000));
        assert!(request.want_url);

        let request: CreateSessionRequest =
            serde_json::from_value(json!({ "deviceId": "LOCKER_001" })).unwrap();
        assert_eq!(request.device_id.as_deref(), Some("LOCKER_001"));
        assert!(!request.want_url);
    }
}
