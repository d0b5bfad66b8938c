//! Session issuance

use chrono::{DateTime, Utc};
use tracing::info;
use url::Url;
use uuid::Uuid;

use super::DispatchService;
use crate::{device::DeviceId, error::DispatchResult, models::AuthorizationToken};

/// How the scan code is handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadFormat {
    /// The raw code
    Code,
    /// A link to the scan endpoint under this base, carrying the code as `c`
    Url(Url),
}

/// Input for [`DispatchService::issue_session`]
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Locker identifier as the caller knows it
    pub device: String,
    pub tenant_id: Option<String>,
    /// Requested validity; the service default applies when absent
    pub validity_ms: Option<i64>,
    pub payload: PayloadFormat,
}

/// A freshly issued scan session
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: Uuid,
    pub device_id: DeviceId,
    /// Effective validity after clamping
    pub validity_ms: i64,
    pub expires_at: DateTime<Utc>,
    /// Code or URL to render as a QR code
    pub payload: String,
}

/// Link to the scan endpoint for `code`, keeping any path prefix of `base`
pub fn scan_url(base: &Url, code: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().extend(["api", "qr", "scan"]);
    }
    url.set_query(None);
    url.query_pairs_mut().append_pair("c", code);
    url
}

impl DispatchService {
    /// Issue a single-use token bound to one locker.
    ///
    /// One insert of a new unique row; never contends with other sessions.
    pub async fn issue_session(&self, request: IssueRequest) -> DispatchResult<IssuedSession> {
        let device_id = DeviceId::parse(&request.device)?;
        let tenant_id = request
            .tenant_id
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let validity_ms = request
            .validity_ms
            .unwrap_or(self.settings.default_validity_ms);

        let token = AuthorizationToken::issue(device_id, tenant_id, validity_ms, self.clock.now());
        self.bounded(self.store.insert_token(&token)).await?;

        info!(
            session_id = %token.id,
            device_id = %token.device_id,
            validity_ms = token.validity_ms(),
            "Issued scan session"
        );

        let payload = match &request.payload {
            PayloadFormat::Code => token.code.clone(),
            PayloadFormat::Url(base) => scan_url(base, &token.code).to_string(),
        };

        Ok(IssuedSession {
            session_id: token.id,
            validity_ms: token.validity_ms(),
            expires_at: token.expires_at,
            device_id: token.device_id,
            payload,
        })
    }
}
