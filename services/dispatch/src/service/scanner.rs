//! Scan consumption

use tracing::{info, warn};
use uuid::Uuid;

use super::DispatchService;
use crate::{
    device::DeviceId,
    error::{DispatchError, DispatchResult, TokenRejection},
    models::{CommandAction, token::redact_code},
    store::ConsumeOutcome,
};

/// Codes longer than this were never issued and are not sent to the store
const MAX_CODE_LEN: usize = 128;

/// Confirmation returned to the scanning client
#[derive(Debug, Clone)]
pub struct ScanReceipt {
    pub command_id: Uuid,
    pub device_id: DeviceId,
    pub action: CommandAction,
}

impl DispatchService {
    /// Exchange a scan code for exactly one `OPEN` command.
    ///
    /// The check "state is NEW and not yet expired" and the transition to
    /// CONSUMED happen as one conditional update in the store. Racing scans
    /// of the same code therefore produce a single winner; the others get
    /// [`TokenRejection::AlreadyUsed`].
    pub async fn consume(&self, code: &str) -> DispatchResult<ScanReceipt> {
        let code = code.trim();
        if code.is_empty() {
            return Err(DispatchError::MissingCode);
        }

        let outcome = if code.len() > MAX_CODE_LEN {
            ConsumeOutcome::Rejected(TokenRejection::NotFound)
        } else {
            let now = self.clock.now();
            self.bounded(self.store.consume_token(code, now)).await?
        };

        match outcome {
            ConsumeOutcome::Consumed { token, command } => {
                info!(
                    session_id = %token.id,
                    command_id = %command.id,
                    device_id = %command.device_id,
                    "Scan accepted, command queued"
                );
                Ok(ScanReceipt {
                    command_id: command.id,
                    device_id: command.device_id,
                    action: command.action,
                })
            }
            ConsumeOutcome::Rejected(rejection) => {
                warn!(
                    code_prefix = redact_code(code),
                    reason = rejection.as_str(),
                    "Scan rejected"
                );
                Err(DispatchError::TokenRejected(rejection))
            }
        }
    }
}
