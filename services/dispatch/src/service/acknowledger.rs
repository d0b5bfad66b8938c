//! Command acknowledgment

use tracing::info;
use uuid::Uuid;

use super::DispatchService;
use crate::{
    error::{DispatchError, DispatchResult},
    models::AckOutcome,
};

impl DispatchService {
    /// Mark a command delivered.
    ///
    /// `success` is the device's report on the physical action and is stored
    /// as-is; a failed action is not re-queued. Acknowledging a command that
    /// is already delivered succeeds without touching it and returns
    /// [`AckOutcome::AlreadyAcknowledged`].
    pub async fn acknowledge(&self, command_id: &str, success: bool) -> DispatchResult<AckOutcome> {
        let id = Uuid::parse_str(command_id.trim())
            .map_err(|_| DispatchError::CommandNotFound(command_id.to_string()))?;

        let now = self.clock.now();
        let outcome = self
            .bounded(self.store.acknowledge_command(id, success, now))
            .await?
            .ok_or_else(|| DispatchError::CommandNotFound(id.to_string()))?;

        let command = outcome.command();
        info!(
            command_id = %command.id,
            device_id = %command.device_id,
            success,
            repeat = outcome.was_repeat(),
            "Command acknowledged"
        );
        Ok(outcome)
    }
}
