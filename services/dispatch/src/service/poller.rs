//! Per-device command polling

use tracing::debug;

use super::DispatchService;
use crate::{device::DeviceId, error::DispatchResult, models::Command};

impl DispatchService {
    /// Oldest pending command for a locker, or `None` when its queue is empty.
    ///
    /// Read-only: repeated polls before an acknowledgment return the same
    /// command, so a device that crashed mid-delivery simply polls again.
    pub async fn next_command(&self, device: &str) -> DispatchResult<Option<Command>> {
        let device_id = DeviceId::parse(device)?;
        let command = self
            .bounded(self.store.next_pending_command(&device_id))
            .await?;

        if let Some(command) = &command {
            debug!(device_id = %device_id, command_id = %command.id, "Serving pending command");
        }
        Ok(command)
    }
}
