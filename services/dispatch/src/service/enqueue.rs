//! Direct enqueue for trusted callers

use tracing::info;

use super::DispatchService;
use crate::{
    device::DeviceId,
    error::DispatchResult,
    models::{Command, CommandAction},
};

impl DispatchService {
    /// Queue a command that did not come from a scan.
    ///
    /// Authorization is the caller's concern; the command carries no origin token.
    pub async fn enqueue(&self, device: &str, action: CommandAction) -> DispatchResult<Command> {
        let device_id = DeviceId::parse(device)?;
        let command = Command::pending(device_id, action, None, self.clock.now());
        self.bounded(self.store.enqueue_command(&command)).await?;

        info!(
            command_id = %command.id,
            device_id = %command.device_id,
            action = command.action.as_str(),
            "Command queued directly"
        );
        Ok(command)
    }
}
