//! Command model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::{device::DeviceId, models::token::AuthorizationToken};

/// Physical operation a locker performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandAction {
    Open,
    Close,
}

impl CommandAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandAction::Open => "OPEN",
            CommandAction::Close => "CLOSE",
        }
    }
}

impl FromStr for CommandAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(CommandAction::Open),
            "CLOSE" => Ok(CommandAction::Close),
            other => Err(format!("unknown command action '{}'", other)),
        }
    }
}

/// Delivery status. `Delivered` means acknowledged by the device, not merely fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    Pending,
    Delivered,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Pending => "PENDING",
            CommandStatus::Delivered => "DELIVERED",
        }
    }
}

impl FromStr for CommandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(CommandStatus::Pending),
            "DELIVERED" => Ok(CommandStatus::Delivered),
            other => Err(format!("unknown command status '{}'", other)),
        }
    }
}

/// Queued instruction for a locker
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: Uuid,
    pub device_id: DeviceId,
    pub action: CommandAction,
    pub status: CommandStatus,
    pub origin_token_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Set iff `status` is `Delivered`
    pub ack_at: Option<DateTime<Utc>>,
    /// Outcome reported by the device; informational only
    pub ack_success: Option<bool>,
}

/// Result of recording an acknowledgment
#[derive(Debug, Clone)]
pub enum AckOutcome {
    /// The command moved from `Pending` to `Delivered`
    Acknowledged(Command),
    /// The command was already `Delivered`; nothing changed
    AlreadyAcknowledged(Command),
}

impl AckOutcome {
    pub fn command(&self) -> &Command {
        match self {
            AckOutcome::Acknowledged(command) | AckOutcome::AlreadyAcknowledged(command) => command,
        }
    }

    pub fn was_repeat(&self) -> bool {
        matches!(self, AckOutcome::AlreadyAcknowledged(_))
    }
}

impl Command {
    /// New pending command
    pub fn pending(
        device_id: DeviceId,
        action: CommandAction,
        origin_token_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            action,
            status: CommandStatus::Pending,
            origin_token_id,
            created_at: now,
            ack_at: None,
            ack_success: None,
        }
    }

    /// The `OPEN` command a successful scan of `token` produces
    pub fn for_token(token: &AuthorizationToken, now: DateTime<Utc>) -> Self {
        Self::pending(token.device_id.clone(), CommandAction::Open, Some(token.id), now)
    }

    pub fn is_pending(&self) -> bool {
        self.status == CommandStatus::Pending
    }

    /// Mark delivered. A second call keeps the first acknowledgment intact.
    pub fn acknowledge(&mut self, success: bool, now: DateTime<Utc>) -> AckOutcome {
        if !self.is_pending() {
            return AckOutcome::AlreadyAcknowledged(self.clone());
        }
        self.status = CommandStatus::Delivered;
        self.ack_at = Some(now);
        self.ack_success = Some(success);
        AckOutcome::Acknowledged(self.clone())
    }
}
