//! Dispatch domain models

pub mod command;
pub mod token;

// Re-export for convenience
pub use command::{AckOutcome, Command, CommandAction, CommandStatus};
pub use token::{AuthorizationToken, TokenState};
