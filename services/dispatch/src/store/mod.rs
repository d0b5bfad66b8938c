//! Persistence for authorization tokens and the per-device command queue
//!
//! The store is the only synchronization point between service instances.
//! Every method is a single round-trip; [`DispatchStore::consume_token`] in
//! particular must be one atomic conditional update, never a read followed
//! by a write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use uuid::Uuid;

use crate::{
    device::DeviceId,
    error::TokenRejection,
    models::{AckOutcome, AuthorizationToken, Command},
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Result of an attempt to consume a token
#[derive(Debug, Clone)]
pub enum ConsumeOutcome {
    /// This caller won the token and the command was enqueued with it
    Consumed {
        token: AuthorizationToken,
        command: Command,
    },
    /// The token could not be consumed; nothing was written
    Rejected(TokenRejection),
}

/// Abstraction over dispatch storage backends.
/// Implementations: [`PgStore`] (PostgreSQL) and [`InMemoryStore`].
#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// Persist a freshly issued token. Fails with a conflict if the code exists.
    async fn insert_token(&self, token: &AuthorizationToken) -> DatabaseResult<()>;

    /// Look a token up by its code
    async fn find_token(&self, code: &str) -> DatabaseResult<Option<AuthorizationToken>>;

    /// Atomically move a usable token to `Consumed` and enqueue its `OPEN`
    /// command. Under concurrent calls for the same code exactly one caller
    /// gets [`ConsumeOutcome::Consumed`].
    async fn consume_token(&self, code: &str, now: DateTime<Utc>)
    -> DatabaseResult<ConsumeOutcome>;

    /// Append a command to its device queue
    async fn enqueue_command(&self, command: &Command) -> DatabaseResult<()>;

    /// Oldest pending command for a device, without changing it
    async fn next_pending_command(&self, device_id: &DeviceId) -> DatabaseResult<Option<Command>>;

    /// Look a command up by id
    async fn find_command(&self, id: Uuid) -> DatabaseResult<Option<Command>>;

    /// Mark a command delivered. `None` when no such command exists.
    async fn acknowledge_command(
        &self,
        id: Uuid,
        success: bool,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<AckOutcome>>;

    /// Delete never-consumed tokens that expired before `cutoff`
    async fn purge_expired_tokens(&self, cutoff: DateTime<Utc>) -> DatabaseResult<u64>;

    /// Check that the backend answers
    async fn health_check(&self) -> DatabaseResult<bool>;
}
