//! In-process store for local development and tests
//!
//! A single mutex guards tokens and commands together, which gives the same
//! all-or-nothing consume semantics as the PostgreSQL transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ConsumeOutcome, DispatchStore};
use crate::{
    device::DeviceId,
    error::TokenRejection,
    models::{AckOutcome, AuthorizationToken, Command, TokenState},
};

#[derive(Debug, Default)]
struct Inner {
    /// Tokens keyed by code
    tokens: HashMap<String, AuthorizationToken>,
    /// Commands in insertion order
    commands: Vec<Command>,
}

/// Store that keeps everything in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DispatchStore for InMemoryStore {
    async fn insert_token(&self, token: &AuthorizationToken) -> DatabaseResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.tokens.contains_key(&token.code) {
            return Err(DatabaseError::Conflict(
                "authorization_tokens.code already exists".to_string(),
            ));
        }
        inner.tokens.insert(token.code.clone(), token.clone());
        Ok(())
    }

    async fn find_token(&self, code: &str) -> DatabaseResult<Option<AuthorizationToken>> {
        let inner = self.inner.lock().await;
        Ok(inner.tokens.get(code).cloned())
    }

    async fn consume_token(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<ConsumeOutcome> {
        let mut inner = self.inner.lock().await;

        let Some(token) = inner.tokens.get_mut(code) else {
            return Ok(ConsumeOutcome::Rejected(TokenRejection::NotFound));
        };
        if let Err(rejection) = token.consume(now) {
            return Ok(ConsumeOutcome::Rejected(rejection));
        }

        let token = token.clone();
        let command = Command::for_token(&token, now);
        inner.commands.push(command.clone());

        Ok(ConsumeOutcome::Consumed { token, command })
    }

    async fn enqueue_command(&self, command: &Command) -> DatabaseResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.commands.iter().any(|c| c.id == command.id) {
            return Err(DatabaseError::Conflict("commands.id already exists".to_string()));
        }
        inner.commands.push(command.clone());
        Ok(())
    }

    async fn next_pending_command(&self, device_id: &DeviceId) -> DatabaseResult<Option<Command>> {
        let inner = self.inner.lock().await;
        let next = inner
            .commands
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_pending() && &c.device_id == device_id)
            .min_by_key(|(seq, c)| (c.created_at, *seq))
            .map(|(_, c)| c.clone());
        Ok(next)
    }

    async fn find_command(&self, id: Uuid) -> DatabaseResult<Option<Command>> {
        let inner = self.inner.lock().await;
        Ok(inner.commands.iter().find(|c| c.id == id).cloned())
    }

    async fn acknowledge_command(
        &self,
        id: Uuid,
        success: bool,
        now: DateTime<Utc>,
    ) -> DatabaseResult<Option<AckOutcome>> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .commands
            .iter_mut()
            .find(|c| c.id == id)
            .map(|c| c.acknowledge(success, now)))
    }

    async fn purge_expired_tokens(&self, cutoff: DateTime<Utc>) -> DatabaseResult<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.tokens.len();
        inner
            .tokens
            .retain(|_, t| !(t.state == TokenState::New && t.expires_at < cutoff));
        Ok((before - inner.tokens.len()) as u64)
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        Ok(true)
    }
}
