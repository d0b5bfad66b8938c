//! Token-gated command dispatch
//!
//! [`DispatchService`] ties the store, the clock and the request timeout
//! together. Each operation lives in its own module:
//!
//! - [`issuer`]: hand out single-use scan codes
//! - [`scanner`]: exchange a code for exactly one `OPEN` command
//! - [`poller`]: serve the oldest pending command of a locker
//! - [`acknowledger`]: record that a locker carried a command out
//! - [`enqueue`]: queue a command without a scan, for trusted callers
//! - [`housekeeping`]: drop tokens that expired long ago

use std::{future::Future, sync::Arc, time::Duration};

use common::error::DatabaseResult;

use crate::{
    clock::Clock,
    error::{DispatchError, DispatchResult},
    models::token::DEFAULT_VALIDITY_MS,
    store::DispatchStore,
};

pub mod acknowledger;
pub mod enqueue;
pub mod housekeeping;
pub mod issuer;
pub mod poller;
pub mod scanner;

pub use issuer::{IssueRequest, IssuedSession, PayloadFormat};
pub use scanner::ScanReceipt;

/// Tunables for [`DispatchService`]
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Validity window applied when an issue request does not carry one
    pub default_validity_ms: i64,
    /// Upper bound on a single store round-trip
    pub store_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_validity_ms: DEFAULT_VALIDITY_MS,
            store_timeout: Duration::from_secs(3),
        }
    }
}

/// Entry point for the dispatch operations
#[derive(Clone)]
pub struct DispatchService {
    store: Arc<dyn DispatchStore>,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
}

impl DispatchService {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Whether the backing store answers within the timeout
    pub async fn health_check(&self) -> DispatchResult<bool> {
        self.bounded(self.store.health_check()).await
    }

    /// Run one store call under the configured timeout.
    ///
    /// A call abandoned on timeout leaves no partial state: single statements
    /// either ran or did not, and an unfinished transaction is rolled back
    /// when dropped.
    async fn bounded<T, F>(&self, call: F) -> DispatchResult<T>
    where
        F: Future<Output = DatabaseResult<T>>,
    {
        match tokio::time::timeout(self.settings.store_timeout, call).await {
            Ok(result) => result.map_err(DispatchError::from),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.settings.store_timeout.as_millis() as u64,
                    "Store call timed out"
                );
                Err(DispatchError::Timeout(self.settings.store_timeout))
            }
        }
    }
}
