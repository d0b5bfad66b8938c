//! Token retention

use chrono::{DateTime, Duration, Utc};

use super::DispatchService;
use crate::error::DispatchResult;

impl DispatchService {
    /// Delete never-consumed tokens whose deadline passed more than `retention` ago.
    ///
    /// Consume evaluates expiry itself, so this only bounds table growth.
    pub async fn purge_expired_tokens(&self, retention: Duration) -> DispatchResult<u64> {
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.bounded(self.store.purge_expired_tokens(cutoff)).await
    }
}
