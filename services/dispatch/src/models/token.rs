//! Authorization token model

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::str::FromStr;
use uuid::Uuid;

use crate::{device::DeviceId, error::TokenRejection};

/// Random bytes behind every scan code
pub const CODE_BYTES: usize = 16;

/// Validity window used when the caller does not ask for one
pub const DEFAULT_VALIDITY_MS: i64 = 15_000;

/// Shortest validity window a token can be issued with
pub const MIN_VALIDITY_MS: i64 = 1_000;

/// Stored lifecycle state. Expiry is derived from `expires_at`, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    New,
    Consumed,
}

impl TokenState {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenState::New => "NEW",
            TokenState::Consumed => "CONSUMED",
        }
    }
}

impl FromStr for TokenState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(TokenState::New),
            "CONSUMED" => Ok(TokenState::Consumed),
            other => Err(format!("unknown token state '{}'", other)),
        }
    }
}

/// Single-use capability that lets one scan enqueue one command
#[derive(Debug, Clone)]
pub struct AuthorizationToken {
    pub id: Uuid,
    pub code: String,
    pub device_id: DeviceId,
    pub tenant_id: Option<String>,
    pub state: TokenState,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set iff `state` is `Consumed`
    pub consumed_at: Option<DateTime<Utc>>,
}

impl AuthorizationToken {
    /// Build a fresh token with a random code.
    ///
    /// `validity_ms` is clamped to [`MIN_VALIDITY_MS`].
    pub fn issue(
        device_id: DeviceId,
        tenant_id: Option<String>,
        validity_ms: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: generate_code(),
            device_id,
            tenant_id,
            state: TokenState::New,
            issued_at: now,
            expires_at: now
                .checked_add_signed(Duration::milliseconds(clamp_validity_ms(validity_ms)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            consumed_at: None,
        }
    }

    /// A token can be consumed while it is `New` and strictly before `expires_at`
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.state == TokenState::New && now < self.expires_at
    }

    /// Why this token cannot be consumed at `now`, if it cannot
    pub fn rejection(&self, now: DateTime<Utc>) -> Option<TokenRejection> {
        match self.state {
            TokenState::Consumed => Some(TokenRejection::AlreadyUsed),
            TokenState::New if now >= self.expires_at => Some(TokenRejection::Expired),
            TokenState::New => None,
        }
    }

    /// Transition `New -> Consumed`. Callers must hold exclusive access to the record.
    pub fn consume(&mut self, now: DateTime<Utc>) -> Result<(), TokenRejection> {
        if let Some(rejection) = self.rejection(now) {
            return Err(rejection);
        }
        self.state = TokenState::Consumed;
        self.consumed_at = Some(now);
        Ok(())
    }

    /// Validity window in milliseconds
    pub fn validity_ms(&self) -> i64 {
        (self.expires_at - self.issued_at).num_milliseconds()
    }
}

/// Clamp a requested validity window to the allowed minimum
pub fn clamp_validity_ms(validity_ms: i64) -> i64 {
    validity_ms.max(MIN_VALIDITY_MS)
}

/// Generate a hex encoded scan code from the thread-local CSPRNG
pub fn generate_code() -> String {
    let mut bytes = [0u8; CODE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Shortened code for log lines
pub fn redact_code(code: &str) -> &str {
    code.char_indices().nth(8).map_or(code, |(end, _)| &code[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issued(validity_ms: i64) -> (AuthorizationToken, DateTime<Utc>) {
        let now = Utc::now();
        let device = DeviceId::parse("7").unwrap();
        (AuthorizationToken::issue(device, None, validity_ms, now), now)
    }

    #[test]
    fn test_code_shape() {
        let code = generate_code();
        assert_eq!(code.len(), CODE_BYTES * 2);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(code, generate_code());
    }

    #[test]
    fn test_validity_is_clamped() {
        let (token, now) = issued(10);
        assert_eq!(token.expires_at, now + Duration::milliseconds(MIN_VALIDITY_MS));
        assert_eq!(token.validity_ms(), MIN_VALIDITY_MS);

        let (token, _) = issued(DEFAULT_VALIDITY_MS);
        assert_eq!(token.validity_ms(), DEFAULT_VALIDITY_MS);
    }

    #[test]
    fn test_usable_until_deadline() {
        let (token, now) = issued(1_000);
        assert!(token.is_usable(now));
        assert!(token.is_usable(now + Duration::milliseconds(999)));
        assert!(!token.is_usable(now + Duration::milliseconds(1_000)));
        assert_eq!(
            token.rejection(now + Duration::milliseconds(1_000)),
            Some(TokenRejection::Expired)
        );
    }

    #[test]
    fn test_consume_once() {
        let (mut token, now) = issued(5_000);
        assert!(token.consume(now).is_ok());
        assert_eq!(token.state, TokenState::Consumed);
        assert_eq!(token.consumed_at, Some(now));

        let later = now + Duration::milliseconds(10);
        assert_eq!(token.consume(later), Err(TokenRejection::AlreadyUsed));
        assert_eq!(token.consumed_at, Some(now));
    }

    #[test]
    fn test_state_round_trips_through_text() {
        assert_eq!("NEW".parse::<TokenState>(), Ok(TokenState::New));
        assert_eq!(TokenState::Consumed.as_str(), "CONSUMED");
        assert!("EXPIRED".parse::<TokenState>().is_err());
    }

    #[test]
    fn test_redact_code() {
        assert_eq!(redact_code("0123456789abcdef"), "01234567");
        assert_eq!(redact_code("abc"), "abc");
    }
}
