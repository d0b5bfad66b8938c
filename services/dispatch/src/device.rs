//! Locker identifier canonicalization

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::OnceLock};

use crate::error::DispatchError;

const PREFIX: &str = "LOCKER_";
const MIN_DIGITS: usize = 3;

/// Canonical locker identifier, e.g. `LOCKER_007`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Normalize an external locker identifier.
    ///
    /// `7` and `007` both become `LOCKER_007`; an id already carrying the
    /// prefix is only uppercased.
    pub fn parse(raw: &str) -> Result<Self, DispatchError> {
        let raw = raw.trim();
        if raw.is_empty() || raw.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(DispatchError::InvalidDevice);
        }

        static PREFIXED: OnceLock<Regex> = OnceLock::new();
        let prefixed = PREFIXED
            .get_or_init(|| Regex::new(r"(?i)^locker_(.*)$").expect("Failed to compile locker regex"));

        let canonical = match prefixed.captures(raw) {
            Some(caps) if caps[1].is_empty() => return Err(DispatchError::InvalidDevice),
            Some(_) => raw.to_uppercase(),
            None => format!("{}{:0>width$}", PREFIX, raw, width = MIN_DIGITS),
        };

        Ok(DeviceId(canonical))
    }

    /// Wrap a value read back from the store, which is already canonical
    pub(crate) fn from_stored(value: String) -> Self {
        DeviceId(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
