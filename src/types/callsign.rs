//! Station callsign type

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{FeedError, Result};

/// Longest station identifier accepted on APRS-IS (callsign plus `-SSID`).
pub const MAX_CALLSIGN_LEN: usize = 9;

/// Normalized station identifier.
///
/// Stored uppercase. Accepts ASCII letters, digits and `-`, at most
/// [`MAX_CALLSIGN_LEN`] characters, which covers amateur callsigns with an SSID
/// as well as the tactical and CWOP identifiers seen on APRS-IS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Callsign(String);

impl Callsign {
    /// Parse and normalize a callsign.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= MAX_CALLSIGN_LEN
            && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !trimmed.starts_with('-')
            && !trimmed.ends_with('-');

        if !valid {
            return Err(FeedError::InvalidCallsign { callsign: raw.to_string() });
        }

        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// The callsign as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Callsign without the SSID suffix.
    pub fn base(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// SSID suffix, if any.
    pub fn ssid(&self) -> Option<&str> {
        self.0.split_once('-').map(|(_, ssid)| ssid)
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Callsign {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Callsign {
    type Error = FeedError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Callsign> for String {
    fn from(value: Callsign) -> Self {
        value.0
    }
}

impl AsRef<str> for Callsign {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
