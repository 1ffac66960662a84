//! Correlation tokens
//!
//! A correlation token ties an upload to the WebSocket opened later by the
//! same browser session. Tokens are random UUIDs issued by the server; a
//! cookie value that does not parse as one is treated as no token at all.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Why a presented token was refused
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenError {
    #[error("Correlation token cannot be empty")]
    Empty,

    #[error("Correlation token is not a valid UUID: {0}")]
    Malformed(String),
}

/// A server-issued correlation token
///
/// Compared by UUID value, so the hyphenated and simple spellings of the
/// same token are equal. Always rendered in the simple form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    /// Issue a fresh random token
    pub fn generate() -> Self {
        CorrelationToken(Uuid::new_v4())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for CorrelationToken {
    fn from(uuid: Uuid) -> Self {
        CorrelationToken(uuid)
    }
}

impl FromStr for CorrelationToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TokenError::Empty);
        }
        Uuid::try_parse(s)
            .map(CorrelationToken)
            .map_err(|e| TokenError::Malformed(e.to_string()))
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
