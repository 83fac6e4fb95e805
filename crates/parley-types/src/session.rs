//! Streaming session identity and lifecycle status.

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of one streaming session.
///
/// Generated from a random UUID v4, so two live sessions sharing an id is not
/// a realistic failure mode. The registry still rejects collisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// Lets the registry look sessions up by the raw query-string value.
impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a streaming session.
///
/// `Connecting -> Active -> {Aborted, Closed}`; both terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connecting,
    Active,
    Aborted,
    Closed,
}

impl SessionStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Aborted | SessionStatus::Closed)
    }

    /// Compact encoding for storage in an atomic.
    pub fn as_u8(self) -> u8 {
        match self {
            SessionStatus::Connecting => 0,
            SessionStatus::Active => 1,
            SessionStatus::Aborted => 2,
            SessionStatus::Closed => 3,
        }
    }

    /// Inverse of [`SessionStatus::as_u8`]. Unknown values decode as `Closed`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionStatus::Connecting,
            1 => SessionStatus::Active,
            2 => SessionStatus::Aborted,
            _ => SessionStatus::Closed,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Aborted => write!(f, "aborted"),
            SessionStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Point-in-time view of a registered session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

/// Handshake payload announced as the first event of a streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub session_id: SessionId,
    pub post_endpoint: String,
}

impl Handshake {
    /// The URI a client posts messages to: `<post_endpoint>?sessionId=<id>`.
    pub fn message_uri(&self) -> String {
        format!("{}?sessionId={}", self.post_endpoint, self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_unique() {
        let ids: HashSet<SessionId> = (0..1_000).map(|_| SessionId::generate()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn status_u8_roundtrip() {
        for status in [
            SessionStatus::Connecting,
            SessionStatus::Active,
            SessionStatus::Aborted,
            SessionStatus::Closed,
        ] {
            assert_eq!(SessionStatus::from_u8(status.as_u8()), status);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!SessionStatus::Connecting.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Aborted.is_terminal());
        assert!(SessionStatus::Closed.is_terminal());
    }

    #[test]
    fn handshake_message_uri() {
        let handshake = Handshake {
            session_id: SessionId::from("abc123"),
            post_endpoint: "/messages".to_string(),
        };
        assert_eq!(handshake.message_uri(), "/messages?sessionId=abc123");

        let json = serde_json::to_value(&handshake).unwrap();
        assert_eq!(json["sessionId"], "abc123");
        assert_eq!(json["postEndpoint"], "/messages");
    }
}
