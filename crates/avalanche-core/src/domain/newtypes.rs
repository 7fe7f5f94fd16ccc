//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for pipeline identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based ID types
// ============================================================================

/// Identifier of a single telemetry event, assigned by the emitting feature side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Create a new random EventId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an EventId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid event UUID: {e}")))
    }
}

/// Identifier of a transmitted batch, echoed back by the acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Create a new random BatchId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BatchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid batch UUID: {e}")))
    }
}

/// Durable per-installation identifier, stable across restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallId(Uuid);

impl InstallId {
    /// Generate a fresh random InstallId
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an InstallId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for InstallId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstallId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid install UUID: {e}")))
    }
}

// ============================================================================
// Storage token
// ============================================================================

/// Opaque token assigned by storage on append
///
/// Tokens are monotonic: within one channel, a lower token was appended earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventToken(i64);

impl EventToken {
    /// Wrap a raw sequence number
    #[must_use]
    pub const fn new(seq: i64) -> Self {
        Self(seq)
    }

    /// Get the raw sequence number
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl Display for EventToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// String-based types
// ============================================================================

/// Maximum length of a channel name
const MAX_CHANNEL_NAME_LEN: usize = 64;

/// Name of a logical event stream (one per feature category)
///
/// Format: 1-64 ASCII characters from `[A-Za-z0-9_.-]`, e.g. `"analytics"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
    /// Create a new ChannelName
    ///
    /// # Errors
    /// Returns error if the name is empty, too long, or contains invalid characters
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.is_empty() {
            return Err(DomainError::InvalidChannelName(
                "Channel name cannot be empty".to_string(),
            ));
        }

        if name.len() > MAX_CHANNEL_NAME_LEN {
            return Err(DomainError::InvalidChannelName(format!(
                "Channel name exceeds {MAX_CHANNEL_NAME_LEN} characters: {name}"
            )));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(DomainError::InvalidChannelName(format!(
                "Channel name contains invalid characters: {name}"
            )));
        }

        Ok(Self(name))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChannelName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ChannelName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ChannelName> for String {
    fn from(name: ChannelName) -> Self {
        name.0
    }
}

/// Application secret identifying the app to the ingestion backend
///
/// The secret is trimmed and must not be empty. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct AppSecret(String);

impl AppSecret {
    /// Create a new AppSecret
    ///
    /// # Errors
    /// Returns error if the secret is empty or whitespace-only
    pub fn new(secret: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = secret.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidSecret(
                "Application secret cannot be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the secret value for transmission
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AppSecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("AppSecret(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod id_tests {
        use super::*;

        #[test]
        fn test_event_ids_are_unique() {
            assert_ne!(EventId::new(), EventId::new());
        }

        #[test]
        fn test_install_id_from_str() {
            let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
            let id: InstallId = uuid_str.parse().unwrap();
            assert_eq!(id.to_string(), uuid_str);
        }

        #[test]
        fn test_install_id_from_str_trims_whitespace() {
            let id: InstallId = " 550e8400-e29b-41d4-a716-446655440000\n".parse().unwrap();
            assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
        }

        #[test]
        fn test_install_id_from_str_invalid() {
            let result: Result<InstallId, _> = "not-a-uuid".parse();
            assert!(matches!(result, Err(DomainError::InvalidId(_))));
        }

        #[test]
        fn test_event_token_ordering() {
            assert!(EventToken::new(1) < EventToken::new(2));
            assert_eq!(EventToken::new(7).to_string(), "#7");
        }
    }

    mod channel_name_tests {
        use super::*;

        #[test]
        fn test_valid_names() {
            for name in ["analytics", "crashes", "push.v2", "a_b-c", "A1"] {
                assert!(ChannelName::new(name).is_ok(), "{name} should be valid");
            }
        }

        #[test]
        fn test_empty_name_rejected() {
            assert!(matches!(
                ChannelName::new(""),
                Err(DomainError::InvalidChannelName(_))
            ));
        }

        #[test]
        fn test_invalid_characters_rejected() {
            assert!(ChannelName::new("has space").is_err());
            assert!(ChannelName::new("slash/name").is_err());
            assert!(ChannelName::new("emoji\u{1F600}").is_err());
        }

        #[test]
        fn test_too_long_rejected() {
            let name = "a".repeat(65);
            assert!(ChannelName::new(name).is_err());
            assert!(ChannelName::new("a".repeat(64)).is_ok());
        }

        #[test]
        fn test_serde_validates() {
            let ok: ChannelName = serde_json::from_str("\"analytics\"").unwrap();
            assert_eq!(ok.as_str(), "analytics");

            let bad: Result<ChannelName, _> = serde_json::from_str("\"bad name\"");
            assert!(bad.is_err());
        }
    }

    mod secret_tests {
        use super::*;

        #[test]
        fn test_secret_trimmed() {
            let secret = AppSecret::new("  abc-123  ").unwrap();
            assert_eq!(secret.expose(), "abc-123");
        }

        #[test]
        fn test_empty_secret_rejected() {
            assert!(AppSecret::new("").is_err());
            assert!(AppSecret::new("   ").is_err());
        }

        #[test]
        fn test_debug_is_redacted() {
            let secret = AppSecret::new("super-secret").unwrap();
            assert_eq!(format!("{secret:?}"), "AppSecret(***)");
        }
    }
}
