// Queue Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Queue used when a worker is started without queue names
pub const DEFAULT_QUEUE: &str = "default";

/// Maximum length of a queue name
pub const MAX_QUEUE_NAME_LEN: usize = 64;

/// Validated queue name
///
/// 1..=64 characters drawn from ASCII alphanumerics and `_ - . :`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("queue name is empty".to_string())
        } else if name.len() > MAX_QUEUE_NAME_LEN {
            Some(format!(
                "queue name too long ({} > {})",
                name.len(),
                MAX_QUEUE_NAME_LEN
            ))
        } else if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
        {
            Some("only alphanumeric characters and _ - . : are allowed".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => Err(DomainError::InvalidQueueName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    pub fn default_queue() -> Self {
        Self(DEFAULT_QUEUE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for QueueName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["default", "high", "emails:v2", "a.b-c_d", "Q1"] {
            assert!(QueueName::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = QueueName::parse("").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_too_long_name_rejected() {
        let err = QueueName::parse("a".repeat(65)).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn test_invalid_chars_rejected() {
        let err = QueueName::parse("bad queue!").unwrap_err();
        assert!(err.to_string().contains("alphanumeric"));
    }
}
