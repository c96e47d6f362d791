use serde::Serialize;
use thiserror::Error;

use crate::models::Locale;

/// Errors that can end or degrade a sync cycle
///
/// Cloneable so one failure can be handed to every caller that joined the
/// same in-flight sync.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    /// Missing or malformed credentials / settings. Never reaches the network.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network failure, non-2xx response, timeout or unreadable body
    #[error("Transport error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// Upstream answered with nothing while we still hold listings
    #[error("Upstream returned no listings, keeping previous snapshot of {previous} listings")]
    EmptyResult { previous: usize },

    /// The refresh task itself blew up
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Short machine-readable tag, used in status payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Transport { .. } => "transport",
            Self::EmptyResult { .. } => "empty_result",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// A non-default locale that could not be fetched during a cycle
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocaleFailure {
    pub locale: Locale,
    pub message: String,
}

impl LocaleFailure {
    pub fn new(locale: Locale, error: &SyncError) -> Self {
        Self {
            locale,
            message: error.to_string(),
        }
    }
}
