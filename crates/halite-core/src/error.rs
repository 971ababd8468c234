// ── Core error types ──
//
// User-facing errors from halite-core. Consumers never see raw HTTP
// status codes or JSON parse failures; the `From<halite_api::Error>`
// impl translates transport-layer errors into domain variants.

use thiserror::Error;

use crate::descriptions::RegistryError;
use crate::model::EntityAction;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach the pool cloud: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Coordinator not connected")]
    NotConnected,

    /// Every retry of a refresh round failed; previous readings remain
    /// in the store.
    #[error("Refresh failed after {attempts} attempts: {last_error}")]
    RefreshExhausted { attempts: u32, last_error: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: u64 },

    #[error("No entity description for key: {key}")]
    UnknownKey { key: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Action {action} not supported by {key}")]
    UnsupportedAction { key: String, action: EntityAction },

    #[error("Invalid action argument: {message}")]
    InvalidArgument { message: String },

    #[error("Operation rejected by the cloud: {message}")]
    Rejected { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<halite_api::Error> for CoreError {
    fn from(err: halite_api::Error) -> Self {
        match err {
            halite_api::Error::Login { message } => {
                CoreError::AuthenticationFailed { message }
            }
            halite_api::Error::InvalidToken { context } => CoreError::AuthenticationFailed {
                message: format!("token rejected during {context}"),
            },
            halite_api::Error::OperationFailed { operation, message } => CoreError::Rejected {
                message: format!("{operation}: {message}"),
            },
            halite_api::Error::Transport(ref e) => CoreError::ConnectionFailed {
                reason: e.to_string(),
            },
            halite_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid base URL: {e}"),
            },
            halite_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            halite_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("deserialization error: {message}"))
            }
        }
    }
}

impl From<halite_config::ConfigError> for CoreError {
    fn from(err: halite_config::ConfigError) -> Self {
        CoreError::Config {
            message: err.to_string(),
        }
    }
}
