use thiserror::Error;

/// Top-level error type for the `halite-api` crate.
///
/// Covers every failure mode of the vendor cloud surface: login,
/// bearer-token validation, device reads, and config/action writes.
/// `halite-core` maps these into poll-cycle outcomes.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Credentials rejected by the login endpoint. Not retried — the
    /// user has to re-enter credentials.
    #[error("Login failed: {message}")]
    Login { message: String },

    /// Bearer token expired or revoked (401/403 mid-cycle). The caller
    /// clears the cached token and re-logs-in on the next attempt.
    #[error("Invalid or expired token: {context}")]
    InvalidToken { context: String },

    // ── Writes ──────────────────────────────────────────────────────
    /// The vendor accepted the request but rejected the operation.
    #[error("Operation '{operation}' failed: {message}")]
    OperationFailed { operation: String, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error means auth has expired and clearing
    /// the token + re-login might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Login { .. } | Self::InvalidToken { .. })
    }
}
