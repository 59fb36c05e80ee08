//! Error types for astro-live.

use thiserror::Error;

use crate::chart::ChartKind;

/// Main error type for astro-live operations.
#[derive(Error, Debug)]
pub enum AstroLiveError {
    /// Microphone permission was not granted; the session was not started.
    #[error("microphone permission not granted")]
    PermissionDenied,

    /// Connecting to the live endpoint failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The live audio stream dropped or could not be started.
    #[error("stream dropped: {0}")]
    StreamDropped(String),

    /// A teardown step failed. Logged, never propagated by the manager.
    #[error("teardown failed: {0}")]
    Teardown(String),

    /// The astrology API returned no data for a chart.
    #[error("chart data unavailable: {0}")]
    ChartUnavailable(ChartKind),

    /// Birth date could not be parsed.
    #[error("invalid birth date: {0}")]
    InvalidBirthDate(String),

    /// No stored profile or reading for the given key.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

/// Convenience Result type for astro-live operations.
pub type Result<T> = std::result::Result<T, AstroLiveError>;
