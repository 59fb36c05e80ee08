//! Seams over the remote live conversation endpoint.

use async_trait::async_trait;

use super::SessionConfig;
use crate::Result;

/// A remote endpoint that opens live conversation sessions.
#[async_trait]
pub trait LiveEndpoint: Send + Sync {
    /// Open a session configured with `config`.
    ///
    /// Fails with [`AstroLiveError::Connect`](crate::AstroLiveError::Connect)
    /// on network or auth failure.
    async fn connect(&self, config: &SessionConfig) -> Result<Box<dyn LiveSession>>;
}

/// One open connection to the live endpoint.
///
/// `stop_stream` and `close` may be called on a half-closed connection; the
/// manager isolates their failures from each other.
#[async_trait]
pub trait LiveSession: Send {
    /// Start the bidirectional audio conversation.
    async fn start_stream(&mut self) -> Result<()>;

    /// Whether the conversation is still running.
    async fn is_active(&mut self) -> Result<bool>;

    /// Stop the audio conversation.
    async fn stop_stream(&mut self) -> Result<()>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}
