//! Live conversation sessions.
//!
//! [`LiveSessionManager`] owns the lifecycle of one logical conversation
//! against a [`LiveEndpoint`]: connect, monitor, reconnect a bounded number
//! of times, and release the device audio on the way out.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use astro_live::audio::{AudioFocusGuard, PlatformCapabilities, SoftwareAudioDevice};
//! use astro_live::live::{
//!     AudioBridge, ChartContext, GeminiLiveEndpoint, LiveSessionManager, LiveSettings,
//!     SessionConfig, StaticPermission,
//! };
//!
//! #[tokio::main]
//! async fn main() -> astro_live::Result<()> {
//!     let settings = LiveSettings::default();
//!     let config = SessionConfig::for_chart(&settings, &ChartContext::default());
//!     let (bridge, _mic, _events) = AudioBridge::channel(64);
//!     let endpoint = GeminiLiveEndpoint::new(&settings, "api-key", bridge);
//!     let guard = AudioFocusGuard::new(
//!         Arc::new(SoftwareAudioDevice::new()),
//!         PlatformCapabilities::default(),
//!     );
//!
//!     let manager = LiveSessionManager::new(
//!         config,
//!         Arc::new(endpoint),
//!         guard,
//!         Arc::new(StaticPermission::granted()),
//!     );
//!     manager.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     manager.stop().await;
//!     Ok(())
//! }
//! ```

mod config;
pub mod gemini;
mod handle;
mod id;
mod manager;
mod permission;
mod retry;
mod state;

pub use config::{ChartContext, LiveSettings, ResponseModality, SessionConfig};
pub use gemini::{AudioBridge, AudioChunk, GeminiLiveEndpoint, LiveEvent};
pub use handle::{LiveEndpoint, LiveSession};
pub use id::SessionId;
pub use manager::{LiveSessionManager, LoopDiagnostics};
pub use permission::{PermissionGate, StaticPermission};
pub use retry::{
    ReconnectPolicy, RetryDecision, RetryState, MAX_RECONNECT_ATTEMPTS, POLL_INTERVAL,
    RECONNECT_DELAY,
};
pub use state::{ConnectionState, LoopPhase, ManagerState};
