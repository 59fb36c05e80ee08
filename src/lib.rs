//! # astro-live
//!
//! Birth-chart voice consultations over a reconnecting live model session.
//!
//! Charts are fetched from an astrology HTTP API and stored locally; a
//! [`LiveSessionManager`] then holds a voice conversation with a hosted
//! live model that receives the chart as context, reconnecting a bounded
//! number of times and releasing device audio on every exit path.
//!
//! ## Features
//!
//! - **Reconnecting sessions**: fixed-delay, capped reconnect loop with
//!   cooperative cancellation
//! - **Audio focus guard**: routing snapshot and restore around every session
//! - **Chart store**: one reading per user in a local JSON file
//! - **Async I/O**: tokio, reqwest and tokio-tungstenite
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use astro_live::chart::{ChartApiClient, ChartApiSettings, ChartRepository, LocalStore};
//!
//! #[tokio::main]
//! async fn main() -> astro_live::Result<()> {
//!     // Initialize logging
//!     astro_live::logging::try_init().ok();
//!
//!     let client = ChartApiClient::from_settings(&ChartApiSettings::default())?;
//!     let store = Arc::new(LocalStore::open("astro-live.json")?);
//!     let repository = ChartRepository::new(Arc::new(client), store);
//!
//!     let context = repository.load_context("Asha")?;
//!     println!("D1: {:?}", context.d1);
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod chart;
pub mod cli;
pub mod config;
pub mod error;
pub mod live;
pub mod logging;

// Re-export commonly used types
pub use audio::{AudioDevice, AudioFocusGuard, PlatformCapabilities, SoftwareAudioDevice};
pub use chart::{BirthDetails, ChartKind, ChartReading, ChartRepository, LocalStore};
pub use error::{AstroLiveError, Result};
pub use live::{
    LiveEndpoint, LiveSession, LiveSessionManager, ManagerState, SessionConfig, SessionId,
};
