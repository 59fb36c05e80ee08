//! Audio focus guard: take focus, route to speaker, restore on release.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::focus::{select_strategy, FocusHandle, FocusStrategy};
use super::{
    AudioDevice, AudioMode, AudioRoutingSnapshot, FocusChange, FocusRequestResult,
    PlatformCapabilities,
};

/// Capacity of the focus change channel.
const FOCUS_EVENT_CAPACITY: usize = 16;

/// State held between `acquire` and `release`.
#[derive(Debug, Default)]
struct Lease {
    previous_mode: Option<AudioMode>,
    previous_speakerphone: Option<bool>,
    handle: Option<FocusHandle>,
    held: bool,
    stats: LeaseStats,
}

/// Acquire/release counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaseStats {
    /// Number of acquisitions that took a lease.
    pub acquired: u64,
    /// Number of releases that gave a lease back.
    pub released: u64,
}

impl LeaseStats {
    /// Leases taken but not yet given back.
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

/// Guards exclusive, speaker-routed audio for a live conversation.
///
/// Every step of [`acquire`](Self::acquire) and [`release`](Self::release)
/// is best-effort: failures are logged and the remaining steps still run.
pub struct AudioFocusGuard {
    device: Arc<dyn AudioDevice>,
    strategy: Box<dyn FocusStrategy>,
    events: broadcast::Sender<FocusChange>,
    lease: Mutex<Lease>,
}

impl AudioFocusGuard {
    /// Create a guard, choosing the focus strategy from `capabilities`.
    pub fn new(device: Arc<dyn AudioDevice>, capabilities: PlatformCapabilities) -> Self {
        Self::with_strategy(device, select_strategy(capabilities))
    }

    /// Create a guard with an explicit strategy.
    pub fn with_strategy(device: Arc<dyn AudioDevice>, strategy: Box<dyn FocusStrategy>) -> Self {
        let (events, _) = broadcast::channel(FOCUS_EVENT_CAPACITY);
        Self {
            device,
            strategy,
            events,
            lease: Mutex::new(Lease::default()),
        }
    }

    /// Subscribe to focus changes delivered by the platform.
    pub fn subscribe(&self) -> broadcast::Receiver<FocusChange> {
        self.events.subscribe()
    }

    /// Name of the active focus strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Whether a lease is currently held.
    pub fn is_held(&self) -> bool {
        self.lock().held
    }

    /// Routing captured by the current lease, if both values were read.
    pub fn snapshot(&self) -> Option<AudioRoutingSnapshot> {
        let lease = self.lock();
        match (lease.previous_mode, lease.previous_speakerphone) {
            (Some(mode), Some(speakerphone)) => Some(AudioRoutingSnapshot { mode, speakerphone }),
            _ => None,
        }
    }

    /// Acquire/release counters.
    pub fn stats(&self) -> LeaseStats {
        self.lock().stats
    }

    /// Snapshot routing, request focus, then route audio to the speaker.
    ///
    /// A second acquire while a lease is held is ignored so the original
    /// snapshot survives.
    pub fn acquire(&self) {
        let mut lease = self.lock();
        if lease.held {
            debug!("audio focus already held");
            return;
        }
        debug!(strategy = self.strategy.name(), "requesting audio focus");

        // Fresh values every cycle.
        lease.previous_mode = None;
        lease.previous_speakerphone = None;
        match self.device.mode() {
            Ok(mode) => lease.previous_mode = Some(mode),
            Err(e) => warn!(error = %e, "could not capture previous audio mode"),
        }
        match self.device.is_speakerphone_on() {
            Ok(on) => lease.previous_speakerphone = Some(on),
            Err(e) => warn!(error = %e, "could not capture previous speakerphone state"),
        }

        match self.strategy.request(self.device.as_ref(), &self.events) {
            Ok((handle, result)) => {
                debug!(?result, "audio focus request result");
                if result != FocusRequestResult::Granted {
                    warn!(strategy = self.strategy.name(), ?result, "audio focus not granted");
                }
                lease.handle = Some(handle);
            }
            Err(e) => {
                warn!(strategy = self.strategy.name(), error = %e, "failed to request audio focus")
            }
        }

        if let Err(e) = self.device.set_mode(AudioMode::Normal) {
            warn!(error = %e, "failed to set audio mode");
        }
        match self.device.set_speakerphone_on(true) {
            Ok(()) => debug!("audio routed to speaker"),
            Err(e) => warn!(error = %e, "failed to route audio to speaker"),
        }

        lease.held = true;
        lease.stats.acquired += 1;
    }

    /// Abandon focus and restore the captured routing. Safe to call when
    /// nothing was acquired.
    pub fn release(&self) {
        let mut lease = self.lock();
        if !lease.held {
            return;
        }
        debug!("abandoning audio focus");

        if let Some(handle) = lease.handle.take() {
            if let Err(e) = self.strategy.abandon(self.device.as_ref(), &handle) {
                warn!(error = %e, "error abandoning audio focus");
            }
        }

        if let Some(mode) = lease.previous_mode.take() {
            if let Err(e) = self.device.set_mode(mode) {
                warn!(error = %e, "failed to restore audio mode");
            }
        }
        if let Some(on) = lease.previous_speakerphone.take() {
            if let Err(e) = self.device.set_speakerphone_on(on) {
                warn!(error = %e, "failed to restore speakerphone state");
            }
        }

        lease.held = false;
        lease.stats.released += 1;
        debug!("restored previous audio routing");
    }

    fn lock(&self) -> MutexGuard<'_, Lease> {
        // A panic mid-release must not wedge later releases.
        self.lease.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for AudioFocusGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFocusGuard")
            .field("strategy", &self.strategy.name())
            .field("lease", &*self.lock())
            .finish()
    }
}
