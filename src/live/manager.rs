//! Live session lifecycle and reconnect loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handle::{LiveEndpoint, LiveSession};
use super::id::SessionId;
use super::permission::PermissionGate;
use super::retry::{ReconnectPolicy, RetryDecision, RetryState};
use super::state::{ConnectionState, LoopPhase, ManagerState};
use super::SessionConfig;
use crate::audio::{AudioFocusGuard, FocusChange, LeaseStats};
use crate::error::AstroLiveError;
use crate::Result;

/// One connection attempt and, once connected, its session handle.
struct Session {
    id: SessionId,
    state: ConnectionState,
    handle: Option<Box<dyn LiveSession>>,
    connected_at: Option<Instant>,
}

impl Session {
    fn connecting() -> Self {
        let mut session = Self {
            id: SessionId::new(),
            state: ConnectionState::Disconnected,
            handle: None,
            connected_at: None,
        };
        session.transition(ConnectionState::Connecting);
        session
    }

    fn attach(&mut self, handle: Box<dyn LiveSession>) -> &mut Box<dyn LiveSession> {
        self.transition(ConnectionState::Connected);
        self.connected_at = Some(Instant::now());
        self.handle.insert(handle)
    }

    fn transition(&mut self, target: ConnectionState) {
        if !self.state.can_transition_to(target) {
            debug!(session_id = %self.id, from = ?self.state, to = ?target, "unexpected connection transition");
        }
        self.state = target;
    }
}

/// Point-in-time view of the loop internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopDiagnostics {
    /// Current loop phase.
    pub phase: LoopPhase,
    /// Failures since the last successful connect.
    pub retry_attempts: u32,
    /// Connects issued since the manager was created.
    pub connect_attempts: u64,
    /// Audio focus lease counters.
    pub focus: LeaseStats,
}

/// How a connected session ended.
enum SessionEnd {
    /// Cancellation was requested.
    Cancelled,
    /// The stream could not start, went inactive, or the liveness check failed.
    Dropped(AstroLiveError),
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Shared {
    config: SessionConfig,
    endpoint: Arc<dyn LiveEndpoint>,
    permissions: Arc<dyn PermissionGate>,
    guard: AudioFocusGuard,
    policy: ReconnectPolicy,
    listening: AtomicBool,
    state: watch::Sender<ManagerState>,
    phase: Mutex<LoopPhase>,
    retry: Mutex<RetryState>,
    connect_attempts: AtomicU64,
    session: tokio::sync::Mutex<Option<Session>>,
}

/// Releases the audio focus if the worker future is dropped mid-flight.
struct ReleaseOnDrop<'a>(&'a AudioFocusGuard);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Owns one logical live conversation: connects, watches the session,
/// reconnects a bounded number of times, and always gives the device audio
/// back when it is done.
///
/// At most one worker runs per manager. Callers serialize `start` and
/// `stop` on a given instance.
pub struct LiveSessionManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl LiveSessionManager {
    /// Create a manager with the default reconnect policy.
    pub fn new(
        config: SessionConfig,
        endpoint: Arc<dyn LiveEndpoint>,
        guard: AudioFocusGuard,
        permissions: Arc<dyn PermissionGate>,
    ) -> Self {
        Self::with_policy(config, endpoint, guard, permissions, ReconnectPolicy::default())
    }

    /// Create a manager with an explicit reconnect policy.
    pub fn with_policy(
        config: SessionConfig,
        endpoint: Arc<dyn LiveEndpoint>,
        guard: AudioFocusGuard,
        permissions: Arc<dyn PermissionGate>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ManagerState::Idle);
        Self {
            shared: Arc::new(Shared {
                config,
                endpoint,
                permissions,
                guard,
                policy,
                listening: AtomicBool::new(false),
                state,
                phase: Mutex::new(LoopPhase::Idle),
                retry: Mutex::new(RetryState::new(&policy)),
                connect_attempts: AtomicU64::new(0),
                session: tokio::sync::Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Session configuration shared by every connection.
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Coarse caller-facing state.
    pub fn state(&self) -> ManagerState {
        *self.shared.state.borrow()
    }

    /// Watch coarse state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ManagerState> {
        self.shared.state.subscribe()
    }

    /// Subscribe to audio focus changes.
    pub fn subscribe_focus(&self) -> tokio::sync::broadcast::Receiver<FocusChange> {
        self.shared.guard.subscribe()
    }

    /// Loop internals, for logging and tests.
    pub fn diagnostics(&self) -> LoopDiagnostics {
        LoopDiagnostics {
            phase: *lock(&self.shared.phase),
            retry_attempts: lock(&self.shared.retry).attempts(),
            connect_attempts: self.shared.connect_attempts.load(Ordering::SeqCst),
            focus: self.shared.guard.stats(),
        }
    }

    /// Start listening. Must be called within a tokio runtime.
    ///
    /// Returns `Ok(())` without doing anything if a worker is already
    /// running, and [`AstroLiveError::PermissionDenied`] if the microphone
    /// permission is missing.
    pub fn start(&self) -> Result<()> {
        info!("start listening requested");
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| AstroLiveError::LockPoisoned)?;

        if worker.as_ref().is_some_and(|w| self.shared.is_running(w)) {
            warn!("live session already running, ignoring start");
            return Ok(());
        }

        if !self.shared.permissions.microphone_granted() {
            error!("microphone permission not granted");
            return Err(AstroLiveError::PermissionDenied);
        }

        self.shared.listening.store(true, Ordering::SeqCst);
        lock(&self.shared.retry).reset();
        self.shared.state.send_replace(ManagerState::Listening);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.shared.clone().run(cancel.clone()));
        *worker = Some(Worker { cancel, handle });
        Ok(())
    }

    /// Stop listening and wait for the worker to unwind, then tear down
    /// whatever is left. Safe to call when never started.
    pub async fn stop(&self) {
        info!("stop listening requested");
        self.shared.listening.store(false, Ordering::SeqCst);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(worker) = worker {
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                if e.is_panic() {
                    error!(error = %e, "live session worker panicked");
                }
            }
        }

        self.shared.teardown().await;
        self.shared.force_phase(LoopPhase::Idle);
        self.shared.state.send_replace(ManagerState::Idle);
        info!("live session stopped");
    }
}

impl Drop for LiveSessionManager {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker {
            // The worker unwinds on its own and releases focus on the way out.
            self.shared.listening.store(false, Ordering::SeqCst);
            worker.cancel.cancel();
        }
    }
}

impl Shared {
    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// A worker that has published `Stopped` has no side effects left, even
    /// if its task has not been reaped yet.
    fn is_running(&self, worker: &Worker) -> bool {
        !worker.handle.is_finished() && *self.state.borrow() != ManagerState::Stopped
    }

    fn set_phase(&self, target: LoopPhase) {
        let mut phase = lock(&self.phase);
        if !phase.can_transition_to(target) {
            debug!(from = ?*phase, to = ?target, "unexpected loop transition");
        }
        *phase = target;
    }

    fn force_phase(&self, target: LoopPhase) {
        *lock(&self.phase) = target;
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let exhausted = {
            let _release = ReleaseOnDrop(&self.guard);
            let exhausted = self.listen(&cancel).await;

            self.set_phase(LoopPhase::Stopping);
            self.listening.store(false, Ordering::SeqCst);
            self.teardown().await;
            self.set_phase(LoopPhase::Idle);
            exhausted
        };

        debug!(exhausted, "exiting listen loop");
        // Last action of the worker, so a restart may follow immediately.
        if exhausted {
            self.state.send_replace(ManagerState::Stopped);
        }
    }

    /// Connect, monitor and reconnect until cancelled or out of attempts.
    /// Returns whether the attempts ran out.
    async fn listen(&self, cancel: &CancellationToken) -> bool {
        while self.is_listening() {
            self.set_phase(LoopPhase::Connecting);
            let attempt = lock(&self.retry).attempts() + 1;
            info!(
                attempt,
                max_attempts = self.policy.max_attempts,
                model = self.config.model(),
                "connecting to live model"
            );
            self.connect_attempts.fetch_add(1, Ordering::SeqCst);
            *self.session.lock().await = Some(Session::connecting());

            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                result = self.endpoint.connect(&self.config) => result,
            };

            let failure = match connected {
                Ok(handle) => match self.run_session(handle, cancel).await {
                    SessionEnd::Cancelled => return false,
                    SessionEnd::Dropped(reason) => reason,
                },
                Err(e) => {
                    error!(error = %e, "connection to live model failed");
                    e
                }
            };

            if !self.is_listening() || cancel.is_cancelled() {
                return false;
            }

            let decision = lock(&self.retry).record_failure();
            match decision {
                RetryDecision::Retry { attempt, delay } => {
                    self.set_phase(LoopPhase::Reconnecting);
                    info!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %failure,
                        "reconnecting to live model"
                    );
                    self.teardown().await;

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return false,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp { attempts } => {
                    error!(attempts, reason = %failure, "max reconnect attempts reached, stopping");
                    return true;
                }
            }
        }
        false
    }

    /// Drive one connected session until it drops or cancellation fires.
    async fn run_session(&self, handle: Box<dyn LiveSession>, cancel: &CancellationToken) -> SessionEnd {
        let mut slot = self.session.lock().await;
        let session = slot.get_or_insert_with(Session::connecting);
        let session_id = session.id;
        let live = session.attach(handle);
        lock(&self.retry).reset();
        info!(session_id = %session_id, "connected to live model");

        let mut focus_events = self.guard.subscribe();
        self.guard.acquire();

        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            result = live.start_stream() => result,
        };
        if let Err(e) = started {
            error!(session_id = %session_id, error = %e, "failed to start audio conversation");
            return SessionEnd::Dropped(AstroLiveError::StreamDropped(e.to_string()));
        }
        session.transition(ConnectionState::Active);
        drop(slot);

        self.set_phase(LoopPhase::Monitoring);
        info!(session_id = %session_id, "audio conversation running");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                _ = tokio::time::sleep(self.policy.poll_interval) => {}
            }
            if !self.is_listening() {
                return SessionEnd::Cancelled;
            }

            while let Ok(change) = focus_events.try_recv() {
                debug!(session_id = %session_id, ?change, "audio focus changed");
            }

            let mut slot = self.session.lock().await;
            let Some(session) = slot.as_mut() else {
                return SessionEnd::Dropped(AstroLiveError::StreamDropped(
                    "session cleared".into(),
                ));
            };
            let connected_at = session.connected_at;
            let Some(live) = session.handle.as_mut() else {
                return SessionEnd::Dropped(AstroLiveError::StreamDropped(
                    "session has no connection".into(),
                ));
            };

            let active = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                result = live.is_active() => result,
            };
            match active {
                Ok(true) => {}
                Ok(false) => {
                    info!(
                        session_id = %session_id,
                        uptime_secs = connected_at.map_or(0, |t| t.elapsed().as_secs()),
                        "conversation ended"
                    );
                    return SessionEnd::Dropped(AstroLiveError::StreamDropped(
                        "conversation ended".into(),
                    ));
                }
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "error checking conversation status");
                    return SessionEnd::Dropped(e);
                }
            }
        }
    }

    /// Best-effort teardown. Each step runs even if an earlier one fails.
    async fn teardown(&self) {
        let session = self.session.lock().await.take();

        if let Some(mut session) = session {
            debug!(session_id = %session.id, "cleaning up session");
            let streaming = session.state.is_streaming();

            if let Some(mut live) = session.handle.take() {
                session.transition(ConnectionState::Closing);
                if streaming {
                    if let Err(e) = live.stop_stream().await {
                        let err = AstroLiveError::Teardown(format!("stop stream: {}", e));
                        warn!(session_id = %session.id, error = %err, "error stopping conversation");
                    }
                }
                if let Err(e) = live.close().await {
                    let err = AstroLiveError::Teardown(format!("close: {}", e));
                    warn!(session_id = %session.id, error = %err, "error closing session");
                }
            }
            session.transition(ConnectionState::Disconnected);
        }

        self.guard.release();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{PlatformCapabilities, SoftwareAudioDevice};
    use crate::live::{ChartContext, LiveSettings, StaticPermission};
    use async_trait::async_trait;

    /// Endpoint that never answers.
    struct SilentEndpoint;

    #[async_trait]
    impl LiveEndpoint for SilentEndpoint {
        async fn connect(&self, _config: &SessionConfig) -> Result<Box<dyn LiveSession>> {
            std::future::pending().await
        }
    }

    fn manager(granted: bool) -> LiveSessionManager {
        let guard = AudioFocusGuard::new(
            Arc::new(SoftwareAudioDevice::new()),
            PlatformCapabilities::default(),
        );
        LiveSessionManager::new(
            SessionConfig::for_chart(&LiveSettings::default(), &ChartContext::default()),
            Arc::new(SilentEndpoint),
            guard,
            Arc::new(StaticPermission(granted)),
        )
    }

    #[tokio::test]
    async fn test_stop_when_never_started() {
        let manager = manager(true);
        manager.stop().await;
        assert_eq!(manager.state(), ManagerState::Idle);
        assert_eq!(manager.diagnostics().focus.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_start_without_permission() {
        let manager = manager(false);
        let result = manager.start();
        assert!(matches!(result, Err(AstroLiveError::PermissionDenied)));
        assert_eq!(manager.state(), ManagerState::Idle);
        assert_eq!(manager.diagnostics().connect_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_connect() {
        let manager = manager(true);
        manager.start().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(manager.diagnostics().phase, LoopPhase::Connecting);
        {
            let slot = manager.shared.session.lock().await;
            let session = slot.as_ref().unwrap();
            assert_eq!(session.state, ConnectionState::Connecting);
            assert!(session.handle.is_none());
        }

        manager.stop().await;
        assert!(manager.shared.session.lock().await.is_none());

        let diagnostics = manager.diagnostics();
        assert_eq!(diagnostics.phase, LoopPhase::Idle);
        assert_eq!(diagnostics.focus.acquired, diagnostics.focus.released);
        assert_eq!(manager.state(), ManagerState::Idle);
    }
}
