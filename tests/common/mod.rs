//! Shared fixtures for live session tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use astro_live::audio::{AudioFocusGuard, AudioMode, PlatformCapabilities, SoftwareAudioDevice};
use astro_live::live::{
    ChartContext, LiveEndpoint, LiveSession, LiveSessionManager, LiveSettings, ReconnectPolicy,
    SessionConfig, StaticPermission,
};
use astro_live::{AstroLiveError, Result};

/// What the next `connect` call does.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Fail with a connect error.
    Fail,
    /// Open a session.
    Succeed(SessionScript),
    /// Never return.
    Hang,
}

/// Behavior of one scripted session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionScript {
    /// Liveness polls answered `true` before the session reports inactive.
    pub active_polls: usize,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub fail_close: bool,
}

impl SessionScript {
    pub fn active_for(polls: usize) -> Self {
        Self {
            active_polls: polls,
            ..Self::default()
        }
    }

    pub fn forever() -> Self {
        Self::active_for(usize::MAX)
    }
}

/// Call counters shared between the endpoint and its sessions.
#[derive(Debug, Default)]
pub struct Calls {
    pub connects: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub closes: AtomicUsize,
    pub connect_times: Mutex<Vec<Instant>>,
}

impl Calls {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.connect_times.lock().unwrap().clone()
    }
}

/// Endpoint that plays back a fixed script, then repeats `fallback`.
pub struct ScriptedEndpoint {
    steps: Mutex<VecDeque<Step>>,
    fallback: Step,
    pub calls: Arc<Calls>,
}

impl ScriptedEndpoint {
    pub fn new(steps: impl IntoIterator<Item = Step>, fallback: Step) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback,
            calls: Arc::new(Calls::default()),
        }
    }
}

#[async_trait]
impl LiveEndpoint for ScriptedEndpoint {
    async fn connect(&self, _config: &SessionConfig) -> Result<Box<dyn LiveSession>> {
        self.calls.connects.fetch_add(1, Ordering::SeqCst);
        self.calls.connect_times.lock().unwrap().push(Instant::now());

        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match step {
            Step::Fail => Err(AstroLiveError::Connect("scripted failure".into())),
            Step::Succeed(script) => Ok(Box::new(ScriptedSession {
                script,
                remaining: script.active_polls,
                calls: self.calls.clone(),
            })),
            Step::Hang => std::future::pending().await,
        }
    }
}

struct ScriptedSession {
    script: SessionScript,
    remaining: usize,
    calls: Arc<Calls>,
}

#[async_trait]
impl LiveSession for ScriptedSession {
    async fn start_stream(&mut self) -> Result<()> {
        self.calls.starts.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_start {
            return Err(AstroLiveError::StreamDropped("scripted start failure".into()));
        }
        Ok(())
    }

    async fn is_active(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        self.remaining -= 1;
        Ok(true)
    }

    async fn stop_stream(&mut self) -> Result<()> {
        self.calls.stops.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_stop {
            return Err(AstroLiveError::WebSocket("scripted stop failure".into()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.calls.closes.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_close {
            return Err(AstroLiveError::WebSocket("scripted close failure".into()));
        }
        Ok(())
    }
}

/// A manager over a scripted endpoint and an in-memory audio device.
pub struct Harness {
    pub manager: LiveSessionManager,
    pub device: Arc<SoftwareAudioDevice>,
    pub calls: Arc<Calls>,
}

impl Harness {
    pub fn new(endpoint: ScriptedEndpoint) -> Self {
        Self::with_policy(endpoint, ReconnectPolicy::default())
    }

    pub fn with_policy(endpoint: ScriptedEndpoint, policy: ReconnectPolicy) -> Self {
        let device = Arc::new(SoftwareAudioDevice::with_routing(AudioMode::InCall, false));
        let calls = endpoint.calls.clone();
        let guard = AudioFocusGuard::new(device.clone(), PlatformCapabilities::default());
        let config = SessionConfig::for_chart(&LiveSettings::default(), &ChartContext::default());

        let manager = LiveSessionManager::with_policy(
            config,
            Arc::new(endpoint),
            guard,
            Arc::new(StaticPermission::granted()),
            policy,
        );

        Self {
            manager,
            device,
            calls,
        }
    }
}
