//! In-process audio device.

use std::sync::Mutex;

use super::{
    AudioDevice, AudioMode, AudioRoutingSnapshot, FocusChange, FocusGain, FocusListener,
    FocusRequest, FocusRequestResult, StreamType,
};
use crate::error::AstroLiveError;
use crate::Result;

#[derive(Debug, Default)]
struct DeviceState {
    mode: AudioMode,
    speakerphone: bool,
    focus_owner: Option<FocusListener>,
    focus_requests: u64,
    focus_abandons: u64,
}

/// Audio device kept entirely in memory.
///
/// Used on hosts without a mobile audio stack: routing changes are
/// recorded, and focus is arbitrated between listeners the same way a
/// platform would, notifying the displaced holder.
#[derive(Debug, Default)]
pub struct SoftwareAudioDevice {
    state: Mutex<DeviceState>,
}

impl SoftwareAudioDevice {
    /// Create a device in `Normal` mode with the speakerphone off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a device with the given initial routing.
    pub fn with_routing(mode: AudioMode, speakerphone: bool) -> Self {
        Self {
            state: Mutex::new(DeviceState {
                mode,
                speakerphone,
                ..Default::default()
            }),
        }
    }

    /// Current routing.
    pub fn routing(&self) -> AudioRoutingSnapshot {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        AudioRoutingSnapshot {
            mode: state.mode,
            speakerphone: state.speakerphone,
        }
    }

    /// Whether any listener currently holds focus.
    pub fn focus_held(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.focus_owner.is_some()
    }

    /// Number of focus requests received.
    pub fn focus_requests(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.focus_requests
    }

    /// Number of focus abandons received.
    pub fn focus_abandons(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.focus_abandons
    }

    fn grant(&self, listener: &FocusListener, gain: FocusGain) -> Result<FocusRequestResult> {
        let mut state = self.state.lock().map_err(|_| AstroLiveError::LockPoisoned)?;
        state.focus_requests += 1;

        if let Some(previous) = state.focus_owner.take() {
            if !previous.same_channel(listener) {
                let change = match gain {
                    FocusGain::Gain => FocusChange::Loss,
                    FocusGain::Transient => FocusChange::LossTransient,
                    FocusGain::TransientMayDuck => FocusChange::LossTransientCanDuck,
                };
                // Nobody subscribed is fine.
                let _ = previous.send(change);
            }
        }

        state.focus_owner = Some(listener.clone());
        Ok(FocusRequestResult::Granted)
    }

    fn abandon(&self, listener: &FocusListener) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| AstroLiveError::LockPoisoned)?;
        state.focus_abandons += 1;

        if state
            .focus_owner
            .as_ref()
            .is_some_and(|owner| owner.same_channel(listener))
        {
            state.focus_owner = None;
        }
        Ok(())
    }
}

impl AudioDevice for SoftwareAudioDevice {
    fn mode(&self) -> Result<AudioMode> {
        let state = self.state.lock().map_err(|_| AstroLiveError::LockPoisoned)?;
        Ok(state.mode)
    }

    fn set_mode(&self, mode: AudioMode) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| AstroLiveError::LockPoisoned)?;
        state.mode = mode;
        Ok(())
    }

    fn is_speakerphone_on(&self) -> Result<bool> {
        let state = self.state.lock().map_err(|_| AstroLiveError::LockPoisoned)?;
        Ok(state.speakerphone)
    }

    fn set_speakerphone_on(&self, on: bool) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| AstroLiveError::LockPoisoned)?;
        state.speakerphone = on;
        Ok(())
    }

    fn request_focus(&self, request: &FocusRequest) -> Result<FocusRequestResult> {
        self.grant(&request.listener, request.gain)
    }

    fn abandon_focus_request(&self, request: &FocusRequest) -> Result<()> {
        self.abandon(&request.listener)
    }

    fn request_focus_legacy(
        &self,
        listener: &FocusListener,
        _stream: StreamType,
        gain: FocusGain,
    ) -> Result<FocusRequestResult> {
        self.grant(listener, gain)
    }

    fn abandon_focus_legacy(&self, listener: &FocusListener) -> Result<()> {
        self.abandon(listener)
    }
}
