//! Device audio routing and focus management.
//!
//! The live conversation needs exclusive, speaker-routed audio. The
//! [`AudioFocusGuard`] takes focus around each connected session and
//! restores the device's previous routing when it lets go.
//!
//! Platforms expose focus through two API generations; both are hidden
//! behind [`FocusStrategy`], chosen once from [`PlatformCapabilities`].

mod device;
mod focus;
mod guard;

pub use device::SoftwareAudioDevice;
pub use focus::{select_strategy, FocusHandle, FocusStrategy, LegacyFocus, RequestFocus};
pub use guard::{AudioFocusGuard, LeaseStats};

use tokio::sync::broadcast;

use crate::Result;

/// Device-wide audio mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioMode {
    /// Regular media playback.
    #[default]
    Normal,
    /// A ringtone is playing.
    Ringtone,
    /// A telephony call is active.
    InCall,
    /// A VoIP or other communication session is active.
    InCommunication,
}

impl AudioMode {
    /// All modes, for exhaustive checks.
    pub const ALL: [AudioMode; 4] = [
        AudioMode::Normal,
        AudioMode::Ringtone,
        AudioMode::InCall,
        AudioMode::InCommunication,
    ];
}

/// Audio routing captured right before focus is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioRoutingSnapshot {
    /// Device audio mode.
    pub mode: AudioMode,
    /// Whether the speakerphone was on.
    pub speakerphone: bool,
}

/// Kind of focus being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusGain {
    /// Long-lived focus.
    Gain,
    /// Short focus; others pause.
    Transient,
    /// Short focus; others may keep playing at lower volume.
    TransientMayDuck,
}

/// Platform answer to a focus request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRequestResult {
    /// Focus was granted.
    Granted,
    /// Focus was refused.
    Failed,
    /// Focus will be granted later.
    Delayed,
}

/// Focus change notification delivered to the current holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    /// Focus (re)gained.
    Gain,
    /// Focus lost for an unknown duration.
    Loss,
    /// Focus lost briefly.
    LossTransient,
    /// Focus lost briefly; playback may continue ducked.
    LossTransientCanDuck,
}

/// Observer for focus changes. The guard owns the sending half and hands
/// clones to the platform as its listener.
pub type FocusListener = broadcast::Sender<FocusChange>;

/// Attributes attached to a modern focus request.
#[derive(Debug, Clone)]
pub struct FocusRequest {
    /// Requested gain.
    pub gain: FocusGain,
    /// Usage attribute; live conversations are media playback of speech.
    pub usage: AudioUsage,
    /// Content attribute.
    pub content: ContentType,
    /// Where focus changes are delivered.
    pub listener: FocusListener,
}

/// Audio usage attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioUsage {
    /// Media playback.
    Media,
    /// Voice communication.
    VoiceCommunication,
}

/// Audio content attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// Spoken content.
    Speech,
    /// Music.
    Music,
}

/// Stream type used by the legacy focus API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// The media stream.
    Music,
    /// The voice call stream.
    VoiceCall,
}

/// Capabilities of the host audio platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Platform API level.
    pub api_level: u32,
}

impl PlatformCapabilities {
    /// First API level whose focus requests go through request objects.
    pub const REQUEST_FOCUS_API_LEVEL: u32 = 31;

    /// Create capabilities for the given API level.
    pub fn new(api_level: u32) -> Self {
        Self { api_level }
    }

    /// Whether the request-object focus API should be used.
    pub fn supports_focus_requests(&self) -> bool {
        self.api_level >= Self::REQUEST_FOCUS_API_LEVEL
    }
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self::new(Self::REQUEST_FOCUS_API_LEVEL)
    }
}

/// Process-wide audio subsystem of the device.
///
/// Every method may fail; callers in this crate treat failures as
/// best-effort and log them.
pub trait AudioDevice: Send + Sync {
    /// Current audio mode.
    fn mode(&self) -> Result<AudioMode>;

    /// Change the audio mode.
    fn set_mode(&self, mode: AudioMode) -> Result<()>;

    /// Whether the speakerphone is on.
    fn is_speakerphone_on(&self) -> Result<bool>;

    /// Turn the speakerphone on or off.
    fn set_speakerphone_on(&self, on: bool) -> Result<()>;

    /// Request focus with a request object.
    fn request_focus(&self, request: &FocusRequest) -> Result<FocusRequestResult>;

    /// Abandon a focus request previously passed to [`request_focus`](Self::request_focus).
    fn abandon_focus_request(&self, request: &FocusRequest) -> Result<()>;

    /// Request focus with the legacy listener API.
    fn request_focus_legacy(
        &self,
        listener: &FocusListener,
        stream: StreamType,
        gain: FocusGain,
    ) -> Result<FocusRequestResult>;

    /// Abandon focus held by `listener` through the legacy API.
    fn abandon_focus_legacy(&self, listener: &FocusListener) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_threshold() {
        assert!(!PlatformCapabilities::new(30).supports_focus_requests());
        assert!(PlatformCapabilities::new(31).supports_focus_requests());
        assert!(PlatformCapabilities::new(34).supports_focus_requests());
    }

    #[test]
    fn test_default_mode() {
        assert_eq!(AudioMode::default(), AudioMode::Normal);
    }
}
