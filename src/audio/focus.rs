//! Focus request strategies for the two platform API generations.

use tracing::debug;

use super::{
    AudioDevice, AudioUsage, ContentType, FocusGain, FocusListener, FocusRequest,
    FocusRequestResult, PlatformCapabilities, StreamType,
};
use crate::Result;

/// What must be handed back to the platform to abandon focus.
#[derive(Debug, Clone)]
pub enum FocusHandle {
    /// The request object passed to the modern API.
    Request(FocusRequest),
    /// The listener registered with the legacy API.
    Legacy(FocusListener),
}

/// One way of requesting and abandoning transient focus.
pub trait FocusStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Request transient, duckable focus. Returns the handle needed to
    /// abandon it along with the platform's answer.
    fn request(
        &self,
        device: &dyn AudioDevice,
        listener: &FocusListener,
    ) -> Result<(FocusHandle, FocusRequestResult)>;

    /// Abandon focus previously obtained from [`request`](Self::request).
    fn abandon(&self, device: &dyn AudioDevice, handle: &FocusHandle) -> Result<()>;
}

/// Request-object focus API.
#[derive(Debug, Default)]
pub struct RequestFocus;

impl FocusStrategy for RequestFocus {
    fn name(&self) -> &'static str {
        "request"
    }

    fn request(
        &self,
        device: &dyn AudioDevice,
        listener: &FocusListener,
    ) -> Result<(FocusHandle, FocusRequestResult)> {
        let request = FocusRequest {
            gain: FocusGain::TransientMayDuck,
            usage: AudioUsage::Media,
            content: ContentType::Speech,
            listener: listener.clone(),
        };
        let result = device.request_focus(&request)?;
        Ok((FocusHandle::Request(request), result))
    }

    fn abandon(&self, device: &dyn AudioDevice, handle: &FocusHandle) -> Result<()> {
        match handle {
            FocusHandle::Request(request) => device.abandon_focus_request(request),
            FocusHandle::Legacy(listener) => {
                debug!("request strategy given a legacy handle");
                device.abandon_focus_legacy(listener)
            }
        }
    }
}

/// Legacy listener/stream-type focus API.
#[derive(Debug, Default)]
pub struct LegacyFocus;

impl FocusStrategy for LegacyFocus {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn request(
        &self,
        device: &dyn AudioDevice,
        listener: &FocusListener,
    ) -> Result<(FocusHandle, FocusRequestResult)> {
        let result =
            device.request_focus_legacy(listener, StreamType::Music, FocusGain::TransientMayDuck)?;
        Ok((FocusHandle::Legacy(listener.clone()), result))
    }

    fn abandon(&self, device: &dyn AudioDevice, handle: &FocusHandle) -> Result<()> {
        match handle {
            FocusHandle::Legacy(listener) => device.abandon_focus_legacy(listener),
            FocusHandle::Request(request) => device.abandon_focus_legacy(&request.listener),
        }
    }
}

/// Pick the strategy matching the platform.
pub fn select_strategy(capabilities: PlatformCapabilities) -> Box<dyn FocusStrategy> {
    if capabilities.supports_focus_requests() {
        Box::new(RequestFocus)
    } else {
        Box::new(LegacyFocus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SoftwareAudioDevice;
    use tokio::sync::broadcast;

    #[test]
    fn test_select_strategy() {
        assert_eq!(select_strategy(PlatformCapabilities::new(33)).name(), "request");
        assert_eq!(select_strategy(PlatformCapabilities::new(28)).name(), "legacy");
    }

    #[test]
    fn test_request_strategy_roundtrip() {
        let device = SoftwareAudioDevice::new();
        let (listener, _rx) = broadcast::channel(4);

        let (handle, result) = RequestFocus.request(&device, &listener).unwrap();
        assert_eq!(result, FocusRequestResult::Granted);
        assert!(matches!(handle, FocusHandle::Request(ref r) if r.gain == FocusGain::TransientMayDuck));
        assert!(device.focus_held());

        RequestFocus.abandon(&device, &handle).unwrap();
        assert!(!device.focus_held());
    }

    #[test]
    fn test_legacy_strategy_roundtrip() {
        let device = SoftwareAudioDevice::new();
        let (listener, _rx) = broadcast::channel(4);

        let (handle, result) = LegacyFocus.request(&device, &listener).unwrap();
        assert_eq!(result, FocusRequestResult::Granted);
        assert!(matches!(handle, FocusHandle::Legacy(_)));
        assert!(device.focus_held());

        LegacyFocus.abandon(&device, &handle).unwrap();
        assert!(!device.focus_held());
    }
}
