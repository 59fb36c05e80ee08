//! Device permission gate.

/// Answers whether the app may record audio.
pub trait PermissionGate: Send + Sync {
    /// Whether microphone permission is granted.
    fn microphone_granted(&self) -> bool;
}

/// A permission answer fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPermission(pub bool);

impl StaticPermission {
    /// Permission granted.
    pub fn granted() -> Self {
        Self(true)
    }

    /// Permission denied.
    pub fn denied() -> Self {
        Self(false)
    }
}

impl PermissionGate for StaticPermission {
    fn microphone_granted(&self) -> bool {
        self.0
    }
}

impl<F> PermissionGate for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn microphone_granted(&self) -> bool {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_static_permission() {
        assert!(StaticPermission::granted().microphone_granted());
        assert!(!StaticPermission::denied().microphone_granted());
    }

    #[test]
    fn test_closure_permission() {
        let flag = Arc::new(AtomicBool::new(false));
        let gate = {
            let flag = flag.clone();
            move || flag.load(Ordering::SeqCst)
        };
        assert!(!gate.microphone_granted());
        flag.store(true, Ordering::SeqCst);
        assert!(gate.microphone_granted());
    }
}
