/// Lifecycle guard: screen-wake reservation and background/foreground notices.
///
/// The reservation is held while the session is running and released on
/// pause, completion or reset. Release is idempotent, so any number of
/// teardown paths may call it. Going to the background never stops the
/// timer or the step counter; the user only gets a notice.

use crate::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Foreground,
    Background,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Foreground => f.write_str("foreground"),
            Visibility::Background => f.write_str("background"),
        }
    }
}

#[derive(Debug)]
pub struct LifecycleGuard {
    wake_lock_enabled: bool,
    held: bool,
    visibility: Visibility,
}

impl LifecycleGuard {
    pub fn new(wake_lock_enabled: bool) -> Self {
        Self {
            wake_lock_enabled,
            held: false,
            visibility: Visibility::Foreground,
        }
    }

    /// Best-effort acquisition. Failure only means the screen may dim.
    pub fn acquire(&mut self, platform: &dyn Platform) -> bool {
        if !self.wake_lock_enabled || self.held {
            return self.held;
        }
        match platform.acquire_wake_lock() {
            Ok(()) => {
                log::debug!("Wake reservation held");
                self.held = true;
            }
            Err(e) => log::warn!("Could not keep the screen awake: {e}"),
        }
        self.held
    }

    /// Release if held. Safe to call any number of times.
    pub fn release(&mut self, platform: &dyn Platform) {
        if self.held {
            platform.release_wake_lock();
            self.held = false;
            log::debug!("Wake reservation released");
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Record a visibility change. While a session is active, each real
    /// transition shows a notice; repeated signals are ignored.
    pub fn on_visibility(
        &mut self,
        visibility: Visibility,
        steps: u64,
        session_active: bool,
        platform: &dyn Platform,
    ) -> Option<String> {
        if visibility == self.visibility {
            return None;
        }
        log::info!("App moved to {visibility}");
        self.visibility = visibility;
        if !session_active {
            return None;
        }
        let notice = match visibility {
            Visibility::Background => "Counting continues in the background".to_string(),
            Visibility::Foreground => match steps {
                1 => "Welcome back: 1 step counted".to_string(),
                n => format!("Welcome back: {n} steps counted"),
            },
        };
        platform.notify(&notice);
        Some(notice)
    }
}
