/// Platform capabilities consumed by the engine: haptics, tone synthesis,
/// screen-wake reservation, motion-sensor access and a non-blocking notice
/// surface.
///
/// Every method is best-effort. Implementations report a missing capability
/// with `PlatformError::Unavailable` and a refused one with `Denied`; the
/// engine degrades instead of failing.

use crate::error::PlatformError;
use crate::feedback::Tone;

pub trait Platform: Send + Sync {
    /// Start a vibration pattern (alternating on/off ms). Returns immediately.
    fn vibrate(&self, pattern: &[u64]) -> Result<(), PlatformError>;

    /// Start a tone. Returns immediately.
    fn play_tone(&self, tone: Tone) -> Result<(), PlatformError>;

    /// Ask the platform to keep the display on.
    fn acquire_wake_lock(&self) -> Result<(), PlatformError>;

    fn release_wake_lock(&self);

    /// Ask for access to the motion sensor stream.
    fn request_motion_access(&self) -> Result<(), PlatformError>;

    /// Show a transient, non-blocking message.
    fn notify(&self, text: &str);
}

/// Terminal stand-in used by the CLI: cues and notices go to the log.
/// `motion: false` behaves like a user who refused sensor access.
pub struct ConsolePlatform {
    pub motion: bool,
}

impl Platform for ConsolePlatform {
    fn vibrate(&self, pattern: &[u64]) -> Result<(), PlatformError> {
        let bars: Vec<String> = pattern
            .iter()
            .enumerate()
            .map(|(i, ms)| if i % 2 == 0 { format!("▮{ms}") } else { format!("·{ms}") })
            .collect();
        log::info!("~ vibrate {}", bars.join(" "));
        Ok(())
    }

    fn play_tone(&self, tone: Tone) -> Result<(), PlatformError> {
        log::info!("♪ {} Hz for {} ms", tone.frequency_hz, tone.duration_ms);
        Ok(())
    }

    fn acquire_wake_lock(&self) -> Result<(), PlatformError> {
        log::debug!("Screen wake reservation acquired");
        Ok(())
    }

    fn release_wake_lock(&self) {
        log::debug!("Screen wake reservation released");
    }

    fn request_motion_access(&self) -> Result<(), PlatformError> {
        if self.motion { Ok(()) } else { Err(PlatformError::Denied) }
    }

    fn notify(&self, text: &str) {
        log::info!("» {text}");
    }
}

/// Target with none of the optional capabilities. The engine runs timer-only
/// and silently.
pub struct HeadlessPlatform;

impl Platform for HeadlessPlatform {
    fn vibrate(&self, _pattern: &[u64]) -> Result<(), PlatformError> {
        Err(PlatformError::Unavailable)
    }

    fn play_tone(&self, _tone: Tone) -> Result<(), PlatformError> {
        Err(PlatformError::Unavailable)
    }

    fn acquire_wake_lock(&self) -> Result<(), PlatformError> {
        Err(PlatformError::Unavailable)
    }

    fn release_wake_lock(&self) {}

    fn request_motion_access(&self) -> Result<(), PlatformError> {
        Err(PlatformError::Unavailable)
    }

    fn notify(&self, _text: &str) {}
}

#[cfg(test)]
pub use fake::{FakePlatform, PlatformCall};


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_reports_everything_unavailable() {
        let p = HeadlessPlatform;
        assert_eq!(p.vibrate(&[10]), Err(PlatformError::Unavailable));
        assert_eq!(
            p.play_tone(Tone { frequency_hz: 440, duration_ms: 10 }),
            Err(PlatformError::Unavailable)
        );
        assert_eq!(p.acquire_wake_lock(), Err(PlatformError::Unavailable));
        assert_eq!(p.request_motion_access(), Err(PlatformError::Unavailable));
    }

    #[test]
    fn fake_tracks_wake_lock_state() {
        let p = FakePlatform::new();
        assert!(!p.wake_lock_held());
        p.acquire_wake_lock().unwrap();
        assert!(p.wake_lock_held());
        p.release_wake_lock();
        assert!(!p.wake_lock_held());
    }

    #[test]
    fn console_without_sensor_refuses_motion_access() {
        assert!(ConsolePlatform { motion: true }.request_motion_access().is_ok());
        assert_eq!(
            ConsolePlatform { motion: false }.request_motion_access(),
            Err(PlatformError::Denied)
        );
    }
}
