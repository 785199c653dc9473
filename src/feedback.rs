/// Feedback engine: maps session events to haptic patterns or tones.
///
/// SessionStart:            double pulse / 1000 Hz
/// PhaseStart (fast):       three strong pulses / 1000 Hz
/// PhaseStart (recovery):   one gentle pulse / 600 Hz
/// PhaseEnd (cut short):    long single pulse / 500 Hz
/// Countdown:               short tick / 700 Hz
/// SessionComplete:         two long pulses / 1200 Hz
/// Step:                    tap, firmer during fast phases
///
/// Exactly one channel is used per event, chosen by the active mode. A
/// missing capability is skipped, never substituted by the other channel.

use crate::error::EngineError;
use crate::platform::Platform;

use clap::ValueEnum;
use serde::Deserialize;

/// Output channel for every cue of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackMode {
    #[default]
    #[value(alias = "haptic", alias = "haptics")]
    Vibration,
    #[value(alias = "audio", alias = "tone")]
    Sound,
}

impl FeedbackMode {
    /// Parse a user-supplied mode name. Trims whitespace, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vibration" | "haptic" | "haptics" => Some(FeedbackMode::Vibration),
            "sound" | "audio" | "tone" => Some(FeedbackMode::Sound),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeedbackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackMode::Vibration => f.write_str("vibration"),
            FeedbackMode::Sound => f.write_str("sound"),
        }
    }
}

/// Something the user should feel or hear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackEvent {
    SessionStart,
    PhaseStart { high_intensity: bool },
    PhaseEnd,
    Countdown,
    SessionComplete,
    Step { fast: bool },
}

/// A synthesized sine tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration_ms: u64,
}

/// What was actually delivered for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Haptic(&'static [u64]),
    Tone(Tone),
}

/// Vibration pattern for an event: alternating on/off durations in ms,
/// starting with "on".
pub fn pattern_for(event: FeedbackEvent) -> &'static [u64] {
    match event {
        FeedbackEvent::SessionStart => &[300, 100, 300],
        FeedbackEvent::PhaseStart { high_intensity: true } => &[200, 100, 200, 100, 200],
        FeedbackEvent::PhaseStart { high_intensity: false } => &[100, 200],
        FeedbackEvent::PhaseEnd => &[500],
        FeedbackEvent::Countdown => &[50],
        FeedbackEvent::SessionComplete => &[500, 200, 500],
        FeedbackEvent::Step { fast: true } => &[40],
        FeedbackEvent::Step { fast: false } => &[25],
    }
}

/// Tone for an event.
pub fn tone_for(event: FeedbackEvent) -> Tone {
    let (frequency_hz, duration_ms) = match event {
        FeedbackEvent::SessionStart => (1000, 300),
        FeedbackEvent::PhaseStart { high_intensity: true } => (1000, 300),
        FeedbackEvent::PhaseStart { high_intensity: false } => (600, 200),
        FeedbackEvent::PhaseEnd => (500, 400),
        FeedbackEvent::Countdown => (700, 100),
        FeedbackEvent::SessionComplete => (1200, 500),
        FeedbackEvent::Step { fast: true } => (900, 40),
        FeedbackEvent::Step { fast: false } => (450, 30),
    };
    Tone { frequency_hz, duration_ms }
}

/// Routes events to the one channel selected by `mode`.
#[derive(Debug, Clone)]
pub struct FeedbackDispatcher {
    mode: FeedbackMode,
    enabled: bool,
}

impl FeedbackDispatcher {
    pub fn new(mode: FeedbackMode) -> Self {
        Self { mode, enabled: true }
    }

    /// A dispatcher that drops every event.
    pub fn muted(mode: FeedbackMode) -> Self {
        Self { mode, enabled: false }
    }

    pub fn mode(&self) -> FeedbackMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: FeedbackMode) {
        if mode != self.mode {
            log::info!("Feedback mode: {} → {mode}", self.mode);
            self.mode = mode;
        }
    }

    /// Fire-and-forget delivery. Returns the cue that was handed to the
    /// platform, or None if feedback is muted or the capability is missing.
    pub fn dispatch(&self, event: FeedbackEvent, platform: &dyn Platform) -> Option<Cue> {
        if !self.enabled {
            return None;
        }
        let (cue, result) = match self.mode {
            FeedbackMode::Vibration => {
                let pattern = pattern_for(event);
                (Cue::Haptic(pattern), platform.vibrate(pattern))
            }
            FeedbackMode::Sound => {
                let tone = tone_for(event);
                (Cue::Tone(tone), platform.play_tone(tone))
            }
        };
        match result {
            Ok(()) => {
                log::trace!("Feedback {event:?} → {cue:?}");
                Some(cue)
            }
            Err(e) => {
                let channel = match self.mode {
                    FeedbackMode::Vibration => "haptics",
                    FeedbackMode::Sound => "audio",
                };
                log::debug!("Feedback {event:?} skipped: {} ({e})", EngineError::FeedbackUnavailable(channel));
                None
            }
        }
    }
}
