/// Phase sequencer: the interval-session state machine.
///
/// A 1 Hz tick counts the active phase down. At zero the next phase is
/// loaded (PhaseStart cue keyed to its intensity) or, past the last phase,
/// the run is Completed (SessionComplete cue). The tick itself is the pure
/// function `tick(&RunState, &SessionTemplate)`; `PhaseSequencer` owns the
/// state and the template and applies it.
///
/// Idle → Running (start) ⇄ Paused (pause/resume) → Completed (last phase ends)
/// any → Idle (reset)

use crate::catalog::{Phase, Round, SessionTemplate};
use crate::error::EngineError;
use crate::feedback::FeedbackEvent;

/// Countdown cues fire when a tick leaves this many seconds on the clock.
const COUNTDOWN_SECONDS: std::ops::RangeInclusive<u32> = 2..=3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => f.write_str("idle"),
            SessionStatus::Running => f.write_str("running"),
            SessionStatus::Paused => f.write_str("paused"),
            SessionStatus::Completed => f.write_str("completed"),
        }
    }
}

/// Mutable state of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub phase_index: usize,
    pub time_remaining_s: u32,
    pub step_count: u64,
    pub status: SessionStatus,
    /// Ticks consumed while running.
    pub elapsed_ticks: u64,
}

impl RunState {
    pub fn idle() -> Self {
        Self {
            phase_index: 0,
            time_remaining_s: 0,
            step_count: 0,
            status: SessionStatus::Idle,
            elapsed_ticks: 0,
        }
    }

    /// Fresh running state at the top of `template`.
    pub fn started(template: &SessionTemplate) -> Self {
        Self {
            time_remaining_s: template.phase(0).map_or(0, |p| p.duration_s),
            status: SessionStatus::Running,
            ..Self::idle()
        }
    }

    /// Phases fully counted down so far.
    pub fn phases_completed(&self) -> usize {
        self.phase_index
    }
}

/// Where a tick landed relative to the phase list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    NextPhase { from: usize, to: usize },
    Completed,
}

/// Result of one tick: the next state and the cues it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub state: RunState,
    pub events: Vec<FeedbackEvent>,
    pub boundary: Option<Boundary>,
}

/// One second of session time. Ticks outside Running change nothing.
pub fn tick(state: &RunState, template: &SessionTemplate) -> TickOutcome {
    let mut next = state.clone();
    let mut events = Vec::new();

    if state.status != SessionStatus::Running {
        return TickOutcome { state: next, events, boundary: None };
    }

    next.elapsed_ticks += 1;
    next.time_remaining_s = state.time_remaining_s.saturating_sub(1);

    if next.time_remaining_s > 0 {
        if COUNTDOWN_SECONDS.contains(&next.time_remaining_s) {
            events.push(FeedbackEvent::Countdown);
        }
        return TickOutcome { state: next, events, boundary: None };
    }

    let from = state.phase_index;
    next.phase_index = from + 1;
    let boundary = match template.phase(next.phase_index) {
        Some(phase) => {
            next.time_remaining_s = phase.duration_s;
            events.push(FeedbackEvent::PhaseStart { high_intensity: phase.high_intensity });
            Boundary::NextPhase { from, to: next.phase_index }
        }
        None => {
            next.status = SessionStatus::Completed;
            events.push(FeedbackEvent::SessionComplete);
            Boundary::Completed
        }
    };

    TickOutcome { state: next, events, boundary: Some(boundary) }
}

/// Owns the run state and the template being run.
#[derive(Debug)]
pub struct PhaseSequencer {
    template: Option<SessionTemplate>,
    state: RunState,
}

impl PhaseSequencer {
    pub fn new() -> Self {
        Self {
            template: None,
            state: RunState::idle(),
        }
    }

    /// Begin `template` from its first phase. Rejects templates that could
    /// never complete; on error the sequencer is left untouched.
    pub fn start(&mut self, template: SessionTemplate) -> Result<Vec<FeedbackEvent>, EngineError> {
        template.validate().map_err(|reason| {
            EngineError::invalid_template(
                &template.key.program,
                template.key.week,
                template.key.session,
                reason,
            )
        })?;
        self.state = RunState::started(&template);
        log::info!(
            "Session {} started: {} phases, {}s planned",
            template.key,
            template.len(),
            template.total_duration_s()
        );
        self.template = Some(template);
        Ok(vec![FeedbackEvent::SessionStart])
    }

    /// Running → Paused. Returns false if the session was not running.
    pub fn pause(&mut self) -> bool {
        if self.state.status != SessionStatus::Running {
            return false;
        }
        self.state.status = SessionStatus::Paused;
        log::info!("Paused with {}s left in phase {}", self.state.time_remaining_s, self.state.phase_index);
        true
    }

    /// Paused → Running, from the preserved remaining time.
    pub fn resume(&mut self) -> bool {
        if self.state.status != SessionStatus::Paused {
            return false;
        }
        self.state.status = SessionStatus::Running;
        log::info!("Resumed with {}s left in phase {}", self.state.time_remaining_s, self.state.phase_index);
        true
    }

    /// Back to Idle with every counter zeroed. A run cut short mid-phase
    /// yields a PhaseEnd cue.
    pub fn reset(&mut self) -> Vec<FeedbackEvent> {
        let interrupted = matches!(self.state.status, SessionStatus::Running | SessionStatus::Paused);
        self.state = RunState::idle();
        self.template = None;
        if interrupted {
            log::info!("Session reset mid-phase");
            vec![FeedbackEvent::PhaseEnd]
        } else {
            Vec::new()
        }
    }

    /// Advance one second.
    pub fn tick(&mut self) -> TickOutcome {
        let outcome = match &self.template {
            Some(template) => tick(&self.state, template),
            None => TickOutcome {
                state: self.state.clone(),
                events: Vec::new(),
                boundary: None,
            },
        };
        if let Some(boundary) = outcome.boundary {
            log::debug!("Tick {}: {boundary:?}", outcome.state.elapsed_ticks);
        }
        self.state = outcome.state.clone();
        outcome
    }

    /// Count one detected step. Only a running session counts.
    pub fn record_step(&mut self) -> Option<u64> {
        if self.state.status != SessionStatus::Running {
            return None;
        }
        self.state.step_count += 1;
        Some(self.state.step_count)
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn template(&self) -> Option<&SessionTemplate> {
        self.template.as_ref()
    }

    /// Phase the clock is currently counting down, if any.
    pub fn current_phase(&self) -> Option<&Phase> {
        self.template.as_ref()?.phase(self.state.phase_index)
    }

    /// Intensity of the phase active right now. Steps are attributed with it.
    pub fn current_is_fast(&self) -> bool {
        self.current_phase().is_some_and(|p| p.high_intensity)
    }

    pub fn current_round(&self) -> Option<Round> {
        self.current_phase()?.round
    }

    /// Percentage of the current phase already elapsed.
    pub fn phase_progress_pct(&self) -> f32 {
        match self.current_phase() {
            Some(p) if p.duration_s > 0 => {
                (p.duration_s - self.state.time_remaining_s) as f32 / p.duration_s as f32 * 100.0
            }
            _ => 0.0,
        }
    }

    /// Percentage of phases completed.
    pub fn overall_progress_pct(&self) -> f32 {
        match &self.template {
            Some(t) if !t.phases.is_empty() => self.state.phase_index as f32 / t.len() as f32 * 100.0,
            _ => 0.0,
        }
    }
}

/// Format seconds as `m:ss`.
pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
