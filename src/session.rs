/// Walk session: the engine the event loop drives.
///
/// Wires the sequencer, the step strategy, feedback, the wake reservation
/// and the recorder together. Every method is synchronous and returns
/// immediately; producers (ticker, motion stream, cadence ticker, visibility
/// signal) call in from one loop, so the run state is never shared.

use crate::catalog::{Round, SessionTemplate};
use crate::clock::Clock;
use crate::error::EngineError;
use crate::feedback::{FeedbackDispatcher, FeedbackEvent, FeedbackMode};
use crate::lifecycle::{LifecycleGuard, Visibility};
use crate::platform::Platform;
use crate::recorder::{SessionRecorder, SessionTelemetry};
use crate::sequencer::{format_clock, Boundary, PhaseSequencer, RunState, SessionStatus, TickOutcome};
use crate::step_detector::{MotionSample, StepEvent, StepStrategy, StrategyKind};

use std::sync::Arc;

/// Read-only view of a session for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub phase_label: Option<String>,
    pub phase_index: usize,
    pub phase_count: usize,
    pub time_remaining_s: u32,
    pub high_intensity: bool,
    pub round: Option<Round>,
    pub step_count: u64,
    pub phase_progress_pct: f32,
    pub overall_progress_pct: f32,
}

impl std::fmt::Display for SessionSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(label) = &self.phase_label else {
            return write!(f, "{} | {} steps", self.status, self.step_count);
        };
        write!(
            f,
            "[{}/{}] {label}, {}, {} left ({:.0}%)",
            self.phase_index + 1,
            self.phase_count,
            if self.high_intensity { "fast" } else { "easy" },
            format_clock(self.time_remaining_s),
            self.phase_progress_pct
        )?;
        if let Some(round) = self.round {
            write!(f, " round {}/{}", round.current, round.total)?;
        }
        if self.status == SessionStatus::Paused {
            f.write_str(" [paused]")?;
        }
        write!(f, " | {} steps | {:.0}% done", self.step_count, self.overall_progress_pct)
    }
}

pub struct WalkSession {
    sequencer: PhaseSequencer,
    strategy: StepStrategy,
    feedback: FeedbackDispatcher,
    lifecycle: LifecycleGuard,
    platform: Arc<dyn Platform>,
    clock: Arc<dyn Clock>,
    recorder: SessionRecorder,
    started_ms: Option<u64>,
    timer_only: bool,
}

impl WalkSession {
    pub fn new(
        strategy: StepStrategy,
        feedback: FeedbackDispatcher,
        lifecycle: LifecycleGuard,
        platform: Arc<dyn Platform>,
        clock: Arc<dyn Clock>,
        recorder: SessionRecorder,
    ) -> Self {
        Self {
            sequencer: PhaseSequencer::new(),
            strategy,
            feedback,
            lifecycle,
            platform,
            clock,
            recorder,
            started_ms: None,
            timer_only: false,
        }
    }

    /// Start `template` from its first phase. An unrunnable template is
    /// rejected before anything changes; every other failure degrades.
    pub fn start(&mut self, template: SessionTemplate) -> Result<(), EngineError> {
        let events = self.sequencer.start(template)?;
        self.strategy.reset();

        self.timer_only = false;
        if self.strategy.needs_motion() {
            if let Err(e) = self.platform.request_motion_access() {
                log::warn!("{} ({e}); running timer-only", EngineError::PermissionDenied);
                self.timer_only = true;
            }
        }

        self.lifecycle.acquire(self.platform.as_ref());
        self.started_ms = Some(self.clock.now_ms());
        if self.timer_only {
            log::info!("Step source: none (timer only); cues: {}", self.feedback.mode());
        } else {
            log::info!("Step source: {}; cues: {}", self.strategy, self.feedback.mode());
        }
        self.dispatch_all(&events);
        Ok(())
    }

    /// Halt the timer and detach the step source. Counters are kept.
    pub fn pause(&mut self) -> bool {
        if !self.sequencer.pause() {
            return false;
        }
        self.strategy.suspend();
        self.lifecycle.release(self.platform.as_ref());
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.sequencer.resume() {
            return false;
        }
        self.lifecycle.acquire(self.platform.as_ref());
        true
    }

    /// Abandon the run: back to Idle with counters zeroed and the wake
    /// reservation released.
    pub fn reset(&mut self) {
        let events = self.sequencer.reset();
        self.dispatch_all(&events);
        self.strategy.reset();
        self.lifecycle.release(self.platform.as_ref());
        self.started_ms = None;
        self.timer_only = false;
    }

    /// One second of session time.
    pub fn tick(&mut self) -> TickOutcome {
        let outcome = self.sequencer.tick();
        self.dispatch_all(&outcome.events);
        match outcome.boundary {
            Some(Boundary::NextPhase { from, to }) => {
                if let Some(phase) = self.sequencer.current_phase() {
                    log::info!(
                        "Phase {} → {}/{}: {} [{}] ({})",
                        from + 1,
                        to + 1,
                        self.sequencer.template().map_or(0, |t| t.len()),
                        phase.label,
                        phase.kind,
                        format_clock(phase.duration_s)
                    );
                }
            }
            Some(Boundary::Completed) => self.finish(),
            None => {}
        }
        outcome
    }

    fn finish(&mut self) {
        self.lifecycle.release(self.platform.as_ref());
        let completed_ms = self.clock.now_ms();
        let Some(template) = self.sequencer.template() else {
            return;
        };
        let state = self.sequencer.state();
        log::info!(
            "Session {} complete: {} steps over {} phases",
            template.key,
            state.step_count,
            state.phases_completed()
        );
        let started_ms = self.started_ms.unwrap_or(completed_ms);
        self.recorder
            .record(SessionTelemetry::from_run(template, state, started_ms, completed_ms));
    }

    /// Feed one accelerometer sample. The step is attributed to the phase
    /// active right now, before any pending tick is applied.
    pub fn on_motion(&mut self, sample: &MotionSample) -> Option<StepEvent> {
        if self.sequencer.status() != SessionStatus::Running || self.timer_only {
            return None;
        }
        let fast = self.sequencer.current_is_fast();
        let step = self.strategy.on_motion(sample, fast)?;
        self.register(step);
        Some(step)
    }

    /// Poll the pacing metronome.
    pub fn on_cadence(&mut self) -> Option<StepEvent> {
        if self.sequencer.status() != SessionStatus::Running {
            return None;
        }
        let fast = self.sequencer.current_is_fast();
        let step = self.strategy.on_cadence(self.clock.now_ms(), fast)?;
        self.register(step);
        Some(step)
    }

    fn register(&mut self, step: StepEvent) {
        if self.strategy.counts_steps() {
            self.sequencer.record_step();
        }
        self.dispatch(FeedbackEvent::Step { fast: step.fast });
    }

    /// App moved between foreground and background. Neither the timer nor
    /// step counting stops.
    pub fn on_visibility(&mut self, visibility: Visibility) -> Option<String> {
        let active = self.is_active();
        let steps = self.sequencer.state().step_count;
        self.lifecycle
            .on_visibility(visibility, steps, active, self.platform.as_ref())
    }

    /// Switch the cue channel. Takes effect from the next event.
    pub fn set_feedback_mode(&mut self, mode: FeedbackMode) {
        self.feedback.set_mode(mode);
    }

    fn dispatch(&self, event: FeedbackEvent) {
        self.feedback.dispatch(event, self.platform.as_ref());
    }

    fn dispatch_all(&self, events: &[FeedbackEvent]) {
        for &event in events {
            self.dispatch(event);
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.sequencer.status()
    }

    /// Running or paused.
    pub fn is_active(&self) -> bool {
        matches!(self.status(), SessionStatus::Running | SessionStatus::Paused)
    }

    pub fn state(&self) -> &RunState {
        self.sequencer.state()
    }

    pub fn template(&self) -> Option<&SessionTemplate> {
        self.sequencer.template()
    }

    pub fn step_count(&self) -> u64 {
        self.sequencer.state().step_count
    }

    /// Motion access was refused; only the timer runs.
    pub fn is_timer_only(&self) -> bool {
        self.timer_only
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let phase = self.sequencer.current_phase();
        SessionSnapshot {
            status: self.status(),
            phase_label: phase.map(|p| p.label.clone()),
            phase_index: self.sequencer.state().phase_index,
            phase_count: self.template().map_or(0, |t| t.len()),
            time_remaining_s: self.sequencer.state().time_remaining_s,
            high_intensity: phase.is_some_and(|p| p.high_intensity),
            round: self.sequencer.current_round(),
            step_count: self.step_count(),
            phase_progress_pct: self.sequencer.phase_progress_pct(),
            overall_progress_pct: self.sequencer.overall_progress_pct(),
        }
    }
}

impl Drop for WalkSession {
    fn drop(&mut self) {
        if self.lifecycle.is_held() {
            log::debug!("Session dropped while holding the wake reservation");
            self.lifecycle.release(self.platform.as_ref());
        }
    }
}
