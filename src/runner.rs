/// Event loop for one session.
///
/// Multiplexes the producers that feed `WalkSession`: the 1 Hz phase ticker,
/// the motion stream, the pacing ticker, the visibility signal and user
/// commands. All of them run on this one task; motion already queued when a
/// phase boundary fires is applied before the boundary.

use crate::feedback::FeedbackMode;
use crate::lifecycle::Visibility;
use crate::session::WalkSession;
use crate::sequencer::SessionStatus;
use crate::step_detector::{MotionSample, StrategyKind};

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, interval_at, Duration, Instant};

/// Pacing beats are checked this often; the beat interval itself comes from
/// the strategy.
const CADENCE_POLL_MS: u64 = 50;

/// User controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Pause,
    Resume,
    Reset,
    SetMode(FeedbackMode),
}

impl SessionCommand {
    /// Parse a console command. Trims whitespace, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "p" | "pause" => Some(SessionCommand::Pause),
            "r" | "resume" => Some(SessionCommand::Resume),
            "q" | "reset" | "stop" => Some(SessionCommand::Reset),
            _ => {
                let mode = s.strip_prefix("mode ").unwrap_or(&s);
                FeedbackMode::parse(mode).map(SessionCommand::SetMode)
            }
        }
    }
}

/// Inputs the loop listens to. Any of them may close; the loop keeps
/// running on the rest.
pub struct SessionInputs {
    pub motion: Option<mpsc::Receiver<MotionSample>>,
    pub visibility: watch::Receiver<Visibility>,
    pub commands: mpsc::Receiver<SessionCommand>,
}

/// Drive a started session until it completes or is reset. Returns the
/// final status.
pub async fn run_session(session: &mut WalkSession, tick_interval: Duration, inputs: SessionInputs) -> SessionStatus {
    let SessionInputs {
        mut motion,
        mut visibility,
        mut commands,
    } = inputs;

    if !session.is_active() {
        log::warn!("Runner called on a {} session", session.status());
        return session.status();
    }

    // Burst: a stalled loop catches up so the countdown keeps wall time.
    let mut ticker = interval_at(Instant::now() + tick_interval, tick_interval);
    let mut cadence = interval(Duration::from_millis(CADENCE_POLL_MS));
    let paced = session.strategy_kind() == StrategyKind::Paced;
    let mut visibility_open = true;
    let mut commands_open = true;

    log::info!("{}", session.snapshot());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Samples taken up to this boundary belong to the phase that
                // is ending. Let producers woken at the same instant enqueue
                // theirs, then apply everything queued before the tick.
                tokio::task::yield_now().await;
                drain_motion(session, &mut motion);
                session.tick();
                match session.status() {
                    SessionStatus::Completed => break,
                    SessionStatus::Running => log::debug!("{}", session.snapshot()),
                    _ => {}
                }
            }
            sample = next_sample(&mut motion) => {
                match sample {
                    Some(sample) => apply_sample(session, &sample),
                    None => {
                        log::info!("Motion stream ended");
                        motion = None;
                    }
                }
            }
            _ = cadence.tick(), if paced => {
                session.on_cadence();
            }
            result = visibility.changed(), if visibility_open => {
                if result.is_err() {
                    visibility_open = false;
                    continue;
                }
                let v = *visibility.borrow_and_update();
                session.on_visibility(v);
            }
            cmd = commands.recv(), if commands_open => {
                let Some(cmd) = cmd else {
                    commands_open = false;
                    continue;
                };
                match cmd {
                    SessionCommand::Pause => {
                        if session.pause() {
                            log::info!("{}", session.snapshot());
                        }
                    }
                    SessionCommand::Resume => {
                        if session.resume() {
                            // A full second before the next countdown step.
                            ticker.reset();
                            log::info!("{}", session.snapshot());
                        }
                    }
                    SessionCommand::Reset => {
                        session.reset();
                        break;
                    }
                    SessionCommand::SetMode(mode) => session.set_feedback_mode(mode),
                }
            }
        }
    }

    session.status()
}

fn apply_sample(session: &mut WalkSession, sample: &MotionSample) {
    if let Some(step) = session.on_motion(sample) {
        log::debug!("Step at {} ms ({} total)", step.timestamp_ms, session.step_count());
    }
}

/// Apply every sample already waiting in the channel without blocking.
fn drain_motion(session: &mut WalkSession, motion: &mut Option<mpsc::Receiver<MotionSample>>) {
    let Some(rx) = motion.as_mut() else { return };
    loop {
        match rx.try_recv() {
            Ok(sample) => apply_sample(session, &sample),
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => break,
        }
    }
    log::info!("Motion stream ended");
    *motion = None;
}

async fn next_sample(motion: &mut Option<mpsc::Receiver<MotionSample>>) -> Option<MotionSample> {
    match motion {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::feedback::FeedbackDispatcher;
    use crate::lifecycle::LifecycleGuard;
    use crate::platform::FakePlatform;
    use crate::recorder::tests::RecordingSink;
    use crate::recorder::SessionRecorder;
    use crate::sequencer::tests::template;
    use crate::step_detector::{
        PacedCadence, PacedCadenceConfig, StepDetector, StepDetectorConfig, StepStrategy,
    };
    use std::sync::Arc;
    use tokio::time::sleep;

    const SECOND: Duration = Duration::from_secs(1);

    struct Rig {
        session: WalkSession,
        platform: FakePlatform,
        sink: Arc<RecordingSink>,
        visibility_tx: watch::Sender<Visibility>,
        commands_tx: mpsc::Sender<SessionCommand>,
        inputs: Option<SessionInputs>,
        motion_tx: mpsc::Sender<MotionSample>,
    }

    fn rig(strategy: StepStrategy, phases: &[(&str, u32, bool)]) -> Rig {
        let platform = FakePlatform::new();
        let sink = Arc::new(RecordingSink::default());
        let mut session = WalkSession::new(
            strategy,
            FeedbackDispatcher::new(FeedbackMode::Vibration),
            LifecycleGuard::new(true),
            Arc::new(platform.clone()),
            Arc::new(ManualClock::new(0)),
            SessionRecorder::inline(sink.clone()),
        );
        session.start(template(phases)).unwrap();
        let (visibility_tx, visibility_rx) = watch::channel(Visibility::Foreground);
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let (motion_tx, motion_rx) = mpsc::channel(64);
        Rig {
            session,
            platform,
            sink,
            visibility_tx,
            commands_tx,
            motion_tx,
            inputs: Some(SessionInputs {
                motion: Some(motion_rx),
                visibility: visibility_rx,
                commands: commands_rx,
            }),
        }
    }

    fn sensor() -> StepStrategy {
        StepStrategy::SensorDetected(StepDetector::new(StepDetectorConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn runs_to_completion_on_the_ticker() {
        let mut rig = rig(sensor(), &[("A", 3, false), ("B", 2, true)]);
        let inputs = rig.inputs.take().unwrap();
        let started = Instant::now();
        let status = run_session(&mut rig.session, SECOND, inputs).await;
        assert_eq!(status, SessionStatus::Completed);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
        assert_eq!(rig.session.state().phases_completed(), 2);
        assert_eq!(rig.sink.records().len(), 1);
        assert!(!rig.platform.wake_lock_held());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_the_countdown() {
        let mut rig = rig(sensor(), &[("A", 5, false)]);
        let inputs = rig.inputs.take().unwrap();
        let tx = rig.commands_tx.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2_500)).await;
            tx.send(SessionCommand::Pause).await.unwrap();
            sleep(Duration::from_millis(7_500)).await;
            tx.send(SessionCommand::Resume).await.unwrap();
        });
        let started = Instant::now();
        let status = run_session(&mut rig.session, SECOND, inputs).await;
        assert_eq!(status, SessionStatus::Completed);
        // 2 ticks, 7.5 s paused, then 3 full ticks after resume.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(13) && elapsed < Duration::from_secs(14));
        assert_eq!(rig.session.state().elapsed_ticks, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_command_ends_the_loop() {
        let mut rig = rig(sensor(), &[("A", 30, true)]);
        let inputs = rig.inputs.take().unwrap();
        let tx = rig.commands_tx.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1_500)).await;
            tx.send(SessionCommand::Reset).await.unwrap();
        });
        let status = run_session(&mut rig.session, SECOND, inputs).await;
        assert_eq!(status, SessionStatus::Idle);
        assert_eq!(rig.session.state().phase_index, 0);
        assert!(!rig.platform.wake_lock_held());
        assert!(rig.sink.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn motion_steps_are_counted() {
        let mut rig = rig(sensor(), &[("A", 3, true)]);
        let inputs = rig.inputs.take().unwrap();
        let tx = rig.motion_tx.clone();
        tokio::spawn(async move {
            for i in 0..4u64 {
                let t = i * 400;
                tx.send(MotionSample::new(t, 0.0, 0.0, 9.8)).await.unwrap();
                tx.send(MotionSample::new(t + 100, 6.0, 3.0, 14.0)).await.unwrap();
                sleep(Duration::from_millis(400)).await;
            }
        });
        let status = run_session(&mut rig.session, SECOND, inputs).await;
        assert_eq!(status, SessionStatus::Completed);
        // One step per 400 ms pair: the jolt and the return to rest fall
        // inside one debounce window. Steps at 100, 400, 800, 1200.
        assert_eq!(rig.session.step_count(), 4);
        assert_eq!(rig.sink.records()[0].steps, rig.session.step_count());
    }

    #[tokio::test(start_paused = true)]
    async fn step_on_a_phase_boundary_belongs_to_the_ending_phase() {
        let mut rig = rig(sensor(), &[("fast", 1, true), ("slow", 2, false)]);
        let inputs = rig.inputs.take().unwrap();
        rig.motion_tx.send(MotionSample::new(0, 0.0, 0.0, 9.8)).await.unwrap();
        let tx = rig.motion_tx.clone();
        // Wakes on the same instant as the first phase boundary.
        tokio::spawn(async move {
            sleep(SECOND).await;
            tx.send(MotionSample::new(1_000, 10.0, 5.0, 20.0)).await.unwrap();
        });
        let status = run_session(&mut rig.session, SECOND, inputs).await;
        assert_eq!(status, SessionStatus::Completed);
        assert_eq!(rig.session.step_count(), 1);
        let vib = rig.platform.vibrations();
        assert!(vib.contains(&vec![40]), "fast-phase step cue missing: {vib:?}");
        assert!(!vib.contains(&vec![25]), "step was given to the slow phase: {vib:?}");
    }

    #[test]
    fn queued_samples_are_drained_before_a_tick() {
        let mut rig = rig(sensor(), &[("fast", 1, true), ("slow", 2, false)]);
        let mut inputs = rig.inputs.take().unwrap();
        rig.motion_tx.try_send(MotionSample::new(0, 0.0, 0.0, 9.8)).unwrap();
        rig.motion_tx.try_send(MotionSample::new(900, 10.0, 5.0, 20.0)).unwrap();
        drain_motion(&mut rig.session, &mut inputs.motion);
        assert_eq!(rig.session.step_count(), 1);
        assert!(inputs.motion.is_some());

        drop(rig.motion_tx);
        drain_motion(&mut rig.session, &mut inputs.motion);
        assert!(inputs.motion.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn paced_strategy_beats_without_motion() {
        let paced = StepStrategy::PacedCadence(PacedCadence::new(PacedCadenceConfig::default()));
        let mut rig = rig(paced, &[("fast", 2, true)]);
        let mut inputs = rig.inputs.take().unwrap();
        inputs.motion = None;
        let status = run_session(&mut rig.session, SECOND, inputs).await;
        assert_eq!(status, SessionStatus::Completed);
        assert_eq!(rig.session.step_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn visibility_and_mode_switch() {
        let mut rig = rig(sensor(), &[("A", 2, true), ("B", 2, false)]);
        let inputs = rig.inputs.take().unwrap();
        let vis = rig.visibility_tx.clone();
        let cmd = rig.commands_tx.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            vis.send(Visibility::Background).unwrap();
            cmd.send(SessionCommand::SetMode(FeedbackMode::Sound)).await.unwrap();
            sleep(Duration::from_millis(1_000)).await;
            vis.send(Visibility::Foreground).unwrap();
        });
        let status = run_session(&mut rig.session, SECOND, inputs).await;
        assert_eq!(status, SessionStatus::Completed);
        assert_eq!(rig.platform.notices().len(), 2);
        assert!(rig.platform.tone_count() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_inputs_do_not_stop_the_timer() {
        let mut rig = rig(sensor(), &[("A", 2, true)]);
        let inputs = rig.inputs.take().unwrap();
        drop(rig.visibility_tx);
        drop(rig.commands_tx);
        drop(rig.motion_tx);
        let status = run_session(&mut rig.session, SECOND, inputs).await;
        assert_eq!(status, SessionStatus::Completed);
    }

    #[test]
    fn command_parsing() {
        assert_eq!(SessionCommand::parse(" P "), Some(SessionCommand::Pause));
        assert_eq!(SessionCommand::parse("resume"), Some(SessionCommand::Resume));
        assert_eq!(SessionCommand::parse("q"), Some(SessionCommand::Reset));
        assert_eq!(
            SessionCommand::parse("mode sound"),
            Some(SessionCommand::SetMode(FeedbackMode::Sound))
        );
        assert_eq!(
            SessionCommand::parse("vibration"),
            Some(SessionCommand::SetMode(FeedbackMode::Vibration))
        );
        assert_eq!(SessionCommand::parse("jump"), None);
    }
}
