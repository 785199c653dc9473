/// Step detection and pacing.
///
/// Two strategies produce step events for the session:
/// - `SensorDetected`: threshold-and-debounce detection on the summed
///   per-axis change between consecutive accelerometer samples.
/// - `PacedCadence`: a metronome keyed to phase intensity that ignores motion
///   entirely. Its beats drive step feedback but are not counted as steps.
///
/// The detector keeps only the previous sample and the time of the last
/// accepted step, so work per sample is O(1).

use serde::Deserialize;

/// One raw accelerometer reading (including gravity).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub timestamp_ms: u64,
}

impl MotionSample {
    pub fn new(timestamp_ms: u64, x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z, timestamp_ms }
    }

    /// |Δx| + |Δy| + |Δz| against an earlier sample.
    pub fn delta(&self, previous: &MotionSample) -> f32 {
        (self.x - previous.x).abs() + (self.y - previous.y).abs() + (self.z - previous.z).abs()
    }
}

/// A registered step (or pacing beat).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEvent {
    pub timestamp_ms: u64,
    /// Whether the phase active at detection time is high intensity.
    pub fast: bool,
}

/// Configuration for step detection.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDetectorConfig {
    /// Minimum summed axis change to count as a step.
    pub threshold: f32,
    /// Minimum time between two accepted steps in milliseconds.
    pub debounce_ms: u64,
}

impl Default for StepDetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 12.0,
            debounce_ms: 250, // max 4 steps/sec
        }
    }
}

/// Threshold + debounce step detector.
#[derive(Debug, Clone)]
pub struct StepDetector {
    config: StepDetectorConfig,
    previous: Option<MotionSample>,
    last_step_ms: Option<u64>,
}

impl StepDetector {
    pub fn new(config: StepDetectorConfig) -> Self {
        Self {
            config,
            previous: None,
            last_step_ms: None,
        }
    }

    /// Process one sample. The first sample after construction, `rebase` or
    /// `reset` only primes the baseline.
    pub fn process_sample(&mut self, sample: &MotionSample, fast: bool) -> Option<StepEvent> {
        let previous = self.previous.replace(*sample)?;
        self.process_delta(sample.delta(&previous), sample.timestamp_ms, fast)
    }

    /// Apply threshold and debounce to an already computed delta.
    pub fn process_delta(&mut self, delta: f32, timestamp_ms: u64, fast: bool) -> Option<StepEvent> {
        if delta <= self.config.threshold {
            return None;
        }
        if let Some(last) = self.last_step_ms {
            if timestamp_ms.saturating_sub(last) <= self.config.debounce_ms {
                return None;
            }
        }
        self.last_step_ms = Some(timestamp_ms);
        Some(StepEvent { timestamp_ms, fast })
    }

    /// Drop the baseline sample (listener detached). The debounce memory is
    /// kept so a resume cannot double-count the step just before the pause.
    pub fn rebase(&mut self) {
        self.previous = None;
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.last_step_ms = None;
    }

    pub fn config(&self) -> &StepDetectorConfig {
        &self.config
    }
}

/// Beat intervals for synthetic pacing.
#[derive(Debug, Clone, PartialEq)]
pub struct PacedCadenceConfig {
    pub fast_interval_ms: u64,
    pub slow_interval_ms: u64,
}

impl Default for PacedCadenceConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: 500, // 120 beats/min
            slow_interval_ms: 750, // 80 beats/min
        }
    }
}

/// Metronome keyed to phase intensity.
#[derive(Debug, Clone)]
pub struct PacedCadence {
    config: PacedCadenceConfig,
    last_beat_ms: Option<u64>,
}

impl PacedCadence {
    pub fn new(config: PacedCadenceConfig) -> Self {
        Self { config, last_beat_ms: None }
    }

    fn interval_ms(&self, fast: bool) -> u64 {
        if fast { self.config.fast_interval_ms } else { self.config.slow_interval_ms }
    }

    /// Emit a beat if one interval has passed since the previous beat. The
    /// first poll anchors the metronome without beating.
    pub fn poll(&mut self, now_ms: u64, fast: bool) -> Option<StepEvent> {
        let Some(last) = self.last_beat_ms else {
            self.last_beat_ms = Some(now_ms);
            return None;
        };
        if now_ms.saturating_sub(last) < self.interval_ms(fast) {
            return None;
        }
        self.last_beat_ms = Some(now_ms);
        Some(StepEvent { timestamp_ms: now_ms, fast })
    }

    pub fn reset(&mut self) {
        self.last_beat_ms = None;
    }

    pub fn config(&self) -> &PacedCadenceConfig {
        &self.config
    }
}

/// Which step strategy a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Sensor,
    Paced,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Sensor => f.write_str("sensor-detected"),
            StrategyKind::Paced => f.write_str("paced-cadence"),
        }
    }
}

/// Step source for a session.
#[derive(Debug, Clone)]
pub enum StepStrategy {
    SensorDetected(StepDetector),
    PacedCadence(PacedCadence),
}

impl std::fmt::Display for StepStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStrategy::SensorDetected(d) => write!(
                f,
                "{} (threshold {}, debounce {} ms)",
                self.kind(),
                d.config().threshold,
                d.config().debounce_ms
            ),
            StepStrategy::PacedCadence(p) => write!(
                f,
                "{} (fast every {} ms, slow every {} ms)",
                self.kind(),
                p.config().fast_interval_ms,
                p.config().slow_interval_ms
            ),
        }
    }
}

impl StepStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            StepStrategy::SensorDetected(_) => StrategyKind::Sensor,
            StepStrategy::PacedCadence(_) => StrategyKind::Paced,
        }
    }

    /// Whether events from this strategy are real steps that go into the count.
    pub fn counts_steps(&self) -> bool {
        matches!(self, StepStrategy::SensorDetected(_))
    }

    /// Whether this strategy needs the motion sensor.
    pub fn needs_motion(&self) -> bool {
        self.counts_steps()
    }

    pub fn on_motion(&mut self, sample: &MotionSample, fast: bool) -> Option<StepEvent> {
        match self {
            StepStrategy::SensorDetected(d) => d.process_sample(sample, fast),
            StepStrategy::PacedCadence(_) => None,
        }
    }

    pub fn on_cadence(&mut self, now_ms: u64, fast: bool) -> Option<StepEvent> {
        match self {
            StepStrategy::SensorDetected(_) => None,
            StepStrategy::PacedCadence(p) => p.poll(now_ms, fast),
        }
    }

    /// The producer is detached (pause). Counters survive.
    pub fn suspend(&mut self) {
        match self {
            StepStrategy::SensorDetected(d) => d.rebase(),
            StepStrategy::PacedCadence(p) => p.reset(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            StepStrategy::SensorDetected(d) => d.reset(),
            StepStrategy::PacedCadence(p) => p.reset(),
        }
    }
}
