/// Simulated walker: a 50 Hz accelerometer stream for targets without a
/// real motion sensor.
///
/// Gravity sits on z with a gentle sway on every axis; each stride adds one
/// heel-strike spike. Timestamps are milliseconds since the stream started.

use crate::step_detector::MotionSample;

use std::f32::consts::TAU;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

const GRAVITY: f32 = 9.81;

#[derive(Debug, Clone)]
pub struct WalkSimConfig {
    pub sample_interval_ms: u64,
    pub stride_interval_ms: u64,
    /// Heel-strike magnitude added on z (and 40% of it on x).
    pub strike: f32,
}

impl Default for WalkSimConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 20, // 50Hz
            stride_interval_ms: 520, // ~115 steps/min
            strike: 10.0,
        }
    }
}

pub struct WalkSimulator {
    config: WalkSimConfig,
    last_ms: Option<u64>,
}

impl WalkSimulator {
    pub fn new(config: WalkSimConfig) -> Self {
        Self { config, last_ms: None }
    }

    /// Reading at `t_ms`. A spike lands on the first sample past each stride
    /// boundary.
    pub fn next_sample(&mut self, t_ms: u64) -> MotionSample {
        let stride = self.config.stride_interval_ms.max(1);
        let strike = self.last_ms.is_some_and(|last| t_ms / stride > last / stride);
        self.last_ms = Some(t_ms);

        let phase = (t_ms % stride) as f32 / stride as f32 * TAU;
        let mut x = 0.3 * phase.sin();
        let y = 0.2 * phase.cos();
        let mut z = GRAVITY + 0.5 * phase.cos();
        if strike {
            x += 0.4 * self.config.strike;
            z += self.config.strike;
        }
        MotionSample::new(t_ms, x, y, z)
    }
}

/// Stream samples into `tx` until the receiver goes away.
pub async fn run(config: WalkSimConfig, tx: mpsc::Sender<MotionSample>) {
    let mut ticker = interval(Duration::from_millis(config.sample_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let origin = Instant::now();
    let mut sim = WalkSimulator::new(config);

    loop {
        ticker.tick().await;
        let t_ms = origin.elapsed().as_millis() as u64;
        if tx.send(sim.next_sample(t_ms)).await.is_err() {
            log::debug!("Motion receiver closed, simulator stopping");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step_detector::{StepDetector, StepDetectorConfig};

    #[test]
    fn one_step_per_stride() {
        let mut sim = WalkSimulator::new(WalkSimConfig {
            sample_interval_ms: 20,
            stride_interval_ms: 500,
            strike: 10.0,
        });
        let mut detector = StepDetector::new(StepDetectorConfig::default());
        let steps: Vec<u64> = (0..500u64)
            .filter_map(|i| detector.process_sample(&sim.next_sample(i * 20), false))
            .map(|s| s.timestamp_ms)
            .collect();
        // Strides cross 500, 1000, ... 9500 within the 10 s window.
        assert_eq!(steps.len(), 19);
        assert_eq!(steps[0], 500);
        assert!(steps.windows(2).all(|w| w[1] - w[0] == 500));
    }

    #[test]
    fn sway_alone_stays_below_threshold() {
        let mut sim = WalkSimulator::new(WalkSimConfig {
            strike: 0.0,
            ..WalkSimConfig::default()
        });
        let mut detector = StepDetector::new(StepDetectorConfig::default());
        let steps = (0..1000u64)
            .filter(|i| detector.process_sample(&sim.next_sample(i * 20), true).is_some())
            .count();
        assert_eq!(steps, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_stops_when_receiver_drops() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = tokio::spawn(run(WalkSimConfig::default(), tx));
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.timestamp_ms - first.timestamp_ms, 20);
        drop(rx);
        handle.await.unwrap();
    }
}
