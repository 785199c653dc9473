/// TOML configuration with sensible defaults.
/// No config file is required to run; defaults work out of the box.

use crate::feedback::FeedbackMode;
use crate::step_detector::{
    PacedCadence, PacedCadenceConfig, StepDetector, StepDetectorConfig, StepStrategy, StrategyKind,
};

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session clock period. 1000 for real sessions; lower values replay faster.
    pub tick_interval_ms: u64,
    /// Optional TOML file with extra session templates.
    pub catalog_path: Option<String>,
    pub feedback: FeedbackConfig,
    pub steps: StepsConfig,
    pub lifecycle: LifecycleConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub mode: FeedbackMode,
    pub enabled: bool,
}

/// Step strategy and its tunables, shared by every program unless a
/// `[steps.programs.<id>]` table overrides them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StepsConfig {
    pub strategy: StrategyKind,
    pub threshold: f32,
    pub debounce_ms: u64,
    pub paced_fast_interval_ms: u64,
    pub paced_slow_interval_ms: u64,
    pub programs: HashMap<String, StepOverrides>,
}

/// Per-program overrides. Unset fields inherit from `[steps]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StepOverrides {
    pub strategy: Option<StrategyKind>,
    pub threshold: Option<f32>,
    pub debounce_ms: Option<u64>,
    pub paced_fast_interval_ms: Option<u64>,
    pub paced_slow_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Ask the platform to keep the screen on while a session runs.
    pub wake_lock: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Upload finished sessions. When false the record is only logged.
    pub enabled: bool,
    pub base_url: String,
    /// Bearer token for the backend.
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000, // 1Hz
            catalog_path: None,
            feedback: FeedbackConfig::default(),
            steps: StepsConfig::default(),
            lifecycle: LifecycleConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            mode: FeedbackMode::Vibration,
            enabled: true,
        }
    }
}

impl Default for StepsConfig {
    fn default() -> Self {
        let detector = StepDetectorConfig::default();
        let paced = PacedCadenceConfig::default();
        Self {
            strategy: StrategyKind::Sensor,
            threshold: detector.threshold,
            debounce_ms: detector.debounce_ms,
            paced_fast_interval_ms: paced.fast_interval_ms,
            paced_slow_interval_ms: paced.slow_interval_ms,
            programs: HashMap::new(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { wake_lock: true }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:8001".into(),
            token: None,
            timeout_ms: 5000,
        }
    }
}

impl StepsConfig {
    /// Build the step strategy for `program`, applying its overrides. A
    /// `forced` kind (command line) wins over both the override and the default.
    pub fn strategy_with(&self, program: &str, forced: Option<StrategyKind>) -> StepStrategy {
        let o = self.programs.get(program).cloned().unwrap_or_default();
        match forced.or(o.strategy).unwrap_or(self.strategy) {
            StrategyKind::Sensor => StepStrategy::SensorDetected(StepDetector::new(StepDetectorConfig {
                threshold: o.threshold.unwrap_or(self.threshold),
                debounce_ms: o.debounce_ms.unwrap_or(self.debounce_ms),
            })),
            StrategyKind::Paced => StepStrategy::PacedCadence(PacedCadence::new(PacedCadenceConfig {
                fast_interval_ms: o.paced_fast_interval_ms.unwrap_or(self.paced_fast_interval_ms),
                slow_interval_ms: o.paced_slow_interval_ms.unwrap_or(self.paced_slow_interval_ms),
            })),
        }
    }
}

impl TelemetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load config from the default config file path, or return defaults if not found.
    pub fn load() -> Self {
        let config_path = config_file_path();
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {config_path}");
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse config file {config_path}: {e}. Using defaults.");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No config file found at {config_path}. Using defaults.");
                Self::default()
            }
        }
    }
}

fn config_file_path() -> String {
    if let Ok(path) = std::env::var("WALKPACE_CONFIG") {
        path
    } else if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        format!("{xdg}/walkpace/config.toml")
    } else if let Ok(home) = std::env::var("HOME") {
        format!("{home}/.config/walkpace/config.toml")
    } else {
        "walkpace.toml".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.feedback.mode, FeedbackMode::Vibration);
        assert!(config.feedback.enabled);
        assert_eq!(config.steps.strategy, StrategyKind::Sensor);
        assert_eq!(config.steps.threshold, 12.0);
        assert_eq!(config.steps.debounce_ms, 250);
        assert!(config.lifecycle.wake_lock);
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            tick_interval_ms = 200

            [feedback]
            mode = "sound"

            [steps]
            debounce_ms = 300

            [steps.programs.marche]
            strategy = "paced"
            paced_fast_interval_ms = 450

            [telemetry]
            enabled = true
            token = "abc"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.tick_interval_ms, 200);
        assert_eq!(config.feedback.mode, FeedbackMode::Sound);
        // Other fields should be defaults
        assert!(config.feedback.enabled);
        assert_eq!(config.steps.threshold, 12.0);
        assert_eq!(config.steps.debounce_ms, 300);
        assert_eq!(config.telemetry.token.as_deref(), Some("abc"));
        assert_eq!(config.telemetry.timeout_ms, 5000);
    }

    #[test]
    fn program_overrides_select_strategy() {
        let config: Config = toml::from_str(
            r#"
            [steps.programs.marche]
            strategy = "paced"
            "#,
        )
        .unwrap();
        assert_eq!(config.steps.strategy_with("marche", None).kind(), StrategyKind::Paced);
        assert_eq!(config.steps.strategy_with("ramadan", None).kind(), StrategyKind::Sensor);
    }

    #[test]
    fn forced_kind_keeps_program_tunables() {
        let config: Config = toml::from_str(
            r#"
            [steps.programs.marche]
            strategy = "sensor"
            paced_slow_interval_ms = 900
            "#,
        )
        .unwrap();
        match config.steps.strategy_with("marche", Some(StrategyKind::Paced)) {
            StepStrategy::PacedCadence(p) => assert_eq!(p.config().slow_interval_ms, 900),
            other => panic!("Expected paced strategy, got {other:?}"),
        }
    }

    #[test]
    fn program_overrides_inherit_unset_tunables() {
        let config: Config = toml::from_str(
            r#"
            [steps]
            threshold = 10.0
            [steps.programs.ramadan]
            debounce_ms = 400
            "#,
        )
        .unwrap();
        match config.steps.strategy_with("ramadan", None) {
            StepStrategy::SensorDetected(d) => {
                assert_eq!(d.config().threshold, 10.0);
                assert_eq!(d.config().debounce_ms, 400);
            }
            other => panic!("Expected sensor strategy, got {other:?}"),
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(toml::from_str::<Config>("[feedback]\nmode = \"both\"").is_err());
    }
}
