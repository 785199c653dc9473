/// Session recorder: builds the completed-session telemetry record and
/// submits it once to the backend.
///
/// A single best-effort attempt, no retry. Failures are logged and never
/// reach the session: the completion screen is driven by local state only.

use crate::catalog::SessionTemplate;
use crate::error::EngineError;
use crate::sequencer::RunState;

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

const SESSIONS_PATH: &str = "/api/walking/sessions";
const USER_AGENT: &str = concat!("walkpace/", env!("CARGO_PKG_VERSION"));

/// Summary of one finished session, as the backend expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionTelemetry {
    pub week_id: u32,
    pub seance_id: String,
    pub steps: u64,
    pub duration_minutes: u32,
    pub phases_completed: u32,
}

impl SessionTelemetry {
    /// Build the record from the final run state. Duration is wall-clock
    /// time between start and completion, pauses included.
    pub fn from_run(template: &SessionTemplate, state: &RunState, started_ms: u64, completed_ms: u64) -> Self {
        Self {
            week_id: template.key.week,
            seance_id: template.seance_id.clone(),
            steps: state.step_count,
            duration_minutes: elapsed_minutes(started_ms, completed_ms),
            phases_completed: state.phases_completed() as u32,
        }
    }
}

/// Whole minutes between two clock readings, rounded to nearest.
pub fn elapsed_minutes(started_ms: u64, completed_ms: u64) -> u32 {
    let elapsed = completed_ms.saturating_sub(started_ms);
    ((elapsed + 30_000) / 60_000) as u32
}

/// Destination for telemetry records.
pub trait TelemetrySink: Send + Sync {
    fn submit(&self, telemetry: &SessionTelemetry) -> Result<(), EngineError>;
}

/// Authenticated JSON POST to the backend.
pub struct HttpTelemetrySink {
    agent: ureq::Agent,
    endpoint: String,
    token: Option<String>,
}

impl HttpTelemetrySink {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            endpoint: format!("{}{SESSIONS_PATH}", base_url.trim_end_matches('/')),
            token,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TelemetrySink for HttpTelemetrySink {
    fn submit(&self, telemetry: &SessionTelemetry) -> Result<(), EngineError> {
        let mut request = self
            .agent
            .post(&self.endpoint)
            .header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request
            .send_json(telemetry)
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        Ok(())
    }
}

/// Sink used when telemetry is disabled: the record is only logged.
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn submit(&self, telemetry: &SessionTelemetry) -> Result<(), EngineError> {
        let json = serde_json::to_string(telemetry).map_err(|e| EngineError::Persistence(e.to_string()))?;
        log::info!("Telemetry (not uploaded): {json}");
        Ok(())
    }
}

/// Hands finished sessions to a sink. Clones share pending workers.
#[derive(Clone)]
pub struct SessionRecorder {
    sink: Arc<dyn TelemetrySink>,
    detached: bool,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl SessionRecorder {
    /// Submit on the caller's thread.
    #[cfg(test)]
    pub fn inline(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            sink,
            detached: false,
            pending: Arc::default(),
        }
    }

    /// Submit on a short-lived worker thread so the event loop never waits
    /// on the network.
    pub fn detached(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            sink,
            detached: true,
            pending: Arc::default(),
        }
    }

    /// Block until every detached submission has finished. Called before
    /// process exit; the sink timeout bounds the wait.
    pub fn wait(&self) {
        let handles: Vec<_> = match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => return,
        };
        for handle in handles {
            if handle.join().is_err() {
                log::warn!("Telemetry worker panicked");
            }
        }
    }

    /// Fire-and-forget submission.
    pub fn record(&self, telemetry: SessionTelemetry) {
        if !self.detached {
            submit_once(self.sink.as_ref(), &telemetry);
            return;
        }
        let sink = Arc::clone(&self.sink);
        let spawned = std::thread::Builder::new()
            .name("telemetry-submit".into())
            .spawn(move || submit_once(sink.as_ref(), &telemetry));
        match spawned {
            Ok(handle) => {
                if let Ok(mut pending) = self.pending.lock() {
                    pending.push(handle);
                }
            }
            Err(e) => log::warn!("Telemetry worker could not start: {e}"),
        }
    }
}

fn submit_once(sink: &dyn TelemetrySink, telemetry: &SessionTelemetry) {
    match sink.submit(telemetry) {
        Ok(()) => log::info!(
            "Telemetry sent: {} steps, {} min, {} phases ({})",
            telemetry.steps,
            telemetry.duration_minutes,
            telemetry.phases_completed,
            telemetry.seance_id
        ),
        Err(e) => log::warn!("{e}; session {} kept locally only", telemetry.seance_id),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::SessionTemplateCatalog;
    use crate::sequencer::SessionStatus;

    /// Sink double: stores every record, optionally failing each submission.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub records: Mutex<Vec<SessionTelemetry>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub(crate) fn failing() -> Self {
            Self { fail: true, ..Self::default() }
        }

        pub(crate) fn records(&self) -> Vec<SessionTelemetry> {
            self.records.lock().unwrap().clone()
        }
    }

    impl TelemetrySink for RecordingSink {
        fn submit(&self, telemetry: &SessionTelemetry) -> Result<(), EngineError> {
            self.records.lock().unwrap().push(telemetry.clone());
            if self.fail {
                Err(EngineError::Persistence("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    fn sample() -> SessionTelemetry {
        SessionTelemetry {
            week_id: 2,
            seance_id: "s2-1".into(),
            steps: 3120,
            duration_minutes: 31,
            phases_completed: 17,
        }
    }

    #[test]
    fn wire_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["week_id"], 2);
        assert_eq!(json["seance_id"], "s2-1");
        assert_eq!(json["steps"], 3120);
        assert_eq!(json["duration_minutes"], 31);
        assert_eq!(json["phases_completed"], 17);
    }

    #[test]
    fn minutes_come_from_wall_clock() {
        assert_eq!(elapsed_minutes(0, 0), 0);
        assert_eq!(elapsed_minutes(0, 29_999), 0);
        assert_eq!(elapsed_minutes(0, 30_000), 1);
        assert_eq!(elapsed_minutes(10_000, 10_000 + 25 * 60_000 + 40_000), 26);
        assert_eq!(elapsed_minutes(5_000, 1_000), 0);
    }

    #[test]
    fn from_run_uses_template_identity() {
        let catalog = SessionTemplateCatalog::builtin();
        let t = catalog.lookup("ramadan", 2, 1).unwrap();
        let state = RunState {
            phase_index: t.len(),
            time_remaining_s: 0,
            step_count: 812,
            status: SessionStatus::Completed,
            elapsed_ticks: t.total_duration_s(),
        };
        let rec = SessionTelemetry::from_run(t, &state, 1_000, 1_000 + 45 * 60_000);
        assert_eq!(rec.week_id, 2);
        assert_eq!(rec.seance_id, "s2-1");
        assert_eq!(rec.steps, 812);
        assert_eq!(rec.duration_minutes, 45);
        assert_eq!(rec.phases_completed as usize, t.len());
    }

    #[test]
    fn failed_submission_is_swallowed() {
        let sink = Arc::new(RecordingSink::failing());
        let recorder = SessionRecorder::inline(sink.clone());
        recorder.record(sample());
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn detached_submission_runs_once() {
        let sink = Arc::new(RecordingSink::default());
        let recorder = SessionRecorder::detached(sink.clone());
        recorder.record(sample());
        recorder.clone().wait();
        assert_eq!(sink.records(), vec![sample()]);
        recorder.wait();
    }

    #[test]
    fn http_sink_endpoint_joins_base_url() {
        let sink = HttpTelemetrySink::new("https://api.example.test/", None, Duration::from_secs(5));
        assert_eq!(sink.endpoint(), "https://api.example.test/api/walking/sessions");
    }

    #[test]
    fn http_sink_unreachable_backend_is_persistence_error() {
        // Port 9 on localhost: nothing listens, connection is refused fast.
        let sink = HttpTelemetrySink::new("http://127.0.0.1:9", Some("t".into()), Duration::from_millis(500));
        let err = sink.submit(&sample()).unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
    }

    #[test]
    fn log_sink_accepts_record() {
        assert!(LogSink.submit(&sample()).is_ok());
    }
}
