/// Error taxonomy for the session engine.
///
/// Only `InvalidTemplate` and `Catalog` ever reach a caller as `Err`.
/// Everything else is absorbed where it happens and logged: a running
/// session is never aborted by a missing sensor, a silent speaker or a
/// failed upload.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Catalog lookup miss, or a template that would hang the sequencer.
    #[error("invalid template {program}/{week}/{session}: {reason}")]
    InvalidTemplate {
        program: String,
        week: u32,
        session: u32,
        reason: String,
    },

    /// Motion sensor unavailable or access refused.
    #[error("motion sensor access denied")]
    PermissionDenied,

    /// Neither haptics nor audio can be driven on this target.
    #[error("feedback capability unavailable: {0}")]
    FeedbackUnavailable(&'static str),

    /// Telemetry submission failed.
    #[error("telemetry submission failed: {0}")]
    Persistence(String),

    /// Catalog overlay file could not be read or parsed.
    #[error("catalog load failed: {0}")]
    Catalog(String),
}

impl EngineError {
    pub fn invalid_template(program: &str, week: u32, session: u32, reason: impl Into<String>) -> Self {
        EngineError::InvalidTemplate {
            program: program.to_string(),
            week,
            session,
            reason: reason.into(),
        }
    }
}

/// Failure reported by a platform capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("capability not present on this target")]
    Unavailable,
    #[error("capability refused by the platform")]
    Denied,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_template_message_names_the_lookup() {
        let e = EngineError::invalid_template("ramadan", 9, 1, "no such week");
        assert_eq!(e.to_string(), "invalid template ramadan/9/1: no such week");
    }

    #[test]
    fn platform_errors_describe_the_capability() {
        assert_eq!(PlatformError::Denied.to_string(), "capability refused by the platform");
        assert_eq!(
            EngineError::FeedbackUnavailable("haptics").to_string(),
            "feedback capability unavailable: haptics"
        );
    }
}
