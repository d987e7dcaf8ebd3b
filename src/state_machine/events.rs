use serde::{Deserialize, Serialize};

/// Events that can trigger sample delivery state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SampleEvent {
    /// Hard staging starts; the sample is claimed for delivery
    StartHardStage,
    /// Hard staging failed with the given reason, roll back to staged
    HardStageFailed(String),
    /// Transfer confirmed by the monitor
    Deliver,
    /// Transfer failed or timed out, as decided by the monitor
    Fail(String),
}

impl SampleEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StartHardStage => "start_hard_stage",
            Self::HardStageFailed(_) => "hard_stage_failed",
            Self::Deliver => "deliver",
            Self::Fail(_) => "fail",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::HardStageFailed(msg) | Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_metadata() {
        let failed = SampleEvent::HardStageFailed("disk full".to_string());
        assert_eq!(failed.event_type(), "hard_stage_failed");
        assert_eq!(failed.error_message(), Some("disk full"));
        assert_eq!(SampleEvent::StartHardStage.error_message(), None);
    }

    #[test]
    fn test_event_serde() {
        let json = serde_json::to_string(&SampleEvent::Fail("timeout".into())).unwrap();
        assert_eq!(json, r#"{"type":"Fail","data":"timeout"}"#);
    }
}
