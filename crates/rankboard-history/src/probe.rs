use chrono::NaiveDate;
use rankboard_core::{ChannelKind, EntityKey, Observation, QueryDescriptor, Rank};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::HistoryError;

/// What the measurement backend reports for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub rank: Rank,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_ref: Option<String>,
    /// Title of the measured page; feature pages adopt it as their name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
}

impl Measurement {
    pub fn into_observation(self, date: NaiveDate) -> Result<Observation, HistoryError> {
        if let Rank::Unrecognized(marker) = &self.rank {
            return Err(HistoryError::InvalidInput(format!(
                "measurement rank '{marker}' is neither a position nor out of range"
            )));
        }
        Ok(Observation {
            date,
            rank: self.rank,
            screenshot_ref: self.screenshot_ref,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProbeError {
    pub message: String,
}

impl ProbeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Measurement backend seam. Implementations may report progress lines
/// through `status` before returning.
pub trait RankProbe {
    fn measure(
        &self,
        descriptor: &QueryDescriptor,
        status: &mut dyn FnMut(&str),
    ) -> Result<Measurement, ProbeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Recorded { entity_key: EntityKey, rank: Rank },
    UpstreamFailed { message: String },
    Rejected { message: String },
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recorded { .. } => "recorded",
            Self::UpstreamFailed { .. } => "upstream_failed",
            Self::Rejected { .. } => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub task_index: usize,
    pub channel: ChannelKind,
    pub brand_name: String,
    #[serde(flatten)]
    pub status: TaskStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_measurement_is_rejected() {
        let measurement = Measurement {
            rank: Rank::Unrecognized("枠無".to_owned()),
            screenshot_ref: None,
            page_title: None,
        };
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        assert!(matches!(
            measurement.into_observation(date),
            Err(HistoryError::InvalidInput(_))
        ));
    }

    #[test]
    fn measurement_keeps_screenshot() {
        let measurement = Measurement {
            rank: Rank::OutOfRange,
            screenshot_ref: Some("shots/a.jpg".to_owned()),
            page_title: Some("ignored here".to_owned()),
        };
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        let observation = measurement.into_observation(date).expect("observation");
        assert_eq!(observation.rank, Rank::OutOfRange);
        assert_eq!(observation.screenshot_ref.as_deref(), Some("shots/a.jpg"));
    }

    #[test]
    fn task_outcome_json_is_flat() {
        let outcome = TaskOutcome {
            task_index: 2,
            channel: ChannelKind::LocalMap,
            brand_name: "brand".to_owned(),
            status: TaskStatus::UpstreamFailed {
                message: "timeout".to_owned(),
            },
        };
        let json = serde_json::to_value(&outcome).expect("serialize outcome");
        assert_eq!(json["status"], "upstream_failed");
        assert_eq!(json["message"], "timeout");
        assert_eq!(json["channel"], "local_map");
    }
}
