use rankboard_core::Rank;
use serde::{Deserialize, Serialize};

/// Rank movement, in positions, at which a change counts as sharp.
pub const SHARP_CHANGE_THRESHOLD: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaDirection {
    SharpImprovement,
    Improvement,
    Unchanged,
    Decline,
    SharpDecline,
}

impl DeltaDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SharpImprovement => "sharp_improvement",
            Self::Improvement => "improvement",
            Self::Unchanged => "unchanged",
            Self::Decline => "decline",
            Self::SharpDecline => "sharp_decline",
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            Self::SharpImprovement => "↑",
            Self::Improvement => "↗",
            Self::Unchanged => "→",
            Self::Decline => "↘",
            Self::SharpDecline => "↓",
        }
    }

    fn from_diff(diff: i64) -> Self {
        if diff >= SHARP_CHANGE_THRESHOLD {
            Self::SharpImprovement
        } else if diff > 0 {
            Self::Improvement
        } else if diff == 0 {
            Self::Unchanged
        } else if diff > -SHARP_CHANGE_THRESHOLD {
            Self::Decline
        } else {
            Self::SharpDecline
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub direction: DeltaDirection,
    /// `previous - current`; positive means the rank improved.
    pub diff: i64,
}

/// Classifies the move from `previous` to `current`. Either side missing, or
/// carrying no comparable position, yields no classification.
pub fn classify(previous: Option<&Rank>, current: Option<&Rank>) -> Option<Delta> {
    let previous = previous?.comparable_position()?;
    let current = current?.comparable_position()?;
    let diff = i64::from(previous) - i64::from(current);
    Some(Delta {
        direction: DeltaDirection::from_diff(diff),
        diff,
    })
}
