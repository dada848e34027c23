//! Maturity gate
//!
//! A prediction with an end bound can only be judged once the bound plus a
//! settle buffer (one day by default) lies strictly in the past.

use chrono::{DateTime, Duration, Utc};
use swarm_common::time::to_iso;

/// Default settle buffer after the timeframe end
pub const DEFAULT_MATURITY_BUFFER_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Maturity {
    /// No end bound, or `now > end + buffer`
    Mature,
    NotYet {
        end: DateTime<Utc>,
        eligible_after: DateTime<Utc>,
    },
}

impl Maturity {
    /// Feedback reason for an immature prediction
    pub fn reason(&self) -> Option<String> {
        match self {
            Maturity::Mature => None,
            Maturity::NotYet {
                end,
                eligible_after,
            } => Some(format!(
                "Prediction timeframe ends on {}. Predictions must be mature for at least one day before verification. Can be verified after {}.",
                to_iso(end),
                to_iso(eligible_after)
            )),
        }
    }
}

pub fn check_maturity(
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    buffer: Duration,
) -> Maturity {
    let Some(end) = end else {
        return Maturity::Mature;
    };
    let eligible_after = end + buffer;
    if now > eligible_after {
        Maturity::Mature
    } else {
        Maturity::NotYet {
            end,
            eligible_after,
        }
    }
}
