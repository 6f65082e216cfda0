//! Tracking projector
//!
//! Maps an application status onto the display timeline shown to the user.
//! No decisions are made here.

use crate::models::EstimationStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Completed,
    Current,
    Upcoming,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStep {
    pub status: EstimationStatus,
    pub title: String,
    pub description: String,
    pub state: StepState,
}

const PROGRESSION: [EstimationStatus; 4] = [
    EstimationStatus::Draft,
    EstimationStatus::Pending,
    EstimationStatus::Processing,
    EstimationStatus::Approved,
];

fn describe(status: EstimationStatus) -> (&'static str, &'static str) {
    match status {
        EstimationStatus::Draft => ("Estimation created", "AI valuation and loan offer are ready."),
        EstimationStatus::Pending => ("Application submitted", "Waiting for an appraiser to pick it up."),
        EstimationStatus::Processing => ("Under review", "The item is being verified by an appraiser."),
        EstimationStatus::Approved => ("Approved", "The loan can be disbursed at the branch."),
        EstimationStatus::Rejected => ("Rejected", "The application did not pass review."),
    }
}

fn step(status: EstimationStatus, state: StepState) -> TimelineStep {
    let (title, description) = describe(status);
    TimelineStep {
        status,
        title: title.to_string(),
        description: description.to_string(),
        state,
    }
}

pub struct TrackingProjector;

impl TrackingProjector {
    /// Steps before the current status are completed, the rest upcoming.
    /// A rejection replaces the final step and marks every earlier one completed.
    pub fn timeline(status: EstimationStatus) -> Vec<TimelineStep> {
        if status == EstimationStatus::Rejected {
            let mut steps: Vec<_> = PROGRESSION[..3]
                .iter()
                .map(|s| step(*s, StepState::Completed))
                .collect();
            steps.push(step(EstimationStatus::Rejected, StepState::Failed));
            return steps;
        }

        let current = PROGRESSION.iter().position(|s| *s == status).unwrap_or(0);

        PROGRESSION
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let state = if i < current {
                    StepState::Completed
                } else if i == current && status == EstimationStatus::Approved {
                    StepState::Completed
                } else if i == current {
                    StepState::Current
                } else {
                    StepState::Upcoming
                };
                step(*s, state)
            })
            .collect()
    }

    /// Fraction of the timeline finished, in [0, 1].
    pub fn progress(status: EstimationStatus) -> f64 {
        let steps = Self::timeline(status);
        let done = steps
            .iter()
            .filter(|s| matches!(s.state, StepState::Completed | StepState::Failed))
            .count();
        done as f64 / steps.len() as f64
    }
}
