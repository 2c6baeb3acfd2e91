use {
    asset_registry::TaskType,
    std::time::{Duration, Instant},
    thiserror::Error,
};

/// Identifies one buyer task. Supplied by the caller and only used for
/// correlation in settlement records, logs and errors.
#[derive(Clone, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub struct TaskId(pub String);

impl From<&str> for TaskId {
    fn from(inner: &str) -> Self {
        Self(inner.to_string())
    }
}

/// A buyer's prediction task for one auction run.
///
/// `targets` is the held-out series the buyer wants predicted; `baseline`
/// holds the feature columns the buyer already owns. Assets are valued by
/// how much they improve a fit over the baseline alone, so an empty baseline
/// means valuation against an intercept-only model.
#[derive(Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub task_type: TaskType,
    pub targets: Vec<f64>,
    pub baseline: Vec<Vec<f64>>,
}

impl Task {
    pub fn samples(&self) -> usize {
        self.targets.len()
    }

    /// Validates the task shape before any scoring work happens.
    pub fn validate(&self) -> Result<(), InvalidTask> {
        if self.targets.len() < 2 {
            return Err(InvalidTask::TooFewSamples {
                samples: self.targets.len(),
            });
        }
        if self.targets.iter().any(|value| !value.is_finite()) {
            return Err(InvalidTask::NonFiniteTargets);
        }
        for (index, column) in self.baseline.iter().enumerate() {
            if column.len() != self.targets.len() {
                return Err(InvalidTask::BaselineShape {
                    column: index,
                    len: column.len(),
                    expected: self.targets.len(),
                });
            }
            if column.iter().any(|value| !value.is_finite()) {
                return Err(InvalidTask::NonFiniteBaseline { column: index });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvalidTask {
    #[error("task supplies {samples} target samples, at least 2 are required")]
    TooFewSamples { samples: usize },
    #[error("targets contain a non-finite value")]
    NonFiniteTargets,
    #[error("baseline column {column} has {len} samples, expected {expected}")]
    BaselineShape {
        column: usize,
        len: usize,
        expected: usize,
    },
    #[error("baseline column {column} contains a non-finite value")]
    NonFiniteBaseline { column: usize },
}

/// Wall-clock budget for one settlement. Both the valuation fan-out and the
/// payout allocation check against it; nothing runs past it.
#[derive(Clone, Copy, Debug)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    /// The remaining budget.
    ///
    /// Returns [`std::time::Duration`] so callers can hand it directly to
    /// `tokio::time::timeout`; the error case makes an exhausted deadline
    /// impossible to miss.
    pub fn remaining(&self) -> Result<Duration, DeadlineExceeded> {
        let now = Instant::now();
        if now >= self.0 {
            Err(DeadlineExceeded)
        } else {
            Ok(self.0 - now)
        }
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("the deadline has been exceeded")]
pub struct DeadlineExceeded;
