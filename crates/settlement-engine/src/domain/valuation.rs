//! Prediction-gain valuation.
//!
//! Assets are valued by fitting the task targets with ridge-regularized
//! least squares on [intercept | baseline columns | asset columns] and
//! measuring the gain `1 - rmse / std(targets)`, clamped to `[0, 1]`. An
//! asset's score is the gain it adds over the baseline-only fit. The same
//! fit, restricted to subsets of a coalition, doubles as the cooperative
//! game the payout allocator solves.

use {
    super::{auction::Task, shapley::CoalitionGame},
    asset_registry::Asset,
    nalgebra::{DMatrix, DVector},
    std::{cell::RefCell, collections::HashMap, sync::Arc},
    thiserror::Error,
};

/// A prediction-gain score in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Score(pub f64);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("asset has {actual} samples per column, task has {expected}")]
    SampleMismatch { actual: usize, expected: usize },
}

/// Deterministic valuator. Identical inputs produce identical scores, which
/// makes settlements reproducible.
#[derive(Clone, Debug)]
pub struct Valuator {
    /// Tikhonov regularization added to the normal equations. Keeps the
    /// system solvable in the presence of collinear feature columns.
    pub ridge: f64,
}

impl Default for Valuator {
    fn default() -> Self {
        Self { ridge: 1e-6 }
    }
}

impl Valuator {
    /// Gain of fitting the targets on the buyer's baseline features alone.
    pub fn baseline_gain(&self, task: &Task) -> f64 {
        self.fit_gain(task, &[])
    }

    /// Scores one asset: the gain its columns add over the baseline fit.
    pub fn score(&self, asset: &Asset, task: &Task) -> Result<Score, Error> {
        if asset.data.samples() != task.samples() {
            return Err(Error::SampleMismatch {
                actual: asset.data.samples(),
                expected: task.samples(),
            });
        }
        let columns: Vec<&[f64]> = asset.data.columns().iter().map(Vec::as_slice).collect();
        let gain = self.fit_gain(task, &columns) - self.baseline_gain(task);
        Ok(Score(gain.clamp(0.0, 1.0)))
    }

    /// Gain of a least-squares fit on intercept, baseline columns and
    /// `extra` columns: `max(0, 1 - rmse / std(targets))`.
    ///
    /// Adding columns never increases the training residual, so the gain is
    /// monotone non-decreasing in `extra`.
    fn fit_gain(&self, task: &Task, extra: &[&[f64]]) -> f64 {
        let samples = task.samples();
        let features = 1 + task.baseline.len() + extra.len();

        let mut x = DMatrix::zeros(samples, features);
        for row in 0..samples {
            x[(row, 0)] = 1.0;
        }
        let columns = task
            .baseline
            .iter()
            .map(Vec::as_slice)
            .chain(extra.iter().copied());
        for (index, column) in columns.enumerate() {
            for (row, value) in column.iter().enumerate() {
                x[(row, index + 1)] = *value;
            }
        }

        let y = DVector::from_column_slice(&task.targets);
        let xt = x.transpose();
        let gram = &xt * &x + DMatrix::identity(features, features) * self.ridge;
        let Some(cholesky) = gram.cholesky() else {
            return 0.0;
        };
        let beta = cholesky.solve(&(&xt * &y));

        let residual = &y - &x * beta;
        let rmse = (residual.norm_squared() / samples as f64).sqrt();
        let std = standard_deviation(&task.targets);
        if std <= f64::EPSILON {
            // Constant targets: either the fit is perfect or no gain exists.
            return if rmse <= f64::EPSILON { 1.0 } else { 0.0 };
        }
        (1.0 - rmse / std).clamp(0.0, 1.0)
    }
}

fn standard_deviation(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt()
}

/// Characteristic function of the cooperative game played by a fixed member
/// list: `v(S)` is the gain the subset `S` adds over the baseline fit.
///
/// Values are memoized per subset bitmask since both the exact allocator and
/// the permutation sampler revisit subsets.
pub struct CoalitionValue<'a> {
    valuator: &'a Valuator,
    task: &'a Task,
    members: &'a [Arc<Asset>],
    baseline_gain: f64,
    cache: RefCell<HashMap<u64, f64>>,
}

impl<'a> CoalitionValue<'a> {
    pub fn new(valuator: &'a Valuator, task: &'a Task, members: &'a [Arc<Asset>]) -> Self {
        assert!(
            members.len() <= 64,
            "coalitions are capped to bitmask-sized member lists"
        );
        Self {
            valuator,
            task,
            members,
            baseline_gain: valuator.baseline_gain(task),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// The absolute prediction gain the full coalition achieves for the
    /// buyer, baseline included.
    pub fn pool_gain(&self) -> Score {
        Score((self.baseline_gain + self.value(self.full_mask())).clamp(0.0, 1.0))
    }
}

impl CoalitionGame for CoalitionValue<'_> {
    fn members(&self) -> usize {
        self.members.len()
    }

    fn value(&self, subset: u64) -> f64 {
        if subset == 0 {
            return 0.0;
        }
        if let Some(value) = self.cache.borrow().get(&subset) {
            return *value;
        }
        let columns: Vec<&[f64]> = self
            .members
            .iter()
            .enumerate()
            .filter(|(index, _)| subset & (1 << index) != 0)
            .flat_map(|(_, asset)| asset.data.columns().iter().map(Vec::as_slice))
            .collect();
        let value = (self.valuator.fit_gain(self.task, &columns) - self.baseline_gain).max(0.0);
        self.cache.borrow_mut().insert(subset, value);
        value
    }
}

/// Penalty multipliers `exp(-lambda * total_similarity)`, one per member,
/// that blunt the payout gains from uploading near-duplicate data.
///
/// A member's total similarity is the sum of cosine similarities between its
/// per-sample column mean and every other member's.
pub fn replication_penalties(members: &[Arc<Asset>], lambda: f64) -> Vec<f64> {
    let profiles: Vec<DVector<f64>> = members.iter().map(|asset| profile(asset)).collect();
    (0..members.len())
        .map(|i| {
            let total: f64 = (0..members.len())
                .filter(|j| *j != i)
                .map(|j| cosine_similarity(&profiles[i], &profiles[j]))
                .sum();
            (-lambda * total).exp()
        })
        .collect()
}

fn profile(asset: &Asset) -> DVector<f64> {
    let columns = asset.data.columns();
    let samples = asset.data.samples();
    let mut mean = DVector::zeros(samples);
    for column in columns {
        mean += DVector::from_column_slice(column);
    }
    mean / columns.len() as f64
}

fn cosine_similarity(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let norms = a.norm() * b.norm();
    if norms <= f64::EPSILON {
        return 0.0;
    }
    a.dot(b) / norms
}
