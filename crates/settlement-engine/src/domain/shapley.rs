//! Shapley-value payout allocation.
//!
//! Small coalitions are solved exactly by walking all subsets; larger ones
//! fall back to seeded Monte-Carlo permutation sampling with a convergence
//! check between batches. Callers always learn which mode produced the
//! payouts and, for sampling, how many permutations were drawn, because that
//! determines whether the numbers are reproducible without the seed.
//!
//! Only monotone games are supported: characteristic values never decrease
//! when a coalition grows, so every payout is non-negative and members with
//! no marginal contribution in any order get exactly zero.

use {
    super::auction::{Deadline, TaskId},
    rand::{SeedableRng, rngs::StdRng, seq::SliceRandom},
    thiserror::Error,
};

/// Raw values below this are float noise from the least-squares fits, not
/// contributions; they are pinned to exactly zero.
const ZERO_EPS: f64 = 1e-9;

/// A cooperative game over at most 64 members, subsets encoded as bitmasks
/// over member indices.
pub trait CoalitionGame {
    fn members(&self) -> usize;

    /// `v(S)`. Must satisfy `v(0) == 0` and be non-decreasing in `S`.
    fn value(&self, subset: u64) -> f64;

    fn full_mask(&self) -> u64 {
        match self.members() {
            0 => 0,
            64 => u64::MAX,
            members => (1u64 << members) - 1,
        }
    }
}

/// Which algorithm produced an allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Exact,
    Sampled { samples: u64 },
}

/// Payout amounts per member index, summing to the charge.
#[derive(Clone, Debug, PartialEq)]
pub struct Allocation {
    pub payouts: Vec<f64>,
    pub mode: Mode,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    #[error("task {task}: coalition has no contributing members")]
    EmptyCoalition { task: TaskId },
    #[error("task {task}: allocation did not stabilize within {samples} samples")]
    NonConverged { task: TaskId, samples: u64 },
}

#[derive(Clone, Debug)]
pub struct Allocator {
    /// Coalitions up to this size are solved exactly over all `2^k` subsets.
    pub exact_coalition_limit: usize,
    /// Permutations drawn between convergence checks in sampled mode.
    pub sample_batch: usize,
    /// Hard budget on drawn permutations.
    pub max_samples: usize,
    /// Convergence criterion: largest batch-to-batch change of any
    /// normalized share.
    pub tolerance: f64,
}

impl Default for Allocator {
    fn default() -> Self {
        Self {
            exact_coalition_limit: 12,
            sample_batch: 64,
            max_samples: 20_000,
            tolerance: 1e-3,
        }
    }
}

impl Allocator {
    /// Computes each member's Shapley value of `game`, applies the optional
    /// per-member penalty multipliers, and normalizes the result into payout
    /// amounts summing to `charge`.
    pub fn allocate(
        &self,
        task: &TaskId,
        game: &impl CoalitionGame,
        charge: f64,
        penalties: Option<&[f64]>,
        seed: u64,
        deadline: Deadline,
    ) -> Result<Allocation, Error> {
        if game.members() == 0 {
            return Err(Error::EmptyCoalition { task: task.clone() });
        }

        let (mut values, mode) = if game.members() <= self.exact_coalition_limit {
            (self.exact(task, game, deadline)?, Mode::Exact)
        } else {
            self.sampled(task, game, seed, deadline)?
        };

        for value in &mut values {
            if *value <= ZERO_EPS {
                *value = 0.0;
            }
        }
        if let Some(penalties) = penalties {
            for (value, penalty) in values.iter_mut().zip(penalties) {
                *value *= penalty;
            }
        }

        let total: f64 = values.iter().sum();
        if total <= 0.0 {
            return Err(Error::EmptyCoalition { task: task.clone() });
        }
        Ok(Allocation {
            payouts: values
                .into_iter()
                .map(|value| charge * value / total)
                .collect(),
            mode,
        })
    }

    /// Exact Shapley values: for every member, sum the marginal contribution
    /// over all subsets not containing it, weighted by
    /// `|S|! * (k - |S| - 1)! / k!`.
    fn exact(
        &self,
        task: &TaskId,
        game: &impl CoalitionGame,
        deadline: Deadline,
    ) -> Result<Vec<f64>, Error> {
        let members = game.members();
        let weights: Vec<f64> = (0..members)
            .map(|s| factorial(s) * factorial(members - s - 1) / factorial(members))
            .collect();

        let mut values = vec![0.0; members];
        for member in 0..members {
            // An exhausted deadline mid-walk surfaces as non-convergence so
            // callers retry with a larger budget.
            if deadline.remaining().is_err() {
                return Err(Error::NonConverged {
                    task: task.clone(),
                    samples: 0,
                });
            }
            let bit = 1u64 << member;
            for subset in 0..=game.full_mask() {
                if subset & bit != 0 {
                    continue;
                }
                let marginal = (game.value(subset | bit) - game.value(subset)).max(0.0);
                values[member] += weights[subset.count_ones() as usize] * marginal;
            }
        }
        Ok(values)
    }

    /// Monte-Carlo estimate: average each member's marginal contribution to
    /// the prefix of uniformly random permutations, batch by batch, until
    /// the shares stop moving.
    fn sampled(
        &self,
        task: &TaskId,
        game: &impl CoalitionGame,
        seed: u64,
        deadline: Deadline,
    ) -> Result<(Vec<f64>, Mode), Error> {
        let members = game.members();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..members).collect();
        let mut sums = vec![0.0; members];
        let mut samples = 0u64;
        let mut previous: Option<Vec<f64>> = None;

        loop {
            for _ in 0..self.sample_batch {
                order.shuffle(&mut rng);
                let mut prefix = 0u64;
                let mut prefix_value = 0.0;
                for &member in &order {
                    prefix |= 1u64 << member;
                    let value = game.value(prefix);
                    sums[member] += (value - prefix_value).max(0.0);
                    prefix_value = value;
                }
                samples += 1;
            }

            let shares = normalized(&sums);
            if let Some(previous) = &previous {
                let delta = shares
                    .iter()
                    .zip(previous)
                    .map(|(now, before)| (now - before).abs())
                    .fold(0.0, f64::max);
                if delta <= self.tolerance {
                    let means = sums.iter().map(|sum| sum / samples as f64).collect();
                    return Ok((means, Mode::Sampled { samples }));
                }
            }
            previous = Some(shares);

            if samples as usize >= self.max_samples || deadline.remaining().is_err() {
                return Err(Error::NonConverged {
                    task: task.clone(),
                    samples,
                });
            }
        }
    }
}

fn normalized(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|value| value / total).collect()
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|i| i as f64).product()
}
