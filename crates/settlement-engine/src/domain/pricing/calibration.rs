//! Offline calibration of price bands from recorded settlement history.
//!
//! Both estimators discretize the configured band into a grid of candidate
//! prices and replay the recorded bids against it, crediting each candidate
//! with the revenue it would have earned (the candidate price when the bid
//! covers it, nothing otherwise). They are pure: replaying the same history
//! always yields the same recommendation, and nothing feeds back into the
//! request-path quoting without an operator updating the configuration.

use super::PricePolicy;

/// One recorded auction outcome. Only the bid matters for virtual revenue.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    pub bid: f64,
}

/// Evenly spaced candidate prices covering a policy's `[floor, cap]` band.
#[derive(Clone, Debug)]
pub struct PriceGrid {
    prices: Vec<f64>,
}

impl PriceGrid {
    pub fn new(policy: PricePolicy, experts: usize) -> Self {
        let experts = experts.max(2);
        let step = (policy.cap() - policy.floor()) / (experts - 1) as f64;
        Self {
            prices: (0..experts)
                .map(|index| policy.floor() + step * index as f64)
                .collect(),
        }
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    fn cap(&self) -> f64 {
        *self.prices.last().expect("grid has at least two prices")
    }

    fn revenue(&self, price: f64, observation: &Observation) -> f64 {
        if observation.bid >= price { price } else { 0.0 }
    }
}

/// Multiplicative-weights estimator: every candidate price keeps a weight,
/// multiplied after each observation by `1 + learning_rate * gain` where the
/// gain is the candidate's virtual revenue normalized by the band cap. The
/// recommendation is the weight-averaged price.
#[derive(Clone, Debug)]
pub struct MultiplicativeWeights {
    pub grid: PriceGrid,
    pub learning_rate: f64,
}

impl MultiplicativeWeights {
    pub fn recommend(&self, history: &[Observation]) -> f64 {
        let cap = self.grid.cap();
        let mut weights = vec![1.0; self.grid.prices().len()];

        for observation in history {
            for (index, price) in self.grid.prices().iter().enumerate() {
                let gain = self.grid.revenue(*price, observation) / cap;
                weights[index] *= 1.0 + self.learning_rate * gain;
            }
            // Rescale before the weights overflow.
            let total: f64 = weights.iter().sum();
            if total > 1e6 {
                for weight in &mut weights {
                    *weight /= total;
                }
            }
        }

        let total: f64 = weights.iter().sum();
        self.grid
            .prices()
            .iter()
            .zip(&weights)
            .map(|(price, weight)| price * weight / total)
            .sum()
    }
}

/// Upper-confidence-bound estimator: replays the history as the bandit it
/// would have faced, picking the candidate with the highest mean revenue
/// plus `sqrt(confidence * ln(rounds) / pulls)` each round, and recommends
/// the candidate with the highest posterior mean.
#[derive(Clone, Debug)]
pub struct UpperConfidenceBound {
    pub grid: PriceGrid,
    pub confidence: f64,
}

impl UpperConfidenceBound {
    pub fn recommend(&self, history: &[Observation]) -> f64 {
        let experts = self.grid.prices().len();
        let mut pulls = vec![0u64; experts];
        let mut means = vec![0.0; experts];
        let mut rounds = 0u64;

        for observation in history {
            rounds += 1;
            let choice = self.choose(&pulls, &means, rounds);
            let reward = self.grid.revenue(self.grid.prices()[choice], observation);

            pulls[choice] += 1;
            let pulled = pulls[choice] as f64;
            means[choice] = ((pulled - 1.0) / pulled) * means[choice] + reward / pulled;
        }

        let best = means
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(index, _)| index)
            .unwrap_or(0);
        self.grid.prices()[best]
    }

    fn choose(&self, pulls: &[u64], means: &[f64], rounds: u64) -> usize {
        // Try every candidate once before trusting the bonus term.
        if let Some(unpulled) = pulls.iter().position(|count| *count == 0) {
            return unpulled;
        }
        (0..pulls.len())
            .max_by(|a, b| {
                let bonus = |index: usize| {
                    (self.confidence * (rounds as f64).ln() / pulls[index] as f64).sqrt()
                };
                (means[*a] + bonus(*a)).total_cmp(&(means[*b] + bonus(*b)))
            })
            .expect("grid has at least two prices")
    }
}
