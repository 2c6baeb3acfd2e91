//! Billing decision for one auction.
//!
//! A trade clears exactly when the bid covers the quoted price. The charge
//! rule is fixed per deployment and determines the payout total downstream,
//! so it is part of the configuration rather than a per-request choice.

use {
    super::{auction::TaskId, pricing::Price},
    serde::Deserialize,
    thiserror::Error,
};

/// How the final charge is derived from quote and bid once a trade clears.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChargeRule {
    /// The buyer pays exactly the quoted price.
    #[default]
    QuotedPrice,
    /// The buyer pays halfway between quote and bid.
    Midpoint,
}

/// Outcome of the billing decision. `charge` is zero unless `cleared`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Outcome {
    pub cleared: bool,
    pub charge: f64,
}

/// Rejects bids that are not non-negative finite amounts. Runs before any
/// valuation work so malformed requests fail fast.
pub fn validate_bid(task: &TaskId, bid: f64) -> Result<(), InvalidBid> {
    if !bid.is_finite() || bid < 0.0 {
        return Err(InvalidBid {
            task: task.clone(),
            bid,
        });
    }
    Ok(())
}

/// The trade clears iff `bid >= price`.
pub fn clear(task: &TaskId, price: Price, bid: f64, rule: ChargeRule) -> Result<Outcome, InvalidBid> {
    validate_bid(task, bid)?;
    if bid < price.0 {
        return Ok(Outcome {
            cleared: false,
            charge: 0.0,
        });
    }
    let charge = match rule {
        ChargeRule::QuotedPrice => price.0,
        ChargeRule::Midpoint => (price.0 + bid) / 2.0,
    };
    Ok(Outcome {
        cleared: true,
        charge,
    })
}

#[derive(Clone, Debug, Error, PartialEq)]
#[error("task {task}: bid {bid} is not a non-negative finite amount")]
pub struct InvalidBid {
    pub task: TaskId,
    pub bid: f64,
}
