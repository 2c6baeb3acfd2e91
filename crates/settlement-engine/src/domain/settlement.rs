use {
    super::{auction::TaskId, pricing::Price, shapley, valuation},
    asset_registry::{AssetId, SellerId},
    chrono::{DateTime, Utc},
};

/// Stages of one auction request.
///
/// `Rejected` and `Settled` are terminal; a settlement is only ever exposed
/// to callers in a terminal stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Received,
    Valuating,
    Priced,
    Cleared,
    Rejected,
    Allocated,
    Settled,
}

/// One payout line of a settled trade.
#[derive(Clone, Debug, PartialEq)]
pub struct Payout {
    pub asset: AssetId,
    pub seller: SellerId,
    pub amount: f64,
}

/// An asset left out of the coalition, kept on the record so exclusions are
/// visible to the caller instead of silently shrinking payouts.
#[derive(Clone, Debug, PartialEq)]
pub struct ExcludedAsset {
    pub asset: AssetId,
    pub reason: ExclusionReason,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExclusionReason {
    /// The asset's shape is incompatible with the task.
    Incompatible(valuation::Error),
    /// The pool exceeded the coalition cap and this asset scored below the
    /// cut.
    BelowCoalitionCut { score: f64 },
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Incompatible(error) => error.fmt(f),
            Self::BelowCoalitionCut { score } => {
                write!(f, "scored {score} which is below the coalition size cut")
            }
        }
    }
}

/// Terminal record of one auction. Immutable once produced; the payout
/// amounts sum to `charge` whenever `cleared` and are empty otherwise.
#[derive(Clone, Debug)]
pub struct Settlement {
    pub task: TaskId,
    pub price: Price,
    pub bid: f64,
    pub gain: valuation::Score,
    pub cleared: bool,
    pub charge: f64,
    pub payouts: Vec<Payout>,
    pub allocation: Option<shapley::Mode>,
    pub excluded: Vec<ExcludedAsset>,
    pub registry_version: u64,
    pub settled_at: DateTime<Utc>,
}
