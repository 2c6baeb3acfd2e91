use {
    serde::{Deserialize, Serialize},
    std::time::Duration,
};

/// A buyer's request to run one auction.
///
/// The evaluation data is supplied inline: `targets` is the held-out series
/// the buyer wants predicted, `baseline` the feature columns the buyer
/// already owns. Assets are valued by how much they improve a fit over the
/// baseline alone.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AuctionRequest {
    pub task_id: String,
    pub task_type: String,
    pub bid: f64,
    pub targets: Vec<f64>,
    /// Feature columns the buyer already owns. May be empty, in which case
    /// assets are valued against an intercept-only baseline.
    #[serde(default)]
    pub baseline: Vec<Vec<f64>>,
    /// Explicit candidate assets. When omitted, every registered asset of
    /// the task type is considered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_asset_ids: Option<Vec<u64>>,
    /// Wall-clock budget for valuation and payout allocation, e.g. "2s".
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}
