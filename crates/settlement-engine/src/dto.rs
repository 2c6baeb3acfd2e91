//! Conversion from domain settlements to the wire model.

use crate::domain::{settlement::Settlement, shapley};

pub fn settlement_record(settlement: &Settlement) -> model::SettlementRecord {
    model::SettlementRecord {
        task_id: settlement.task.0.clone(),
        market_price_offered: settlement.price.0,
        your_bid: settlement.bid,
        prediction_gain_achieved: settlement.gain.0,
        cleared: settlement.cleared,
        cost_to_you: settlement.charge,
        seller_payouts: settlement
            .payouts
            .iter()
            .map(|payout| model::SellerPayout {
                seller_id: payout.seller.0.clone(),
                asset_id: payout.asset.0,
                amount: payout.amount,
            })
            .collect(),
        allocation: settlement.allocation.map(|mode| match mode {
            shapley::Mode::Exact => model::AllocationReport::Exact,
            shapley::Mode::Sampled { samples } => model::AllocationReport::Sampled { samples },
        }),
        excluded_assets: settlement
            .excluded
            .iter()
            .map(|excluded| model::ExcludedAsset {
                asset_id: excluded.asset.0,
                reason: excluded.reason.to_string(),
            })
            .collect(),
        registry_version: settlement.registry_version,
        settled_at: settlement.settled_at,
    }
}
