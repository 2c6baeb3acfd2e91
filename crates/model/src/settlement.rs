use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// The terminal outcome of one auction.
///
/// Produced exactly once per request. When the trade clears, the payout
/// amounts sum to `cost_to_you`; when it does not, `seller_payouts` is empty
/// and `cost_to_you` is zero.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SettlementRecord {
    pub task_id: String,
    pub market_price_offered: f64,
    pub your_bid: f64,
    pub prediction_gain_achieved: f64,
    pub cleared: bool,
    pub cost_to_you: f64,
    /// Ordered by descending amount, ties broken by asset id.
    pub seller_payouts: Vec<SellerPayout>,
    /// How the payouts were computed. Absent for rejected trades.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<AllocationReport>,
    /// Assets that could not be valued and were left out of the coalition.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_assets: Vec<ExcludedAsset>,
    /// Version of the asset registry snapshot the auction ran against.
    pub registry_version: u64,
    pub settled_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SellerPayout {
    pub seller_id: String,
    pub asset_id: u64,
    pub amount: f64,
}

/// Which allocation algorithm produced the payouts.
///
/// Sampled allocations are only reproducible together with the engine's RNG
/// seed, so the distinction is surfaced to API consumers.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AllocationReport {
    Exact,
    Sampled { samples: u64 },
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExcludedAsset {
    pub asset_id: u64,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SettlementRecord {
        SettlementRecord {
            task_id: "task-7".to_string(),
            market_price_offered: 180.0,
            your_bid: 200.0,
            prediction_gain_achieved: 0.9,
            cleared: true,
            cost_to_you: 180.0,
            seller_payouts: vec![SellerPayout {
                seller_id: "alice".to_string(),
                asset_id: 1,
                amount: 180.0,
            }],
            allocation: Some(AllocationReport::Exact),
            excluded_assets: vec![],
            registry_version: 3,
            settled_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn serializes_api_field_names() {
        let json = serde_json::to_value(record()).unwrap();

        assert_eq!(json["market_price_offered"], 180.0);
        assert_eq!(json["your_bid"], 200.0);
        assert_eq!(json["prediction_gain_achieved"], 0.9);
        assert_eq!(json["cost_to_you"], 180.0);
        assert_eq!(json["seller_payouts"][0]["seller_id"], "alice");
        assert_eq!(json["seller_payouts"][0]["amount"], 180.0);
        assert_eq!(json["allocation"]["mode"], "exact");
        // Empty exclusion lists are omitted from the wire format entirely.
        assert!(json.get("excluded_assets").is_none());
    }

    #[test]
    fn sampled_allocation_reports_sample_count() {
        let mut record = record();
        record.allocation = Some(AllocationReport::Sampled { samples: 1280 });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["allocation"]["mode"], "sampled");
        assert_eq!(json["allocation"]["samples"], 1280);
    }

    #[test]
    fn roundtrips_rejected_trade() {
        let record = SettlementRecord {
            cleared: false,
            cost_to_you: 0.0,
            seller_payouts: vec![],
            allocation: None,
            ..record()
        };

        let json = serde_json::to_string(&record).unwrap();
        let parsed: SettlementRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.seller_payouts.is_empty());
    }
}
