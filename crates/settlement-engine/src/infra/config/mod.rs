//! Engine configuration.

pub mod file;

use {
    crate::domain::{
        auctioneer::EmptyCoalitionPolicy,
        clearing::ChargeRule,
        pricing::{PricePolicy, Pricer},
        shapley::Allocator,
        valuation::Valuator,
    },
    std::time::Duration,
};

/// Fully validated engine configuration. Built from a TOML file
/// ([`file::load`]) or from the defaults below.
#[derive(Clone, Debug)]
pub struct Config {
    pub valuator: Valuator,
    pub pricer: Pricer,
    pub charge_rule: ChargeRule,
    pub allocator: Allocator,
    pub empty_coalition: EmptyCoalitionPolicy,
    pub replication_penalty: Option<f64>,
    pub max_coalition: usize,
    pub default_timeout: Duration,
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            valuator: Valuator::default(),
            pricer: Pricer::new(
                PricePolicy::new(50.0, 500.0).expect("default price band is valid"),
                Default::default(),
            ),
            charge_rule: ChargeRule::default(),
            allocator: Allocator::default(),
            empty_coalition: EmptyCoalitionPolicy::default(),
            replication_penalty: None,
            max_coalition: 64,
            default_timeout: Duration::from_secs(2),
            seed: None,
        }
    }
}
