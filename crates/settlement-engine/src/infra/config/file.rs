use {
    super::Config,
    crate::domain::{
        auctioneer::EmptyCoalitionPolicy,
        clearing::ChargeRule,
        pricing::{PricePolicy, Pricer},
        shapley::Allocator,
        valuation::Valuator,
    },
    asset_registry::TaskType,
    serde::Deserialize,
    std::{collections::HashMap, path::Path, time::Duration},
    tokio::fs,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
struct RawConfig {
    valuation: RawValuation,
    pricing: RawPricing,
    clearing: RawClearing,
    allocation: RawAllocation,
    /// Budget applied to requests that do not carry their own deadline.
    #[serde(with = "humantime_serde")]
    default_timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
struct RawValuation {
    ridge: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
struct RawPricing {
    floor: f64,
    cap: f64,
    /// Per-task-type price bands overriding the default one.
    task_types: HashMap<String, RawBand>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawBand {
    floor: f64,
    cap: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
struct RawClearing {
    charge_rule: ChargeRule,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
struct RawAllocation {
    exact_coalition_limit: usize,
    sample_batch: usize,
    max_samples: usize,
    tolerance: f64,
    max_coalition: usize,
    empty_coalition: EmptyCoalitionPolicy,
    seed: Option<u64>,
    replication_penalty: Option<f64>,
}

impl Default for RawValuation {
    fn default() -> Self {
        Self {
            ridge: Valuator::default().ridge,
        }
    }
}

impl Default for RawPricing {
    fn default() -> Self {
        Self {
            floor: 50.0,
            cap: 500.0,
            task_types: HashMap::new(),
        }
    }
}

impl Default for RawAllocation {
    fn default() -> Self {
        let allocator = Allocator::default();
        Self {
            exact_coalition_limit: allocator.exact_coalition_limit,
            sample_batch: allocator.sample_batch,
            max_samples: allocator.max_samples,
            tolerance: allocator.tolerance,
            max_coalition: 64,
            empty_coalition: EmptyCoalitionPolicy::default(),
            seed: None,
            replication_penalty: None,
        }
    }
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            valuation: RawValuation::default(),
            pricing: RawPricing::default(),
            clearing: RawClearing::default(),
            allocation: RawAllocation::default(),
            default_timeout: Duration::from_secs(2),
        }
    }
}

/// Load the engine configuration from a TOML file.
///
/// # Panics
///
/// This method panics if the config is invalid or on I/O errors.
pub async fn load(path: &Path) -> Config {
    let data = fs::read_to_string(path)
        .await
        .unwrap_or_else(|e| panic!("I/O error while reading {path:?}: {e:?}"));
    load_str(&data)
}

/// Like [`load`], for an in-memory TOML string.
pub fn load_str(data: &str) -> Config {
    let raw = toml::de::from_str::<RawConfig>(data)
        .unwrap_or_else(|e| panic!("TOML syntax error in configuration: {e:?}"));
    build(raw)
}

fn build(raw: RawConfig) -> Config {
    let default_policy = PricePolicy::new(raw.pricing.floor, raw.pricing.cap)
        .unwrap_or_else(|e| panic!("invalid configuration: {e}"));
    let overrides = raw
        .pricing
        .task_types
        .into_iter()
        .map(|(name, band)| {
            let policy = PricePolicy::new(band.floor, band.cap)
                .unwrap_or_else(|e| panic!("invalid configuration for task type {name:?}: {e}"));
            (TaskType(name), policy)
        })
        .collect();

    let allocation = raw.allocation;
    if allocation.exact_coalition_limit > 20 {
        panic!(
            "invalid configuration: exact-coalition-limit {} walks more than 2^20 subsets",
            allocation.exact_coalition_limit
        );
    }
    if allocation.max_coalition > 64 {
        panic!("invalid configuration: max-coalition cannot exceed 64");
    }
    if allocation.sample_batch == 0 {
        panic!("invalid configuration: sample-batch must be at least 1");
    }
    if allocation.max_samples < allocation.sample_batch {
        panic!("invalid configuration: max-samples is smaller than one sample batch");
    }
    if !(allocation.tolerance > 0.0) {
        panic!("invalid configuration: tolerance must be positive");
    }

    Config {
        valuator: Valuator {
            ridge: raw.valuation.ridge,
        },
        pricer: Pricer::new(default_policy, overrides),
        charge_rule: raw.clearing.charge_rule,
        allocator: Allocator {
            exact_coalition_limit: allocation.exact_coalition_limit,
            sample_batch: allocation.sample_batch,
            max_samples: allocation.max_samples,
            tolerance: allocation.tolerance,
        },
        empty_coalition: allocation.empty_coalition,
        replication_penalty: allocation.replication_penalty,
        max_coalition: allocation.max_coalition,
        default_timeout: raw.default_timeout,
        seed: allocation.seed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_full_configuration() {
        let config = load_str(
            r#"
            default-timeout = "5s"

            [valuation]
            ridge = 1e-4

            [pricing]
            floor = 90.0
            cap = 190.0

            [pricing.task-types.imaging]
            floor = 10.0
            cap = 40.0

            [clearing]
            charge-rule = "midpoint"

            [allocation]
            exact-coalition-limit = 10
            sample-batch = 32
            max-samples = 4096
            tolerance = 1e-4
            max-coalition = 32
            empty-coalition = "retain"
            seed = 7
            replication-penalty = 0.6931
            "#,
        );

        assert_eq!(config.valuator.ridge, 1e-4);
        assert_eq!(config.pricer.policy(&"other".into()).floor(), 90.0);
        assert_eq!(config.pricer.policy(&"imaging".into()).cap(), 40.0);
        assert_eq!(config.charge_rule, ChargeRule::Midpoint);
        assert_eq!(config.allocator.exact_coalition_limit, 10);
        assert_eq!(config.allocator.max_samples, 4096);
        assert_eq!(config.empty_coalition, EmptyCoalitionPolicy::Retain);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.replication_penalty, Some(0.6931));
        assert_eq!(config.default_timeout, Duration::from_secs(5));
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = load_str("");
        assert_eq!(config.pricer.policy(&"any".into()).floor(), 50.0);
        assert_eq!(config.pricer.policy(&"any".into()).cap(), 500.0);
        assert_eq!(config.charge_rule, ChargeRule::QuotedPrice);
        assert_eq!(config.allocator.exact_coalition_limit, 12);
        assert_eq!(config.seed, None);
    }

    #[tokio::test]
    async fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[pricing]\nfloor = 10.0\ncap = 20.0").unwrap();

        let config = load(file.path()).await;
        assert_eq!(config.pricer.policy(&"any".into()).cap(), 20.0);
    }

    #[test]
    #[should_panic(expected = "invalid configuration")]
    fn rejects_non_positive_floor() {
        load_str("[pricing]\nfloor = 0.0\ncap = 100.0");
    }

    #[test]
    #[should_panic(expected = "max-coalition")]
    fn rejects_oversized_coalition_cap() {
        load_str("[allocation]\nmax-coalition = 65");
    }

    #[test]
    #[should_panic(expected = "TOML syntax error")]
    fn rejects_unknown_fields() {
        load_str("[pricing]\nflour = 50.0");
    }
}
