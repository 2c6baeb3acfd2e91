//! Market pricing.
//!
//! Quotes are a pure function of the task type and the prediction gain the
//! candidate pool achieves: the gain maps affinely onto the configured
//! `[floor, cap]` band. No pricing state survives a request; recalibrating
//! the band from recorded history is an explicit offline step
//! ([`calibration`]).

pub mod calibration;

use {
    super::valuation::Score,
    asset_registry::TaskType,
    std::collections::HashMap,
    thiserror::Error,
};

/// A quoted market price.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Price(pub f64);

/// Price band for one task type. The floor keeps quotes bounded away from
/// zero; the cap bounds what a maximally useful pool can be quoted at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricePolicy {
    floor: f64,
    cap: f64,
}

impl PricePolicy {
    pub fn new(floor: f64, cap: f64) -> Result<Self, InvalidPolicy> {
        if !floor.is_finite() || !cap.is_finite() {
            return Err(InvalidPolicy::NonFinite);
        }
        if floor <= 0.0 {
            return Err(InvalidPolicy::FloorNotPositive { floor });
        }
        if cap < floor {
            return Err(InvalidPolicy::CapBelowFloor { floor, cap });
        }
        Ok(Self { floor, cap })
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    pub fn cap(&self) -> f64 {
        self.cap
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum InvalidPolicy {
    #[error("price bounds must be finite")]
    NonFinite,
    #[error("price floor {floor} must be positive")]
    FloorNotPositive { floor: f64 },
    #[error("price cap {cap} is below the floor {floor}")]
    CapBelowFloor { floor: f64, cap: f64 },
}

/// Quotes deterministic prices from the pool's joint prediction gain.
#[derive(Clone, Debug)]
pub struct Pricer {
    default_policy: PricePolicy,
    overrides: HashMap<TaskType, PricePolicy>,
}

impl Pricer {
    pub fn new(default_policy: PricePolicy, overrides: HashMap<TaskType, PricePolicy>) -> Self {
        Self {
            default_policy,
            overrides,
        }
    }

    pub fn default_policy(&self) -> PricePolicy {
        self.default_policy
    }

    pub fn policy(&self, task_type: &TaskType) -> PricePolicy {
        *self.overrides.get(task_type).unwrap_or(&self.default_policy)
    }

    /// Monotone non-decreasing in the gain: a pool that achieves more for
    /// the buyer is never quoted less. Always within `[floor, cap]`.
    pub fn quote(&self, task_type: &TaskType, pool_gain: Score) -> Price {
        let policy = self.policy(task_type);
        let gain = pool_gain.0.clamp(0.0, 1.0);
        Price(policy.floor + (policy.cap - policy.floor) * gain)
    }
}
