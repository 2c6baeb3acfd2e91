//! The per-request auction state machine.
//!
//! One settlement walks RECEIVED -> VALUATING -> PRICED -> CLEARED|REJECTED
//! -> ALLOCATED -> SETTLED against a single registry snapshot. Callers only
//! ever see a terminal [`Settlement`] or a typed [`Error`]; there is no
//! partially computed result to observe.

use {
    super::{
        auction::{Deadline, InvalidTask, Task, TaskId},
        clearing::{self, ChargeRule, InvalidBid},
        pricing::Pricer,
        settlement::{ExcludedAsset, ExclusionReason, Payout, Settlement, Stage},
        shapley::{self, Allocator},
        valuation::{self, CoalitionValue, Score, Valuator},
    },
    asset_registry::{Asset, AssetId, TaskType},
    futures::future::join_all,
    itertools::Itertools,
    serde::Deserialize,
    std::{
        hash::{DefaultHasher, Hash, Hasher},
        sync::Arc,
        time::Duration,
    },
    thiserror::Error,
};

/// Read-only view of the asset registry one auction runs against.
///
/// All reads of a single auction resolve against the same implementation
/// instance, so a consistent snapshot is enough and no locking is needed.
/// [`asset_registry::Snapshot`] is the production implementation.
#[cfg_attr(test, mockall::automock)]
pub trait Catalog: Send + Sync {
    /// Version of the registry view, recorded on the settlement.
    fn version(&self) -> u64;
    fn list_assets(&self, task_type: &TaskType) -> Vec<Arc<Asset>>;
    fn load(&self, id: AssetId) -> Option<Arc<Asset>>;
}

impl Catalog for asset_registry::Snapshot {
    fn version(&self) -> u64 {
        self.version()
    }

    fn list_assets(&self, task_type: &TaskType) -> Vec<Arc<Asset>> {
        self.list_assets(task_type)
    }

    fn load(&self, id: AssetId) -> Option<Arc<Asset>> {
        self.load(id).ok()
    }
}

/// What happens to the buyer's charge when a cleared trade ends up without
/// any contributing seller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyCoalitionPolicy {
    #[default]
    Refund,
    Retain,
}

/// The applied outcome for the buyer's money, reported inside
/// [`Error::EmptyCoalition`] so it is never ambiguous.
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum Disposition {
    #[display("refunded to the buyer")]
    Refunded,
    #[display("retained by the platform")]
    Retained,
}

#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("task {task}: {reason}")]
    InvalidTask {
        task: TaskId,
        #[source]
        reason: InvalidTask,
    },
    #[error(transparent)]
    InvalidBid(#[from] InvalidBid),
    #[error("task {task}: candidate asset {asset} is not registered")]
    UnknownAsset { task: TaskId, asset: AssetId },
    #[error("task {task}: valuation exceeded its {budget:?} budget")]
    ValuationTimeout { task: TaskId, budget: Duration },
    #[error(
        "task {task}: payout allocation did not stabilize within {samples} samples; retry with a \
         larger budget or looser tolerance"
    )]
    NonConvergedEstimate { task: TaskId, samples: u64 },
    #[error("task {task}: no contributing sellers; the charge of {charge} is {disposition}")]
    EmptyCoalition {
        task: TaskId,
        charge: f64,
        disposition: Disposition,
    },
}

/// Runs the settlement state machine for individual auction requests.
///
/// Holds configuration only; auctions share nothing mutable, so any number
/// of them may run concurrently on one `Auctioneer`.
#[derive(Clone, Debug)]
pub struct Auctioneer {
    pub valuator: Valuator,
    pub pricer: Pricer,
    pub allocator: Allocator,
    pub charge_rule: ChargeRule,
    pub empty_coalition_policy: EmptyCoalitionPolicy,
    /// Penalty strength for near-duplicate data; `None` disables the
    /// penalty.
    pub replication_penalty: Option<f64>,
    /// Oversized pools keep only this many top-scored assets.
    pub max_coalition: usize,
    /// Budget applied when the request does not carry its own.
    pub default_timeout: Duration,
    /// Fixed sampling seed. When unset, a stable seed is derived per
    /// request so settlements stay reproducible.
    pub seed: Option<u64>,
}

impl Auctioneer {
    pub async fn settle(
        &self,
        catalog: &impl Catalog,
        task: Task,
        bid: f64,
        candidates: Option<Vec<AssetId>>,
        timeout: Option<Duration>,
    ) -> Result<Settlement, Error> {
        let deadline = Deadline::after(timeout.unwrap_or(self.default_timeout));
        tracing::debug!(task = %task.id, bid, stage = ?Stage::Received, "auction received");

        clearing::validate_bid(&task.id, bid)?;
        task.validate().map_err(|reason| Error::InvalidTask {
            task: task.id.clone(),
            reason,
        })?;

        let pool = self.resolve_candidates(catalog, &task, candidates)?;
        if pool.is_empty() {
            return Err(self.empty_coalition(&task.id, 0.0));
        }

        tracing::debug!(
            task = %task.id,
            assets = pool.len(),
            stage = ?Stage::Valuating,
            "scoring candidates"
        );
        let task = Arc::new(task);
        let (scored, mut excluded) = self.valuate(&task, pool, deadline).await?;
        if scored.is_empty() {
            return Err(self.empty_coalition(&task.id, 0.0));
        }
        let members = self.cap_coalition(scored, &mut excluded);

        let value = CoalitionValue::new(&self.valuator, &task, &members);
        let gain = value.pool_gain();
        let price = self.pricer.quote(&task.task_type, gain);
        tracing::debug!(
            task = %task.id,
            price = price.0,
            gain = gain.0,
            stage = ?Stage::Priced,
            "quoted"
        );

        let outcome = clearing::clear(&task.id, price, bid, self.charge_rule)?;
        if !outcome.cleared {
            tracing::info!(
                task = %task.id,
                price = price.0,
                bid,
                stage = ?Stage::Rejected,
                "bid below quote"
            );
            return Ok(Settlement {
                task: task.id.clone(),
                price,
                bid,
                gain,
                cleared: false,
                charge: 0.0,
                payouts: vec![],
                allocation: None,
                excluded,
                registry_version: catalog.version(),
                settled_at: chrono::Utc::now(),
            });
        }
        tracing::debug!(
            task = %task.id,
            charge = outcome.charge,
            stage = ?Stage::Cleared,
            "cleared"
        );

        let penalties = self
            .replication_penalty
            .map(|lambda| valuation::replication_penalties(&members, lambda));
        let seed = self
            .seed
            .unwrap_or_else(|| derive_seed(&task.id, catalog.version()));
        let allocation = self
            .allocator
            .allocate(
                &task.id,
                &value,
                outcome.charge,
                penalties.as_deref(),
                seed,
                deadline,
            )
            .map_err(|error| match error {
                shapley::Error::EmptyCoalition { .. } => {
                    self.empty_coalition(&task.id, outcome.charge)
                }
                shapley::Error::NonConverged { task, samples } => {
                    Error::NonConvergedEstimate { task, samples }
                }
            })?;
        tracing::debug!(
            task = %task.id,
            mode = ?allocation.mode,
            stage = ?Stage::Allocated,
            "payouts allocated"
        );

        let payouts = members
            .iter()
            .zip(&allocation.payouts)
            .map(|(asset, amount)| Payout {
                asset: asset.id,
                seller: asset.seller.clone(),
                amount: *amount,
            })
            .sorted_by(|a, b| {
                b.amount
                    .total_cmp(&a.amount)
                    .then_with(|| a.asset.cmp(&b.asset))
            })
            .collect();

        let settlement = Settlement {
            task: task.id.clone(),
            price,
            bid,
            gain,
            cleared: true,
            charge: outcome.charge,
            payouts,
            allocation: Some(allocation.mode),
            excluded,
            registry_version: catalog.version(),
            settled_at: chrono::Utc::now(),
        };
        tracing::info!(
            task = %settlement.task,
            charge = settlement.charge,
            sellers = settlement.payouts.len(),
            stage = ?Stage::Settled,
            "settled"
        );
        Ok(settlement)
    }

    fn resolve_candidates(
        &self,
        catalog: &impl Catalog,
        task: &Task,
        candidates: Option<Vec<AssetId>>,
    ) -> Result<Vec<Arc<Asset>>, Error> {
        match candidates {
            Some(ids) => ids
                .into_iter()
                .map(|id| {
                    catalog.load(id).ok_or_else(|| Error::UnknownAsset {
                        task: task.id.clone(),
                        asset: id,
                    })
                })
                .collect(),
            None => Ok(catalog.list_assets(&task.task_type)),
        }
    }

    /// Scores every pool asset concurrently under the deadline. Assets whose
    /// shape does not fit the task are excluded and recorded, not dropped.
    async fn valuate(
        &self,
        task: &Arc<Task>,
        pool: Vec<Arc<Asset>>,
        deadline: Deadline,
    ) -> Result<(Vec<(Arc<Asset>, Score)>, Vec<ExcludedAsset>), Error> {
        let budget = deadline.remaining().map_err(|_| Error::ValuationTimeout {
            task: task.id.clone(),
            budget: Duration::ZERO,
        })?;

        let scoring = pool.into_iter().map(|asset| {
            let valuator = self.valuator.clone();
            let task = Arc::clone(task);
            tokio::task::spawn_blocking(move || {
                let score = valuator.score(&asset, &task);
                (asset, score)
            })
        });
        let joined = tokio::time::timeout(budget, join_all(scoring))
            .await
            .map_err(|_| Error::ValuationTimeout {
                task: task.id.clone(),
                budget,
            })?;

        let mut scored = Vec::new();
        let mut excluded = Vec::new();
        for result in joined {
            let (asset, score) = result.expect("valuation never panics");
            match score {
                Ok(score) => scored.push((asset, score)),
                Err(error) => {
                    tracing::warn!(
                        task = %task.id,
                        asset = %asset.id,
                        %error,
                        "excluding asset from coalition"
                    );
                    excluded.push(ExcludedAsset {
                        asset: asset.id,
                        reason: ExclusionReason::Incompatible(error),
                    });
                }
            }
        }
        Ok((scored, excluded))
    }

    /// Keeps the coalition within the configured cap, best scores first, and
    /// records what fell below the cut.
    fn cap_coalition(
        &self,
        scored: Vec<(Arc<Asset>, Score)>,
        excluded: &mut Vec<ExcludedAsset>,
    ) -> Vec<Arc<Asset>> {
        let mut ranked: Vec<_> = scored
            .into_iter()
            .sorted_by(|(a, score_a), (b, score_b)| {
                score_b
                    .0
                    .total_cmp(&score_a.0)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .collect();

        if ranked.len() > self.max_coalition {
            tracing::warn!(
                dropped = ranked.len() - self.max_coalition,
                cap = self.max_coalition,
                "pool exceeds the coalition cap, keeping top scorers"
            );
            for (asset, score) in ranked.split_off(self.max_coalition) {
                excluded.push(ExcludedAsset {
                    asset: asset.id,
                    reason: ExclusionReason::BelowCoalitionCut { score: score.0 },
                });
            }
        }
        ranked.into_iter().map(|(asset, _)| asset).collect()
    }

    fn empty_coalition(&self, task: &TaskId, charge: f64) -> Error {
        let disposition = match self.empty_coalition_policy {
            EmptyCoalitionPolicy::Refund => Disposition::Refunded,
            EmptyCoalitionPolicy::Retain => Disposition::Retained,
        };
        tracing::warn!(%task, charge, %disposition, "no contributing sellers");
        Error::EmptyCoalition {
            task: task.clone(),
            charge,
            disposition,
        }
    }
}

/// Stable per-request seed so sampled settlements reproduce without
/// configuration.
fn derive_seed(task: &TaskId, registry_version: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    task.0.hash(&mut hasher);
    registry_version.hash(&mut hasher);
    hasher.finish()
}
