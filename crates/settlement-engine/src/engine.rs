use {
    crate::{
        domain::{
            Auctioneer,
            Error,
            auction::{Task, TaskId},
        },
        dto,
        infra::config::Config,
    },
    asset_registry::{AssetId, Registry, TaskType},
    std::sync::Arc,
};

/// The settlement engine: one asset registry plus the stateless settlement
/// pipeline. Any number of auctions may run concurrently; each one works
/// against the registry snapshot taken when it starts.
pub struct Engine {
    registry: Arc<Registry>,
    auctioneer: Auctioneer,
}

impl Engine {
    pub fn new(config: Config, registry: Arc<Registry>) -> Self {
        Self {
            registry,
            auctioneer: Auctioneer {
                valuator: config.valuator,
                pricer: config.pricer,
                allocator: config.allocator,
                charge_rule: config.charge_rule,
                empty_coalition_policy: config.empty_coalition,
                replication_penalty: config.replication_penalty,
                max_coalition: config.max_coalition,
                default_timeout: config.default_timeout,
                seed: config.seed,
            },
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Settles one auction against the current registry snapshot and
    /// returns the wire record.
    pub async fn run_auction(
        &self,
        request: model::AuctionRequest,
    ) -> Result<model::SettlementRecord, Error> {
        let snapshot = self.registry.snapshot();
        let task = Task {
            id: TaskId(request.task_id),
            task_type: TaskType(request.task_type),
            targets: request.targets,
            baseline: request.baseline,
        };
        let candidates = request
            .candidate_asset_ids
            .map(|ids| ids.into_iter().map(AssetId).collect());
        let settlement = self
            .auctioneer
            .settle(
                snapshot.as_ref(),
                task,
                request.bid,
                candidates,
                request.timeout,
            )
            .await?;
        Ok(dto::settlement_record(&settlement))
    }
}
