use {
    crate::{
        cli,
        domain::pricing::calibration::{
            MultiplicativeWeights,
            Observation,
            PriceGrid,
            UpperConfidenceBound,
        },
        engine::Engine,
        infra::config::{self, Config},
    },
    anyhow::Context,
    asset_registry::{AssetData, Registry, SellerId, TaskType},
    clap::Parser,
    serde::Deserialize,
    std::{path::Path, sync::Arc},
    tracing::level_filters::LevelFilter,
};

pub async fn run(args: impl Iterator<Item = String>) {
    let args = cli::Args::parse_from(args);
    observe::tracing::initialize(&args.log, LevelFilter::ERROR);
    tracing::info!("running settlement engine with {args:#?}");

    let config = match &args.config {
        Some(path) => config::file::load(path).await,
        None => Config::default(),
    };

    let result = match args.command {
        cli::Command::Solve { market, request } => solve(config, &market, &request).await,
        cli::Command::Calibrate {
            history,
            experts,
            learning_rate,
            confidence,
        } => calibrate(config, &history, experts, learning_rate, confidence).await,
    };
    match result {
        Ok(output) => println!("{output}"),
        Err(error) => {
            tracing::error!(?error, "command failed");
            println!("{}", serde_json::json!({ "error": format!("{error:#}") }));
            std::process::exit(1);
        }
    }
}

/// One seller entry of a market file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MarketAsset {
    seller: String,
    task_type: String,
    columns: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MarketFile {
    assets: Vec<MarketAsset>,
}

async fn solve(config: Config, market: &Path, request: &Path) -> anyhow::Result<String> {
    let market: MarketFile = read_json(market).await.context("reading market file")?;
    let request: model::AuctionRequest =
        read_json(request).await.context("reading auction request")?;

    let registry = Arc::new(Registry::new());
    for asset in market.assets {
        let data = AssetData::new(asset.columns)
            .with_context(|| format!("invalid data for seller {:?}", asset.seller))?;
        registry.register(SellerId(asset.seller), TaskType(asset.task_type), data);
    }

    let engine = Engine::new(config, registry);
    let record = engine.run_auction(request).await?;
    Ok(serde_json::to_string_pretty(&record)?)
}

async fn calibrate(
    config: Config,
    history: &Path,
    experts: usize,
    learning_rate: f64,
    confidence: f64,
) -> anyhow::Result<String> {
    let records: Vec<model::SettlementRecord> = read_json(history)
        .await
        .context("reading settlement history")?;
    let observations: Vec<Observation> = records
        .iter()
        .map(|record| Observation {
            bid: record.your_bid,
        })
        .collect();

    let grid = PriceGrid::new(config.pricer.default_policy(), experts);
    let mwu = MultiplicativeWeights {
        grid: grid.clone(),
        learning_rate,
    };
    let ucb = UpperConfidenceBound { grid, confidence };

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "observations": observations.len(),
        "multiplicative_weights": mwu.recommend(&observations),
        "upper_confidence_bound": ucb.recommend(&observations),
    }))?)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {path:?}"))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {path:?}"))
}
