//! End-to-end settlement runs against a real registry.

use {
    asset_registry::{AssetData, Registry},
    settlement_engine::{
        Engine,
        domain::{
            Error,
            auctioneer::Disposition,
            pricing::{PricePolicy, Pricer},
        },
        infra::config::Config,
    },
    std::{collections::HashMap, sync::Arc, time::Duration},
};

fn config_with_band(floor: f64, cap: f64) -> Config {
    Config {
        pricer: Pricer::new(PricePolicy::new(floor, cap).unwrap(), HashMap::new()),
        ..Config::default()
    }
}

fn request(bid: f64, targets: Vec<f64>) -> model::AuctionRequest {
    model::AuctionRequest {
        task_id: "task-1".to_string(),
        task_type: "regression".to_string(),
        bid,
        targets,
        baseline: vec![],
        candidate_asset_ids: None,
        timeout: None,
    }
}

fn register(registry: &Registry, seller: &str, column: Vec<f64>) {
    registry.register(
        seller.into(),
        "regression".into(),
        AssetData::new(vec![column]).unwrap(),
    );
}

fn assert_budget_balance(record: &model::SettlementRecord) {
    let total: f64 = record
        .seller_payouts
        .iter()
        .map(|payout| payout.amount)
        .sum();
    assert!(
        (total - record.cost_to_you).abs() <= 1e-6 * record.cost_to_you.max(1.0),
        "payouts sum to {total}, charge is {}",
        record.cost_to_you
    );
}

#[tokio::test]
async fn sole_contributor_takes_the_whole_charge() {
    let registry = Arc::new(Registry::new());
    let column = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    register(&registry, "alice", column.clone());

    let engine = Engine::new(config_with_band(90.0, 190.0), Arc::clone(&registry));
    let targets = column.iter().map(|x| 3.0 * x + 2.0).collect();
    let record = engine.run_auction(request(200.0, targets)).await.unwrap();

    // A perfect predictor prices at the cap of the band.
    assert!(record.cleared);
    assert!((record.market_price_offered - 190.0).abs() < 0.01);
    assert!((record.prediction_gain_achieved - 1.0).abs() < 0.01);
    assert_eq!(record.your_bid, 200.0);
    assert_eq!(record.cost_to_you, record.market_price_offered);
    assert_eq!(record.seller_payouts.len(), 1);
    assert_eq!(record.seller_payouts[0].seller_id, "alice");
    assert!((record.seller_payouts[0].amount - record.cost_to_you).abs() < 1e-9);
    assert_eq!(record.allocation, Some(model::AllocationReport::Exact));
    assert_budget_balance(&record);
}

#[tokio::test]
async fn null_contributor_is_paid_exactly_zero() {
    let registry = Arc::new(Registry::new());
    let column = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    register(&registry, "alice", column.clone());
    // Constant column, collinear with the intercept: zero marginal value in
    // every coalition.
    register(&registry, "bob", vec![7.0; 6]);

    let engine = Engine::new(config_with_band(50.0, 500.0), registry);
    let targets = column.iter().map(|x| 2.0 * x - 1.0).collect();
    let record = engine.run_auction(request(800.0, targets)).await.unwrap();

    assert!(record.cleared);
    assert_eq!(record.seller_payouts.len(), 2);
    let bob = record
        .seller_payouts
        .iter()
        .find(|payout| payout.seller_id == "bob")
        .unwrap();
    assert_eq!(bob.amount, 0.0);
    assert_budget_balance(&record);
}

#[tokio::test]
async fn underbid_trade_is_rejected_with_empty_payouts() {
    let registry = Arc::new(Registry::new());
    register(&registry, "alice", vec![1.0, 2.0, 3.0, 4.0]);

    // Degenerate band so the quote is exactly 150 regardless of gain.
    let engine = Engine::new(config_with_band(150.0, 150.0), registry);
    let record = engine
        .run_auction(request(100.0, vec![1.0, 2.0, 3.0, 4.0]))
        .await
        .unwrap();

    assert!(!record.cleared);
    assert_eq!(record.market_price_offered, 150.0);
    assert_eq!(record.cost_to_you, 0.0);
    assert!(record.seller_payouts.is_empty());
    assert_eq!(record.allocation, None);
}

#[tokio::test]
async fn empty_candidate_pool_fails_before_pricing() {
    let registry = Arc::new(Registry::new());
    let engine = Engine::new(Config::default(), registry);

    let result = engine
        .run_auction(request(200.0, vec![1.0, 2.0, 3.0]))
        .await;
    match result.unwrap_err() {
        Error::EmptyCoalition {
            charge,
            disposition,
            ..
        } => {
            assert_eq!(charge, 0.0);
            assert_eq!(disposition, Disposition::Refunded);
        }
        other => panic!("expected empty coalition, got {other:?}"),
    }
}

#[tokio::test]
async fn settlements_are_reproducible() {
    let registry = Arc::new(Registry::new());
    let column = vec![0.5, 1.7, 2.2, 3.9, 5.1, 6.4];
    register(&registry, "alice", column.clone());
    register(&registry, "bob", vec![2.0, 1.0, 4.0, 3.0, 6.0, 5.0]);

    let engine = Engine::new(config_with_band(50.0, 500.0), registry);
    let targets: Vec<f64> = column.iter().map(|x| x + 0.3).collect();
    let first = engine
        .run_auction(request(600.0, targets.clone()))
        .await
        .unwrap();
    let second = engine.run_auction(request(600.0, targets)).await.unwrap();

    assert_eq!(first.market_price_offered, second.market_price_offered);
    assert_eq!(first.cost_to_you, second.cost_to_you);
    for (a, b) in first.seller_payouts.iter().zip(&second.seller_payouts) {
        assert_eq!(a.seller_id, b.seller_id);
        assert_eq!(a.amount.to_bits(), b.amount.to_bits());
    }
}

#[tokio::test]
async fn large_coalitions_use_the_sampling_estimator() {
    let registry = Arc::new(Registry::new());
    let column = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    // Two sellers with identical data: perfectly symmetric marginals.
    register(&registry, "alice", column.clone());
    register(&registry, "bob", column.clone());

    let config = Config {
        allocator: settlement_engine::domain::shapley::Allocator {
            exact_coalition_limit: 1,
            ..Default::default()
        },
        ..config_with_band(50.0, 500.0)
    };
    let engine = Engine::new(config, registry);
    let targets = column.iter().map(|x| 4.0 * x).collect();
    let record = engine.run_auction(request(600.0, targets)).await.unwrap();

    let Some(model::AllocationReport::Sampled { samples }) = record.allocation else {
        panic!("expected sampled allocation, got {:?}", record.allocation);
    };
    assert!(samples > 0);
    assert_eq!(record.seller_payouts.len(), 2);
    // Monte-Carlo estimate: the split is even up to sampling noise.
    let half = record.cost_to_you / 2.0;
    for payout in &record.seller_payouts {
        assert!(
            (payout.amount - half).abs() < 0.05 * record.cost_to_you,
            "expected a roughly even split, got {}",
            payout.amount
        );
    }
    assert_budget_balance(&record);
}

#[tokio::test]
async fn heterogeneous_coalition_balances_the_budget() {
    let registry = Arc::new(Registry::new());
    register(&registry, "alice", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    register(&registry, "bob", vec![1.0, 4.0, 9.0, 16.0, 25.0, 36.0]);
    register(&registry, "carol", vec![0.1, -0.4, 0.7, 0.2, -0.9, 0.3]);

    let engine = Engine::new(config_with_band(50.0, 500.0), registry);
    let targets = vec![2.1, 6.3, 12.2, 20.4, 30.1, 42.2];
    let record = engine.run_auction(request(700.0, targets)).await.unwrap();

    assert!(record.cleared);
    assert!(record.seller_payouts.iter().all(|payout| payout.amount >= 0.0));
    // Ordered by descending amount.
    for window in record.seller_payouts.windows(2) {
        assert!(window[0].amount >= window[1].amount);
    }
    assert_budget_balance(&record);
}

#[tokio::test]
async fn adding_a_better_asset_never_lowers_the_quote() {
    let column = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let noise = vec![0.4, -0.2, 0.9, -0.7, 0.1, 0.3];
    let targets: Vec<f64> = column.iter().map(|x| x * 2.0 + 1.0).collect();

    let weak_only = Arc::new(Registry::new());
    register(&weak_only, "bob", noise.clone());
    let engine = Engine::new(config_with_band(50.0, 500.0), weak_only);
    let weak_quote = engine
        .run_auction(request(1_000.0, targets.clone()))
        .await
        .unwrap()
        .market_price_offered;

    let with_strong = Arc::new(Registry::new());
    register(&with_strong, "bob", noise);
    register(&with_strong, "alice", column);
    let engine = Engine::new(config_with_band(50.0, 500.0), with_strong);
    let strong_quote = engine
        .run_auction(request(1_000.0, targets))
        .await
        .unwrap()
        .market_price_offered;

    assert!(strong_quote >= weak_quote);
}

#[tokio::test]
async fn malformed_task_is_a_typed_error() {
    let registry = Arc::new(Registry::new());
    register(&registry, "alice", vec![1.0, 2.0, 3.0]);

    let engine = Engine::new(Config::default(), registry);
    let result = engine
        .run_auction(request(200.0, vec![1.0, f64::NAN, 3.0]))
        .await;
    assert!(matches!(result.unwrap_err(), Error::InvalidTask { .. }));
}

#[tokio::test]
async fn exhausted_deadline_is_a_valuation_timeout() {
    let registry = Arc::new(Registry::new());
    register(&registry, "alice", vec![1.0, 2.0, 3.0, 4.0]);

    let engine = Engine::new(Config::default(), registry);
    let mut request = request(200.0, vec![1.0, 2.0, 3.0, 4.0]);
    request.timeout = Some(Duration::ZERO);

    let result = engine.run_auction(request).await;
    assert!(matches!(
        result.unwrap_err(),
        Error::ValuationTimeout { .. }
    ));
}

#[tokio::test]
async fn explicit_candidates_restrict_the_coalition() {
    let registry = Arc::new(Registry::new());
    let column = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let alice = registry.register(
        "alice".into(),
        "regression".into(),
        AssetData::new(vec![column.clone()]).unwrap(),
    );
    register(&registry, "bob", column.clone());

    let engine = Engine::new(config_with_band(50.0, 500.0), registry);
    let targets = column.iter().map(|x| x * 2.0).collect();
    let mut request = request(600.0, targets);
    request.candidate_asset_ids = Some(vec![alice.id.0]);

    let record = engine.run_auction(request).await.unwrap();
    assert_eq!(record.seller_payouts.len(), 1);
    assert_eq!(record.seller_payouts[0].seller_id, "alice");
}
