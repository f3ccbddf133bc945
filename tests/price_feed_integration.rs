//! Price Feed Integration Tests
//!
//! Publisher and re-optimization watcher wired together over channels the
//! way a long-running deployment runs them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use fertilizer_strategy::market::run_price_publisher;
use fertilizer_strategy::strategy::run_reoptimization_watcher;
use fertilizer_strategy::{
    Constraint, CurveLibrary, InMemoryStrategyStore, ManagerSettings, Nutrient,
    NutrientResponseCurve, OptimizationRequest, PriceCache, PriceSnapshot, StrategyManager,
};

const WAIT: Duration = Duration::from_secs(5);

fn snapshot(id: &str, n: f64, p: f64) -> PriceSnapshot {
    PriceSnapshot::new(id, Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap(), "USD")
        .with_fertilizer("n", Nutrient::Nitrogen, 1.0, n)
        .with_fertilizer("p", Nutrient::Phosphorus, 1.0, p)
        .with_commodity("corn", 5.0)
}

fn manager() -> Arc<StrategyManager> {
    let curves = CurveLibrary::new([
        NutrientResponseCurve::mitscherlich("corn", Nutrient::Nitrogen, 60.0, 0.02, 250.0).unwrap(),
        NutrientResponseCurve::mitscherlich("corn", Nutrient::Phosphorus, 30.0, 0.03, 120.0).unwrap(),
    ])
    .unwrap();
    let prices = PriceCache::with_snapshots([snapshot("base", 1.0, 2.0)]).unwrap();
    Arc::new(StrategyManager::new(
        Arc::new(curves),
        Arc::new(prices),
        Arc::new(InMemoryStrategyStore::new()),
        ManagerSettings::default(),
    ))
}

fn budgeted_corn() -> OptimizationRequest {
    OptimizationRequest::new("north-40", "corn", "base")
        .with_nutrients(&[Nutrient::Nitrogen, Nutrient::Phosphorus])
        .with_constraint(Constraint::budget("farm-budget", 100.0))
}

#[tokio::test]
async fn publisher_forwards_only_accepted_snapshots() {
    let cache = Arc::new(PriceCache::new());
    let (feed_tx, feed_rx) = mpsc::channel(8);
    let (pub_tx, mut pub_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_price_publisher(
        Arc::clone(&cache),
        feed_rx,
        pub_tx,
        cancel.clone(),
    ));

    feed_tx.send(snapshot("a", 1.0, 2.0)).await.unwrap();
    // Negative price is invalid
    feed_tx.send(snapshot("bad", -1.0, 2.0)).await.unwrap();
    // Same id twice
    feed_tx.send(snapshot("a", 1.2, 2.0)).await.unwrap();
    feed_tx.send(snapshot("b", 1.1, 2.0)).await.unwrap();

    assert_eq!(timeout(WAIT, pub_rx.recv()).await.unwrap().as_deref(), Some("a"));
    assert_eq!(timeout(WAIT, pub_rx.recv()).await.unwrap().as_deref(), Some("b"));

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("a").unwrap().nutrient_unit_cost(Nutrient::Nitrogen).unwrap(), 1.0);
    assert!(cache.get("bad").is_err());

    drop(feed_tx);
    assert_ok!(assert_ok!(timeout(WAIT, task).await));
}

#[tokio::test]
async fn watcher_forwards_material_alerts() {
    let m = manager();
    let record = m.optimize(&budgeted_corn()).unwrap();

    let (feed_tx, feed_rx) = mpsc::channel(8);
    let (pub_tx, pub_rx) = mpsc::channel(8);
    let (alert_tx, mut alert_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();

    let publisher = tokio::spawn(run_price_publisher(
        Arc::clone(m.prices()),
        feed_rx,
        pub_tx,
        cancel.clone(),
    ));
    let watcher = tokio::spawn(run_reoptimization_watcher(
        Arc::clone(&m),
        pub_rx,
        alert_tx,
        cancel.clone(),
    ));

    // Barely moved, then a large drop in phosphorus cost
    feed_tx.send(snapshot("steady", 1.01, 2.0)).await.unwrap();
    feed_tx.send(snapshot("cheap-p", 1.0, 0.5)).await.unwrap();

    let alert = timeout(WAIT, alert_rx.recv()).await.unwrap().unwrap();
    assert_eq!(alert.strategy_id, record.strategy_id);
    assert_eq!(alert.snapshot_id, "cheap-p");
    assert_eq!(alert.field_id, "north-40");

    // Both snapshots were compared and stored
    let scenarios = m.scenarios(&record.strategy_id).unwrap();
    assert_eq!(scenarios.len(), 2);
    assert!(!scenarios[0].delta.reoptimize_recommended);

    cancel.cancel();
    assert_ok!(assert_ok!(timeout(WAIT, publisher).await));
    assert_ok!(assert_ok!(timeout(WAIT, watcher).await));
    assert!(alert_rx.recv().await.is_none());
}

#[tokio::test]
async fn watcher_stops_when_published_channel_closes() {
    let (pub_tx, pub_rx) = mpsc::channel::<String>(1);
    let (alert_tx, _alert_rx) = mpsc::channel(1);
    let watcher = tokio::spawn(run_reoptimization_watcher(
        manager(),
        pub_rx,
        alert_tx,
        CancellationToken::new(),
    ));

    drop(pub_tx);
    assert_ok!(assert_ok!(timeout(WAIT, watcher).await));
}

#[tokio::test]
async fn unknown_snapshot_id_does_not_stop_watcher() {
    let m = manager();
    m.optimize(&budgeted_corn()).unwrap();
    m.prices().publish(snapshot("cheap-p", 1.0, 0.5)).unwrap();

    let (pub_tx, pub_rx) = mpsc::channel(4);
    let (alert_tx, mut alert_rx) = mpsc::channel(4);
    let watcher = tokio::spawn(run_reoptimization_watcher(
        Arc::clone(&m),
        pub_rx,
        alert_tx,
        CancellationToken::new(),
    ));

    pub_tx.send("never-published".to_string()).await.unwrap();
    pub_tx.send("cheap-p".to_string()).await.unwrap();

    let alert = timeout(WAIT, alert_rx.recv()).await.unwrap().unwrap();
    assert_eq!(alert.snapshot_id, "cheap-p");

    drop(pub_tx);
    assert_ok!(assert_ok!(timeout(WAIT, watcher).await));
}
