mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{harness, harness_with, sample, test_config};
use orbit_services::{service_monitoring, ServiceError};
use orbit_shared::AlertRule;
use sea_orm::{EntityTrait, PaginatorTrait};
use std::time::Duration;

#[tokio::test]
async fn test_ingested_samples_are_persisted_by_the_writer() {
    let mut h = harness().await;
    let endpoint = h.running("demo").await;
    let monitoring = h.orchestrator.monitoring.clone();

    monitoring.ingest(sample(endpoint.id)).unwrap();
    monitoring.ingest(sample(endpoint.id)).unwrap();
    assert_eq!(monitoring.pending(), 2);

    assert_eq!(h.worker.drain_once().await, 2);
    assert_eq!(monitoring.pending(), 0);
    assert_eq!(h.worker.drain_once().await, 0);

    let stored = service_monitoring::Entity::find().all(&h.db).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|s| s.endpoint_id == endpoint.id));
}

#[tokio::test]
async fn test_invalid_samples_are_rejected_up_front() {
    let h = harness().await;
    let endpoint = h.deployed("demo").await;
    let monitoring = &h.orchestrator.monitoring;

    let mut s = sample(endpoint.id);
    s.cpu_usage = 120.0;
    assert!(matches!(monitoring.ingest(s), Err(ServiceError::Validation(_))));

    let mut s = sample(endpoint.id);
    s.response_time = f64::NAN;
    assert!(matches!(monitoring.ingest(s), Err(ServiceError::Validation(_))));

    let mut s = sample(endpoint.id);
    s.custom_metrics.insert("queue_depth".to_string(), f64::INFINITY);
    assert!(matches!(monitoring.ingest(s), Err(ServiceError::Validation(_))));

    assert_eq!(monitoring.pending(), 0);
}

#[tokio::test]
async fn test_full_buffer_rejects_with_backpressure() {
    let mut config = test_config();
    config.ingest.buffer_capacity = 2;
    let mut h = harness_with(config, AlertRule::defaults()).await;
    let endpoint = h.deployed("demo").await;
    let monitoring = h.orchestrator.monitoring.clone();

    monitoring.ingest(sample(endpoint.id)).unwrap();
    monitoring.ingest(sample(endpoint.id)).unwrap();
    let err = monitoring.ingest(sample(endpoint.id)).unwrap_err();
    assert!(matches!(err, ServiceError::Backpressure { capacity: 2 }));

    assert_eq!(h.worker.drain_once().await, 2);
    monitoring.ingest(sample(endpoint.id)).unwrap();
    assert_eq!(h.worker.drain_once().await, 1);
    assert_eq!(service_monitoring::Entity::find().count(&h.db).await.unwrap(), 3);
}

#[tokio::test]
async fn test_bad_row_does_not_sink_the_batch() {
    let mut h = harness().await;
    let endpoint = h.deployed("demo").await;
    let monitoring = h.orchestrator.monitoring.clone();

    monitoring.ingest(sample(endpoint.id)).unwrap();
    monitoring.ingest(sample(uuid::Uuid::new_v4())).unwrap();
    monitoring.ingest(sample(endpoint.id)).unwrap();

    assert_eq!(h.worker.drain_once().await, 2);
    let stored = service_monitoring::Entity::find().all(&h.db).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|s| s.endpoint_id == endpoint.id));
}

#[tokio::test]
async fn test_retention_removes_old_samples() {
    let mut h = harness().await;
    let endpoint = h.deployed("demo").await;
    let monitoring = h.orchestrator.monitoring.clone();
    let now = Utc::now();

    for days_ago in [10, 8, 1, 0] {
        let mut s = sample(endpoint.id);
        s.timestamp = Some(now - ChronoDuration::days(days_ago) - ChronoDuration::minutes(1));
        monitoring.ingest(s).unwrap();
    }
    assert_eq!(h.worker.drain_once().await, 4);

    assert_eq!(monitoring.sweep_retention().await.unwrap(), 2);
    assert_eq!(monitoring.sweep_retention().await.unwrap(), 0);
    assert_eq!(service_monitoring::Entity::find().count(&h.db).await.unwrap(), 2);

    assert_eq!(monitoring.purge_before(now).await.unwrap(), 2);
    assert_eq!(service_monitoring::Entity::find().count(&h.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_latest_summary_covers_running_endpoints() {
    let mut h = harness().await;
    let running = h.running("live").await;
    let starting = h.deployed("pending").await;
    let monitoring = h.orchestrator.monitoring.clone();
    let now = Utc::now();

    let mut older = sample(running.id);
    older.timestamp = Some(now - ChronoDuration::minutes(5));
    older.cpu_usage = 11.0;
    let mut newer = sample(running.id);
    newer.timestamp = Some(now - ChronoDuration::minutes(1));
    newer.cpu_usage = 42.0;
    monitoring.ingest(older).unwrap();
    monitoring.ingest(newer).unwrap();
    monitoring.ingest(sample(starting.id)).unwrap();
    h.worker.drain_once().await;

    let summary = monitoring.latest_summary().await.unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].endpoint_id, running.id);
    assert_eq!(summary[0].endpoint_name, "live-v1");
    assert_eq!(summary[0].cpu_usage, 42.0);
}

#[tokio::test]
async fn test_background_writer_flushes_partial_batches() {
    let h = harness().await;
    let endpoint = h.deployed("demo").await;
    let monitoring = h.orchestrator.monitoring.clone();
    let writer = tokio::spawn(h.worker.run());

    for _ in 0..3 {
        monitoring.ingest(sample(endpoint.id)).unwrap();
    }

    let mut stored = 0;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        stored = service_monitoring::Entity::find().count(&h.db).await.unwrap();
        if stored == 3 {
            break;
        }
    }
    assert_eq!(stored, 3);
    writer.abort();
}

#[tokio::test]
async fn test_samples_across_all_endpoints() {
    let mut h = harness().await;
    let alpha = h.running("alpha").await;
    let beta = h.running("beta").await;
    let monitoring = h.orchestrator.monitoring.clone();

    monitoring.ingest(sample(alpha.id)).unwrap();
    monitoring.ingest(sample(alpha.id)).unwrap();
    monitoring.ingest(sample(beta.id)).unwrap();
    assert_eq!(h.worker.drain_once().await, 3);

    let from = Utc::now() - ChronoDuration::hours(1);
    let to = Utc::now() + ChronoDuration::minutes(1);

    let all = monitoring.samples(None, from, to, None).await.unwrap();
    assert_eq!(all.len(), 3);

    let only_beta = monitoring.samples(Some(beta.id), from, to, None).await.unwrap();
    assert_eq!(only_beta.len(), 1);
    assert_eq!(only_beta[0].endpoint_id, beta.id);

    let capped = monitoring.samples(None, from, to, Some(2)).await.unwrap();
    assert_eq!(capped.len(), 2);

    let stale = monitoring
        .samples(None, from - ChronoDuration::hours(5), from, None)
        .await
        .unwrap();
    assert!(stale.is_empty());
}
