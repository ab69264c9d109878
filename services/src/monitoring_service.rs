use crate::alert_service::AlertService;
use crate::entity::{service_endpoints, service_monitoring};
use crate::error::{Result, ServiceError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use orbit_shared::{EndpointSnapshot, EndpointStatus, MonitoringSample};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub buffer_capacity: usize,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub retention: ChronoDuration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: 10_000,
            batch_size: 500,
            batch_timeout: Duration::from_secs(1),
            retention: ChronoDuration::days(7),
        }
    }
}

/// Accepts samples on the request path and answers range queries.
///
/// `ingest` only enqueues; persistence and alert evaluation happen in the
/// [`IngestWorker`] that drains the buffer.
pub struct MonitoringService {
    db: DatabaseConnection,
    sender: mpsc::Sender<MonitoringSample>,
    capacity: usize,
    retention: ChronoDuration,
}

impl MonitoringService {
    pub fn new(
        db: DatabaseConnection,
        settings: &IngestSettings,
    ) -> (Self, mpsc::Receiver<MonitoringSample>) {
        let capacity = settings.buffer_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let service = Self {
            db,
            sender,
            capacity,
            retention: settings.retention,
        };
        (service, receiver)
    }

    /// Enqueues one sample. A full buffer rejects the sample instead of
    /// blocking the producer or evicting older samples.
    pub fn ingest(&self, mut sample: MonitoringSample) -> Result<()> {
        sample.validate().map_err(ServiceError::Validation)?;
        if sample.timestamp.is_none() {
            sample.timestamp = Some(Utc::now());
        }

        match self.sender.try_send(sample) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(sample)) => {
                log::warn!(
                    "Ingest buffer full, rejected sample for endpoint {}",
                    sample.endpoint_id
                );
                Err(ServiceError::Backpressure {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => {
                Err(ServiceError::Backend("ingest writer is not running".to_string()))
            }
        }
    }

    /// Samples currently waiting for the writer.
    pub fn pending(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    /// Samples in `[from, to]`, oldest first, for one endpoint or all of them.
    /// With a limit, the newest `limit` samples of the range are returned.
    pub async fn samples(
        &self,
        endpoint_id: Option<uuid::Uuid>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: Option<u64>,
    ) -> Result<Vec<service_monitoring::Model>> {
        let mut query = service_monitoring::Entity::find();
        if let Some(endpoint_id) = endpoint_id {
            query = query.filter(service_monitoring::Column::EndpointId.eq(endpoint_id));
        }
        let mut query = query
            .filter(service_monitoring::Column::Timestamp.gte(from.fixed_offset()))
            .filter(service_monitoring::Column::Timestamp.lte(to.fixed_offset()))
            .order_by_desc(service_monitoring::Column::Timestamp)
            .order_by_desc(service_monitoring::Column::Id);

        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        let mut samples = query.all(&self.db).await?;
        samples.reverse();
        Ok(samples)
    }

    /// Newest sample of every running endpoint.
    pub async fn latest_summary(&self) -> Result<Vec<EndpointSnapshot>> {
        let running = service_endpoints::Entity::find()
            .filter(service_endpoints::Column::Status.eq(EndpointStatus::Running))
            .order_by_asc(service_endpoints::Column::Name)
            .all(&self.db)
            .await?;

        let mut summary = Vec::with_capacity(running.len());
        for endpoint in running {
            let latest = service_monitoring::Entity::find()
                .filter(service_monitoring::Column::EndpointId.eq(endpoint.id))
                .order_by_desc(service_monitoring::Column::Timestamp)
                .order_by_desc(service_monitoring::Column::Id)
                .one(&self.db)
                .await?;

            if let Some(sample) = latest {
                summary.push(EndpointSnapshot {
                    endpoint_id: endpoint.id,
                    endpoint_name: endpoint.name,
                    cpu_usage: sample.cpu_usage,
                    memory_usage: sample.memory_usage,
                    response_time: sample.response_time,
                    request_count: sample.request_count,
                    error_count: sample.error_count,
                    timestamp: sample.timestamp.with_timezone(&Utc),
                });
            }
        }
        Ok(summary)
    }

    /// Deletes samples older than `cutoff`.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = service_monitoring::Entity::delete_many()
            .filter(service_monitoring::Column::Timestamp.lt(cutoff.fixed_offset()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Applies the retention window once.
    pub async fn sweep_retention(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.retention;
        let removed = self.purge_before(cutoff).await?;
        if removed > 0 {
            log::info!("Retention sweep removed {} samples older than {}", removed, cutoff);
        }
        Ok(removed)
    }

    /// Periodic retention sweep; runs until the task is dropped.
    pub async fn run_retention(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_retention().await {
                log::error!("Retention sweep failed: {}", e);
            }
        }
    }
}

/// Background writer that drains the ingest buffer in batches and feeds
/// persisted samples to the alert engine.
pub struct IngestWorker {
    db: DatabaseConnection,
    receiver: mpsc::Receiver<MonitoringSample>,
    alerts: Arc<AlertService>,
    batch_size: usize,
    batch_timeout: Duration,
}

impl IngestWorker {
    pub fn new(
        db: DatabaseConnection,
        receiver: mpsc::Receiver<MonitoringSample>,
        alerts: Arc<AlertService>,
        settings: &IngestSettings,
    ) -> Self {
        Self {
            db,
            receiver,
            alerts,
            batch_size: settings.batch_size.max(1),
            batch_timeout: settings.batch_timeout,
        }
    }

    pub async fn run(mut self) {
        log::info!(
            "Ingest writer started (batch size {}, batch timeout {:?})",
            self.batch_size,
            self.batch_timeout
        );

        while let Some(batch) = self.next_batch().await {
            self.persist(batch).await;
        }

        log::info!("Ingest writer stopped: buffer closed");
    }

    /// Persists whatever is buffered right now, up to one batch, without
    /// waiting. Returns the number of samples stored.
    pub async fn drain_once(&mut self) -> usize {
        let mut batch = Vec::new();
        while batch.len() < self.batch_size {
            match self.receiver.try_recv() {
                Ok(sample) => batch.push(sample),
                Err(_) => break,
            }
        }
        if batch.is_empty() {
            return 0;
        }
        self.persist(batch).await
    }

    /// Waits for the first sample, then collects more until the batch is
    /// full or the batch timeout passes. `None` once the buffer is closed
    /// and empty.
    async fn next_batch(&mut self) -> Option<Vec<MonitoringSample>> {
        let first = self.receiver.recv().await?;
        let mut batch = Vec::with_capacity(self.batch_size);
        batch.push(first);

        let deadline = tokio::time::Instant::now() + self.batch_timeout;
        while batch.len() < self.batch_size {
            match tokio::time::timeout_at(deadline, self.receiver.recv()).await {
                Ok(Some(sample)) => batch.push(sample),
                Ok(None) | Err(_) => break,
            }
        }
        Some(batch)
    }

    async fn persist(&self, batch: Vec<MonitoringSample>) -> usize {
        let models: Vec<service_monitoring::ActiveModel> = batch.iter().map(to_active_model).collect();

        let stored: Vec<&MonitoringSample> =
            match service_monitoring::Entity::insert_many(models).exec(&self.db).await {
                Ok(_) => {
                    log::debug!("Inserted {} monitoring samples", batch.len());
                    batch.iter().collect()
                }
                Err(e) => {
                    log::warn!(
                        "Batch insert of {} samples failed, retrying one by one: {}",
                        batch.len(),
                        e
                    );
                    let mut stored = Vec::with_capacity(batch.len());
                    for sample in &batch {
                        match to_active_model(sample).insert(&self.db).await {
                            Ok(_) => stored.push(sample),
                            Err(e) => log::error!(
                                "Dropped sample for endpoint {}: {}",
                                sample.endpoint_id,
                                e
                            ),
                        }
                    }
                    stored
                }
            };

        for sample in &stored {
            if let Err(e) = self.alerts.evaluate(sample).await {
                log::error!(
                    "Alert evaluation for endpoint {} failed: {}",
                    sample.endpoint_id,
                    e
                );
            }
        }
        stored.len()
    }
}

fn to_active_model(sample: &MonitoringSample) -> service_monitoring::ActiveModel {
    let timestamp = sample.timestamp.unwrap_or_else(Utc::now);
    service_monitoring::ActiveModel {
        endpoint_id: Set(sample.endpoint_id),
        cpu_usage: Set(sample.cpu_usage),
        memory_usage: Set(sample.memory_usage),
        request_count: Set(sample.request_count),
        error_count: Set(sample.error_count),
        response_time: Set(sample.response_time),
        network_in: Set(sample.network_in),
        network_out: Set(sample.network_out),
        custom_metrics: Set(serde_json::json!(sample.custom_metrics)),
        timestamp: Set(timestamp.fixed_offset()),
        ..Default::default()
    }
}
