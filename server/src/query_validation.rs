use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Query parameters of the metrics endpoint: either a trailing window in
/// `hours`, or an explicit `from`/`to` range.
#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    #[serde(default)]
    pub hours: Option<i64>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<u64>,
}

/// Query parameters of the sample listing: an optional endpoint plus the
/// same window as [`MetricsQuery`].
#[derive(Debug, Default, Deserialize)]
pub struct MonitoringQuery {
    #[serde(default)]
    pub endpoint: Option<Uuid>,
    #[serde(default)]
    pub hours: Option<i64>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl MonitoringQuery {
    pub fn window(&self) -> MetricsQuery {
        MetricsQuery {
            hours: self.hours,
            from: self.from,
            to: self.to,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub limit: u64,
}

/// Validate and normalize metrics range queries
pub struct MetricsQueryValidator {
    max_range_days: u32,
    max_results: usize,
}

impl MetricsQueryValidator {
    pub fn new(max_range_days: u32, max_results: usize) -> Self {
        Self {
            max_range_days,
            max_results,
        }
    }

    pub fn validate(&self, query: &MetricsQuery) -> Result<MetricsWindow> {
        self.validate_at(query, Utc::now())
    }

    fn validate_at(&self, query: &MetricsQuery, now: DateTime<Utc>) -> Result<MetricsWindow> {
        let max_range = ChronoDuration::days(self.max_range_days as i64);
        let max_hours = self.max_range_days as i64 * 24;

        if query.hours.is_some() && (query.from.is_some() || query.to.is_some()) {
            return Err(anyhow!("Use either 'hours' or 'from'/'to', not both"));
        }

        let (from, to) = match query.hours {
            Some(hours) if hours <= 0 => {
                return Err(anyhow!("'hours' must be positive"));
            }
            Some(hours) if hours > max_hours => {
                return Err(anyhow!(
                    "Query range exceeds maximum of {} days",
                    self.max_range_days
                ));
            }
            Some(hours) => (now - ChronoDuration::hours(hours), now),
            None => {
                let to = query.to.unwrap_or(now);
                let from = match query.from {
                    Some(from) => from,
                    None => to
                        .checked_sub_signed(ChronoDuration::hours(DEFAULT_WINDOW_HOURS))
                        .ok_or_else(|| anyhow!("'to' time is out of range"))?,
                };
                (from, to)
            }
        };

        if from > to {
            return Err(anyhow!("'from' time must be before 'to' time"));
        }
        if to - from > max_range {
            return Err(anyhow!(
                "Query range exceeds maximum of {} days",
                self.max_range_days
            ));
        }

        let limit = match query.limit {
            Some(0) => return Err(anyhow!("'limit' must be positive")),
            Some(l) => l.min(self.max_results as u64),
            None => self.max_results as u64,
        };

        Ok(MetricsWindow { from, to, limit })
    }
}
