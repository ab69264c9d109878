//! Typed alert conditions and rules evaluated against monitoring samples.

use crate::models::MonitoringSample;
use crate::status::AlertLevel;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CONDITION_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Metric {
    CpuUsage,
    MemoryUsage,
    ResponseTime,
    RequestCount,
    ErrorCount,
    /// error_count / request_count, as a percentage
    ErrorRate,
    NetworkIn,
    NetworkOut,
    Custom(String),
}

impl Metric {
    pub fn is_percentage(&self) -> bool {
        matches!(self, Self::CpuUsage | Self::MemoryUsage | Self::ErrorRate)
    }

    /// `None` when the sample does not carry the metric (custom keys, or an
    /// error rate with zero requests).
    pub fn read(&self, sample: &MonitoringSample) -> Option<f64> {
        match self {
            Self::CpuUsage => Some(sample.cpu_usage),
            Self::MemoryUsage => Some(sample.memory_usage),
            Self::ResponseTime => Some(sample.response_time),
            Self::RequestCount => Some(sample.request_count as f64),
            Self::ErrorCount => Some(sample.error_count as f64),
            Self::ErrorRate => {
                if sample.request_count == 0 {
                    None
                } else {
                    Some(sample.error_count as f64 / sample.request_count as f64 * 100.0)
                }
            }
            Self::NetworkIn => Some(sample.network_in),
            Self::NetworkOut => Some(sample.network_out),
            Self::Custom(key) => sample.custom_metrics.get(key).copied(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CpuUsage => f.write_str("cpu_usage"),
            Self::MemoryUsage => f.write_str("memory_usage"),
            Self::ResponseTime => f.write_str("response_time"),
            Self::RequestCount => f.write_str("request_count"),
            Self::ErrorCount => f.write_str("error_count"),
            Self::ErrorRate => f.write_str("error_rate"),
            Self::NetworkIn => f.write_str("network_in"),
            Self::NetworkOut => f.write_str("network_out"),
            Self::Custom(key) => write!(f, "custom:{}", key),
        }
    }
}

impl TryFrom<String> for Metric {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let metric = match value.as_str() {
            "cpu_usage" => Self::CpuUsage,
            "memory_usage" => Self::MemoryUsage,
            "response_time" => Self::ResponseTime,
            "request_count" => Self::RequestCount,
            "error_count" => Self::ErrorCount,
            "error_rate" => Self::ErrorRate,
            "network_in" => Self::NetworkIn,
            "network_out" => Self::NetworkOut,
            other => match other.strip_prefix("custom:") {
                Some(key) if !key.is_empty() => Self::Custom(key.to_string()),
                _ => return Err(format!("unknown metric '{}'", other)),
            },
        };
        Ok(metric)
    }
}

impl From<Metric> for String {
    fn from(metric: Metric) -> Self {
        metric.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparator {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt => value < threshold,
            Self::Lte => value <= threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

fn default_schema_version() -> u32 {
    CONDITION_SCHEMA_VERSION
}

/// Stored verbatim in `service_alerts.condition`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub metric: Metric,
    pub comparator: Comparator,
    pub threshold: f64,
}

impl AlertCondition {
    pub fn new(metric: Metric, comparator: Comparator, threshold: f64) -> Self {
        Self {
            schema_version: CONDITION_SCHEMA_VERSION,
            metric,
            comparator,
            threshold,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != CONDITION_SCHEMA_VERSION {
            return Err(format!(
                "unsupported condition schema_version {} (expected {})",
                self.schema_version, CONDITION_SCHEMA_VERSION
            ));
        }
        if !self.threshold.is_finite() {
            return Err("threshold must be a finite number".to_string());
        }
        if self.metric.is_percentage() && !(0.0..=100.0).contains(&self.threshold) {
            return Err(format!(
                "threshold for {} must be within [0, 100], got {}",
                self.metric, self.threshold
            ));
        }
        Ok(())
    }

    /// The observed value when the sample breaches the condition.
    pub fn breached_by(&self, sample: &MonitoringSample) -> Option<f64> {
        self.metric
            .read(sample)
            .filter(|value| self.comparator.holds(*value, self.threshold))
    }

    pub fn describe(&self) -> String {
        format!("{} {} {}", self.metric, self.comparator.symbol(), self.threshold)
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    pub level: AlertLevel,
    pub condition: AlertCondition,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AlertRule {
    pub fn new(name: impl Into<String>, level: AlertLevel, condition: AlertCondition) -> Self {
        Self {
            name: name.into(),
            title: None,
            level,
            condition,
            enabled: true,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("rule name must not be empty".to_string());
        }
        if self.name.len() > 200 {
            return Err("rule name must be at most 200 characters".to_string());
        }
        self.condition.validate()
    }

    pub fn title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| format!("{} breached", self.name))
    }

    /// Built-in rule set used when no rules file is configured.
    pub fn defaults() -> Vec<AlertRule> {
        vec![
            AlertRule::new(
                "high_cpu_usage",
                AlertLevel::Warning,
                AlertCondition::new(Metric::CpuUsage, Comparator::Gt, 90.0),
            ),
            AlertRule::new(
                "high_memory_usage",
                AlertLevel::Warning,
                AlertCondition::new(Metric::MemoryUsage, Comparator::Gt, 90.0),
            ),
            AlertRule::new(
                "slow_response",
                AlertLevel::Error,
                AlertCondition::new(Metric::ResponseTime, Comparator::Gt, 1000.0),
            ),
            AlertRule::new(
                "high_error_rate",
                AlertLevel::Critical,
                AlertCondition::new(Metric::ErrorRate, Comparator::Gte, 5.0),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn sample() -> MonitoringSample {
        MonitoringSample {
            endpoint_id: Uuid::new_v4(),
            timestamp: None,
            cpu_usage: 95.0,
            memory_usage: 40.0,
            response_time: 120.0,
            request_count: 200,
            error_count: 20,
            network_in: 1.5,
            network_out: 0.5,
            custom_metrics: HashMap::from([("queue_depth".to_string(), 42.0)]),
        }
    }

    #[test]
    fn test_threshold_comparisons() {
        let s = sample();
        assert_eq!(
            AlertCondition::new(Metric::CpuUsage, Comparator::Gt, 90.0).breached_by(&s),
            Some(95.0)
        );
        assert_eq!(
            AlertCondition::new(Metric::MemoryUsage, Comparator::Gt, 90.0).breached_by(&s),
            None
        );
        assert_eq!(
            AlertCondition::new(Metric::ErrorRate, Comparator::Gte, 10.0).breached_by(&s),
            Some(10.0)
        );
        assert!(
            AlertCondition::new(Metric::Custom("queue_depth".into()), Comparator::Lte, 42.0)
                .breached_by(&s)
                .is_some()
        );
        assert!(
            AlertCondition::new(Metric::Custom("missing".into()), Comparator::Gt, 0.0)
                .breached_by(&s)
                .is_none()
        );
    }

    #[test]
    fn test_error_rate_without_requests_never_fires() {
        let mut s = sample();
        s.request_count = 0;
        s.error_count = 3;
        assert!(
            AlertCondition::new(Metric::ErrorRate, Comparator::Gt, 0.0)
                .breached_by(&s)
                .is_none()
        );
    }

    #[test]
    fn test_condition_validation() {
        assert!(AlertCondition::new(Metric::CpuUsage, Comparator::Gt, 101.0).validate().is_err());
        assert!(AlertCondition::new(Metric::ResponseTime, Comparator::Gt, 5000.0).validate().is_ok());
        assert!(AlertCondition::new(Metric::NetworkIn, Comparator::Gt, f64::NAN).validate().is_err());

        let mut future = AlertCondition::new(Metric::CpuUsage, Comparator::Gt, 50.0);
        future.schema_version = 2;
        assert!(future.validate().is_err());
    }

    #[test]
    fn test_condition_json_shape() {
        let json = serde_json::json!({
            "metric": "custom:queue_depth",
            "comparator": "gte",
            "threshold": 10.0
        });
        let condition: AlertCondition = serde_json::from_value(json).unwrap();
        assert_eq!(condition.schema_version, CONDITION_SCHEMA_VERSION);
        assert_eq!(condition.metric, Metric::Custom("queue_depth".into()));

        let back = serde_json::to_value(&condition).unwrap();
        assert_eq!(back["metric"], "custom:queue_depth");

        let bad = serde_json::json!({"metric": "disk", "comparator": "gt", "threshold": 1.0});
        assert!(serde_json::from_value::<AlertCondition>(bad).is_err());
    }

    #[test]
    fn test_default_rules_are_valid() {
        for rule in AlertRule::defaults() {
            assert!(rule.validate().is_ok(), "{}", rule.name);
        }
    }
}
