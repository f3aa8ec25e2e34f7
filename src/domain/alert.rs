// Geofence rules and alert events
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geometry::Area;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertChannel {
    Ui,
    Webhook,
}

/// Rule payload as submitted by callers; the engine assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    pub name: String,
    pub area: Area,
    pub threshold_devices: u64,
    #[serde(default)]
    pub alert_channels: Vec<AlertChannel>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    pub active: bool,
}

/// A stored geofence rule. Immutable after creation; deletion is the only
/// removal path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceRule {
    pub id: String,
    pub name: String,
    pub area: Area,
    pub threshold_devices: u64,
    pub alert_channels: Vec<AlertChannel>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    pub active: bool,
}

impl GeofenceRule {
    pub fn wants_webhook(&self) -> bool {
        self.alert_channels.contains(&AlertChannel::Webhook) && self.webhook_url.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// Level for an observed device count against a rule threshold.
pub fn severity(total_devices: u64, threshold: u64) -> AlertLevel {
    if total_devices as f64 > threshold as f64 * 1.5 {
        AlertLevel::Critical
    } else if total_devices > threshold {
        AlertLevel::Warning
    } else {
        AlertLevel::Info
    }
}

/// Produced by a rule evaluation and handed to subscribers; never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub rule_id: String,
    pub triggered_at: DateTime<Utc>,
    pub total_devices: u64,
    pub level: AlertLevel,
    pub message: String,
}

impl AlertEvent {
    pub fn for_rule(rule_id: &str, total_devices: u64, threshold: u64) -> Self {
        let level = severity(total_devices, threshold);
        let message = match level {
            AlertLevel::Critical => "Critical density exceeded. Immediate action recommended.",
            AlertLevel::Warning => "High density detected. Monitor and prepare resources.",
            AlertLevel::Info => "Density within normal range.",
        };
        Self {
            rule_id: rule_id.to_string(),
            triggered_at: Utc::now(),
            total_devices,
            level,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bands() {
        assert_eq!(severity(1000, 1000), AlertLevel::Info);
        assert_eq!(severity(1001, 1000), AlertLevel::Warning);
        assert_eq!(severity(1500, 1000), AlertLevel::Warning);
        assert_eq!(severity(1501, 1000), AlertLevel::Critical);
    }

    #[test]
    fn webhook_requires_channel_and_url() {
        let base = GeofenceRule {
            id: "r".into(),
            name: "r".into(),
            area: Area::Circle {
                center: crate::domain::geometry::Point::new(44.4, 26.1),
                radius_m: 100.0,
            },
            threshold_devices: 10,
            alert_channels: vec![AlertChannel::Ui],
            webhook_url: None,
            active: true,
        };
        assert!(!base.wants_webhook());

        let mut with_channel = base.clone();
        with_channel.alert_channels = vec![AlertChannel::Ui, AlertChannel::Webhook];
        assert!(!with_channel.wants_webhook());

        with_channel.webhook_url = Some("http://example.test/hook".into());
        assert!(with_channel.wants_webhook());
    }
}
