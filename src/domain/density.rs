// Density snapshot and flow series domain models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observed or estimated device count at a single location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityPoint {
    pub lat: f64,
    pub lon: f64,
    pub count: u64,
}

/// Point-in-time density picture for a queried area. Created per request,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DensitySnapshot {
    pub area_id: String,
    pub timestamp: DateTime<Utc>,
    pub total_devices: u64,
    pub points: Vec<DensityPoint>,
}

impl DensitySnapshot {
    /// Builds a snapshot from its points, totalling their counts.
    pub fn from_points(
        area_id: String,
        timestamp: DateTime<Utc>,
        points: Vec<DensityPoint>,
    ) -> Self {
        let total_devices = points.iter().map(|p| p.count).sum();
        Self {
            area_id,
            timestamp,
            total_devices,
            points,
        }
    }

    pub fn empty(area_id: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            area_id,
            timestamp,
            total_devices: 0,
            points: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowPoint {
    pub timestamp: DateTime<Utc>,
    pub total_devices: u64,
}

/// Time-ordered aggregate device counts for a previously queried area.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSeries {
    pub area_id: String,
    pub interval_minutes: u32,
    pub series: Vec<FlowPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_points_totals_counts() {
        let points = vec![
            DensityPoint { lat: 44.4, lon: 26.1, count: 12 },
            DensityPoint { lat: 44.5, lon: 26.2, count: 30 },
        ];
        let snap = DensitySnapshot::from_points("area-1".into(), Utc::now(), points);
        assert_eq!(snap.total_devices, 42);
        assert_eq!(snap.points.len(), 2);
    }
}
