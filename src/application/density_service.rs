// Density aggregation - Normalizes areas and reduces upstream cells to snapshots
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use tracing::warn;

use crate::application::density_provider::{DensityCell, DensityProvider, DENSITY_ESTIMATION};
use crate::domain::density::{DensityPoint, DensitySnapshot, FlowPoint, FlowSeries};
use crate::domain::error::{Result, ServiceError};
use crate::domain::geometry::Area;
use crate::infrastructure::synthetic;

const SNAPSHOT_WINDOW_MINUTES: i64 = 60;
const FLOW_INTERVAL_MINUTES: u32 = 60;
pub const DEFAULT_PRECISION: u8 = 7;

/// Converts a queried area into a normalized density snapshot or a
/// time-windowed flow series. Delegates to the upstream provider when one is
/// configured, otherwise to the synthetic generator (which never fails and
/// needs no network).
///
/// Queried areas are cached by id so later flow queries can reuse them;
/// concurrent writers to the same id are last-write-wins.
pub struct DensityService {
    provider: Option<Arc<dyn DensityProvider>>,
    areas: Mutex<HashMap<String, Area>>,
    default_area: Option<Area>,
    precision: u8,
    flow_hours: u32,
}

impl DensityService {
    /// Synthetic-only aggregator; every query is served locally.
    pub fn synthetic() -> Self {
        Self {
            provider: None,
            areas: Mutex::new(HashMap::new()),
            default_area: None,
            precision: DEFAULT_PRECISION,
            flow_hours: 6,
        }
    }

    pub fn live(
        provider: Arc<dyn DensityProvider>,
        precision: u8,
        flow_hours: u32,
        default_area: Option<Area>,
    ) -> Self {
        Self {
            provider: Some(provider),
            areas: Mutex::new(HashMap::new()),
            default_area,
            precision,
            flow_hours,
        }
    }

    pub async fn snapshot(&self, area_id: &str, area: &Area) -> Result<DensitySnapshot> {
        self.snapshot_at_precision(area_id, area, None).await
    }

    /// Snapshot with a per-call precision override for the live density grid.
    pub async fn snapshot_at_precision(
        &self,
        area_id: &str,
        area: &Area,
        precision: Option<u8>,
    ) -> Result<DensitySnapshot> {
        let normalized = area.normalized();
        self.areas
            .lock()
            .unwrap()
            .insert(area_id.to_string(), normalized.clone());

        match &self.provider {
            None => Ok(synthetic::density_snapshot(area_id, &normalized)),
            Some(provider) => {
                self.live_snapshot(
                    provider.as_ref(),
                    area_id,
                    &normalized,
                    precision.unwrap_or(self.precision),
                )
                .await
            }
        }
    }

    async fn live_snapshot(
        &self,
        provider: &dyn DensityProvider,
        area_id: &str,
        area: &Area,
        precision: u8,
    ) -> Result<DensitySnapshot> {
        let end = Utc::now();
        let start = end - Duration::minutes(SNAPSHOT_WINDOW_MINUTES);
        let boundary = area.query_boundary();

        let intervals = provider
            .query_density(&boundary, start, end, precision)
            .await
            .map_err(|e| ServiceError::DataUnavailable(e.to_string()))?;

        let Some(latest) = intervals.last() else {
            return Ok(DensitySnapshot::empty(area_id.to_string(), end));
        };

        let points: Vec<DensityPoint> = latest
            .cells
            .iter()
            .filter_map(|cell| match geohash::decode(&cell.location_code) {
                Ok((coord, _, _)) => Some(DensityPoint {
                    lat: coord.y,
                    lon: coord.x,
                    count: cell_count(cell),
                }),
                Err(e) => {
                    warn!(code = %cell.location_code, error = %e, "skipping undecodable density cell");
                    None
                }
            })
            .collect();

        Ok(DensitySnapshot::from_points(
            area_id.to_string(),
            latest.end,
            points,
        ))
    }

    /// Flow series for a previously queried area id, or the configured
    /// default area when the id is unknown.
    pub async fn flow(&self, area_id: &str) -> Result<FlowSeries> {
        let Some(provider) = &self.provider else {
            return Ok(synthetic::flow_series(area_id));
        };

        let area = self
            .cached_area(area_id)
            .or_else(|| self.default_area.clone())
            .ok_or_else(|| {
                ServiceError::DataUnavailable(format!("no area recorded for id {area_id}"))
            })?;

        let end = Utc::now();
        let start = end - Duration::minutes(self.flow_hours as i64 * 60);
        let intervals = provider
            .query_density(&area.query_boundary(), start, end, self.precision)
            .await
            .map_err(|e| ServiceError::DataUnavailable(e.to_string()))?;

        let series = intervals
            .iter()
            .map(|interval| FlowPoint {
                timestamp: interval.end,
                total_devices: interval.cells.iter().map(cell_count).sum(),
            })
            .collect();

        Ok(FlowSeries {
            area_id: area_id.to_string(),
            interval_minutes: FLOW_INTERVAL_MINUTES,
            series,
        })
    }

    fn cached_area(&self, area_id: &str) -> Option<Area> {
        self.areas.lock().unwrap().get(area_id).cloned()
    }
}

/// Per-cell device count. Precedence: finite direct estimate, then the
/// rounded midpoint of max/min estimates, then zero. Cells that are not
/// density estimations always count zero.
fn cell_count(cell: &DensityCell) -> u64 {
    if cell.kind != DENSITY_ESTIMATION {
        return 0;
    }
    if let Some(estimate) = cell.estimate.filter(|v| v.is_finite()) {
        return estimate.round().max(0.0) as u64;
    }
    match (cell.max_estimate, cell.min_estimate) {
        (Some(max), Some(min)) if max.is_finite() && min.is_finite() => {
            (((max + min) / 2.0).round()).max(0.0) as u64
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::density_provider::DensityInterval;
    use crate::domain::geometry::Point;
    use async_trait::async_trait;
    use chrono::DateTime;

    fn test_area() -> Area {
        Area::rectangle(44.41, 26.08, 44.44, 26.12)
    }

    fn cell(kind: &str, estimate: Option<f64>, max: Option<f64>, min: Option<f64>) -> DensityCell {
        DensityCell {
            location_code: geohash::encode(geohash::Coord { x: 26.10, y: 44.43 }, 7).unwrap(),
            kind: kind.to_string(),
            estimate,
            max_estimate: max,
            min_estimate: min,
        }
    }

    /// Returns one interval with the scripted cells on every query.
    struct ScriptedProvider {
        cells: Vec<DensityCell>,
    }

    #[async_trait]
    impl DensityProvider for ScriptedProvider {
        async fn query_density(
            &self,
            _boundary: &[Point],
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            _precision: u8,
        ) -> Result<Vec<DensityInterval>> {
            Ok(vec![DensityInterval {
                start,
                end,
                cells: self.cells.clone(),
            }])
        }
    }

    struct EmptyProvider;

    #[async_trait]
    impl DensityProvider for EmptyProvider {
        async fn query_density(
            &self,
            _boundary: &[Point],
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _precision: u8,
        ) -> Result<Vec<DensityInterval>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn synthetic_snapshot_totals_match_points() {
        let service = DensityService::synthetic();
        let snap = service.snapshot("area-1", &test_area()).await.unwrap();
        assert_eq!(snap.points.len(), 200);
        let sum: u64 = snap.points.iter().map(|p| p.count).sum();
        assert_eq!(snap.total_devices, sum);
    }

    #[tokio::test]
    async fn synthetic_snapshot_points_stay_in_bounds() {
        let service = DensityService::synthetic();
        let snap = service.snapshot("area-1", &test_area()).await.unwrap();
        for p in &snap.points {
            assert!(p.lat >= 44.41 && p.lat <= 44.44);
            assert!(p.lon >= 26.08 && p.lon <= 26.12);
        }
    }

    #[tokio::test]
    async fn synthetic_flow_is_floored_random_walk() {
        let service = DensityService::synthetic();
        let flow = service.flow("anything").await.unwrap();
        assert_eq!(flow.interval_minutes, 15);
        assert_eq!(flow.series.len(), 24);
        assert!(flow.series.iter().all(|p| p.total_devices >= 500));
    }

    #[tokio::test]
    async fn live_cell_aggregation_precedence() {
        let provider = Arc::new(ScriptedProvider {
            cells: vec![
                cell(DENSITY_ESTIMATION, Some(120.0), Some(999.0), Some(1.0)),
                cell(DENSITY_ESTIMATION, None, Some(100.0), Some(51.0)),
                cell(DENSITY_ESTIMATION, Some(f64::NAN), Some(10.0), Some(10.0)),
                cell("CELL_COVERAGE", Some(999.0), None, None),
            ],
        });
        let service = DensityService::live(provider, DEFAULT_PRECISION, 6, None);
        let snap = service.snapshot("live-1", &test_area()).await.unwrap();
        // 120 direct + 76 midpoint (rounded) + 10 NaN-fallback midpoint + 0 wrong kind
        assert_eq!(snap.total_devices, 206);
        assert_eq!(snap.points.len(), 4);
        assert!((snap.points[0].lat - 44.43).abs() < 0.01);
        assert!((snap.points[0].lon - 26.10).abs() < 0.01);
    }

    #[tokio::test]
    async fn empty_response_yields_zero_snapshot() {
        let service = DensityService::live(Arc::new(EmptyProvider), DEFAULT_PRECISION, 6, None);
        let snap = service.snapshot("live-2", &test_area()).await.unwrap();
        assert_eq!(snap.total_devices, 0);
        assert!(snap.points.is_empty());
    }

    #[tokio::test]
    async fn flow_for_unknown_area_without_default_is_unavailable() {
        let service = DensityService::live(Arc::new(EmptyProvider), DEFAULT_PRECISION, 6, None);
        let err = service.flow("never-seen").await.unwrap_err();
        assert!(matches!(err, ServiceError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn flow_reuses_cached_area_and_default() {
        let provider = Arc::new(ScriptedProvider {
            cells: vec![cell(DENSITY_ESTIMATION, Some(40.0), None, None)],
        });
        let service =
            DensityService::live(provider.clone(), DEFAULT_PRECISION, 6, Some(test_area()));

        // Unknown id falls back to the default area.
        let flow = service.flow("unknown").await.unwrap();
        assert_eq!(flow.series.len(), 1);
        assert_eq!(flow.series[0].total_devices, 40);

        // A snapshot caches the area for later flow reuse.
        service.snapshot("seen", &test_area()).await.unwrap();
        assert!(service.flow("seen").await.is_ok());
    }
}
