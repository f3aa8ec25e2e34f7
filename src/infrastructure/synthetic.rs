// Synthetic data generation - Local stand-ins for the upstream services
use chrono::{Duration, Utc};
use rand::Rng;

use crate::domain::density::{DensityPoint, DensitySnapshot, FlowPoint, FlowSeries};
use crate::domain::geometry::{path_length_km, Area, Point};
use crate::domain::route::RoutePlan;

const SNAPSHOT_POINTS: usize = 200;
const FLOW_SEGMENTS: usize = 24;
const FLOW_INTERVAL_MINUTES: i64 = 15;
const FLOW_FLOOR_DEVICES: i64 = 500;
const ROUTE_SEGMENTS: usize = 10;
const ROUTE_JITTER_DEG: f64 = 0.0008;
const BASE_SPEED_KMH: f64 = 30.0;

fn sample(rng: &mut impl Rng, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

/// Uniformly sampled density points over the area's bounds. Always succeeds
/// and never touches the network.
pub fn density_snapshot(area_id: &str, area: &Area) -> DensitySnapshot {
    let (sw, ne) = area.bounding_box();
    let mut rng = rand::thread_rng();

    let points: Vec<DensityPoint> = (0..SNAPSHOT_POINTS)
        .map(|_| {
            let lat = sample(&mut rng, sw.latitude, ne.latitude);
            let lon = sample(&mut rng, sw.longitude, ne.longitude);
            let surge: f64 = if rng.gen_bool(0.5) {
                rng.gen_range(1.0..3.0)
            } else {
                1.0
            };
            DensityPoint {
                lat,
                lon,
                count: (rng.gen_range(1.0..50.0) * surge).round() as u64,
            }
        })
        .collect();

    DensitySnapshot::from_points(area_id.to_string(), Utc::now(), points)
}

/// Bounded random walk over fixed 15-minute intervals; counts never drop
/// below the floor.
pub fn flow_series(area_id: &str) -> FlowSeries {
    let mut rng = rand::thread_rng();
    let now = Utc::now();
    let mut base: i64 = rng.gen_range(1000..=5000);

    let series = (0..FLOW_SEGMENTS)
        .map(|i| {
            base = (base + rng.gen_range(-400..=400)).max(FLOW_FLOOR_DEVICES);
            FlowPoint {
                timestamp: now
                    - Duration::minutes((FLOW_SEGMENTS - i) as i64 * FLOW_INTERVAL_MINUTES),
                total_devices: base as u64,
            }
        })
        .collect();

    FlowSeries {
        area_id: area_id.to_string(),
        interval_minutes: FLOW_INTERVAL_MINUTES as u32,
        series,
    }
}

/// Straight-line route with jitter and a speed-based estimate, used whenever
/// the external path-finder is unavailable. No risk analysis is applied.
pub fn fallback_route(from: Point, to: Point) -> RoutePlan {
    let mut rng = rand::thread_rng();

    let path: Vec<Point> = (0..=ROUTE_SEGMENTS)
        .map(|i| {
            let f = i as f64 / ROUTE_SEGMENTS as f64;
            Point::new(
                from.latitude
                    + (to.latitude - from.latitude) * f
                    + rng.gen_range(-ROUTE_JITTER_DEG..ROUTE_JITTER_DEG),
                from.longitude
                    + (to.longitude - from.longitude) * f
                    + rng.gen_range(-ROUTE_JITTER_DEG..ROUTE_JITTER_DEG),
            )
        })
        .collect();

    let distance_km = path_length_km(&path);
    let congestion = rng.gen_range(0.8..1.6);
    let speed_kmh = BASE_SPEED_KMH / congestion;
    let eta_minutes = ((distance_km / speed_kmh) * 60.0).round().max(0.0) as u32;

    let advisories = if congestion > 1.3 {
        vec!["Avoid main boulevard due to crowding".to_string()]
    } else {
        vec!["Route clear".to_string()]
    };

    RoutePlan {
        from,
        to,
        path,
        eta_minutes,
        advisories,
    }
}
