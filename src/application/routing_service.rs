// Route risk scoring - Samples density along a path and adjusts the ETA
use std::sync::Arc;

use chrono::{Local, Timelike};
use tracing::{debug, warn};

use crate::application::alert_engine::RuleStore;
use crate::application::density_service::DensityService;
use crate::application::path_finder::PathFinder;
use crate::domain::geometry::{path_length_km, Area, Point};
use crate::domain::route::RoutePlan;
use crate::infrastructure::synthetic;

const SAMPLE_COUNT: usize = 10;
const SAMPLE_RADIUS_M: f64 = 200.0;
/// Rules with a threshold above this are treated as critical zones.
const CRITICAL_ZONE_THRESHOLD: u64 = 5000;
const HOTSPOT_DEVICES: u64 = 6000;
const LONG_ROUTE_KM: f64 = 15.0;
const ALERT_ZONE_PENALTY_MINUTES: f64 = 2.0;

/// Everything observed about a path before advisories and ETA adjustment.
#[derive(Debug, Clone, PartialEq)]
struct RouteAnalysis {
    avg_density: f64,
    max_density: u64,
    critical_crossings: usize,
    high_density_crossings: usize,
    length_km: f64,
    hour: u32,
}

/// Scores candidate routes against sampled density and active alert zones.
/// Planning never fails outward: when the path-finder is unavailable the
/// scorer degrades to a synthetic route with no further analysis.
#[derive(Clone)]
pub struct RoutingService {
    path_finder: Arc<dyn PathFinder>,
    density: Arc<DensityService>,
    rules: RuleStore,
}

impl RoutingService {
    pub fn new(
        path_finder: Arc<dyn PathFinder>,
        density: Arc<DensityService>,
        rules: RuleStore,
    ) -> Self {
        Self {
            path_finder,
            density,
            rules,
        }
    }

    pub async fn plan_route(&self, from: Point, to: Point) -> RoutePlan {
        let base = match self.path_finder.find_path(from, to).await {
            Ok(base) if base.path.len() >= 2 => base,
            Ok(_) => {
                warn!("path finder returned an empty geometry, using fallback route");
                return synthetic::fallback_route(from, to);
            }
            Err(e) => {
                warn!(error = %e, "path finder unavailable, using fallback route");
                return synthetic::fallback_route(from, to);
            }
        };

        let analysis = self.analyze(&base.path).await;
        debug!(
            avg = analysis.avg_density,
            max = analysis.max_density,
            critical = analysis.critical_crossings,
            high = analysis.high_density_crossings,
            "route analyzed"
        );

        let advisories = compose_advisories(&analysis);
        let eta_minutes = adjust_eta(base.duration_secs / 60.0, &analysis);

        RoutePlan {
            from,
            to,
            path: base.path,
            eta_minutes,
            advisories,
        }
    }

    async fn analyze(&self, path: &[Point]) -> RouteAnalysis {
        let stride = (path.len() / SAMPLE_COUNT).max(1);
        let mut counts = Vec::new();
        for (i, point) in path.iter().step_by(stride).enumerate() {
            let area = Area::Circle {
                center: *point,
                radius_m: SAMPLE_RADIUS_M,
            };
            match self
                .density
                .snapshot(&format!("route-sample-{i}"), &area)
                .await
            {
                Ok(snapshot) => counts.push(snapshot.total_devices),
                Err(e) => debug!(error = %e, "skipping unavailable route sample"),
            }
        }

        let avg_density = if counts.is_empty() {
            0.0
        } else {
            counts.iter().sum::<u64>() as f64 / counts.len() as f64
        };
        let max_density = counts.iter().copied().max().unwrap_or(0);

        let mut critical_crossings = 0;
        let mut high_density_crossings = 0;
        for rule in self.rules.active() {
            if rule.area.normalized().intersects_path(path) {
                if rule.threshold_devices > CRITICAL_ZONE_THRESHOLD {
                    critical_crossings += 1;
                } else {
                    high_density_crossings += 1;
                }
            }
        }

        RouteAnalysis {
            avg_density,
            max_density,
            critical_crossings,
            high_density_crossings,
            length_km: path_length_km(path),
            hour: Local::now().hour(),
        }
    }
}

/// Fixed-precedence advisory composition; every applicable advisory appears.
fn compose_advisories(analysis: &RouteAnalysis) -> Vec<String> {
    let mut advisories = Vec::new();

    if analysis.critical_crossings > 0 {
        advisories.push(format!(
            "Route crosses {} critical alert zone(s); consider rerouting",
            analysis.critical_crossings
        ));
    }
    if analysis.high_density_crossings > 0 {
        advisories.push(format!(
            "Route crosses {} high-density zone(s)",
            analysis.high_density_crossings
        ));
    }

    if analysis.avg_density >= 5000.0 {
        advisories.push("Very high crowd density along route; expect severe delays".into());
    } else if analysis.avg_density >= 2500.0 {
        advisories.push("High crowd density along route; expect delays".into());
    } else if analysis.avg_density >= 1000.0 {
        advisories.push("Moderate crowd density along route".into());
    } else if analysis.avg_density >= 300.0 {
        advisories.push("Low crowd density along route".into());
    }

    if analysis.max_density > HOTSPOT_DEVICES {
        advisories.push(format!(
            "Dense hotspot of {} devices on route",
            analysis.max_density
        ));
    }

    match analysis.hour {
        7..=9 => advisories.push("Morning rush hour traffic expected".into()),
        16..=19 => advisories.push("Evening rush hour traffic expected".into()),
        22..=23 | 0..=4 => advisories.push("Night travel; low traffic expected".into()),
        _ => {}
    }

    if analysis.length_km > LONG_ROUTE_KM {
        advisories.push(format!(
            "Long route ({:.1} km); plan for breaks",
            analysis.length_km
        ));
    }

    if advisories.is_empty() {
        advisories.push("Route clear".into());
    }
    advisories
}

/// Multiplicative ETA adjustment: density band, then a fixed penalty per
/// crossed alert zone, then the rush-hour multiplier last.
fn adjust_eta(base_minutes: f64, analysis: &RouteAnalysis) -> u32 {
    let density_multiplier = if analysis.avg_density >= 5000.0 {
        1.5
    } else if analysis.avg_density >= 2500.0 {
        1.3
    } else if analysis.avg_density >= 1000.0 {
        1.15
    } else {
        1.0
    };

    let crossings = (analysis.critical_crossings + analysis.high_density_crossings) as f64;
    let mut eta = base_minutes * density_multiplier + ALERT_ZONE_PENALTY_MINUTES * crossings;
    eta *= rush_multiplier(analysis.hour);
    eta.round().max(0.0) as u32
}

fn rush_multiplier(hour: u32) -> f64 {
    match hour {
        7..=9 => 1.25,
        16..=19 => 1.3,
        _ => 1.0,
    }
}
