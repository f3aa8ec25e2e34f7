// External street-routing adapter
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::application::path_finder::{BasePath, PathFinder};
use crate::domain::error::{Result, ServiceError};
use crate::domain::geometry::Point;

#[derive(Debug, Deserialize)]
struct RouteResponse {
    #[serde(default)]
    routes: Vec<RouteEntry>,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    geometry: RouteGeometry,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct RouteGeometry {
    /// GeoJSON order: [longitude, latitude]
    coordinates: Vec<[f64; 2]>,
}

/// OSRM-style path-finder. The short timeout keeps a hung routing service
/// from stalling route planning; callers fall back on any error.
pub struct StreetRouter {
    client: reqwest::Client,
    base_url: String,
}

impl StreetRouter {
    pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PathFinder for StreetRouter {
    async fn find_path(&self, from: Point, to: Point) -> Result<BasePath> {
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url, from.longitude, from.latitude, to.longitude, to.latitude
        );
        debug!(%url, "requesting street route");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ServiceError::PathfinderUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::PathfinderUnavailable(format!(
                "routing service returned {}",
                response.status()
            )));
        }

        let payload: RouteResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::PathfinderUnavailable(e.to_string()))?;

        let Some(route) = payload.routes.into_iter().next() else {
            return Err(ServiceError::PathfinderUnavailable(
                "no routes returned".into(),
            ));
        };

        let path: Vec<Point> = route
            .geometry
            .coordinates
            .into_iter()
            .map(|pair| Point::new(pair[1], pair[0]))
            .collect();

        if path.len() < 2 {
            return Err(ServiceError::PathfinderUnavailable(
                "route geometry too short".into(),
            ));
        }

        Ok(BasePath {
            path,
            duration_secs: route.duration,
        })
    }
}
