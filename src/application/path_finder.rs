// Provider trait for the external street-routing service
use async_trait::async_trait;

use crate::domain::error::Result;
use crate::domain::geometry::Point;

/// Raw path as returned by the external path-finder, before risk scoring.
#[derive(Debug, Clone)]
pub struct BasePath {
    pub path: Vec<Point>,
    pub duration_secs: f64,
}

#[async_trait]
pub trait PathFinder: Send + Sync {
    /// Resolve a street path between two coordinates. Implementations enforce
    /// a short timeout; any failure is reported as `PathfinderUnavailable`
    /// and recovered by the caller's fallback route.
    async fn find_path(&self, from: Point, to: Point) -> Result<BasePath>;
}
