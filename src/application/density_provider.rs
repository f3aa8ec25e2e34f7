// Provider trait for upstream density data access
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::error::Result;
use crate::domain::geometry::Point;

/// Cell kind carrying an actual density estimate; other kinds contribute a
/// zero count.
pub const DENSITY_ESTIMATION: &str = "DENSITY_ESTIMATION";

/// One location-coded unit of estimated device count, as returned upstream.
#[derive(Debug, Clone)]
pub struct DensityCell {
    pub location_code: String,
    pub kind: String,
    pub estimate: Option<f64>,
    pub max_estimate: Option<f64>,
    pub min_estimate: Option<f64>,
}

/// One time slice of the upstream response.
#[derive(Debug, Clone)]
pub struct DensityInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub cells: Vec<DensityCell>,
}

#[async_trait]
pub trait DensityProvider: Send + Sync {
    /// Query density cells for a closed polygon boundary over a time window.
    /// An empty interval list is a valid response, not an error.
    async fn query_density(
        &self,
        boundary: &[Point],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        precision: u8,
    ) -> Result<Vec<DensityInterval>>;
}
