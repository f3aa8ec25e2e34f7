// Route planning result
use serde::{Deserialize, Serialize};

use super::geometry::Point;

/// A planned route with its adjusted travel estimate and ranked advisories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlan {
    pub from: Point,
    pub to: Point,
    pub path: Vec<Point>,
    pub eta_minutes: u32,
    pub advisories: Vec<String>,
}
