// Geographic primitives shared by every layer
use geo::{Contains, Intersects, LineString};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;
const CIRCLE_RING_VERTICES: usize = 12;

/// A WGS84 coordinate. Latitude in [-90, 90], longitude in [-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A spatial query region: a circle around a center point or a polygon ring.
///
/// The legacy wire form (`{ "coordinates": [[lat, lon], ...] }`) still arrives
/// from older rule payloads; it is folded into `Polygon` at the serde boundary
/// so consumers only ever match on the two variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AreaRepr", into = "TaggedArea")]
pub enum Area {
    Circle { center: Point, radius_m: f64 },
    Polygon { boundary: Vec<Point> },
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "areaType")]
enum TaggedArea {
    #[serde(rename = "CIRCLE")]
    Circle {
        center: Point,
        #[serde(rename = "radius")]
        radius_m: f64,
    },
    #[serde(rename = "POLYGON")]
    Polygon { boundary: Vec<Point> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AreaRepr {
    Tagged(TaggedArea),
    Legacy { coordinates: Vec<[f64; 2]> },
}

impl From<AreaRepr> for Area {
    fn from(repr: AreaRepr) -> Self {
        match repr {
            AreaRepr::Tagged(TaggedArea::Circle { center, radius_m }) => {
                Area::Circle { center, radius_m }
            }
            AreaRepr::Tagged(TaggedArea::Polygon { boundary }) => Area::Polygon { boundary },
            AreaRepr::Legacy { coordinates } => Area::Polygon {
                boundary: coordinates
                    .into_iter()
                    .map(|pair| Point::new(pair[0], pair[1]))
                    .collect(),
            },
        }
    }
}

impl From<Area> for TaggedArea {
    fn from(area: Area) -> Self {
        match area {
            Area::Circle { center, radius_m } => TaggedArea::Circle { center, radius_m },
            Area::Polygon { boundary } => TaggedArea::Polygon { boundary },
        }
    }
}

impl Area {
    /// Closed rectangular polygon from south-west / north-east bounds.
    pub fn rectangle(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Area {
        Area::Polygon {
            boundary: vec![
                Point::new(min_lat, min_lon),
                Point::new(min_lat, max_lon),
                Point::new(max_lat, max_lon),
                Point::new(max_lat, min_lon),
                Point::new(min_lat, min_lon),
            ],
        }
    }

    /// Closes an open polygon boundary by appending the first point.
    /// Circles and already-closed polygons pass through unchanged.
    pub fn normalized(&self) -> Area {
        match self {
            Area::Circle { .. } => self.clone(),
            Area::Polygon { boundary } => {
                let mut boundary = boundary.clone();
                if let (Some(first), Some(last)) = (boundary.first().copied(), boundary.last()) {
                    if first != *last {
                        boundary.push(first);
                    }
                }
                Area::Polygon { boundary }
            }
        }
    }

    pub fn contains(&self, point: &Point) -> bool {
        match self {
            Area::Circle { center, radius_m } => haversine_m(center, point) <= *radius_m,
            Area::Polygon { boundary } => {
                to_geo_polygon(boundary).contains(&geo::Point::new(point.longitude, point.latitude))
            }
        }
    }

    /// Axis-aligned bounds as (south-west, north-east) corners.
    pub fn bounding_box(&self) -> (Point, Point) {
        match self {
            Area::Circle { center, radius_m } => {
                let dlat = radius_m / METERS_PER_DEGREE_LAT;
                let dlon =
                    radius_m / (METERS_PER_DEGREE_LAT * center.latitude.to_radians().cos().max(0.01));
                (
                    Point::new(center.latitude - dlat, center.longitude - dlon),
                    Point::new(center.latitude + dlat, center.longitude + dlon),
                )
            }
            Area::Polygon { boundary } => {
                let mut min = Point::new(f64::MAX, f64::MAX);
                let mut max = Point::new(f64::MIN, f64::MIN);
                for p in boundary {
                    min.latitude = min.latitude.min(p.latitude);
                    min.longitude = min.longitude.min(p.longitude);
                    max.latitude = max.latitude.max(p.latitude);
                    max.longitude = max.longitude.max(p.longitude);
                }
                (min, max)
            }
        }
    }

    /// A closed polygon ring suitable for the upstream density query, which
    /// only accepts polygon boundaries. Circles become a fixed-vertex ring.
    pub fn query_boundary(&self) -> Vec<Point> {
        match self.normalized() {
            Area::Polygon { boundary } => boundary,
            Area::Circle { center, radius_m } => {
                let dlat = radius_m / METERS_PER_DEGREE_LAT;
                let dlon = radius_m
                    / (METERS_PER_DEGREE_LAT * center.latitude.to_radians().cos().max(0.01));
                let mut ring: Vec<Point> = (0..CIRCLE_RING_VERTICES)
                    .map(|i| {
                        let theta =
                            2.0 * std::f64::consts::PI * i as f64 / CIRCLE_RING_VERTICES as f64;
                        Point::new(
                            center.latitude + dlat * theta.sin(),
                            center.longitude + dlon * theta.cos(),
                        )
                    })
                    .collect();
                ring.push(ring[0]);
                ring
            }
        }
    }

    /// Whether a travelled polyline crosses this area.
    pub fn intersects_path(&self, path: &[Point]) -> bool {
        if path.is_empty() {
            return false;
        }
        match self {
            Area::Circle { center, radius_m } => path
                .windows(2)
                .any(|seg| segment_distance_m(center, &seg[0], &seg[1]) <= *radius_m)
                || haversine_m(center, &path[0]) <= *radius_m,
            Area::Polygon { boundary } => {
                let line: LineString<f64> = path
                    .iter()
                    .map(|p| (p.longitude, p.latitude))
                    .collect::<Vec<_>>()
                    .into();
                let polygon = to_geo_polygon(boundary);
                line.intersects(&polygon)
            }
        }
    }
}

fn to_geo_polygon(boundary: &[Point]) -> geo::Polygon<f64> {
    let ring: LineString<f64> = boundary
        .iter()
        .map(|p| (p.longitude, p.latitude))
        .collect::<Vec<_>>()
        .into();
    geo::Polygon::new(ring, vec![])
}

/// Great-circle distance in meters.
pub fn haversine_m(a: &Point, b: &Point) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

pub fn path_length_km(path: &[Point]) -> f64 {
    path.windows(2)
        .map(|seg| haversine_m(&seg[0], &seg[1]))
        .sum::<f64>()
        / 1000.0
}

/// Minimum distance in meters from `point` to the segment `a`..`b`, using an
/// equirectangular projection centered on the point. Adequate at city scale.
fn segment_distance_m(point: &Point, a: &Point, b: &Point) -> f64 {
    let lat_scale = METERS_PER_DEGREE_LAT;
    let lon_scale = METERS_PER_DEGREE_LAT * point.latitude.to_radians().cos();

    let (px, py) = (0.0, 0.0);
    let ax = (a.longitude - point.longitude) * lon_scale;
    let ay = (a.latitude - point.latitude) * lat_scale;
    let bx = (b.longitude - point.longitude) * lon_scale;
    let by = (b.latitude - point.latitude) * lat_scale;

    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (cx * cx + cy * cy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_square() -> Area {
        Area::Polygon {
            boundary: vec![
                Point::new(44.40, 26.05),
                Point::new(44.40, 26.15),
                Point::new(44.48, 26.15),
                Point::new(44.48, 26.05),
            ],
        }
    }

    #[test]
    fn normalizing_closes_open_polygon() {
        let Area::Polygon { boundary } = open_square().normalized() else {
            panic!("polygon expected");
        };
        assert_eq!(boundary.len(), 5);
        assert_eq!(boundary.first(), boundary.last());
        assert_eq!(boundary[1], Point::new(44.40, 26.15));
    }

    #[test]
    fn normalizing_closed_polygon_is_identity() {
        let closed = open_square().normalized();
        assert_eq!(closed, closed.normalized());
    }

    #[test]
    fn polygon_containment() {
        let area = open_square();
        assert!(area.contains(&Point::new(44.44, 26.10)));
        assert!(!area.contains(&Point::new(44.60, 26.10)));
    }

    #[test]
    fn circle_containment_uses_radius() {
        let area = Area::Circle {
            center: Point::new(44.4268, 26.1025),
            radius_m: 500.0,
        };
        assert!(area.contains(&Point::new(44.4268, 26.1025)));
        assert!(area.contains(&Point::new(44.4290, 26.1025)));
        assert!(!area.contains(&Point::new(44.4400, 26.1025)));
    }

    #[test]
    fn legacy_coordinate_array_deserializes_as_polygon() {
        let json = r#"{ "coordinates": [[44.40, 26.05], [44.40, 26.15], [44.48, 26.15]] }"#;
        let area: Area = serde_json::from_str(json).unwrap();
        match area {
            Area::Polygon { boundary } => {
                assert_eq!(boundary.len(), 3);
                assert_eq!(boundary[0], Point::new(44.40, 26.05));
            }
            Area::Circle { .. } => panic!("legacy form must map to a polygon"),
        }
    }

    #[test]
    fn tagged_forms_round_trip() {
        let circle = Area::Circle {
            center: Point::new(44.43, 26.10),
            radius_m: 250.0,
        };
        let json = serde_json::to_string(&circle).unwrap();
        assert!(json.contains("CIRCLE"));
        assert_eq!(circle, serde_json::from_str(&json).unwrap());
    }

    #[test]
    fn path_crossing_polygon_detected() {
        let area = open_square();
        let through = vec![Point::new(44.44, 26.00), Point::new(44.44, 26.20)];
        let outside = vec![Point::new(44.60, 26.00), Point::new(44.60, 26.20)];
        assert!(area.intersects_path(&through));
        assert!(!area.intersects_path(&outside));
    }

    #[test]
    fn path_crossing_circle_detected_between_vertices() {
        // Segment endpoints sit outside the circle; only the middle passes through.
        let area = Area::Circle {
            center: Point::new(44.44, 26.10),
            radius_m: 300.0,
        };
        let path = vec![Point::new(44.44, 26.00), Point::new(44.44, 26.20)];
        assert!(area.intersects_path(&path));
    }

    #[test]
    fn haversine_sanity() {
        let a = Point::new(44.4268, 26.1025);
        let b = Point::new(44.4390, 26.0960);
        let d = haversine_m(&a, &b);
        assert!(d > 1_200.0 && d < 1_700.0, "got {d}");
    }
}
