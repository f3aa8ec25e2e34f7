use serde::Deserialize;

use crate::domain::geometry::Area;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerSettings,
    pub upstream: UpstreamSettings,
    pub oauth: OAuthSettings,
    pub routing: RoutingSettings,
    pub geofence: GeofenceSettings,
    pub density: DensitySettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream density provider. Disabled by default: the service then runs
/// fully synthetic with no network access.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamSettings {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub precision: u8,
    pub flow_hours: u32,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            timeout_secs: 10,
            precision: 7,
            flow_hours: 6,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OAuthSettings {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RoutingSettings {
    pub path_finder_url: String,
    pub timeout_secs: u64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            path_finder_url: "https://router.project-osrm.org".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeofenceSettings {
    pub evaluation_interval_secs: u64,
    pub webhook_timeout_secs: u64,
}

impl Default for GeofenceSettings {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: 120,
            webhook_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DensitySettings {
    /// Fallback area for flow queries on area ids never seen before,
    /// as (min_lat, min_lon, max_lat, max_lon).
    pub default_area: Option<[f64; 4]>,
}

impl Default for DensitySettings {
    fn default() -> Self {
        Self {
            default_area: Some([44.41, 26.08, 44.44, 26.12]),
        }
    }
}

impl DensitySettings {
    pub fn default_area(&self) -> Option<Area> {
        self.default_area
            .map(|[min_lat, min_lon, max_lat, max_lon]| {
                Area::rectangle(min_lat, min_lon, max_lat, max_lon)
            })
    }
}

pub fn load_config() -> anyhow::Result<ServiceConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/service").required(false))
        .add_source(config::Environment::with_prefix("CROWDSENSE").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
