// Upstream density provider over its JSON wire format
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::density_provider::{DensityCell, DensityInterval, DensityProvider};
use crate::domain::error::{Result, ServiceError};
use crate::domain::geometry::Point;
use crate::infrastructure::config::{OAuthSettings, UpstreamSettings};
use crate::infrastructure::token_cache::TokenCache;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DensityQueryRequest {
    area: AreaPayload,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    precision: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AreaPayload {
    area_type: &'static str,
    boundary: Vec<Point>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DensityQueryResponse {
    #[serde(default)]
    timed_population_density_data: Vec<TimedDensityData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimedDensityData {
    start_time: DateTime<Utc>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    cell_population_density_data: Vec<CellDensityData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CellDensityData {
    geohash: String,
    data_type: String,
    #[serde(default)]
    ppl_density: Option<f64>,
    #[serde(default)]
    max_ppl_density: Option<f64>,
    #[serde(default)]
    min_ppl_density: Option<f64>,
}

/// Bearer-authenticated client for the upstream population-density API.
pub struct DensityApiClient {
    client: reqwest::Client,
    base_url: String,
    tokens: TokenCache,
    scopes: Vec<String>,
    audience: Option<String>,
}

impl DensityApiClient {
    pub fn new(
        upstream: &UpstreamSettings,
        oauth: &OAuthSettings,
        tokens: TokenCache,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(upstream.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            tokens,
            scopes: oauth.scopes.clone(),
            audience: oauth.audience.clone(),
        })
    }
}

#[async_trait]
impl DensityProvider for DensityApiClient {
    async fn query_density(
        &self,
        boundary: &[Point],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        precision: u8,
    ) -> Result<Vec<DensityInterval>> {
        let token = self
            .tokens
            .get_token(&self.scopes, self.audience.as_deref())
            .await?;

        let request = DensityQueryRequest {
            area: AreaPayload {
                area_type: "POLYGON",
                boundary: boundary.to_vec(),
            },
            start_time: start,
            end_time: end,
            precision,
        };

        let url = format!("{}/population-density-data/retrieve", self.base_url);
        debug!(%url, precision, vertices = boundary.len(), "querying upstream density");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::DataUnavailable(format!("density query failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ServiceError::UpstreamAuth(format!(
                "density provider rejected credentials: {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::DataUnavailable(format!(
                "density provider returned {status}: {body}"
            )));
        }

        let payload: DensityQueryResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::DataUnavailable(format!("malformed density response: {e}")))?;

        Ok(payload
            .timed_population_density_data
            .into_iter()
            .map(|interval| DensityInterval {
                start: interval.start_time,
                end: interval.end_time.unwrap_or(interval.start_time),
                cells: interval
                    .cell_population_density_data
                    .into_iter()
                    .map(|cell| DensityCell {
                        location_code: cell.geohash,
                        kind: cell.data_type,
                        estimate: cell.ppl_density,
                        max_estimate: cell.max_ppl_density,
                        min_estimate: cell.min_ppl_density,
                    })
                    .collect(),
            })
            .collect())
    }
}
