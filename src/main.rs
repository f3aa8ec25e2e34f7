// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::application::alert_engine::{AlertEngine, RuleStore};
use crate::application::density_service::DensityService;
use crate::application::routing_service::RoutingService;
use crate::infrastructure::config::{load_config, ServiceConfig};
use crate::infrastructure::density_api::DensityApiClient;
use crate::infrastructure::street_router::StreetRouter;
use crate::infrastructure::token_cache::{HttpCredentialAuthority, TokenCache};
use crate::infrastructure::webhook::HttpWebhookSink;
use crate::presentation::alert_stream::stream_alerts;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    create_rule, create_snapshot, delete_rule, get_flow, health_check, list_rules, plan_route,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = load_config()?;

    // Aggregation core (infrastructure + application layers)
    let density_service = Arc::new(build_density_service(&config)?);
    let rules = RuleStore::new();
    let webhooks = Arc::new(HttpWebhookSink::new(Duration::from_secs(
        config.geofence.webhook_timeout_secs,
    ))?);
    let alert_engine = Arc::new(AlertEngine::new(
        rules.clone(),
        density_service.clone(),
        webhooks,
        Duration::from_secs(config.geofence.evaluation_interval_secs),
    ));
    let street_router = Arc::new(StreetRouter::new(
        config.routing.path_finder_url.clone(),
        Duration::from_secs(config.routing.timeout_secs),
    )?);
    let routing_service =
        RoutingService::new(street_router, density_service.clone(), rules.clone());

    alert_engine.clone().start();

    let state = Arc::new(AppState {
        density_service,
        alert_engine: alert_engine.clone(),
        routing_service,
    });

    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/density/snapshot", post(create_snapshot))
        .route("/density/flow/:area_id", get(get_flow))
        .route("/alerts/rules", get(list_rules).post(create_rule))
        .route("/alerts/rules/:id", delete(delete_rule))
        .route("/alerts/stream", get(stream_alerts))
        .route("/routing/plan", post(plan_route))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!(%addr, live_upstream = config.upstream.enabled, "starting crowdsense service");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    alert_engine.stop();
    Ok(())
}

fn build_density_service(config: &ServiceConfig) -> anyhow::Result<DensityService> {
    if !config.upstream.enabled {
        tracing::info!("upstream density disabled, running synthetic mode");
        return Ok(DensityService::synthetic());
    }

    let authority = Arc::new(HttpCredentialAuthority::new(&config.oauth)?);
    let tokens = TokenCache::new(authority);
    let provider = Arc::new(DensityApiClient::new(
        &config.upstream,
        &config.oauth,
        tokens,
    )?);
    Ok(DensityService::live(
        provider,
        config.upstream.precision,
        config.upstream.flow_hours,
        config.density.default_area(),
    ))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
