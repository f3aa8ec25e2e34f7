// Application state for HTTP handlers
use std::sync::Arc;

use crate::application::alert_engine::AlertEngine;
use crate::application::density_service::DensityService;
use crate::application::routing_service::RoutingService;

pub struct AppState {
    pub density_service: Arc<DensityService>,
    pub alert_engine: Arc<AlertEngine>,
    pub routing_service: RoutingService,
}
