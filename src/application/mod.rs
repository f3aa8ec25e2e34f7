// Application layer - Core analytics components and their provider seams
pub mod alert_engine;
pub mod density_provider;
pub mod density_service;
pub mod path_finder;
pub mod routing_service;
