// Presentation layer - HTTP surface
pub mod alert_stream;
pub mod app_state;
pub mod handlers;
