// Error taxonomy for the analytics pipeline
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failures surfaced by the core components. Deleting an unknown rule is a
/// success no-op and deliberately has no variant here.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("credential exchange failed: {0}")]
    UpstreamAuth(String),

    #[error("density data unavailable: {0}")]
    DataUnavailable(String),

    /// Recovered internally via the fallback route; never surfaced to route
    /// planning callers.
    #[error("path finder unavailable: {0}")]
    PathfinderUnavailable(String),

    /// Logged and discarded; webhook delivery is best-effort.
    #[error("webhook delivery failed: {0}")]
    WebhookDelivery(String),
}
