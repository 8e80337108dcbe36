//! Error types for the metrics crate.

/// Errors that can occur while wiring up or serving deploy metrics.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The OpenTelemetry/Prometheus bridge failed to initialize.
    #[error("failed to build the prometheus exporter: {0}")]
    Exporter(String),

    /// The `/metrics` HTTP server failed to bind or serve.
    #[error("metrics server error: {0}")]
    Server(#[from] std::io::Error),

    /// The metrics registry could not be encoded to the Prometheus text format.
    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, MetricsError>;
