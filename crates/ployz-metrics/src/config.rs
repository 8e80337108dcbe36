//! Configuration for the `/metrics` HTTP endpoint.

use std::net::SocketAddr;

/// Configuration for the deploy-metrics HTTP server.
///
/// Mirrors the hand-rolled `Config` + `*Builder` pattern used throughout
/// this workspace (e.g. `ployz-executor::ExecutorConfig`) rather than
/// pulling in a configuration-file crate.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address the `/metrics` endpoint binds to.
    pub bind_addr: SocketAddr,
    /// Namespace prefix applied to every metric name (default `ployz`).
    pub namespace: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9090".parse().expect("static address is valid"),
            namespace: "ployz".to_string(),
        }
    }
}

impl MetricsConfig {
    /// Creates a builder seeded with defaults.
    #[must_use]
    pub fn builder() -> MetricsConfigBuilder {
        MetricsConfigBuilder::default()
    }
}

/// Builder for [`MetricsConfig`].
#[derive(Debug, Default)]
pub struct MetricsConfigBuilder {
    bind_addr: Option<SocketAddr>,
    namespace: Option<String>,
}

impl MetricsConfigBuilder {
    /// Sets the bind address for the `/metrics` endpoint.
    #[must_use]
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// Sets the metric name namespace prefix.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Builds the config, falling back to defaults for unset fields.
    #[must_use]
    pub fn build(self) -> MetricsConfig {
        let default = MetricsConfig::default();
        MetricsConfig {
            bind_addr: self.bind_addr.unwrap_or(default.bind_addr),
            namespace: self.namespace.unwrap_or(default.namespace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_binds_to_9090() {
        let config = MetricsConfig::default();
        assert_eq!(config.bind_addr.port(), 9090);
        assert_eq!(config.namespace, "ployz");
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = MetricsConfig::builder()
            .bind_addr("127.0.0.1:9999".parse().unwrap())
            .namespace("custom")
            .build();
        assert_eq!(config.bind_addr.port(), 9999);
        assert_eq!(config.namespace, "custom");
    }
}
