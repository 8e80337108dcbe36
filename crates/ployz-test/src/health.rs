//! A fake health checker that resolves instantly instead of polling, so
//! tests don't sleep through `interval_secs`/`timeout_secs`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use ployz_core::model::HealthCheck;
use ployz_executor::error::PortError;
use ployz_executor::ports::{HealthChecker, PortResult};

/// Resolves `wait_healthy` immediately: `Ok(())` unless the container name
/// has been marked to fail.
#[derive(Default)]
pub struct FakeHealthChecker {
    failing: Mutex<BTreeSet<String>>,
}

impl FakeHealthChecker {
    /// Creates a checker where every container passes by default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `wait_healthy` fail for `name` until [`Self::clear`] is called.
    pub fn fail(&self, name: impl Into<String>) {
        self.failing.lock().insert(name.into());
    }

    /// Stops failing health checks for `name`.
    pub fn clear(&self, name: &str) {
        self.failing.lock().remove(name);
    }
}

#[async_trait]
impl HealthChecker for FakeHealthChecker {
    async fn wait_healthy(&self, container_name: &str, _check: &HealthCheck) -> PortResult<()> {
        if self.failing.lock().contains(container_name) {
            return Err(PortError::new(format!("{container_name} never became healthy")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_by_default() {
        let checker = FakeHealthChecker::new();
        let check = HealthCheck {
            test: vec!["CMD".into()],
            interval_secs: 1,
            timeout_secs: 1,
            retries: 1,
            start_period_secs: 0,
            disable: false,
        };
        assert!(checker.wait_healthy("c1", &check).await.is_ok());
    }

    #[tokio::test]
    async fn fails_marked_containers() {
        let checker = FakeHealthChecker::new();
        checker.fail("c1");
        let check = HealthCheck {
            test: vec!["CMD".into()],
            interval_secs: 1,
            timeout_secs: 1,
            retries: 1,
            start_period_secs: 0,
            disable: false,
        };
        assert!(checker.wait_healthy("c1", &check).await.is_err());
        assert!(checker.wait_healthy("c2", &check).await.is_ok());
    }
}
