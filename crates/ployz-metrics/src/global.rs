//! A process-wide metrics singleton, for callers (the CLI, a reconcile
//! loop) that don't want to thread an `Arc<DeployMetrics>` through every
//! call site.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::recorder::DeployMetrics;

static GLOBAL: OnceCell<Arc<DeployMetrics>> = OnceCell::new();

/// Installs the process-wide [`DeployMetrics`] instance. Returns `false`
/// (and leaves the existing instance in place) if one was already installed.
pub fn install(metrics: Arc<DeployMetrics>) -> bool {
    GLOBAL.set(metrics).is_ok()
}

/// Returns the process-wide instance, if [`install`] has been called.
#[must_use]
pub fn global() -> Option<Arc<DeployMetrics>> {
    GLOBAL.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_starts_uninstalled_in_isolated_process_state() {
        // This test only verifies the accessor shape; a prior test in this
        // binary may have already installed the singleton, since it's
        // process-global by design.
        let _ = global();
    }
}
