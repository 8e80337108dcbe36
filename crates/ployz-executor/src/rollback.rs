//! Rollback-as-reversible-log (§9 Design Notes).
//!
//! Every successful state-changing bucket action appends a compensating
//! [`RollbackAction`] holding its own frozen copy of whatever it needs to
//! undo itself — never a closure over loop-scoped mutable state. On a
//! health failure the log is replayed in reverse, best-effort, with the
//! first failure retained and the rest logged.

use ployz_core::model::ContainerRow;

use crate::error::PortError;
use crate::ports::{ContainerRuntime, ContainerStore, CreateConfig, ResourceConfig};

/// A single compensating action, with every value it needs frozen in place
/// at the time the forward action it undoes succeeded.
#[derive(Debug, Clone)]
pub enum RollbackAction {
    /// Undoes a `Remove`: recreate the container, start it, re-insert its row.
    RecreateAndStart { create: Box<CreateConfig>, row: Box<ContainerRow> },
    /// Undoes a `Create`: stop (best-effort), force-remove, delete the row.
    StopRemoveDeleteRow { name: String, row_id: String },
    /// Undoes a `NeedsSpecUpdate` row rewrite: restore the previous row.
    RestoreRow { row: Box<ContainerRow> },
    /// Undoes a `NeedsUpdate`: re-apply the old resources, restore the old row.
    RestoreResourcesAndRow {
        name: String,
        resources: ResourceConfig,
        row: Box<ContainerRow>,
    },
    /// Undoes the "new" half of a start-first recreate before the old
    /// container has been torn down: just remove the new container.
    RemoveNewContainer { name: String },
    /// Undoes a completed start-first or stop-first recreate: the old
    /// container and row are gone, so restore them and remove the new one.
    RestoreOldContainer {
        create: Box<CreateConfig>,
        old_row: Box<ContainerRow>,
        new_name: String,
        new_row_id: String,
    },
}

/// The ordered log of compensating actions for one tier.
#[derive(Debug, Default)]
pub struct RollbackLog {
    actions: Vec<RollbackAction>,
}

impl RollbackLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action, returning a handle that can later be passed to
    /// [`Self::upgrade`] to replace it in place.
    pub fn push(&mut self, action: RollbackAction) -> usize {
        self.actions.push(action);
        self.actions.len() - 1
    }

    /// Replaces a previously pushed action, e.g. when a start-first recreate
    /// clears its health gate and its compensator changes from "remove the
    /// new container" to "restore the old one".
    pub fn upgrade(&mut self, handle: usize, action: RollbackAction) {
        self.actions[handle] = action;
    }

    /// Returns true if no compensating actions have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Replays `log` in reverse against `runtime`/`store`, best-effort. Returns
/// the first error encountered, if any; later errors are logged and
/// otherwise swallowed so every remaining action still gets a chance to run.
pub async fn replay(log: &RollbackLog, runtime: &dyn ContainerRuntime, store: &dyn ContainerStore) -> Option<PortError> {
    let mut first_err = None;
    for action in log.actions.iter().rev() {
        if let Err(err) = apply_one(action, runtime, store).await {
            tracing::warn!(%err, "rollback action failed");
            if first_err.is_none() {
                first_err = Some(err);
            }
        }
    }
    first_err
}

async fn apply_one(
    action: &RollbackAction,
    runtime: &dyn ContainerRuntime,
    store: &dyn ContainerStore,
) -> Result<(), PortError> {
    match action {
        RollbackAction::RecreateAndStart { create, row } => {
            runtime.container_create((**create).clone()).await?;
            runtime.container_start(&create.name).await?;
            store.insert((**row).clone()).await
        }
        RollbackAction::StopRemoveDeleteRow { name, row_id } => {
            let _ = runtime.container_stop(name).await;
            runtime.container_remove(name, true).await?;
            store.delete(row_id).await
        }
        RollbackAction::RestoreRow { row } => store.update((**row).clone()).await,
        RollbackAction::RestoreResourcesAndRow { name, resources, row } => {
            runtime.container_update(name, *resources).await?;
            store.update((**row).clone()).await
        }
        RollbackAction::RemoveNewContainer { name } => {
            let _ = runtime.container_stop(name).await;
            runtime.container_remove(name, true).await
        }
        RollbackAction::RestoreOldContainer {
            create,
            old_row,
            new_name,
            new_row_id,
        } => {
            let _ = runtime.container_stop(new_name).await;
            runtime.container_remove(new_name, true).await?;
            store.delete(new_row_id).await?;
            runtime.container_create((**create).clone()).await?;
            runtime.container_start(&create.name).await?;
            store.insert((**old_row).clone()).await
        }
    }
}
