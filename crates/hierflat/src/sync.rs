use crossbeam_channel::Receiver;
use tracing::{debug, warn};

use crate::{FlattenedView, Flattener, HierarchyChange, Reflatten, Result, TreeStore};

/// Keeps a [`FlattenedView`] in step with a store's change notifications.
///
/// Changes are only read when [`sync`](HierarchySync::sync) is called, so the
/// view never changes underneath a reader between calls.
#[derive(Debug)]
pub struct HierarchySync {
    flattener: Flattener,
    view: FlattenedView,
    changes: Receiver<HierarchyChange>,
    needs_rebuild: bool,
}

impl HierarchySync {
    /// Builds the initial view. `changes` should be subscribed before this call
    /// so that no change made in between is missed.
    pub fn new<S: TreeStore + ?Sized>(
        store: &S,
        changes: Receiver<HierarchyChange>,
        flattener: Flattener,
    ) -> Result<Self> {
        let view = flattener.flatten_all(store)?;
        Ok(Self {
            flattener,
            view,
            changes,
            needs_rebuild: false,
        })
    }

    pub fn view(&self) -> &FlattenedView {
        &self.view
    }

    pub fn into_view(self) -> FlattenedView {
        self.view
    }

    /// Number of notifications waiting to be applied.
    pub fn pending(&self) -> usize {
        self.changes.len()
    }

    /// Applies every pending notification.
    ///
    /// If applying fails, the drained notifications are gone, so the next call
    /// rebuilds from scratch regardless of what is pending.
    pub fn sync<S: TreeStore + ?Sized>(&mut self, store: &S) -> Result<Vec<Reflatten>> {
        let mut changes: Vec<HierarchyChange> = self.changes.try_iter().collect();
        if self.needs_rebuild {
            changes.push(HierarchyChange::Reset);
        }

        debug!(changes = changes.len(), "Synchronizing flattened view");
        match self
            .flattener
            .apply_changes(&mut self.view, store, changes)
        {
            Ok(outcomes) => {
                self.needs_rebuild = false;
                Ok(outcomes)
            }
            Err(err) => {
                warn!(%err, "Synchronization failed, next sync rebuilds the view");
                self.needs_rebuild = true;
                Err(err)
            }
        }
    }
}
