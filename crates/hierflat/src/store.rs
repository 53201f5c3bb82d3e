use crate::{NodeHandle, Result};

/// A structural change reported by a [`TreeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HierarchyChange {
    /// The adjacency of or around this node changed: it was inserted, removed,
    /// reparented, moved among its siblings, or its own children changed.
    /// The handle may already be stale when the change is observed.
    Node(NodeHandle),
    /// Everything may have changed; the view has to be rebuilt from scratch.
    Reset,
}

/// The read surface the flattener needs from a tree.
///
/// The store is the only authority over node identities. Sequences returned by
/// [`roots`](TreeStore::roots) and [`children`](TreeStore::children) define
/// sibling order.
pub trait TreeStore {
    /// Top-level nodes in sibling order.
    fn roots(&self) -> Vec<NodeHandle>;

    /// Direct children of `node` in sibling order.
    ///
    /// Fails with [`HierarchyError::InvalidHandle`](crate::HierarchyError::InvalidHandle)
    /// if `node` is null or stale.
    fn children(&self, node: NodeHandle) -> Result<Vec<NodeHandle>>;

    /// Parent of `node`, or [`NodeHandle::NULL`] for a root.
    fn parent(&self, node: NodeHandle) -> Result<NodeHandle>;

    fn is_valid(&self, node: NodeHandle) -> bool;

    /// Number of live nodes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Structural version, bumped on every adjacency change.
    fn version(&self) -> u64;
}
