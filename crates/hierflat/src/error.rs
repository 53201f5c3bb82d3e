use thiserror::Error;

use crate::NodeHandle;

pub type Result<T, E = HierarchyError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("Invalid handle {0}: the node is null or has been retired")]
    InvalidHandle(NodeHandle),
    #[error("{0} is not present in the flattened view")]
    NotFound(NodeHandle),
    #[error("Corrupt hierarchy: {0}")]
    CorruptHierarchy(#[from] Corruption),
}

/// Structural inconsistencies reported by a tree store.
///
/// Any of these aborts the current flatten and leaves the previous view intact.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
    #[error("{node} is reachable as its own descendant")]
    Cycle { node: NodeHandle },
    #[error("{node} is listed more than once")]
    DuplicateNode { node: NodeHandle },
    #[error("{node} is listed under {listed_under} but claims {claimed} as parent")]
    ParentMismatch {
        node: NodeHandle,
        listed_under: NodeHandle,
        claimed: NodeHandle,
    },
    #[error("{parent} lists {child}, which is not a live node")]
    StaleChild { parent: NodeHandle, child: NodeHandle },
    #[error("Maximum depth {max_depth} exceeded at {node}")]
    TooDeep { node: NodeHandle, max_depth: usize },
    #[error("Visited more nodes than the {limit} the store reports")]
    NodeCountExceeded { limit: usize },
}

impl HierarchyError {
    #[inline(always)]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, HierarchyError::CorruptHierarchy(_))
    }
}
