//! A hierarchy flattening engine.
//!
//! A [`TreeStore`] owns an arbitrarily nested tree. The [`Flattener`] projects
//! it into a [`FlattenedView`]: a depth-first, pre-order sequence of
//! [`FlattenedEntry`] rows where parents and next siblings are reached through
//! relative offsets and every subtree is a contiguous index range. When the
//! store reports a [`HierarchyChange`], [`Flattener::reflatten`] re-flattens
//! only the affected subtree and splices it into the view.
//!
//! ## Example
//!
//! ```rust
//! use hierflat::{Flattener, MemoryTree, NodeHandle};
//!
//! // A{B, C{D}}
//! let mut tree = MemoryTree::new();
//! let a = tree.add(NodeHandle::NULL).unwrap();
//! let b = tree.add(a).unwrap();
//! let c = tree.add(a).unwrap();
//! let d = tree.add(c).unwrap();
//!
//! let flattener = Flattener::default();
//! let mut view = flattener.flatten_all(&tree).unwrap();
//! assert_eq!(view.get(3).node(), d);
//! assert_eq!(view.get(2).parent_offset(), -2);
//! assert_eq!(view.next_sibling(1).node(), c);
//!
//! tree.remove(c).unwrap();
//! flattener.reflatten(&mut view, &tree, c).unwrap();
//! assert_eq!(view.len(), 2);
//! assert_eq!(view.child_count(a), Ok(1));
//! assert!(view.lookup(&tree, c).is_err());
//! # let _ = b;
//! ```
mod config;
mod entry;
mod error;
mod flattener;
mod handle;
mod memory;
mod store;
mod sync;
mod view;

pub use config::FlattenerConfig;
pub use entry::FlattenedEntry;
pub use entry::MAX_ENTRIES;
pub use entry::NO_OFFSET;
pub use error::Corruption;
pub use error::HierarchyError;
pub use error::Result;
pub use flattener::Flattener;
pub use flattener::Reflatten;
pub use handle::NodeHandle;
pub use memory::MemoryTree;
pub use store::HierarchyChange;
pub use store::TreeStore;
pub use sync::HierarchySync;
pub use view::ChildIndices;
pub use view::FlattenedView;
