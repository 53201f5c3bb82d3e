use std::fmt;

use crate::NodeHandle;

/// Offset value reserved for "no parent" and "no next sibling".
///
/// A genuine offset is never zero because an entry is neither its own parent
/// nor its own sibling.
pub const NO_OFFSET: i32 = 0;

/// Largest number of entries a view can hold. Offsets are `i32` and counts
/// `u32`, so every index difference inside a view has to fit in an `i32`.
pub const MAX_ENTRIES: usize = i32::MAX as usize;

/// One row of a [`FlattenedView`](crate::FlattenedView).
///
/// Navigation is encoded as signed deltas relative to the entry's own flat
/// index, so a contiguous range of entries stays valid when it is moved as a
/// whole. The all-zero value is the null entry returned by out-of-range and
/// invalidated lookups.
///
/// Views are capped at [`MAX_ENTRIES`] rows; flattening a larger hierarchy
/// fails with [`Corruption::NodeCountExceeded`](crate::Corruption::NodeCountExceeded).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlattenedEntry {
    pub(crate) node: NodeHandle,
    pub(crate) parent_offset: i32,
    pub(crate) next_sibling_offset: i32,
    pub(crate) child_count: u32,
    pub(crate) depth: u32,
    pub(crate) subtree_size: u32,
}

static NULL_ENTRY: FlattenedEntry = FlattenedEntry::NULL;

impl FlattenedEntry {
    pub const NULL: FlattenedEntry = FlattenedEntry {
        node: NodeHandle::NULL,
        parent_offset: NO_OFFSET,
        next_sibling_offset: NO_OFFSET,
        child_count: 0,
        depth: 0,
        subtree_size: 0,
    };

    /// A `'static` reference to [`FlattenedEntry::NULL`].
    #[inline(always)]
    pub fn null() -> &'static FlattenedEntry {
        &NULL_ENTRY
    }

    pub(crate) fn new(node: NodeHandle, depth: u32, parent_offset: i32) -> Self {
        Self {
            node,
            parent_offset,
            next_sibling_offset: NO_OFFSET,
            child_count: 0,
            depth,
            subtree_size: 1,
        }
    }

    #[inline(always)]
    pub fn node(&self) -> NodeHandle {
        self.node
    }

    /// Delta to the parent's flat index, or [`NO_OFFSET`] for a root.
    #[inline(always)]
    pub fn parent_offset(&self) -> i32 {
        self.parent_offset
    }

    /// Delta to the next sibling's flat index, or [`NO_OFFSET`] for the last sibling.
    #[inline(always)]
    pub fn next_sibling_offset(&self) -> i32 {
        self.next_sibling_offset
    }

    /// Number of direct children.
    #[inline(always)]
    pub fn child_count(&self) -> u32 {
        self.child_count
    }

    #[inline(always)]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of entries covered by this entry's subtree, itself included.
    #[inline(always)]
    pub fn subtree_size(&self) -> u32 {
        self.subtree_size
    }

    #[inline(always)]
    pub fn descendant_count(&self) -> u32 {
        self.subtree_size.saturating_sub(1)
    }

    #[inline(always)]
    pub fn is_null(&self) -> bool {
        self.node.is_null()
    }

    #[inline(always)]
    pub fn is_root(&self) -> bool {
        !self.is_null() && self.parent_offset == NO_OFFSET
    }

    /// Resolves the parent offset against this entry's own flat index.
    pub fn parent_index(&self, index: usize) -> Option<usize> {
        resolve(index, self.parent_offset)
    }

    /// Resolves the next sibling offset against this entry's own flat index.
    pub fn next_sibling_index(&self, index: usize) -> Option<usize> {
        resolve(index, self.next_sibling_offset)
    }
}

#[inline(always)]
fn resolve(index: usize, offset: i32) -> Option<usize> {
    if offset == NO_OFFSET {
        None
    } else {
        index.checked_add_signed(offset as isize)
    }
}

impl fmt::Display for FlattenedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "FlattenedEntry(Null)")
        } else {
            write!(
                f,
                "FlattenedEntry({}:{})",
                self.node.id(),
                self.node.version()
            )
        }
    }
}
