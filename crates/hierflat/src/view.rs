use std::ops::Range;

use rustc_hash::FxHashMap;

use crate::{FlattenedEntry, HierarchyError, NO_OFFSET, NodeHandle, Result, TreeStore};

/// A tree projected into depth-first pre-order.
///
/// Every subtree occupies a contiguous range of flat indices, and each entry
/// carries relative offsets to its parent and next sibling, so navigation never
/// touches the originating store. A handle-to-index map is maintained alongside
/// the entries for handle-keyed queries.
///
/// Two views are equal when they project the same hierarchy; the store
/// version they were synchronized with is not compared.
#[derive(Debug, Clone, Default)]
pub struct FlattenedView {
    pub(crate) entries: Vec<FlattenedEntry>,
    pub(crate) indices: FxHashMap<NodeHandle, usize>,
    pub(crate) version: u64,
}

impl FlattenedView {
    pub(crate) fn from_parts(
        entries: Vec<FlattenedEntry>,
        indices: FxHashMap<NodeHandle, usize>,
        version: u64,
    ) -> Self {
        Self {
            entries,
            indices,
            version,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`, or the null entry when out of range.
    #[inline(always)]
    pub fn get(&self, index: usize) -> &FlattenedEntry {
        self.entries.get(index).unwrap_or(FlattenedEntry::null())
    }

    pub fn entries(&self) -> &[FlattenedEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &FlattenedEntry> + '_ {
        self.entries.iter()
    }

    /// Store version this view was last synchronized with.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn needs_update<S: TreeStore + ?Sized>(&self, store: &S) -> bool {
        self.version != store.version()
    }

    /// Flat index of `node`.
    ///
    /// Only the view is consulted, so a handle the store has retired is
    /// reported as [`NotFound`](HierarchyError::NotFound) once the removal has
    /// been re-flattened. Use [`lookup`](Self::lookup) to get
    /// [`InvalidHandle`](HierarchyError::InvalidHandle) for stale handles.
    pub fn index_of(&self, node: NodeHandle) -> Result<usize> {
        if node.is_null() {
            return Err(HierarchyError::InvalidHandle(node));
        }
        self.indices
            .get(&node)
            .copied()
            .ok_or(HierarchyError::NotFound(node))
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        self.indices.contains_key(&node)
    }

    pub fn parent_index(&self, index: usize) -> Option<usize> {
        self.entries
            .get(index)
            .and_then(|entry| entry.parent_index(index))
    }

    /// Parent entry, or the null entry for roots and out-of-range indices.
    pub fn parent(&self, index: usize) -> &FlattenedEntry {
        self.parent_index(index)
            .map_or(FlattenedEntry::null(), |parent| self.get(parent))
    }

    pub fn next_sibling_index(&self, index: usize) -> Option<usize> {
        self.entries
            .get(index)
            .and_then(|entry| entry.next_sibling_index(index))
    }

    /// Next sibling entry, or the null entry for the last sibling.
    pub fn next_sibling(&self, index: usize) -> &FlattenedEntry {
        self.next_sibling_index(index)
            .map_or(FlattenedEntry::null(), |sibling| self.get(sibling))
    }

    /// Walks the sibling chain from the first sibling, so this is linear in the
    /// number of preceding siblings.
    pub fn previous_sibling_index(&self, index: usize) -> Option<usize> {
        if index >= self.entries.len() {
            return None;
        }
        let mut cursor = self.parent_index(index).map_or(0, |parent| parent + 1);
        let mut previous = None;
        while cursor != index {
            previous = Some(cursor);
            cursor = self.next_sibling_index(cursor)?;
        }
        previous
    }

    /// Flat index range `[index, index + subtree_size)` covered by the subtree
    /// rooted at `index`.
    pub fn subtree_range(&self, index: usize) -> Option<Range<usize>> {
        self.entries
            .get(index)
            .map(|entry| index..index + entry.subtree_size as usize)
    }

    /// Flat indices of the direct children of the entry at `index`.
    pub fn child_indices(&self, index: usize) -> ChildIndices<'_> {
        let first = self
            .entries
            .get(index)
            .filter(|entry| entry.child_count > 0)
            .map(|_| index + 1);
        ChildIndices {
            view: self,
            next: first,
        }
    }

    /// Lowest entry whose subtree contains both `a` and `b`.
    pub fn common_ancestor(&self, mut a: usize, mut b: usize) -> Option<usize> {
        if a >= self.entries.len() || b >= self.entries.len() {
            return None;
        }
        while self.entries[a].depth > self.entries[b].depth {
            a = self.parent_index(a)?;
        }
        while self.entries[b].depth > self.entries[a].depth {
            b = self.parent_index(b)?;
        }
        while a != b {
            a = self.parent_index(a)?;
            b = self.parent_index(b)?;
        }
        Some(a)
    }

    pub fn entry(&self, node: NodeHandle) -> Result<&FlattenedEntry> {
        self.index_of(node).map(|index| self.get(index))
    }

    /// Like [`entry`](Self::entry), but checks `node` against the store first:
    /// a Null or retired handle is [`InvalidHandle`](HierarchyError::InvalidHandle)
    /// whether or not the view has caught up with the removal, and only a live
    /// handle missing from the view is [`NotFound`](HierarchyError::NotFound).
    pub fn lookup<S: TreeStore + ?Sized>(
        &self,
        store: &S,
        node: NodeHandle,
    ) -> Result<&FlattenedEntry> {
        if !store.is_valid(node) {
            return Err(HierarchyError::InvalidHandle(node));
        }
        self.entry(node)
    }

    pub fn parent_of(&self, node: NodeHandle) -> Result<&FlattenedEntry> {
        self.index_of(node).map(|index| self.parent(index))
    }

    pub fn next_sibling_of(&self, node: NodeHandle) -> Result<&FlattenedEntry> {
        self.index_of(node).map(|index| self.next_sibling(index))
    }

    pub fn child_count(&self, node: NodeHandle) -> Result<u32> {
        self.entry(node).map(FlattenedEntry::child_count)
    }

    pub fn descendant_count(&self, node: NodeHandle) -> Result<u32> {
        self.entry(node).map(FlattenedEntry::descendant_count)
    }

    pub fn depth(&self, node: NodeHandle) -> Result<u32> {
        self.entry(node).map(FlattenedEntry::depth)
    }

    pub fn children(
        &self,
        node: NodeHandle,
    ) -> Result<impl Iterator<Item = &FlattenedEntry> + '_> {
        let index = self.index_of(node)?;
        Ok(self.child_indices(index).map(|child| self.get(child)))
    }

    /// First handle of `fresh` already indexed outside `range`.
    pub(crate) fn conflict(
        &self,
        range: &Range<usize>,
        fresh: &FxHashMap<NodeHandle, usize>,
    ) -> Option<NodeHandle> {
        fresh.keys().copied().find(|node| {
            self.indices
                .get(node)
                .is_some_and(|index| !range.contains(index))
        })
    }

    /// Replaces the subtree rooted at `start` with `fresh`, whose first entry
    /// must be the re-flattened subtree root at the same depth.
    ///
    /// Offsets inside `fresh` are relative and carry over unchanged. Only the
    /// ancestors of `start` and the later siblings along that ancestor chain
    /// point across the splice, so those are the entries that get patched.
    pub(crate) fn splice_subtree(&mut self, start: usize, mut fresh: Vec<FlattenedEntry>) {
        let old = self.entries[start];
        let old_end = start + old.subtree_size as usize;
        let delta = fresh.len() as isize - old.subtree_size as isize;

        if delta != 0 {
            let mut cursor = Some(start);
            while let Some(index) = cursor {
                let mut sibling = self.next_sibling_index(index);
                while let Some(sibling_index) = sibling {
                    let entry = &mut self.entries[sibling_index];
                    entry.parent_offset = shift_back(entry.parent_offset, delta);
                    sibling = entry.next_sibling_index(sibling_index);
                }

                if index != start {
                    let entry = &mut self.entries[index];
                    entry.subtree_size = (entry.subtree_size as isize + delta) as u32;
                    entry.next_sibling_offset = shift_forward(entry.next_sibling_offset, delta);
                }
                cursor = self.parent_index(index);
            }
        }

        fresh[0].parent_offset = old.parent_offset;
        fresh[0].next_sibling_offset = shift_forward(old.next_sibling_offset, delta);

        for entry in &self.entries[start..old_end] {
            self.indices.remove(&entry.node);
        }

        let reindex_end = if delta == 0 {
            old_end
        } else {
            (self.entries.len() as isize + delta) as usize
        };

        self.entries.splice(start..old_end, fresh);

        for (index, entry) in self.entries[start..reindex_end]
            .iter()
            .enumerate()
            .map(|(offset, entry)| (start + offset, entry))
        {
            self.indices.insert(entry.node, index);
        }
    }
}

impl PartialEq for FlattenedView {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries && self.indices == other.indices
    }
}

impl Eq for FlattenedView {}

impl<'a> IntoIterator for &'a FlattenedView {
    type Item = &'a FlattenedEntry;
    type IntoIter = std::slice::Iter<'a, FlattenedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Iterator over the flat indices of an entry's direct children.
#[derive(Debug, Clone)]
pub struct ChildIndices<'a> {
    view: &'a FlattenedView,
    next: Option<usize>,
}

impl Iterator for ChildIndices<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.view.next_sibling_index(current);
        Some(current)
    }
}

// A sibling that sits after the splice moves by `delta`, so a parent offset
// pointing back across the splice grows by the same amount in magnitude.
#[inline(always)]
fn shift_back(offset: i32, delta: isize) -> i32 {
    if offset == NO_OFFSET {
        NO_OFFSET
    } else {
        (offset as isize - delta) as i32
    }
}

#[inline(always)]
fn shift_forward(offset: i32, delta: isize) -> i32 {
    if offset == NO_OFFSET {
        NO_OFFSET
    } else {
        (offset as isize + delta) as i32
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{Flattener, MemoryTree};

    struct Abcd {
        tree: MemoryTree,
        view: FlattenedView,
        a: NodeHandle,
        b: NodeHandle,
        c: NodeHandle,
        d: NodeHandle,
    }

    // A{B, C{D}}
    #[fixture]
    fn abcd() -> Abcd {
        let mut tree = MemoryTree::new();
        let a = tree.add(NodeHandle::NULL).unwrap();
        let b = tree.add(a).unwrap();
        let c = tree.add(a).unwrap();
        let d = tree.add(c).unwrap();
        let view = Flattener::default().flatten_all(&tree).unwrap();
        Abcd {
            tree,
            view,
            a,
            b,
            c,
            d,
        }
    }

    #[rstest]
    #[case(0, false)]
    #[case(3, false)]
    #[case(4, true)]
    #[case(usize::MAX, true)]
    fn test_get_out_of_range_is_null(abcd: Abcd, #[case] index: usize, #[case] expected: bool) {
        assert_eq!(abcd.view.get(index).is_null(), expected);
    }

    #[rstest]
    fn test_navigation(abcd: Abcd) {
        let Abcd { view, a, b, c, d, .. } = abcd;
        assert_eq!(view.len(), 4);
        assert_eq!(view.parent(0).node(), NodeHandle::NULL);
        assert_eq!(view.parent(1).node(), a);
        assert_eq!(view.parent(3).node(), c);
        assert_eq!(view.next_sibling(1).node(), c);
        assert!(view.next_sibling(2).is_null());
        assert_eq!(view.previous_sibling_index(2), Some(1));
        assert_eq!(view.previous_sibling_index(1), None);
        assert_eq!(view.previous_sibling_index(0), None);
        assert_eq!(view.get(3).node(), d);
        assert_eq!(view.get(1).node(), b);
    }

    #[rstest]
    #[case(0, Some(0..4))]
    #[case(1, Some(1..2))]
    #[case(2, Some(2..4))]
    #[case(3, Some(3..4))]
    #[case(4, None)]
    fn test_subtree_range(abcd: Abcd, #[case] index: usize, #[case] expected: Option<Range<usize>>) {
        assert_eq!(abcd.view.subtree_range(index), expected);
    }

    #[rstest]
    #[case(0, vec![1, 2])]
    #[case(1, vec![])]
    #[case(2, vec![3])]
    #[case(9, vec![])]
    fn test_child_indices(abcd: Abcd, #[case] index: usize, #[case] expected: Vec<usize>) {
        assert_eq!(abcd.view.child_indices(index).collect::<Vec<_>>(), expected);
    }

    #[rstest]
    #[case(1, 3, Some(0))]
    #[case(3, 2, Some(2))]
    #[case(3, 3, Some(3))]
    #[case(0, 7, None)]
    fn test_common_ancestor(
        abcd: Abcd,
        #[case] a: usize,
        #[case] b: usize,
        #[case] expected: Option<usize>,
    ) {
        assert_eq!(abcd.view.common_ancestor(a, b), expected);
    }

    #[rstest]
    fn test_handle_queries(abcd: Abcd) {
        let Abcd { view, a, b, c, d, .. } = abcd;
        assert_eq!(view.index_of(c), Ok(2));
        assert!(view.contains(d));
        assert_eq!(view.child_count(a), Ok(2));
        assert_eq!(view.descendant_count(a), Ok(3));
        assert_eq!(view.depth(d), Ok(2));
        assert_eq!(view.parent_of(d).map(|entry| entry.node()), Ok(c));
        assert_eq!(view.next_sibling_of(b).map(|entry| entry.node()), Ok(c));
        assert!(view.parent_of(a).unwrap().is_null());
        assert_eq!(
            view.children(a)
                .unwrap()
                .map(|entry| entry.node())
                .collect::<Vec<_>>(),
            vec![b, c]
        );
    }

    #[rstest]
    fn test_index_of_errors(abcd: Abcd) {
        let missing = NodeHandle::new(42, 1);
        assert_eq!(
            abcd.view.index_of(NodeHandle::NULL),
            Err(HierarchyError::InvalidHandle(NodeHandle::NULL))
        );
        assert_eq!(abcd.view.index_of(missing), Err(HierarchyError::NotFound(missing)));
    }

    #[rstest]
    fn test_lookup_rejects_retired_handle(abcd: Abcd) {
        let Abcd { mut tree, view, c, .. } = abcd;
        assert!(view.lookup(&tree, c).is_ok());
        assert!(!view.needs_update(&tree));

        tree.remove(c).unwrap();
        assert!(view.needs_update(&tree));
        assert_eq!(view.lookup(&tree, c), Err(HierarchyError::InvalidHandle(c)));
    }

    #[rstest]
    fn test_stale_handle_after_removal_is_reflattened(abcd: Abcd) {
        let Abcd {
            mut tree,
            mut view,
            c,
            d,
            ..
        } = abcd;
        tree.remove(c).unwrap();
        Flattener::default().reflatten(&mut view, &tree, c).unwrap();

        for stale in [c, d] {
            assert_eq!(view.index_of(stale), Err(HierarchyError::NotFound(stale)));
            assert_eq!(view.lookup(&tree, stale), Err(HierarchyError::InvalidHandle(stale)));
        }
        assert_eq!(
            view.lookup(&tree, NodeHandle::NULL),
            Err(HierarchyError::InvalidHandle(NodeHandle::NULL))
        );
    }

    #[rstest]
    fn test_equality_ignores_version(abcd: Abcd) {
        let mut other = abcd.view.clone();
        other.version += 1;
        assert_eq!(abcd.view, other);

        other.entries[1].depth += 1;
        assert_ne!(abcd.view, other);
    }

    #[rstest]
    fn test_iter(abcd: Abcd) {
        let Abcd { view, a, b, c, d, .. } = abcd;
        let nodes: Vec<_> = view.iter().map(FlattenedEntry::node).collect();
        assert_eq!(nodes, vec![a, b, c, d]);
        assert_eq!((&view).into_iter().count(), 4);
        assert_eq!(view.entries().len(), 4);
    }
}
