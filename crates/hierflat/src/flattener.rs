use itertools::Itertools;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::{
    Corruption, FlattenedEntry, FlattenedView, FlattenerConfig, HierarchyChange, MAX_ENTRIES,
    NO_OFFSET, NodeHandle, Result, TreeStore,
};

/// What a re-flatten did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reflatten {
    /// The change did not touch anything the view holds.
    Unchanged,
    /// `removed` entries starting at `start` were replaced by `inserted` entries.
    Spliced {
        start: usize,
        removed: usize,
        inserted: usize,
    },
    /// The whole view was rebuilt.
    Rebuilt,
}

#[derive(Debug, Clone, Default)]
pub struct Flattener {
    config: FlattenerConfig,
}

#[derive(Debug)]
struct Frame {
    index: usize,
    node: NodeHandle,
    children: std::vec::IntoIter<NodeHandle>,
    last_child: Option<usize>,
}

#[derive(Debug, Default)]
struct Walk {
    entries: Vec<FlattenedEntry>,
    indices: FxHashMap<NodeHandle, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Nothing,
    Subtree(usize),
    Everything,
}

impl Flattener {
    pub fn new(config: FlattenerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FlattenerConfig {
        &self.config
    }

    /// Flattens the whole store into a new view.
    pub fn flatten_all<S: TreeStore + ?Sized>(&self, store: &S) -> Result<FlattenedView> {
        let capacity = self.config.initial_capacity.min(store.len());
        let walk = self.walk(store, store.roots(), NodeHandle::NULL, 0, capacity)?;
        debug!(entries = walk.entries.len(), version = store.version(), "Flattened hierarchy");
        Ok(FlattenedView::from_parts(
            walk.entries,
            walk.indices,
            store.version(),
        ))
    }

    /// Brings `view` up to date after the store reported a change at `changed`.
    ///
    /// Only the smallest subtree of the view that the change can affect is
    /// re-flattened and spliced in; a change at root level rebuilds everything.
    /// On error the view is left exactly as it was.
    ///
    /// A single change says nothing about other changes still pending, so a
    /// splice does not mark the view as synchronized with the store. Use
    /// [`apply_changes`](Self::apply_changes) with every pending change for that.
    pub fn reflatten<S: TreeStore + ?Sized>(
        &self,
        view: &mut FlattenedView,
        store: &S,
        changed: NodeHandle,
    ) -> Result<Reflatten> {
        let start = match self.select_target(view, store, changed)? {
            Target::Nothing => {
                trace!(%changed, "Change does not affect the view");
                return Ok(Reflatten::Unchanged);
            }
            Target::Everything => return self.rebuild(view, store),
            Target::Subtree(start) => start,
        };

        let root = *view.get(start);
        let expected_parent = view.parent(start).node();
        let walk = self.walk(store, vec![root.node], expected_parent, root.depth, 0)?;
        let range = start..start + root.subtree_size as usize;

        if let Some(node) = view.conflict(&range, &walk.indices) {
            warn!(%node, %changed, "Re-flattened subtree overlaps the rest of the view, rebuilding");
            return self.rebuild(view, store);
        }

        let inserted = walk.entries.len();
        if view.len() - range.len() + inserted > MAX_ENTRIES {
            return Err(Corruption::NodeCountExceeded { limit: MAX_ENTRIES }.into());
        }
        view.splice_subtree(start, walk.entries);

        debug!(
            %changed,
            subtree = %root.node,
            start,
            removed = range.len(),
            inserted,
            "Spliced re-flattened subtree"
        );
        Ok(Reflatten::Spliced {
            start,
            removed: range.len(),
            inserted,
        })
    }

    /// Applies a batch of changes, installing the result only if every change
    /// succeeds. A [`HierarchyChange::Reset`] anywhere in the batch turns it into
    /// a single full rebuild.
    ///
    /// The batch is taken to be every change since the view was last
    /// synchronized, so on success the view records the store's version.
    pub fn apply_changes<S, I>(
        &self,
        view: &mut FlattenedView,
        store: &S,
        changes: I,
    ) -> Result<Vec<Reflatten>>
    where
        S: TreeStore + ?Sized,
        I: IntoIterator<Item = HierarchyChange>,
    {
        let changes = changes.into_iter().unique().collect_vec();
        if changes.is_empty() {
            view.version = store.version();
            return Ok(Vec::new());
        }

        if changes.contains(&HierarchyChange::Reset) {
            return self.rebuild(view, store).map(|outcome| vec![outcome]);
        }

        let mut staged = view.clone();
        let outcomes = changes
            .into_iter()
            .map(|change| match change {
                HierarchyChange::Node(node) => self.reflatten(&mut staged, store, node),
                HierarchyChange::Reset => self.rebuild(&mut staged, store),
            })
            .collect::<Result<Vec<_>>>()?;

        staged.version = store.version();
        *view = staged;
        Ok(outcomes)
    }

    fn rebuild<S: TreeStore + ?Sized>(
        &self,
        view: &mut FlattenedView,
        store: &S,
    ) -> Result<Reflatten> {
        *view = self.flatten_all(store)?;
        Ok(Reflatten::Rebuilt)
    }

    /// Iterative pre-order walk of `seeds` and everything below them.
    ///
    /// Seeds are linked as siblings of each other and get `base_depth`; their
    /// parent offsets are left at [`NO_OFFSET`] for the caller to patch.
    fn walk<S: TreeStore + ?Sized>(
        &self,
        store: &S,
        seeds: Vec<NodeHandle>,
        seed_parent: NodeHandle,
        base_depth: u32,
        capacity: usize,
    ) -> Result<Walk> {
        let limit = entry_limit(store);
        let mut walk = Walk {
            entries: Vec::with_capacity(capacity),
            indices: FxHashMap::default(),
        };
        let mut seeds = seeds.into_iter();
        let mut last_seed: Option<usize> = None;
        let mut stack: SmallVec<[Frame; 32]> = SmallVec::new();

        loop {
            let (next, parent) = match stack.last_mut() {
                Some(frame) => (frame.children.next(), frame.node),
                None => (seeds.next(), seed_parent),
            };

            let Some(node) = next else {
                match stack.pop() {
                    Some(frame) => {
                        walk.entries[frame.index].subtree_size =
                            (walk.entries.len() - frame.index) as u32;
                        continue;
                    }
                    None => break,
                }
            };

            self.check_child(store, parent, node)?;

            let index = walk.entries.len();
            if walk.indices.insert(node, index).is_some() {
                return Err(if stack.iter().any(|frame| frame.node == node) {
                    Corruption::Cycle { node }
                } else {
                    Corruption::DuplicateNode { node }
                }
                .into());
            }

            if index >= limit {
                return Err(Corruption::NodeCountExceeded { limit }.into());
            }

            let depth = base_depth + stack.len() as u32;
            if let Some(max_depth) = self.config.max_depth.filter(|max| depth as usize > *max) {
                return Err(Corruption::TooDeep { node, max_depth }.into());
            }

            let (parent_offset, previous) = match stack.last_mut() {
                Some(frame) => {
                    walk.entries[frame.index].child_count += 1;
                    (
                        -((index - frame.index) as i32),
                        frame.last_child.replace(index),
                    )
                }
                None => (NO_OFFSET, last_seed.replace(index)),
            };
            if let Some(previous) = previous {
                walk.entries[previous].next_sibling_offset = (index - previous) as i32;
            }

            walk.entries
                .push(FlattenedEntry::new(node, depth, parent_offset));

            let children = store
                .children(node)
                .map_err(|_| Corruption::StaleChild { parent, child: node })?;
            stack.push(Frame {
                index,
                node,
                children: children.into_iter(),
                last_child: None,
            });
        }

        Ok(walk)
    }

    fn check_child<S: TreeStore + ?Sized>(
        &self,
        store: &S,
        parent: NodeHandle,
        child: NodeHandle,
    ) -> Result<()> {
        if !store.is_valid(child) {
            return Err(Corruption::StaleChild { parent, child }.into());
        }

        if self.config.verify_parents {
            let claimed = store
                .parent(child)
                .map_err(|_| Corruption::StaleChild { parent, child })?;
            if claimed != parent {
                return Err(Corruption::ParentMismatch {
                    node: child,
                    listed_under: parent,
                    claimed,
                }
                .into());
            }
        }

        Ok(())
    }

    /// Picks the subtree of `view` that has to be re-flattened for `changed`.
    fn select_target<S: TreeStore + ?Sized>(
        &self,
        view: &FlattenedView,
        store: &S,
        changed: NodeHandle,
    ) -> Result<Target> {
        if changed.is_null() {
            return Ok(Target::Everything);
        }

        let candidate = match view.indices.get(&changed).copied() {
            Some(index) if !store.is_valid(changed) => {
                trace!(%changed, "Changed node was removed");
                view.parent_index(index)
            }
            Some(index) if store.parent(changed)? != view.parent(index).node() => {
                trace!(%changed, "Changed node was reparented");
                let old_parent = view.parent_index(index);
                let new_anchor = self.store_anchor(view, store, changed)?;
                old_parent
                    .zip(new_anchor)
                    .and_then(|(old, new)| view.common_ancestor(old, new))
            }
            Some(index) => {
                if self.same_neighbours(view, store, index)? {
                    Some(index)
                } else {
                    trace!(%changed, "Changed node moved among its siblings");
                    view.parent_index(index)
                }
            }
            None if !store.is_valid(changed) => return Ok(Target::Nothing),
            None => {
                trace!(%changed, "Changed node is new to the view");
                self.store_anchor(view, store, changed)?
            }
        };

        // The candidate itself may be out of date; climb until an entry still
        // sits under the parent the store reports for it.
        let mut cursor = candidate;
        while let Some(index) = cursor {
            let node = view.get(index).node();
            if store.is_valid(node) && store.parent(node)? == view.parent(index).node() {
                return Ok(Target::Subtree(index));
            }
            cursor = view.parent_index(index);
        }

        Ok(Target::Everything)
    }

    /// Nearest ancestor of `node` in the store that the view already holds.
    fn store_anchor<S: TreeStore + ?Sized>(
        &self,
        view: &FlattenedView,
        store: &S,
        node: NodeHandle,
    ) -> Result<Option<usize>> {
        let limit = entry_limit(store);
        let mut ancestor = store.parent(node)?;
        let mut steps = 0;

        while !ancestor.is_null() {
            if let Some(index) = view.indices.get(&ancestor) {
                return Ok(Some(*index));
            }
            steps += 1;
            if steps > limit {
                return Err(Corruption::Cycle { node }.into());
            }
            ancestor = store.parent(ancestor)?;
        }

        Ok(None)
    }

    /// Whether the siblings around `index` in the view are the ones the store
    /// reports around that node.
    fn same_neighbours<S: TreeStore + ?Sized>(
        &self,
        view: &FlattenedView,
        store: &S,
        index: usize,
    ) -> Result<bool> {
        let node = view.get(index).node();
        let parent = store.parent(node)?;
        let siblings = if parent.is_null() {
            store.roots()
        } else {
            store.children(parent)?
        };

        let Some(position) = siblings.iter().position(|sibling| *sibling == node) else {
            return Ok(false);
        };

        let in_store = (
            position
                .checked_sub(1)
                .map_or(NodeHandle::NULL, |previous| siblings[previous]),
            siblings.get(position + 1).copied().unwrap_or_default(),
        );
        let in_view = (
            view.previous_sibling_index(index)
                .map_or(NodeHandle::NULL, |previous| view.get(previous).node()),
            view.next_sibling(index).node(),
        );

        Ok(in_store == in_view)
    }
}

/// Most entries a walk may produce: the store's node count, capped so that
/// offsets and counts fit their entry fields.
fn entry_limit<S: TreeStore + ?Sized>(store: &S) -> usize {
    store.len().min(MAX_ENTRIES)
}
