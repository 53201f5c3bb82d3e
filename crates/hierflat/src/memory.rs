use crossbeam_channel::{Receiver, Sender};
use slotmap::{Key, KeyData, SlotMap};

use crate::{Corruption, HierarchyChange, HierarchyError, NodeHandle, Result, TreeStore};

slotmap::new_key_type! { struct NodeKey; }

#[derive(Debug, Clone, Default)]
struct NodeData {
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

/// An in-memory [`TreeStore`].
///
/// Nodes live in a [`SlotMap`], whose versioned keys map one-to-one onto
/// [`NodeHandle`]s: removing a node bumps its slot version, so handles captured
/// earlier become stale. Every mutation is broadcast to all subscribers.
#[derive(Debug, Default)]
pub struct MemoryTree {
    nodes: SlotMap<NodeKey, NodeData>,
    roots: Vec<NodeKey>,
    version: u64,
    subscribers: Vec<Sender<HierarchyChange>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a receiver for every change made after this call.
    pub fn subscribe(&mut self) -> Receiver<HierarchyChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Appends a new node as the last child of `parent`, or as the last root
    /// when `parent` is null.
    pub fn add(&mut self, parent: NodeHandle) -> Result<NodeHandle> {
        self.insert(parent, usize::MAX)
    }

    /// Inserts a new node at `index` among the children of `parent`, clamped to
    /// the number of existing siblings.
    pub fn insert(&mut self, parent: NodeHandle, index: usize) -> Result<NodeHandle> {
        let parent_key = self.optional_key(parent)?;
        let key = self.nodes.insert(NodeData {
            parent: parent_key,
            children: Vec::new(),
        });
        let siblings = self.siblings_mut(parent_key);
        siblings.insert(index.min(siblings.len()), key);

        let handle = to_handle(key);
        self.emit(HierarchyChange::Node(handle));
        Ok(handle)
    }

    /// Removes `node` together with its whole subtree, returning how many nodes
    /// were retired.
    pub fn remove(&mut self, node: NodeHandle) -> Result<usize> {
        let key = self.key(node)?;
        self.detach(key);

        let mut pending = vec![key];
        let mut removed = 0;
        while let Some(key) = pending.pop() {
            if let Some(data) = self.nodes.remove(key) {
                pending.extend(data.children);
                removed += 1;
            }
        }

        self.emit(HierarchyChange::Node(node));
        Ok(removed)
    }

    /// Moves `node` to the end of `parent`'s children, or to the end of the
    /// roots when `parent` is null.
    pub fn set_parent(&mut self, node: NodeHandle, parent: NodeHandle) -> Result<()> {
        let key = self.key(node)?;
        let parent_key = self.optional_key(parent)?;

        if parent_key.is_some_and(|parent_key| self.is_ancestor_or_self(key, parent_key)) {
            return Err(Corruption::Cycle { node }.into());
        }

        self.detach(key);
        if let Some(data) = self.nodes.get_mut(key) {
            data.parent = parent_key;
        }
        self.siblings_mut(parent_key).push(key);

        self.emit(HierarchyChange::Node(node));
        Ok(())
    }

    /// Moves `node` to `index` among its current siblings.
    pub fn set_sibling_index(&mut self, node: NodeHandle, index: usize) -> Result<()> {
        let key = self.key(node)?;
        let parent_key = self.nodes[key].parent;
        let siblings = self.siblings_mut(parent_key);
        if let Some(position) = siblings.iter().position(|sibling| *sibling == key) {
            siblings.remove(position);
            siblings.insert(index.min(siblings.len()), key);
        }

        self.emit(HierarchyChange::Node(node));
        Ok(())
    }

    /// Position of `node` among its siblings.
    pub fn sibling_index(&self, node: NodeHandle) -> Result<usize> {
        let key = self.key(node)?;
        let siblings = match self.nodes[key].parent {
            Some(parent) => &self.nodes[parent].children,
            None => &self.roots,
        };
        Ok(siblings
            .iter()
            .position(|sibling| *sibling == key)
            .unwrap_or_default())
    }

    /// Retires every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.emit(HierarchyChange::Reset);
    }

    /// All live handles, in slot order.
    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.nodes.keys().map(to_handle)
    }

    fn key(&self, node: NodeHandle) -> Result<NodeKey> {
        to_key(node)
            .filter(|key| self.nodes.contains_key(*key))
            .ok_or(HierarchyError::InvalidHandle(node))
    }

    fn optional_key(&self, node: NodeHandle) -> Result<Option<NodeKey>> {
        if node.is_null() {
            Ok(None)
        } else {
            self.key(node).map(Some)
        }
    }

    fn siblings_mut(&mut self, parent: Option<NodeKey>) -> &mut Vec<NodeKey> {
        match parent.and_then(|parent| self.nodes.get_mut(parent)) {
            Some(data) => &mut data.children,
            None => &mut self.roots,
        }
    }

    fn detach(&mut self, key: NodeKey) {
        let parent = self.nodes.get(key).and_then(|data| data.parent);
        self.siblings_mut(parent).retain(|sibling| *sibling != key);
    }

    fn is_ancestor_or_self(&self, ancestor: NodeKey, mut node: NodeKey) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(node).and_then(|data| data.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn emit(&mut self, change: HierarchyChange) {
        self.version += 1;
        self.subscribers.retain(|tx| tx.send(change).is_ok());
    }
}

impl TreeStore for MemoryTree {
    fn roots(&self) -> Vec<NodeHandle> {
        self.roots.iter().copied().map(to_handle).collect()
    }

    fn children(&self, node: NodeHandle) -> Result<Vec<NodeHandle>> {
        let key = self.key(node)?;
        Ok(self.nodes[key]
            .children
            .iter()
            .copied()
            .map(to_handle)
            .collect())
    }

    fn parent(&self, node: NodeHandle) -> Result<NodeHandle> {
        let key = self.key(node)?;
        Ok(self.nodes[key].parent.map(to_handle).unwrap_or_default())
    }

    fn is_valid(&self, node: NodeHandle) -> bool {
        self.key(node).is_ok()
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[inline(always)]
fn to_handle(key: NodeKey) -> NodeHandle {
    let ffi = key.data().as_ffi();
    NodeHandle::new(ffi as u32, (ffi >> 32) as u32)
}

// Occupied slots always carry an odd version; `KeyData::from_ffi` would
// silently round an even one up, so those are rejected here.
#[inline(always)]
fn to_key(node: NodeHandle) -> Option<NodeKey> {
    if node.is_null() || node.version() % 2 == 0 {
        return None;
    }
    let ffi = (u64::from(node.version()) << 32) | u64::from(node.id());
    Some(KeyData::from_ffi(ffi).into())
}
