#![no_main]

use arbitrary::Arbitrary;
use hierflat::{Flattener, HierarchyChange, MemoryTree, NodeHandle};
use itertools::Itertools;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum Edit {
    Add { parent: Option<u8>, index: u8 },
    Remove(u8),
    Move { node: u8, parent: Option<u8> },
    Reorder { node: u8, index: u8 },
    Clear,
}

#[derive(Debug, Clone, Arbitrary)]
struct ArbitraryEdits {
    setup: Vec<Edit>,
    edits: Vec<Edit>,
    batched: bool,
}

fn resolve(tree: &MemoryTree, pick: u8) -> Option<NodeHandle> {
    let live = tree.handles().sorted().collect_vec();
    (!live.is_empty()).then(|| live[pick as usize % live.len()])
}

fn apply(tree: &mut MemoryTree, edit: &Edit) {
    match edit {
        Edit::Add { parent, index } => {
            let parent = parent
                .and_then(|pick| resolve(tree, pick))
                .unwrap_or(NodeHandle::NULL);
            let _ = tree.insert(parent, *index as usize);
        }
        Edit::Remove(pick) => {
            if let Some(node) = resolve(tree, *pick) {
                let _ = tree.remove(node);
            }
        }
        Edit::Move { node, parent } => {
            if let Some(node) = resolve(tree, *node) {
                let parent = parent
                    .and_then(|pick| resolve(tree, pick))
                    .unwrap_or(NodeHandle::NULL);
                let _ = tree.set_parent(node, parent);
            }
        }
        Edit::Reorder { node, index } => {
            if let Some(node) = resolve(tree, *node) {
                let _ = tree.set_sibling_index(node, *index as usize);
            }
        }
        Edit::Clear => tree.clear(),
    }
}

fuzz_target!(|input: ArbitraryEdits| {
    let mut tree = MemoryTree::new();
    for edit in &input.setup {
        apply(&mut tree, edit);
    }

    let flattener = Flattener::default();
    let mut view = flattener.flatten_all(&tree).unwrap();
    let rx = tree.subscribe();

    for edit in &input.edits {
        apply(&mut tree, edit);
        if !input.batched {
            for change in rx.try_iter() {
                match change {
                    HierarchyChange::Node(node) => {
                        flattener.reflatten(&mut view, &tree, node).unwrap();
                    }
                    HierarchyChange::Reset => {
                        flattener.apply_changes(&mut view, &tree, [change]).unwrap();
                    }
                }
            }
        }
    }
    flattener
        .apply_changes(&mut view, &tree, rx.try_iter())
        .unwrap();

    assert_eq!(view, flattener.flatten_all(&tree).unwrap());
});
