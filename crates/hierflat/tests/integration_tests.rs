use hierflat::{
    FlattenedEntry, FlattenedView, Flattener, FlattenerConfig, HierarchyError, HierarchySync,
    MemoryTree, NodeHandle, Reflatten, TreeStore,
};
use itertools::Itertools;
use rstest::{fixture, rstest};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Scenario {
    tree: MemoryTree,
    a: NodeHandle,
    b: NodeHandle,
    c: NodeHandle,
    d: NodeHandle,
}

// A{B{}, C{D{}}}
#[fixture]
fn scenario() -> Scenario {
    init_tracing();
    let mut tree = MemoryTree::new();
    let a = tree.add(NodeHandle::NULL).unwrap();
    let b = tree.add(a).unwrap();
    let c = tree.add(a).unwrap();
    let d = tree.add(c).unwrap();
    Scenario { tree, a, b, c, d }
}

fn rows(view: &FlattenedView) -> Vec<(NodeHandle, u32, u32, i32, i32)> {
    view.iter()
        .map(|entry| {
            (
                entry.node(),
                entry.depth(),
                entry.child_count(),
                entry.parent_offset(),
                entry.next_sibling_offset(),
            )
        })
        .collect()
}

#[rstest]
fn test_flatten_scenario(scenario: Scenario) {
    let Scenario { tree, a, b, c, d } = scenario;
    let view = Flattener::default().flatten_all(&tree).unwrap();

    assert_eq!(
        rows(&view),
        vec![
            (a, 0, 2, 0, 0),
            (b, 1, 0, -1, 1),
            (c, 1, 1, -2, 0),
            (d, 2, 0, -1, 0),
        ]
    );
    assert_eq!(view.get(1).parent_index(1), Some(0));
    assert_eq!(view.get(1).next_sibling_index(1), Some(2));
    assert_eq!(view.subtree_range(2), Some(2..4));
    assert!(view.get(4).is_null());
}

#[rstest]
fn test_remove_scenario(scenario: Scenario) {
    let Scenario {
        mut tree, a, b, c, d,
    } = scenario;
    let flattener = Flattener::default();
    let mut view = flattener.flatten_all(&tree).unwrap();

    tree.remove(c).unwrap();
    flattener.reflatten(&mut view, &tree, c).unwrap();

    assert_eq!(rows(&view), vec![(a, 0, 1, 0, 0), (b, 1, 0, -1, 0)]);
    for stale in [c, d] {
        assert_eq!(view.lookup(&tree, stale), Err(HierarchyError::InvalidHandle(stale)));
        assert_eq!(view.index_of(stale), Err(HierarchyError::NotFound(stale)));
        assert!(!tree.is_valid(stale));
    }
}

#[rstest]
#[case::skip_leaf(1, 2)]
#[case::skip_branch(2, 4)]
#[case::skip_root(0, 4)]
fn test_skip_subtree(scenario: Scenario, #[case] index: usize, #[case] expected_next: usize) {
    let view = Flattener::default().flatten_all(&scenario.tree).unwrap();
    let skipped = index + view.get(index).subtree_size() as usize;
    assert_eq!(skipped, expected_next);
}

#[rstest]
fn test_entry_display(scenario: Scenario) {
    let view = Flattener::default().flatten_all(&scenario.tree).unwrap();
    let a = scenario.a;
    assert_eq!(
        view.get(0).to_string(),
        format!("FlattenedEntry({}:{})", a.id(), a.version())
    );
    assert_eq!(view.get(99).to_string(), "FlattenedEntry(Null)");
    assert_eq!(*view.get(99), FlattenedEntry::NULL);
}

#[rstest]
fn test_sync_through_edits(scenario: Scenario) {
    let Scenario {
        mut tree, a, b, c, d,
    } = scenario;
    let rx = tree.subscribe();
    let mut sync = HierarchySync::new(&tree, rx, Flattener::default()).unwrap();

    let e = tree.add(b).unwrap();
    tree.set_parent(d, b).unwrap();
    tree.set_sibling_index(c, 0).unwrap();
    sync.sync(&tree).unwrap();

    let nodes = sync.view().iter().map(FlattenedEntry::node).collect_vec();
    assert_eq!(nodes, vec![a, c, b, e, d]);
    assert_eq!(sync.view().child_count(b), Ok(2));
    assert_eq!(sync.view().child_count(c), Ok(0));
    assert_eq!(sync.view().parent_of(d).map(FlattenedEntry::node), Ok(b));
    assert_eq!(
        sync.view(),
        &Flattener::default().flatten_all(&tree).unwrap()
    );
}

#[rstest]
fn test_deep_hierarchy_is_bounded_by_config() {
    init_tracing();
    let mut tree = MemoryTree::new();
    let mut parent = NodeHandle::NULL;
    for _ in 0..10 {
        parent = tree.add(parent).unwrap();
    }

    let shallow = Flattener::new(FlattenerConfig::default().with_max_depth(5));
    assert!(shallow.flatten_all(&tree).unwrap_err().is_corrupt());

    let deep = Flattener::new(FlattenerConfig::default().with_max_depth(9));
    assert_eq!(deep.flatten_all(&tree).unwrap().len(), 10);
}

#[rstest]
fn test_localized_edit_splices(scenario: Scenario) {
    let Scenario { mut tree, b, .. } = scenario;
    let flattener = Flattener::default();
    let mut view = flattener.flatten_all(&tree).unwrap();

    tree.add(b).unwrap();
    assert_eq!(
        flattener.reflatten(&mut view, &tree, b),
        Ok(Reflatten::Spliced {
            start: 1,
            removed: 1,
            inserted: 2
        })
    );
    assert_eq!(view, flattener.flatten_all(&tree).unwrap());
}
