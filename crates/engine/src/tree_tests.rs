// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use muster_core::{Gang, QueueKind, Task};

fn res(cpu: f64, mem: f64) -> Resources {
    Resources::cpu_mem(cpu, mem)
}

fn three_pool_tree() -> Tree {
    // root(100 cpu) -> batch(share 3), svc(share 1)
    let spec = PoolSpec::new("root", res(100.0, 10_000.0))
        .with_child(
            PoolSpec::new("batch", res(100.0, 10_000.0))
                .with_share(3.0)
                .with_reservation(res(10.0, 1_000.0)),
        )
        .with_child(
            PoolSpec::new("svc", res(30.0, 3_000.0)).with_reservation(res(10.0, 1_000.0)),
        );
    Tree::new(&spec).unwrap()
}

#[test]
fn builds_index_and_parent_links() {
    let tree = three_pool_tree();
    let batch = tree.get(&PoolId::new("batch")).unwrap();
    assert_eq!(batch.parent().unwrap().id(), &PoolId::new("root"));
    assert!(batch.is_leaf());
    assert!(!tree.root().is_leaf());
    assert_eq!(tree.leaves().len(), 2);
}

#[test]
fn duplicate_ids_rejected() {
    let spec = PoolSpec::new("root", res(1.0, 1.0))
        .with_child(PoolSpec::new("a", res(1.0, 1.0)))
        .with_child(PoolSpec::new("a", res(1.0, 1.0)));
    assert!(matches!(Tree::new(&spec), Err(Error::InvalidArgument(_))));
}

#[test]
fn unknown_pool_is_not_found() {
    let tree = three_pool_tree();
    assert!(matches!(
        tree.get(&PoolId::new("nope")),
        Err(Error::PoolNotFound(_))
    ));
}

#[test]
fn entitlement_splits_by_share_with_floors_and_caps() {
    let tree = three_pool_tree();
    let batch = tree.get(&PoolId::new("batch")).unwrap();
    let svc = tree.get(&PoolId::new("svc")).unwrap();

    // Floors: both reserve 10. Remainder 80 split 3:1 = 60/20, but svc
    // caps at its limit of 30, and the spare 10 flows back to batch.
    assert_eq!(svc.entitlement().cpu, 30.0);
    assert_eq!(batch.entitlement().cpu, 70.0);
    let total = batch.entitlement().cpu + svc.entitlement().cpu;
    assert!(total <= tree.root().entitlement().cpu + 1e-6);
}

#[test]
fn overcommitted_reservations_scale_down() {
    let spec = PoolSpec::new("root", res(10.0, 1_000.0))
        .with_child(PoolSpec::new("a", res(10.0, 1_000.0)).with_reservation(res(8.0, 100.0)))
        .with_child(PoolSpec::new("b", res(10.0, 1_000.0)).with_reservation(res(8.0, 100.0)));
    let tree = Tree::new(&spec).unwrap();
    let a = tree.get(&PoolId::new("a")).unwrap();
    let b = tree.get(&PoolId::new("b")).unwrap();
    assert!((a.entitlement().cpu - 5.0).abs() < 1e-6);
    assert!((b.entitlement().cpu - 5.0).abs() < 1e-6);
}

#[test]
fn zero_share_child_keeps_only_its_reservation() {
    let spec = PoolSpec::new("root", res(10.0, 1_000.0))
        .with_child(
            PoolSpec::new("a", res(10.0, 1_000.0))
                .with_reservation(res(2.0, 0.0))
                .with_share(0.0),
        )
        .with_child(PoolSpec::new("b", res(10.0, 1_000.0)));
    let tree = Tree::new(&spec).unwrap();
    assert_eq!(tree.get(&PoolId::new("a")).unwrap().entitlement().cpu, 2.0);
    assert_eq!(tree.get(&PoolId::new("b")).unwrap().entitlement().cpu, 8.0);
}

#[test]
fn nested_levels_respect_parent_entitlement() {
    let spec = PoolSpec::new("root", res(60.0, 6_000.0)).with_child(
        PoolSpec::new("org", res(60.0, 6_000.0))
            .with_child(PoolSpec::new("team-a", res(60.0, 6_000.0)).with_share(2.0))
            .with_child(PoolSpec::new("team-b", res(60.0, 6_000.0))),
    );
    let tree = Tree::new(&spec).unwrap();
    let a = tree.get(&PoolId::new("team-a")).unwrap();
    let b = tree.get(&PoolId::new("team-b")).unwrap();
    assert!((a.entitlement().cpu - 40.0).abs() < 1e-6);
    assert!((b.entitlement().cpu - 20.0).abs() < 1e-6);
}

#[test]
fn create_attaches_subtree_and_recomputes() {
    let tree = three_pool_tree();
    tree.create(
        &PoolId::new("root"),
        &PoolSpec::new("ml", res(50.0, 5_000.0)).with_share(4.0),
    )
    .unwrap();
    assert!(tree.contains(&PoolId::new("ml")));
    assert_eq!(tree.leaves().len(), 3);

    // Duplicate id anywhere in the tree is rejected.
    assert!(matches!(
        tree.create(&PoolId::new("root"), &PoolSpec::new("svc", res(1.0, 1.0))),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn create_under_busy_leaf_is_rejected() {
    let tree = three_pool_tree();
    let batch = tree.get(&PoolId::new("batch")).unwrap();
    batch
        .enqueue_gang(Gang::single(Task::new("j", 0, res(1.0, 1.0))))
        .unwrap();
    assert!(matches!(
        tree.create(&PoolId::new("batch"), &PoolSpec::new("sub", res(1.0, 1.0))),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn delete_requires_empty_leaf() {
    let tree = three_pool_tree();
    assert!(matches!(
        tree.delete(&PoolId::new("root")),
        Err(Error::InvalidArgument(_))
    ));

    let svc = tree.get(&PoolId::new("svc")).unwrap();
    svc.add_to_demand(res(1.0, 1.0));
    assert!(matches!(
        tree.delete(&PoolId::new("svc")),
        Err(Error::InvalidArgument(_))
    ));

    svc.subtract_from_demand(res(1.0, 1.0));
    tree.delete(&PoolId::new("svc")).unwrap();
    assert!(!tree.contains(&PoolId::new("svc")));
    assert_eq!(tree.root().children().len(), 1);
}

#[test]
fn queue_kind_all_lists_three_queues() {
    assert_eq!(QueueKind::ALL.len(), 3);
}
