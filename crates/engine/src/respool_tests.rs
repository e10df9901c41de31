// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use muster_core::Resources;
use yare::parameterized;

fn leaf_pool(cpu: f64, mem: f64) -> Arc<ResPool> {
    let spec = PoolSpec::new("p1", Resources::cpu_mem(cpu, mem))
        .with_reservation(Resources::cpu_mem(cpu / 2.0, mem / 2.0));
    ResPool::from_spec(&spec, None)
}

fn gang(job: &str, instance: u32, cpu: f64, mem: f64) -> Gang {
    Gang::single(Task::new(job, instance, Resources::cpu_mem(cpu, mem)))
}

fn live_all(_: &Task) -> bool {
    true
}

#[parameterized(
    pending = { true, false, QueueKind::Pending },
    non_preemptible = { false, false, QueueKind::NonPreemptible },
    controller = { true, true, QueueKind::Controller },
)]
fn enqueue_routes_by_class(preemptible: bool, controller: bool, kind: QueueKind) {
    let pool = leaf_pool(10.0, 1000.0);
    let g = Gang::single(
        Task::new("j", 0, Resources::cpu_mem(1.0, 1.0))
            .with_preemptible(preemptible)
            .with_controller(controller),
    );
    pool.enqueue_gang(g).unwrap();
    assert_eq!(pool.queue_len(kind), 1);
}

#[test]
fn enqueue_adds_demand_atomically() {
    let pool = leaf_pool(10.0, 1000.0);
    pool.enqueue_gang(gang("j", 0, 2.0, 200.0)).unwrap();
    pool.enqueue_gang(gang("j", 1, 1.0, 100.0)).unwrap();

    assert_eq!(pool.demand(), Resources::cpu_mem(3.0, 300.0));
    assert_eq!(pool.queue_len(QueueKind::Pending), 2);
    assert!(pool.allocation().total.is_zero());
}

#[test]
fn dequeue_moves_demand_to_allocation() {
    let pool = leaf_pool(10.0, 1000.0);
    pool.enqueue_gang(gang("j", 0, 2.0, 200.0)).unwrap();

    let admitted = pool.dequeue_gangs(10, &live_all);
    assert_eq!(admitted.len(), 1);
    assert!(pool.demand().is_zero());
    assert_eq!(pool.allocation().total, Resources::cpu_mem(2.0, 200.0));
    assert_eq!(pool.queue_len(QueueKind::Pending), 0);
}

#[test]
fn dequeue_respects_entitlement_headroom() {
    let pool = leaf_pool(4.0, 400.0);
    pool.enqueue_gang(gang("j", 0, 3.0, 300.0)).unwrap();
    pool.enqueue_gang(gang("j", 1, 3.0, 300.0)).unwrap();

    let admitted = pool.dequeue_gangs(10, &live_all);
    assert_eq!(admitted.len(), 1, "second gang exceeds entitlement");
    assert_eq!(pool.demand(), Resources::cpu_mem(3.0, 300.0));
    assert_eq!(pool.queue_len(QueueKind::Pending), 1);
}

#[test]
fn dequeue_respects_limit() {
    let pool = leaf_pool(100.0, 10_000.0);
    for i in 0..5 {
        pool.enqueue_gang(gang("j", i, 1.0, 10.0)).unwrap();
    }
    assert_eq!(pool.dequeue_gangs(2, &live_all).len(), 2);
    assert_eq!(pool.queue_len(QueueKind::Pending), 3);
}

#[test]
fn priority_fifo_orders_bands_then_arrival() {
    let pool = leaf_pool(100.0, 10_000.0);
    let low = Gang::single(
        Task::new("j", 0, Resources::cpu_mem(1.0, 1.0)).with_priority(1),
    );
    let high = Gang::single(
        Task::new("j", 1, Resources::cpu_mem(1.0, 1.0)).with_priority(5),
    );
    let low2 = Gang::single(
        Task::new("j", 2, Resources::cpu_mem(1.0, 1.0)).with_priority(1),
    );
    pool.enqueue_gang(low).unwrap();
    pool.enqueue_gang(high).unwrap();
    pool.enqueue_gang(low2).unwrap();

    let admitted = pool.dequeue_gangs(10, &live_all);
    let order: Vec<u32> = admitted.iter().map(|g| g.tasks()[0].instance).collect();
    assert_eq!(order, vec![1, 0, 2]);
}

#[test]
fn non_preemptible_admits_against_reservation() {
    // reservation is half the limit: cpu 2 of 4
    let pool = leaf_pool(4.0, 400.0);
    let np = |i: u32, cpu: f64| {
        Gang::single(
            Task::new("j", i, Resources::cpu_mem(cpu, 10.0)).with_preemptible(false),
        )
    };
    pool.enqueue_gang(np(0, 1.5)).unwrap();
    pool.enqueue_gang(np(1, 1.5)).unwrap();

    let admitted = pool.dequeue_gangs(10, &live_all);
    assert_eq!(admitted.len(), 1, "second gang exceeds the reservation");
    assert_eq!(
        pool.allocation().non_preemptible,
        Resources::cpu_mem(1.5, 10.0)
    );
}

#[test]
fn controller_admits_against_controller_share() {
    // entitlement cpu 10, controller share 0.3 -> cap cpu 3
    let pool = leaf_pool(10.0, 1000.0);
    let ctl = |i: u32, cpu: f64| {
        Gang::single(
            Task::new("j", i, Resources::cpu_mem(cpu, 10.0)).with_controller(true),
        )
    };
    pool.enqueue_gang(ctl(0, 2.0)).unwrap();
    pool.enqueue_gang(ctl(1, 2.0)).unwrap();

    let admitted = pool.dequeue_gangs(10, &live_all);
    assert_eq!(admitted.len(), 1, "second controller gang exceeds the cap");
    assert_eq!(pool.allocation().controller, Resources::cpu_mem(2.0, 10.0));
}

#[test]
fn admission_order_is_np_controller_pending() {
    let pool = leaf_pool(100.0, 10_000.0);
    pool.enqueue_gang(gang("j", 0, 1.0, 1.0)).unwrap();
    pool.enqueue_gang(Gang::single(
        Task::new("j", 1, Resources::cpu_mem(1.0, 1.0)).with_controller(true),
    ))
    .unwrap();
    pool.enqueue_gang(Gang::single(
        Task::new("j", 2, Resources::cpu_mem(1.0, 1.0)).with_preemptible(false),
    ))
    .unwrap();

    let admitted = pool.dequeue_gangs(10, &live_all);
    let order: Vec<u32> = admitted.iter().map(|g| g.tasks()[0].instance).collect();
    assert_eq!(order, vec![2, 1, 0]);
}

#[test]
fn revocable_gangs_admit_against_slack() {
    let pool = leaf_pool(10.0, 1000.0);
    // Pin slack below the limit: 4 cpu of non-revocable allocation.
    pool.add_to_allocation(Resources::cpu_mem(4.0, 0.0), QueueKind::Pending, false);
    pool.set_entitlement(Resources::cpu_mem(5.0, 500.0));
    assert_eq!(pool.slack(), Resources::cpu_mem(1.0, 500.0));

    let revocable = |i: u32, cpu: f64| {
        Gang::single(
            Task::new("j", i, Resources::cpu_mem(cpu, 10.0)).with_revocable(true),
        )
    };
    pool.enqueue_gang(revocable(0, 0.5)).unwrap();
    pool.enqueue_gang(revocable(1, 2.0)).unwrap();

    let admitted = pool.dequeue_gangs(10, &live_all);
    assert_eq!(admitted.len(), 1, "second revocable gang exceeds slack");
    assert_eq!(pool.allocation().revocable, Resources::cpu_mem(0.5, 10.0));
}

#[test]
fn dead_tasks_are_shed_before_admission() {
    let pool = leaf_pool(10.0, 1000.0);
    let g = Gang::new(vec![
        Task::new("j", 0, Resources::cpu_mem(2.0, 20.0)),
        Task::new("j", 1, Resources::cpu_mem(2.0, 20.0)),
    ])
    .unwrap();
    pool.enqueue_gang(g).unwrap();
    // Task j-0 left the tracker; its demand share was released there.
    pool.subtract_from_demand(Resources::cpu_mem(2.0, 20.0));

    let admitted = pool.dequeue_gangs(10, &|t| t.instance == 1);
    assert_eq!(admitted.len(), 1);
    assert_eq!(admitted[0].len(), 1);
    assert!(pool.demand().is_zero());
    assert_eq!(pool.allocation().total, Resources::cpu_mem(2.0, 20.0));
}

#[test]
fn fully_dead_gang_is_dropped() {
    let pool = leaf_pool(10.0, 1000.0);
    pool.enqueue_gang(gang("j", 0, 2.0, 20.0)).unwrap();
    pool.subtract_from_demand(Resources::cpu_mem(2.0, 20.0));

    let admitted = pool.dequeue_gangs(10, &|_| false);
    assert!(admitted.is_empty());
    assert_eq!(pool.queue_len(QueueKind::Pending), 0);
    assert!(pool.allocation().total.is_zero());
}

#[test]
fn return_gang_rolls_back_to_head_and_demand() {
    let pool = leaf_pool(10.0, 1000.0);
    pool.enqueue_gang(gang("j", 0, 2.0, 200.0)).unwrap();
    pool.enqueue_gang(gang("j", 1, 1.0, 100.0)).unwrap();

    let mut admitted = pool.dequeue_gangs(1, &live_all);
    let g = admitted.remove(0);
    pool.return_gang(g);

    assert_eq!(pool.demand(), Resources::cpu_mem(3.0, 300.0));
    assert!(pool.allocation().total.is_zero());
    // Returned gang is back at the head.
    let peeked = pool.peek_gangs(QueueKind::Pending, 1).unwrap();
    assert_eq!(peeked[0].tasks()[0].instance, 0);
}

#[test]
fn peek_is_read_only_and_leaf_only() {
    let pool = leaf_pool(10.0, 1000.0);
    pool.enqueue_gang(gang("j", 0, 1.0, 10.0)).unwrap();
    assert_eq!(pool.peek_gangs(QueueKind::Pending, 10).unwrap().len(), 1);
    assert_eq!(pool.queue_len(QueueKind::Pending), 1);

    let parent = ResPool::from_spec(&PoolSpec::new("root", Resources::cpu_mem(1.0, 1.0)), None);
    parent.add_child(pool);
    assert!(matches!(
        parent.peek_gangs(QueueKind::Pending, 1),
        Err(Error::NotLeaf(_))
    ));
    assert!(matches!(
        parent.enqueue_gang(gang("j", 9, 1.0, 1.0)),
        Err(Error::NotLeaf(_))
    ));
}

#[test]
fn demand_never_goes_negative() {
    let pool = leaf_pool(10.0, 1000.0);
    pool.add_to_demand(Resources::cpu_mem(1.0, 10.0));
    pool.subtract_from_demand(Resources::cpu_mem(5.0, 50.0));
    assert!(pool.demand().is_zero());
}

#[test]
fn set_entitlement_recomputes_slack() {
    let pool = leaf_pool(10.0, 1000.0);
    pool.add_to_allocation(Resources::cpu_mem(2.0, 100.0), QueueKind::Pending, false);
    pool.add_to_allocation(Resources::cpu_mem(1.0, 50.0), QueueKind::Pending, true);
    pool.set_entitlement(Resources::cpu_mem(8.0, 800.0));
    // slack = entitlement - (total - revocable)
    assert_eq!(pool.slack(), Resources::cpu_mem(6.0, 700.0));
}
