// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;

#[tokio::test]
async fn fifo_order() {
    let q = Queue::new("test", 10);
    q.enqueue(1).unwrap();
    q.enqueue(2).unwrap();
    q.enqueue(3).unwrap();

    assert_eq!(q.dequeue(Duration::from_millis(10)).await, Some(1));
    assert_eq!(q.dequeue(Duration::from_millis(10)).await, Some(2));
    assert_eq!(q.dequeue(Duration::from_millis(10)).await, Some(3));
}

#[tokio::test]
async fn dequeue_times_out_on_empty_queue() {
    let q: Queue<u32> = Queue::new("test", 10);
    assert_eq!(q.dequeue(Duration::from_millis(20)).await, None);
}

#[tokio::test]
async fn enqueue_rejects_at_capacity_and_returns_item() {
    let q = Queue::new("test", 2);
    q.enqueue("a").unwrap();
    q.enqueue("b").unwrap();
    let QueueFull(rejected) = q.enqueue("c").unwrap_err();
    assert_eq!(rejected, "c");
    assert_eq!(q.len(), 2);
}

#[tokio::test]
async fn enqueue_head_jumps_the_line_even_at_capacity() {
    let q = Queue::new("test", 2);
    q.enqueue(1).unwrap();
    q.enqueue(2).unwrap();
    q.enqueue_head(0);
    assert_eq!(q.len(), 3);
    assert_eq!(q.try_dequeue(), Some(0));
}

#[tokio::test]
async fn blocked_dequeue_wakes_on_enqueue() {
    let q = Arc::new(Queue::new("test", 10));
    let consumer = {
        let q = Arc::clone(&q);
        tokio::spawn(async move { q.dequeue(Duration::from_secs(5)).await })
    };
    // Give the consumer a chance to block first.
    tokio::time::sleep(Duration::from_millis(10)).await;
    q.enqueue(42).unwrap();
    assert_eq!(consumer.await.unwrap(), Some(42));
}

#[tokio::test]
async fn concurrent_consumers_each_get_distinct_items() {
    let q = Arc::new(Queue::new("test", 10));
    let a = {
        let q = Arc::clone(&q);
        tokio::spawn(async move { q.dequeue(Duration::from_secs(5)).await })
    };
    let b = {
        let q = Arc::clone(&q);
        tokio::spawn(async move { q.dequeue(Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    q.enqueue(1).unwrap();
    q.enqueue(2).unwrap();

    let mut got = vec![a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
    got.sort_unstable();
    assert_eq!(got, vec![1, 2]);
}

#[tokio::test]
async fn peek_is_read_only() {
    let q = Queue::new("test", 10);
    q.enqueue(1).unwrap();
    q.enqueue(2).unwrap();
    assert_eq!(q.peek(5), vec![1, 2]);
    assert_eq!(q.len(), 2);
}
