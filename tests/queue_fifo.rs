use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rcu_lfq::{Domain, LfQueue};

#[test]
fn push_two_pop_two_then_empty() {
    let domain = Domain::new();
    let queue = LfQueue::new(domain.clone());
    let handle = domain.register();

    queue.push(&handle, 1).unwrap();
    queue.push(&handle, 2).unwrap();
    assert_eq!(queue.pop(&handle), Some(1));
    assert_eq!(queue.pop(&handle), Some(2));
    assert_eq!(queue.pop(&handle), None);
}

#[test]
fn single_thread_fifo_order() {
    let domain = Domain::new();
    let queue = LfQueue::new(domain.clone());
    let handle = domain.register();

    let values: Vec<String> = (0..500).map(|i| format!("v{i}")).collect();
    for v in &values {
        queue.push(&handle, v.clone()).unwrap();
    }
    for v in &values {
        assert_eq!(queue.pop(&handle).as_ref(), Some(v));
    }
    assert_eq!(queue.pop(&handle), None);
}

#[test]
fn fresh_queue_pops_empty_repeatedly() {
    let domain = Domain::new();
    let queue: LfQueue<Box<u64>> = LfQueue::new(domain.clone());
    let handle = domain.register();
    for _ in 0..1_000 {
        assert_eq!(queue.pop(&handle), None);
    }
    assert!(queue.is_empty(&handle));
}

#[test]
fn interleaved_push_pop_drains_back_to_empty() {
    let domain = Domain::new();
    let queue = LfQueue::new(domain.clone());
    let handle = domain.register();

    let mut next_expected = 0;
    for round in 0..100u32 {
        for i in 0..3 {
            queue.push(&handle, round * 3 + i).unwrap();
        }
        for _ in 0..2 {
            assert_eq!(queue.pop(&handle), Some(next_expected));
            next_expected += 1;
        }
    }
    while let Some(v) = queue.pop(&handle) {
        assert_eq!(v, next_expected);
        next_expected += 1;
    }
    assert_eq!(next_expected, 300);
    assert!(queue.is_empty(&handle));
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn dropping_the_queue_drops_each_remaining_value_once() {
    let drops = Arc::new(AtomicUsize::new(0));
    let domain = Domain::new();
    {
        let queue = LfQueue::new(domain.clone());
        let handle = domain.register();
        for _ in 0..5 {
            queue.push(&handle, DropCounter(drops.clone())).unwrap();
        }
        drop(queue.pop(&handle));
        drop(queue.pop(&handle));
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }
    assert_eq!(drops.load(Ordering::SeqCst), 5);
}

#[test]
fn queues_sharing_a_domain_stay_independent() {
    let domain = Domain::new();
    let evens = LfQueue::new(domain.clone());
    let odds = LfQueue::new(domain.clone());
    let handle = domain.register();

    for i in 0..10 {
        let queue = if i % 2 == 0 { &evens } else { &odds };
        queue.push(&handle, i).unwrap();
    }
    let evens_out: Vec<_> = std::iter::from_fn(|| evens.pop(&handle)).collect();
    let odds_out: Vec<_> = std::iter::from_fn(|| odds.pop(&handle)).collect();
    assert_eq!(evens_out, vec![0, 2, 4, 6, 8]);
    assert_eq!(odds_out, vec![1, 3, 5, 7, 9]);
}

#[test]
fn queue_can_outlive_its_registered_handles() {
    let domain = Domain::new();
    let queue = LfQueue::new(domain.clone());
    {
        let handle = domain.register();
        queue.push(&handle, 'a').unwrap();
        queue.push(&handle, 'b').unwrap();
    }
    let handle = domain.register();
    assert_eq!(queue.pop(&handle), Some('a'));
    assert_eq!(queue.pop(&handle), Some('b'));
}

#[test]
fn retired_nodes_survive_queue_drop_until_domain_reclaims() {
    let domain = Domain::new();
    let handle = domain.register();
    {
        let queue = LfQueue::new(domain.clone());
        for i in 0..10 {
            queue.push(&handle, i).unwrap();
        }
        for _ in 0..10 {
            queue.pop(&handle);
        }
    }
    assert_eq!(handle.buffered(), 10);
    assert_eq!(handle.synchronize(), 10);
}
