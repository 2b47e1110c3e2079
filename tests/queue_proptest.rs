use proptest::prelude::*;
use rcu_lfq::{Domain, LfQueue, ReclaimConfig};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
enum Operation {
    Push(u16),
    Pop,
    IsEmpty,
    Flush,
    Synchronize,
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => any::<u16>().prop_map(Operation::Push),
        3 => Just(Operation::Pop),
        1 => Just(Operation::IsEmpty),
        1 => Just(Operation::Flush),
        1 => Just(Operation::Synchronize),
    ]
}

proptest! {
    #[test]
    fn test_queue_matches_vec_deque(
        ops in proptest::collection::vec(operation(), 1..200),
        bag_capacity in 1usize..16,
        reclaim_threshold in 1usize..64,
    ) {
        let domain = Domain::with_config(
            ReclaimConfig::new()
                .with_bag_capacity(bag_capacity)
                .with_reclaim_threshold(reclaim_threshold),
        );
        let queue = LfQueue::new(domain.clone());
        let handle = domain.register();
        let mut model = VecDeque::new();
        let mut popped = 0u64;

        for op in ops {
            match op {
                Operation::Push(v) => {
                    prop_assert!(queue.push(&handle, v).is_ok());
                    model.push_back(v);
                }
                Operation::Pop => {
                    let expected = model.pop_front();
                    if expected.is_some() {
                        popped += 1;
                    }
                    prop_assert_eq!(queue.pop(&handle), expected);
                }
                Operation::IsEmpty => {
                    prop_assert_eq!(queue.is_empty(&handle), model.is_empty());
                }
                Operation::Flush => {
                    handle.flush();
                    prop_assert_eq!(handle.buffered(), 0);
                }
                Operation::Synchronize => {
                    handle.synchronize();
                    prop_assert_eq!(domain.stats().pending, 0);
                }
            }

            let stats = domain.stats();
            prop_assert!(handle.buffered() < bag_capacity);
            prop_assert_eq!(stats.retired + handle.buffered() as u64, popped);
            prop_assert!(stats.reclaimed <= stats.retired);
        }

        handle.synchronize();
        let stats = domain.stats();
        prop_assert_eq!(stats.reclaimed, popped);
        prop_assert_eq!(stats.pending, 0);
    }
}
