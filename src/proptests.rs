// src/proptests.rs

use std::collections::VecDeque;

use proptest::collection::vec;
use proptest::prelude::*;

use crate::fifo::KeyFifo;
use crate::keeper::Keeper;
use crate::types::{Limit, LindaId};
use crate::value::{Key, Value};

#[derive(Debug, Clone)]
enum Op {
    Push(Vec<i64>),
    Pop(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        vec(any::<i64>(), 1..4).prop_map(Op::Push),
        (1usize..4).prop_map(Op::Pop),
    ]
}

proptest! {
    /// FIFO order survives any interleaving of pushes and pops, and the
    /// head index snaps back to 1 whenever the fifo drains.
    #[test]
    fn fifo_preserves_order_and_index_hygiene(ops in vec(op_strategy(), 1..40)) {
        let mut fifo = KeyFifo::new();
        let mut model: VecDeque<i64> = VecDeque::new();

        for op in ops {
            match op {
                Op::Push(values) => {
                    model.extend(values.iter().copied());
                    fifo.push(values.into_iter().map(Value::Int));
                }
                Op::Pop(n) => {
                    let n = n.min(fifo.count());
                    let got = fifo.pop(n);
                    let expected: Vec<Value> = model.drain(..n).map(Value::Int).collect();
                    prop_assert_eq!(got, expected);
                }
            }
            prop_assert_eq!(fifo.count(), model.len());
            if fifo.count() == 0 {
                prop_assert_eq!(fifo.first(), 1);
            }
        }
    }

    /// No observable state ever exceeds the configured limit, and a refused
    /// batch leaves the count untouched (all-or-none).
    #[test]
    fn send_never_exceeds_limit(
        limit in 0usize..5,
        batches in vec(vec(any::<i64>(), 1..4), 1..20),
    ) {
        let keeper = Keeper::new(0, false);
        let mut state = keeper.lock();
        let id = LindaId(0x42);
        let key = Key::str("k");
        state.limit(id, &key, Limit::Bounded(limit));

        for batch in batches {
            let before = state.count_one(id, &key).unwrap_or(0);
            let n = batch.len();
            let admitted = state.send(id, &key, batch.into_iter().map(Value::Int).collect());
            let after = state.count_one(id, &key).unwrap_or(0);

            prop_assert!(after <= limit);
            if admitted {
                prop_assert_eq!(after, before + n);
            } else {
                prop_assert_eq!(after, before);
            }
        }
    }

    /// Every sent value is received exactly once, in send order.
    #[test]
    fn delivery_is_exactly_once(values in vec(any::<i64>(), 1..30)) {
        let keeper = Keeper::new(0, false);
        let mut state = keeper.lock();
        let id = LindaId(0x43);
        let key = Key::str("k");

        for v in &values {
            prop_assert!(state.send(id, &key, vec![Value::Int(*v)]));
        }

        let mut received = Vec::new();
        while let Some((k, v)) = state.receive(id, std::slice::from_ref(&key)) {
            prop_assert_eq!(&k, &key);
            let Value::Int(i) = v else { panic!("expected an int") };
            received.push(i);
        }
        prop_assert_eq!(received, values);
    }
}
