//! Cross-thread blocking and wakeup: each test checks one assumption about
//! how senders and receivers park on a key and who wakes them.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use linda::{
    KeeperPool, Key, Limit, PoolConfig, RecvOutcome, SendOutcome, Value, Worker,
};

fn pool() -> Arc<KeeperPool> {
    KeeperPool::new(PoolConfig::default())
}

/// Generous bound so a missed wakeup fails the test instead of hanging it.
const LONG: Duration = Duration::from_secs(5);

/// Assumption: a receiver blocked on an empty key returns as soon as a
/// sender queues a value, and observes exactly that value.
#[test]
fn blocked_receiver_wakes_on_send() {
    let pool = pool();
    let linda = pool.new_linda(Some("wake-recv"), None).unwrap();
    let k = Key::str("k");

    let consumer = {
        let linda = linda.clone();
        let k = k.clone();
        thread::spawn(move || {
            let mut worker = Worker::new();
            linda.receive(&mut worker, Some(LONG), &[k]).unwrap()
        })
    };

    // give the consumer time to park
    thread::sleep(Duration::from_millis(50));
    let worker = Worker::new();
    linda.send(&worker, None, k.clone(), &[Value::Int(7)]).unwrap();

    let got = consumer.join().unwrap();
    assert_eq!(got, RecvOutcome::Received { key: k, values: vec![Value::Int(7)] });
}

/// Assumption: a sender blocked on a full key returns `Queued` once a
/// receiver makes room, and the late value is delivered after the early one.
#[test]
fn blocked_sender_wakes_on_receive() {
    let pool = pool();
    let linda = pool.new_linda(Some("wake-send"), None).unwrap();
    let q = Key::str("q");
    let mut worker = Worker::new();

    linda.limit(q.clone(), Limit::Bounded(1)).unwrap();
    linda.send(&worker, None, q.clone(), &[Value::str("a")]).unwrap();

    let producer = {
        let linda = linda.clone();
        let q = q.clone();
        thread::spawn(move || {
            let worker = Worker::new();
            linda.send(&worker, Some(LONG), q, &[Value::str("b")]).unwrap()
        })
    };

    thread::sleep(Duration::from_millis(50));
    let got = linda.receive(&mut worker, Some(LONG), &[q.clone()]).unwrap();
    assert_eq!(
        got,
        RecvOutcome::Received { key: q.clone(), values: vec![Value::str("a")] }
    );

    assert_eq!(producer.join().unwrap(), SendOutcome::Queued);
    let got = linda.receive(&mut worker, Some(LONG), &[q]).unwrap();
    let RecvOutcome::Received { values, .. } = got else {
        panic!("expected the late value, got {got:?}");
    };
    assert_eq!(values, vec![Value::str("b")]);
}

/// Assumption: raising the limit on a full key wakes a parked sender.
#[test]
fn raising_limit_unblocks_sender() {
    let pool = pool();
    let linda = pool.new_linda(None, None).unwrap();
    let k = Key::str("k");
    let worker = Worker::new();

    linda.limit(k.clone(), Limit::Bounded(1)).unwrap();
    linda.send(&worker, None, k.clone(), &[Value::Int(1)]).unwrap();

    let producer = {
        let linda = linda.clone();
        let k = k.clone();
        thread::spawn(move || {
            let worker = Worker::new();
            linda.send(&worker, Some(LONG), k, &[Value::Int(2)]).unwrap()
        })
    };

    thread::sleep(Duration::from_millis(50));
    linda.limit(k.clone(), Limit::Bounded(4)).unwrap();

    assert_eq!(producer.join().unwrap(), SendOutcome::Queued);
}

/// Assumption: `set` emptying a full key wakes a parked sender.
#[test]
fn set_unblocks_sender() {
    let pool = pool();
    let linda = pool.new_linda(None, None).unwrap();
    let k = Key::str("k");
    let worker = Worker::new();

    linda.limit(k.clone(), Limit::Bounded(1)).unwrap();
    linda.send(&worker, None, k.clone(), &[Value::Int(1)]).unwrap();

    let producer = {
        let linda = linda.clone();
        let k = k.clone();
        thread::spawn(move || {
            let worker = Worker::new();
            linda.send(&worker, Some(LONG), k, &[Value::Int(2)]).unwrap()
        })
    };

    thread::sleep(Duration::from_millis(50));
    linda.set(k.clone(), &[]).unwrap();

    assert_eq!(producer.join().unwrap(), SendOutcome::Queued);
}

/// Assumption: a zero limit admits nothing until it is raised.
#[test]
fn zero_limit_blocks_all_senders() {
    let pool = pool();
    let linda = pool.new_linda(None, None).unwrap();
    let k = Key::str("k");
    let worker = Worker::new();

    linda.limit(k.clone(), Limit::Bounded(0)).unwrap();
    assert_eq!(
        linda
            .send(&worker, Some(Duration::ZERO), k.clone(), &[Value::Int(1)])
            .unwrap(),
        SendOutcome::TimedOut
    );

    let producer = {
        let linda = linda.clone();
        let k = k.clone();
        thread::spawn(move || {
            let worker = Worker::new();
            linda.send(&worker, Some(LONG), k, &[Value::Int(1)]).unwrap()
        })
    };

    thread::sleep(Duration::from_millis(50));
    linda.limit(k.clone(), Limit::Bounded(1)).unwrap();

    assert_eq!(producer.join().unwrap(), SendOutcome::Queued);
}

/// Assumption: per-key FIFO order holds across threads — a consumer sees a
/// producer's values in send order, each exactly once.
#[test]
fn cross_thread_fifo_order() {
    const N: i64 = 200;
    let pool = pool();
    let linda = pool.new_linda(Some("stream"), None).unwrap();
    let k = Key::str("stream");

    let producer = {
        let linda = linda.clone();
        let k = k.clone();
        thread::spawn(move || {
            let worker = Worker::new();
            for i in 0..N {
                let out = linda.send(&worker, Some(LONG), k.clone(), &[Value::Int(i)]).unwrap();
                assert_eq!(out, SendOutcome::Queued);
            }
        })
    };

    let mut worker = Worker::new();
    for expected in 0..N {
        let got = linda.receive(&mut worker, Some(LONG), &[k.clone()]).unwrap();
        let RecvOutcome::Received { values, .. } = got else {
            panic!("stream dried up at {expected}: {got:?}");
        };
        assert_eq!(values, vec![Value::Int(expected)]);
    }
    producer.join().unwrap();
}

/// Assumption: a bounded key never holds more than its limit even while a
/// producer hammers it from another thread.
#[test]
fn limit_holds_under_concurrency() {
    const N: i64 = 100;
    const CAP: usize = 3;
    let pool = pool();
    let linda = pool.new_linda(None, None).unwrap();
    let k = Key::str("bounded");
    linda.limit(k.clone(), Limit::Bounded(CAP)).unwrap();

    let producer = {
        let linda = linda.clone();
        let k = k.clone();
        thread::spawn(move || {
            let worker = Worker::new();
            for i in 0..N {
                linda.send(&worker, Some(LONG), k.clone(), &[Value::Int(i)]).unwrap();
            }
        })
    };

    let mut worker = Worker::new();
    let mut seen = 0;
    while seen < N {
        if let linda::Counts::One(Some(count)) = linda.count(&[k.clone()]).unwrap() {
            assert!(count <= CAP, "count {count} exceeded the limit");
        }
        match linda.receive(&mut worker, Some(LONG), &[k.clone()]).unwrap() {
            RecvOutcome::Received { values, .. } => {
                assert_eq!(values, vec![Value::Int(seen)]);
                seen += 1;
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    producer.join().unwrap();
}
