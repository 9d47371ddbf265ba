#![cfg(not(feature = "loom"))]
#![allow(missing_docs)]

use opgraph::queue::WorkQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn construct_empty() {
    let wq = WorkQueue::new();
    assert!(wq.is_empty());
    assert!(wq.try_dequeue().is_none());
}

#[test]
fn add_items() {
    let wq = WorkQueue::new();
    for _ in 0..6 {
        wq.enqueue(|| {});
    }
    for _ in 0..3 {
        wq.enqueue_out_of_band(|| {});
    }
    assert_eq!(wq.len(), 9);
}

#[test]
fn add_remove_items() {
    let wq = WorkQueue::new();
    assert!(wq.try_dequeue().is_none());

    wq.enqueue(|| {});
    assert!(wq.try_dequeue().is_some());
    assert!(wq.try_dequeue().is_none());

    wq.enqueue_out_of_band(|| {});
    assert!(wq.try_dequeue().is_some());
    assert!(wq.try_dequeue().is_none());

    wq.enqueue(|| {});
    wq.enqueue(|| {});
    assert!(wq.try_dequeue().is_some());
    assert!(wq.try_dequeue().is_some());
    assert!(wq.try_dequeue().is_none());

    wq.enqueue_out_of_band(|| {});
    wq.enqueue_out_of_band(|| {});
    assert!(wq.try_dequeue().is_some());
    assert!(wq.try_dequeue().is_some());
    assert!(wq.try_dequeue().is_none());

    wq.enqueue_out_of_band(|| {});
    wq.enqueue(|| {});
    assert!(wq.try_dequeue().is_some());
    assert!(wq.try_dequeue().is_some());
    assert!(wq.try_dequeue().is_none());
}

#[test]
fn out_of_band_items_drain_first() {
    let executed: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let record = |name: &'static str| {
        let executed = executed.clone();
        move || executed.lock().unwrap().push(name)
    };

    let wq = WorkQueue::new();
    wq.enqueue(record("A"));
    wq.enqueue(record("B"));
    wq.enqueue_out_of_band(record("C"));
    wq.enqueue_out_of_band(record("D"));

    for _ in 0..4 {
        wq.dequeue()();
    }
    assert!(wq.try_dequeue().is_none());
    assert_eq!(*executed.lock().unwrap(), ["C", "D", "A", "B"]);
}

#[test]
fn fifo_within_each_lane() {
    let executed: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
    let record = |which: i32| {
        let executed = executed.clone();
        move || executed.lock().unwrap().push(which)
    };

    let wq = WorkQueue::new();
    wq.enqueue(record(0));
    wq.enqueue(record(1));
    wq.dequeue()();
    wq.dequeue()();
    assert_eq!(*executed.lock().unwrap(), [0, 1]);
    assert!(wq.try_dequeue().is_none());

    wq.enqueue(record(2));
    wq.enqueue(record(3));
    wq.enqueue_out_of_band(record(4));
    wq.enqueue_out_of_band(record(5));
    for _ in 0..4 {
        wq.dequeue()();
    }
    assert_eq!(*executed.lock().unwrap(), [0, 1, 4, 5, 2, 3]);
    assert!(wq.try_dequeue().is_none());
}

#[test]
fn dequeue_blocks_until_an_item_arrives() {
    let before = Arc::new(AtomicBool::new(false));
    let after = Arc::new(AtomicBool::new(false));
    let ran = Arc::new(AtomicBool::new(false));
    let wq = Arc::new(WorkQueue::new());

    let reader = {
        let before = before.clone();
        let after = after.clone();
        let wq = wq.clone();
        thread::spawn(move || {
            before.store(true, Ordering::SeqCst);
            let item = wq.dequeue();
            after.store(true, Ordering::SeqCst);
            item();
        })
    };

    thread::sleep(Duration::from_millis(20));
    assert!(before.load(Ordering::SeqCst));
    assert!(!after.load(Ordering::SeqCst));
    assert!(!ran.load(Ordering::SeqCst));

    {
        let ran = ran.clone();
        wq.enqueue(move || ran.store(true, Ordering::SeqCst));
    }
    reader.join().unwrap();
    assert!(after.load(Ordering::SeqCst));
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn many_producers_one_consumer() {
    let wq = Arc::new(WorkQueue::new());
    let counter = Arc::new(Mutex::new(0u32));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let wq = wq.clone();
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    let counter = counter.clone();
                    wq.enqueue(move || *counter.lock().unwrap() += 1);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    for _ in 0..100 {
        wq.dequeue()();
    }
    assert!(wq.try_dequeue().is_none());
    assert_eq!(*counter.lock().unwrap(), 100);
}
