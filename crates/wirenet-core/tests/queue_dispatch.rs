//! Integration tests for the inbound queue and the dispatch thread.
//!
//! Producers stand in for reactor threads; the consumer is either a hand
//! rolled wait/pop loop or the real [`Dispatcher`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use wirenet_core::{Dispatcher, InboundQueue, Message, OwnedMessage, TsQueue};

const PRODUCERS: u32 = 4;
const PER_PRODUCER: u32 = 500;

#[test]
fn test_concurrent_producers_keep_per_producer_order() {
    // Arrange
    let queue: Arc<TsQueue<(u32, u32)>> = Arc::new(TsQueue::new());
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    queue.push_back((producer, seq));
                }
            })
        })
        .collect();

    // Act: single consumer
    let mut seen: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut total = 0;
    while total < PRODUCERS * PER_PRODUCER {
        queue.wait();
        while let Some((producer, seq)) = queue.pop_front() {
            seen.entry(producer).or_default().push(seq);
            total += 1;
        }
    }
    for handle in producers {
        handle.join().unwrap();
    }

    // Assert: nothing lost, nothing duplicated, per-producer order preserved
    assert_eq!(seen.len(), PRODUCERS as usize);
    for sequence in seen.values() {
        let expected: Vec<u32> = (0..PER_PRODUCER).collect();
        assert_eq!(sequence, &expected);
    }
    assert!(queue.is_empty());
}

#[test]
fn test_items_queued_before_exit_are_all_drained() {
    let queue: Arc<TsQueue<u32>> = Arc::new(TsQueue::new());
    for i in 0..100 {
        queue.push_back(i);
    }
    queue.try_exit();

    let mut drained = Vec::new();
    loop {
        queue.wait();
        match queue.pop_front() {
            Some(item) => drained.push(item),
            None if queue.is_exiting() => break,
            None => continue,
        }
    }

    assert_eq!(drained, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_dispatcher_handles_every_message_pushed_from_many_threads() {
    // Arrange
    let queue: InboundQueue<u32> = Arc::new(TsQueue::new());
    let handled = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&handled);
    let dispatcher = Dispatcher::start(Arc::clone(&queue), move |m: OwnedMessage<u32>| {
        sink.lock().unwrap().push(m.message.id());
    })
    .unwrap();

    // Act
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    queue.push_back(OwnedMessage {
                        sender: None,
                        message: Message::new(producer * PER_PRODUCER + seq),
                    });
                }
            })
        })
        .collect();
    for handle in producers {
        handle.join().unwrap();
    }
    dispatcher.shutdown().unwrap();

    // Assert
    let mut ids = handled.lock().unwrap().clone();
    assert_eq!(ids.len(), (PRODUCERS * PER_PRODUCER) as usize);
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), (PRODUCERS * PER_PRODUCER) as usize);
}
