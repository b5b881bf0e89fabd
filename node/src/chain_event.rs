//! Events emitted by the mining scheduler for in-process subscribers.

use msgchain_types::BlockHash;

/// Chain-level events that observers can subscribe to via the [`EventBus`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    /// A block was mined and appended to the ledger.
    BlockMined {
        index: u64,
        hash: BlockHash,
        message_count: usize,
        size: u64,
    },
}

type Listener = Box<dyn Fn(&ChainEvent) + Send + Sync>;

/// Synchronous fan-out event bus for chain events.
///
/// Listeners run inline on the mining task, so they must not block or await.
/// All subscriptions happen before the bus is shared.
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: &ChainEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn mined(index: u64) -> ChainEvent {
        ChainEvent::BlockMined {
            index,
            hash: BlockHash::new([index as u8; 32]),
            message_count: 1,
            size: 10,
        }
    }

    #[test]
    fn emit_calls_all_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();

        let c1 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));

        let c2 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        }));

        bus.emit(&mined(1));
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn emit_with_no_listeners_is_noop() {
        let bus = EventBus::default();
        assert_eq!(bus.listener_count(), 0);
        bus.emit(&mined(1));
    }

    #[test]
    fn listeners_see_events_in_emit_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = Arc::clone(&seen);
        bus.subscribe(Box::new(move |event| {
            let ChainEvent::BlockMined { index, .. } = event;
            sink.lock().unwrap().push(*index);
        }));

        bus.emit(&mined(1));
        bus.emit(&mined(2));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
