//! Bounded listener registry
//!
//! Components hand out typed channels instead of callbacks. Each listener
//! gets its own unbounded queue; the number of listeners is capped.

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default cap on concurrent listeners per registry
pub const DEFAULT_MAX_LISTENERS: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Listener limit exceeded: {limit}")]
pub struct ListenerLimitExceeded {
    pub limit: usize,
}

/// Fan-out of values to a capped set of channel listeners
#[derive(Debug)]
pub struct ListenerSet<T> {
    listeners: Mutex<Vec<mpsc::UnboundedSender<T>>>,
    max_listeners: usize,
}

impl<T: Clone> ListenerSet<T> {
    pub fn new(max_listeners: usize) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            max_listeners,
        }
    }

    /// Register a new listener.
    ///
    /// Listeners whose receiver was dropped are pruned first and do not
    /// count against the cap.
    pub fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<T>, ListenerLimitExceeded> {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| !tx.is_closed());

        if listeners.len() >= self.max_listeners {
            return Err(ListenerLimitExceeded {
                limit: self.max_listeners,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        listeners.push(tx);
        Ok(rx)
    }

    /// Deliver a value to every live listener, returning how many received it
    pub fn emit(&self, value: T) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| tx.send(value.clone()).is_ok());
        listeners.len()
    }

    pub fn len(&self) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| !tx.is_closed());
        listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LISTENERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_all_listeners() {
        let set = ListenerSet::<u32>::new(4);
        let mut a = set.subscribe().unwrap();
        let mut b = set.subscribe().unwrap();

        assert_eq!(set.emit(7), 2);
        assert_eq!(a.try_recv().unwrap(), 7);
        assert_eq!(b.try_recv().unwrap(), 7);
    }

    #[test]
    fn test_listener_cap_enforced() {
        let set = ListenerSet::<u32>::new(2);
        let _a = set.subscribe().unwrap();
        let _b = set.subscribe().unwrap();

        let err = set.subscribe().unwrap_err();
        assert_eq!(err.limit, 2);
    }

    #[test]
    fn test_dropped_listener_frees_slot() {
        let set = ListenerSet::<u32>::new(1);
        let a = set.subscribe().unwrap();
        drop(a);

        assert!(set.is_empty());
        assert!(set.subscribe().is_ok());
    }

    #[test]
    fn test_emit_prunes_closed_listeners() {
        let set = ListenerSet::<u32>::new(4);
        let _a = set.subscribe().unwrap();
        let b = set.subscribe().unwrap();
        drop(b);

        assert_eq!(set.emit(1), 1);
        assert_eq!(set.len(), 1);
    }
}
