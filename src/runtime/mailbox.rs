//! Latest-wins single-slot mailbox

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Holds at most one item. Publishing replaces whatever was there, so a
/// slow consumer only ever sees the newest value.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    dropped: AtomicU64,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            dropped: AtomicU64::new(0),
        }
    }

    /// Store `item`, discarding an unconsumed predecessor
    pub fn publish(&self, item: T) {
        if self.slot.lock().replace(item).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove and return the newest item
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    /// Discard any pending item; returns whether one was there
    pub fn clear(&self) -> bool {
        self.take().is_some()
    }

    /// Items replaced before anyone consumed them
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_latest_wins() {
        let mailbox = Mailbox::new();
        mailbox.publish(1);
        mailbox.publish(2);
        mailbox.publish(3);

        assert_eq!(mailbox.take(), Some(3));
        assert_eq!(mailbox.take(), None);
        assert_eq!(mailbox.dropped(), 2);
    }

    #[test]
    fn test_clear() {
        let mailbox = Mailbox::new();
        assert!(!mailbox.clear());
        mailbox.publish("frame");
        assert!(mailbox.clear());
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn test_concurrent_publish_keeps_one() {
        let mailbox = Arc::new(Mailbox::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let mailbox = Arc::clone(&mailbox);
                thread::spawn(move || {
                    for i in 0..250 {
                        mailbox.publish(p * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in producers {
            handle.join().unwrap();
        }

        assert!(mailbox.take().is_some());
        assert!(mailbox.take().is_none());
        assert_eq!(mailbox.dropped(), 999);
    }
}
