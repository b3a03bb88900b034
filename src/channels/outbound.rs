//! Send-when-open FIFO for streaming channels

use std::collections::VecDeque;

/// Items waiting for a channel to open
///
/// Items leave in the order they entered. The backlog is drained exactly
/// once, when the channel opens; afterwards every pushed item is handed
/// straight back for sending. A closed queue swallows everything.
#[derive(Debug)]
pub struct OutboundQueue<M> {
    pending: VecDeque<M>,
    open: bool,
    closed: bool,
}

impl<M> Default for OutboundQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> OutboundQueue<M> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            open: false,
            closed: false,
        }
    }

    /// Queue an item, returning whatever may be sent right now
    #[must_use]
    pub fn push(&mut self, item: M) -> Vec<M> {
        if self.closed {
            return Vec::new();
        }
        if self.open {
            return vec![item];
        }
        self.pending.push_back(item);
        Vec::new()
    }

    /// Mark the channel open and take the backlog
    ///
    /// Only the first call returns items.
    #[must_use]
    pub fn mark_open(&mut self) -> Vec<M> {
        if self.open || self.closed {
            return Vec::new();
        }
        self.open = true;
        self.pending.drain(..).collect()
    }

    /// Stop accepting items; returns how many unsent items were dropped
    pub fn close(&mut self) -> usize {
        self.closed = true;
        self.open = false;
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Items still waiting for the channel to open
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queues_until_open() {
        let mut queue = OutboundQueue::new();
        assert!(queue.push("a").is_empty());
        assert!(queue.push("b").is_empty());
        assert_eq!(queue.pending_len(), 2);

        assert_eq!(queue.mark_open(), vec!["a", "b"]);
        assert!(queue.is_open());
        assert_eq!(queue.push("c"), vec!["c"]);
    }

    #[test]
    fn test_drains_exactly_once() {
        let mut queue = OutboundQueue::new();
        let _ = queue.push(1);

        assert_eq!(queue.mark_open(), vec![1]);
        assert!(queue.mark_open().is_empty());
    }

    #[test]
    fn test_order_preserved_for_any_open_point() {
        let items: Vec<u32> = (0..8).collect();

        for open_at in 0..=items.len() {
            let mut queue = OutboundQueue::new();
            let mut wire = Vec::new();

            for (i, &item) in items.iter().enumerate() {
                if i == open_at {
                    wire.extend(queue.mark_open());
                }
                wire.extend(queue.push(item));
            }
            wire.extend(queue.mark_open());

            assert_eq!(wire, items, "open at {open_at}");
        }
    }

    #[test]
    fn test_close_drops_silently() {
        let mut queue = OutboundQueue::new();
        let _ = queue.push("a");
        let _ = queue.push("b");

        assert_eq!(queue.close(), 2);
        assert!(queue.push("c").is_empty());
        assert!(queue.mark_open().is_empty());
        assert!(queue.is_closed());
    }
}
