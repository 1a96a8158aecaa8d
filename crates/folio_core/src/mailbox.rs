//! Per-paper peer mailboxes for message fan-out.
//!
//! Each joined peer owns one bounded queue. A message from peer `p` is
//! prepended to every *other* peer's queue and delivered, most recent first,
//! with that peer's next session response. The newest-first ordering is an
//! observable protocol contract, not an implementation detail.

use std::collections::{HashMap, VecDeque};

use crate::protocol::{Message, PeerId};

/// Mailboxes of every peer currently joined to a paper.
#[derive(Debug)]
pub struct Mailboxes {
    queues: HashMap<PeerId, VecDeque<Message>>,
    capacity: usize,
}

impl Mailboxes {
    /// Create mailboxes bounded to `capacity` pending messages per peer.
    pub fn new(capacity: usize) -> Self {
        Mailboxes {
            queues: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Ensure a mailbox exists for `peer`. Idempotent.
    pub fn ensure(&mut self, peer: &str) {
        if !self.queues.contains_key(peer) {
            self.queues.insert(peer.to_string(), VecDeque::new());
        }
    }

    /// Remove `peer`'s mailbox, dropping any pending messages. Idempotent.
    pub fn remove(&mut self, peer: &str) {
        self.queues.remove(peer);
    }

    /// Whether `peer` is currently known.
    pub fn contains(&self, peer: &str) -> bool {
        self.queues.contains_key(peer)
    }

    /// Peers currently joined.
    pub fn peer_count(&self) -> usize {
        self.queues.len()
    }

    /// Prepend `message` to every mailbox except the sender's.
    ///
    /// Queues at capacity drop their oldest entry to make room.
    pub fn broadcast(&mut self, sender: &str, message: &Message) {
        for (peer, queue) in self.queues.iter_mut() {
            if peer == sender {
                continue;
            }
            queue.push_front(message.clone());
            while queue.len() > self.capacity {
                let dropped = queue.pop_back();
                if dropped.is_some() {
                    log::warn!("mailbox for {} full, dropping oldest message", peer);
                }
            }
        }
    }

    /// Empty `peer`'s mailbox and return its contents in stored order
    /// (most recent first). Unknown peers yield nothing.
    pub fn drain(&mut self, peer: &str) -> Vec<Message> {
        match self.queues.get_mut(peer) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }
}
