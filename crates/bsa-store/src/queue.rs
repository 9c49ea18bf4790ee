//! Pending proposal queue
//!
//! FIFO arrival order, duplicate-intent guard, destructive atomic drain.
//! Many tasks enqueue concurrently; only the reconciler drains.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use bsa_core::{BsaError, BsaResult, Proposal};

/// Queue of proposals awaiting the next reconciliation cycle
#[derive(Debug, Default)]
pub struct ProposalQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<Proposal>,
    intents: HashSet<String>,
}

impl ProposalQueue {
    pub fn new() -> Self {
        ProposalQueue::default()
    }

    /// Enqueue a proposal
    ///
    /// `intent_id` must be unique among currently pending proposals; the
    /// same id becomes valid again once the original is drained, so agents
    /// can retry safely after their earlier attempt is consumed.
    pub fn enqueue(&self, proposal: Proposal) -> BsaResult<()> {
        let mut inner = self.inner.lock();
        if inner.intents.contains(&proposal.intent_id) {
            return Err(BsaError::DuplicateIntent(proposal.intent_id));
        }
        tracing::debug!(
            intent_id = %proposal.intent_id,
            provisional = proposal.provisional,
            "proposal enqueued"
        );
        inner.intents.insert(proposal.intent_id.clone());
        inner.pending.push_back(proposal);
        Ok(())
    }

    /// Take every pending proposal, in arrival order
    ///
    /// Destructive: drained entries are gone from the queue. The caller owns
    /// them from here on.
    pub fn drain(&self) -> Vec<Proposal> {
        let mut inner = self.inner.lock();
        inner.intents.clear();
        inner.pending.drain(..).collect()
    }

    /// Whether an intent is still pending
    pub fn is_pending(&self, intent_id: &str) -> bool {
        self.inner.lock().intents.contains(intent_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_and_drain_fifo() {
        let queue = ProposalQueue::new();
        queue.enqueue(Proposal::new("a", "set x = 1")).unwrap();
        queue.enqueue(Proposal::new("b", "set y = 2")).unwrap();

        let batch = queue.drain();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].intent_id, "a");
        assert_eq!(batch[1].intent_id, "b");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_duplicate_intent_rejected_while_pending() {
        let queue = ProposalQueue::new();
        queue.enqueue(Proposal::new("a", "set x = 1")).unwrap();

        let err = queue.enqueue(Proposal::new("a", "set x = 2")).unwrap_err();
        assert_eq!(err, BsaError::DuplicateIntent("a".to_string()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_intent_reusable_after_drain() {
        let queue = ProposalQueue::new();
        queue.enqueue(Proposal::new("a", "set x = 1")).unwrap();
        queue.drain();

        assert!(!queue.is_pending("a"));
        assert!(queue.enqueue(Proposal::new("a", "set x = 2")).is_ok());
    }

    #[test]
    fn test_drain_empty_queue() {
        let queue = ProposalQueue::new();
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_concurrent_enqueue() {
        use std::sync::Arc;

        let queue = Arc::new(ProposalQueue::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        let id = format!("agent{}-{}", i, j);
                        queue.enqueue(Proposal::new(id, "set x = 1")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.len(), 400);
    }
}
