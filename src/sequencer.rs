//! Receive-time FIFO sequencer.
//!
//! The order server services its client connections in readiness order
//! within each poll round, which is fd order, not arrival order. To keep
//! matching fair, every request decoded in a round is buffered here with
//! the kernel receive timestamp of the segment that carried it; at end of
//! round the batch is emitted to the matching engine sorted by ascending
//! receive time, ties broken by insertion order.

use crate::protocol::ClientRequest;
use crate::spsc::Producer;
use crate::types::{Nanos, MAX_PENDING_REQUESTS};

#[derive(Clone, Copy, Default)]
struct PendingRequest {
    recv_time: Nanos,
    /// Position within the round; makes the in-place sort a stable one.
    arrival: u32,
    request: ClientRequest,
}

pub struct FifoSequencer {
    pending: Vec<PendingRequest>,
}

impl FifoSequencer {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(MAX_PENDING_REQUESTS),
        }
    }

    /// Buffers one request for the current round. Overflow means the
    /// buffer was sized below the aggregate inbound burst and is fatal.
    pub fn add(&mut self, recv_time: Nanos, request: ClientRequest) {
        assert!(
            self.pending.len() < MAX_PENDING_REQUESTS,
            "sequencer overflow at {MAX_PENDING_REQUESTS} pending requests"
        );
        let arrival = self.pending.len() as u32;
        self.pending.push(PendingRequest {
            recv_time,
            arrival,
            request,
        });
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Sorts the round by receive time and hands it to the matching
    /// engine, then resets for the next round.
    pub fn sequence_and_publish(&mut self, out: &mut Producer<ClientRequest>) {
        if self.pending.is_empty() {
            return;
        }
        // In-place sort; the arrival tiebreak reproduces stable ordering
        // without the allocation a stable sort would do per round.
        self.pending
            .sort_unstable_by_key(|p| (p.recv_time, p.arrival));
        for pending in &self.pending {
            out.push(pending.request);
        }
        self.pending.clear();
    }
}

impl Default for FifoSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ClientRequestType;
    use crate::spsc::SpscQueue;
    use crate::types::Side;

    fn request(order_id: u64) -> ClientRequest {
        ClientRequest {
            req_type: ClientRequestType::New,
            client_id: 0,
            ticker_id: 0,
            order_id,
            side: Side::Buy,
            price: 100,
            qty: 1,
        }
    }

    #[test]
    fn emits_in_receive_time_order() {
        let (mut tx, mut rx) = SpscQueue::new(16).split();
        let mut sequencer = FifoSequencer::new();

        sequencer.add(3, request(30));
        sequencer.add(1, request(10));
        sequencer.add(2, request(20));
        sequencer.sequence_and_publish(&mut tx);

        let order: Vec<u64> = std::iter::from_fn(|| rx.pop()).map(|r| r.order_id).collect();
        assert_eq!(order, vec![10, 20, 30]);
        assert_eq!(sequencer.pending(), 0);
    }

    #[test]
    fn ties_preserve_insertion_order() {
        let (mut tx, mut rx) = SpscQueue::new(16).split();
        let mut sequencer = FifoSequencer::new();

        sequencer.add(2, request(1)); // a
        sequencer.add(2, request(2)); // b, same timestamp
        sequencer.add(1, request(3));
        sequencer.sequence_and_publish(&mut tx);

        let order: Vec<u64> = std::iter::from_fn(|| rx.pop()).map(|r| r.order_id).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn empty_round_publishes_nothing() {
        let (mut tx, rx) = SpscQueue::<ClientRequest>::new(4).split();
        let mut sequencer = FifoSequencer::new();
        sequencer.sequence_and_publish(&mut tx);
        assert!(rx.is_empty());
    }

    #[test]
    fn rounds_are_independent() {
        let (mut tx, mut rx) = SpscQueue::new(16).split();
        let mut sequencer = FifoSequencer::new();

        sequencer.add(5, request(1));
        sequencer.sequence_and_publish(&mut tx);
        sequencer.add(4, request(2)); // earlier time, later round
        sequencer.sequence_and_publish(&mut tx);

        let order: Vec<u64> = std::iter::from_fn(|| rx.pop()).map(|r| r.order_id).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    #[should_panic(expected = "sequencer overflow")]
    fn overflow_is_fatal() {
        let mut sequencer = FifoSequencer::new();
        for i in 0..=MAX_PENDING_REQUESTS as u64 {
            sequencer.add(0, request(i));
        }
    }
}
