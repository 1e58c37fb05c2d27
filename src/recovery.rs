//! Trading-side market data consumer with snapshot recovery.
//!
//! In steady state only the incremental stream is read: every update must
//! arrive with the next expected sequence number and is forwarded
//! straight to the strategy-bound queue. The first gap flips the consumer
//! into recovery: it wants the snapshot stream joined, buffers everything
//! from both streams keyed by sequence number, and on every arrival tries
//! to splice a complete snapshot cycle with the contiguous incremental
//! tail that follows the cycle's cursor. A successful splice replays the
//! snapshot body, then the tail, and drops back to steady state.
//!
//! Nothing here is fatal; the consumer buffers and retries until a
//! coherent splice exists.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::protocol::{MarketUpdate, MarketUpdateType, SeqMarketUpdate};
use crate::spsc::Producer;
use crate::transport::{PacketRx, MAX_FRAME_LEN};
use crate::types::MAX_MARKET_UPDATES;

pub struct MarketDataConsumer {
    to_strategy: Producer<MarketUpdate>,
    next_exp_inc_seq: u64,
    in_recovery: bool,
    /// Snapshot-cycle records keyed by snapshot sequence number.
    snapshot_queue: BTreeMap<u64, MarketUpdate>,
    /// Incremental records keyed by incremental sequence number.
    inc_queue: BTreeMap<u64, MarketUpdate>,
}

impl MarketDataConsumer {
    pub fn new(to_strategy: Producer<MarketUpdate>) -> Self {
        Self {
            to_strategy,
            next_exp_inc_seq: 1,
            in_recovery: false,
            snapshot_queue: BTreeMap::new(),
            inc_queue: BTreeMap::new(),
        }
    }

    /// True while the consumer needs the snapshot stream delivered. The
    /// driving loop joins the snapshot group when this flips on and
    /// leaves when it flips off.
    pub fn wants_snapshot(&self) -> bool {
        self.in_recovery
    }

    pub fn next_expected_seq(&self) -> u64 {
        self.next_exp_inc_seq
    }

    /// Handles one record from the incremental stream.
    pub fn on_incremental(&mut self, framed: &SeqMarketUpdate) {
        if !self.in_recovery {
            if framed.seq == self.next_exp_inc_seq {
                self.next_exp_inc_seq += 1;
                self.to_strategy.push(framed.update);
                return;
            }
            warn!(
                expected = self.next_exp_inc_seq,
                received = framed.seq,
                "incremental gap, entering snapshot recovery"
            );
            self.enter_recovery();
        }
        self.queue_incremental(framed);
        self.try_splice();
    }

    /// Handles one record from the snapshot stream. Ignored outside
    /// recovery; the subscription normally is not even joined then.
    pub fn on_snapshot(&mut self, framed: &SeqMarketUpdate) {
        if !self.in_recovery {
            debug!(seq = framed.seq, "snapshot record outside recovery, ignoring");
            return;
        }
        if self.snapshot_queue.contains_key(&framed.seq) {
            // Same snapshot seq twice means a new cycle began; only the
            // fresh cycle can complete.
            warn!(seq = framed.seq, "snapshot cycle restarted, dropping stale cycle");
            self.snapshot_queue.clear();
        }
        self.snapshot_queue.insert(framed.seq, framed.update);
        self.try_splice();
    }

    fn enter_recovery(&mut self) {
        self.in_recovery = true;
        self.snapshot_queue.clear();
        self.inc_queue.clear();
    }

    fn queue_incremental(&mut self, framed: &SeqMarketUpdate) {
        if self.inc_queue.len() >= MAX_MARKET_UPDATES {
            // A bounded wait: anything this old can only splice against a
            // snapshot cycle we evidently never completed.
            warn!("incremental recovery queue full, restarting buffering");
            self.inc_queue.clear();
        }
        self.inc_queue.insert(framed.seq, framed.update);
    }

    /// Attempts the snapshot + incremental splice. Call after every
    /// queued arrival while in recovery.
    fn try_splice(&mut self) {
        // A usable cycle starts at snapshot seq 0 with SNAPSHOT_START.
        let Some(first) = self.snapshot_queue.values().next() else {
            return;
        };
        if first.kind != MarketUpdateType::SnapshotStart {
            debug!("no SNAPSHOT_START at head of snapshot queue yet");
            self.snapshot_queue.clear();
            return;
        }

        // The cycle must be contiguous from 0.
        let mut expected_seq = 0u64;
        let mut body: Vec<MarketUpdate> = Vec::with_capacity(self.snapshot_queue.len());
        let mut gap = false;
        for (&seq, update) in &self.snapshot_queue {
            if seq != expected_seq {
                debug!(expected = expected_seq, found = seq, "gap inside snapshot cycle");
                gap = true;
                break;
            }
            expected_seq += 1;
            if update.kind != MarketUpdateType::SnapshotStart
                && update.kind != MarketUpdateType::SnapshotEnd
            {
                body.push(*update);
            }
        }
        if gap {
            self.snapshot_queue.clear();
            return;
        }

        // And it must be complete.
        let last = self
            .snapshot_queue
            .values()
            .next_back()
            .expect("non-empty snapshot queue");
        if last.kind != MarketUpdateType::SnapshotEnd {
            return;
        }
        let cursor = last.market_order_id;

        // The incremental tail must continue seamlessly from the cursor.
        let mut next_seq = cursor + 1;
        let mut tail: Vec<MarketUpdate> = Vec::new();
        for (&seq, update) in &self.inc_queue {
            if seq <= cursor {
                continue; // already inside the snapshot image
            }
            if seq != next_seq {
                debug!(expected = next_seq, found = seq, "gap in queued incrementals");
                return;
            }
            next_seq += 1;
            tail.push(*update);
        }

        for update in body.iter().chain(tail.iter()) {
            self.to_strategy.push(*update);
        }
        info!(
            snapshot_records = body.len(),
            incremental_records = tail.len(),
            resume_at = next_seq,
            "snapshot recovery complete"
        );

        self.next_exp_inc_seq = next_seq;
        self.snapshot_queue.clear();
        self.inc_queue.clear();
        self.in_recovery = false;
    }

    /// Drains both streams through the state machine. Undecodable frames
    /// are protocol errors: logged, dropped.
    pub fn poll(&mut self, incremental: &mut impl PacketRx, snapshot: &mut impl PacketRx) -> usize {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let mut handled = 0;
        while let Some((len, _)) = incremental.recv(&mut buf) {
            match SeqMarketUpdate::decode(&buf[..len]) {
                Ok(framed) => self.on_incremental(&framed),
                Err(err) => warn!(%err, "dropping undecodable incremental record"),
            }
            handled += 1;
        }
        while let Some((len, _)) = snapshot.recv(&mut buf) {
            match SeqMarketUpdate::decode(&buf[..len]) {
                Ok(framed) => self.on_snapshot(&framed),
                Err(err) => warn!(%err, "dropping undecodable snapshot record"),
            }
            handled += 1;
        }
        handled
    }

    pub fn run(
        &mut self,
        running: &AtomicBool,
        incremental: &mut impl PacketRx,
        snapshot: &mut impl PacketRx,
    ) {
        info!("market data consumer loop starting");
        while running.load(Ordering::Acquire) {
            if self.poll(incremental, snapshot) == 0 {
                std::hint::spin_loop();
            }
        }
        info!("market data consumer loop stopped");
    }
}
