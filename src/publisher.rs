//! Market data publisher: the incremental stream.
//!
//! Drains the matching engine's market update queue, stamps each update
//! with the next global incremental sequence number (strictly increasing
//! from 1), encodes it onto the incremental transport, and forwards the
//! stamped record to the snapshot synthesizer over a second ring. The
//! transport buffers; nothing is selectively dropped.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::affinity;
use crate::protocol::{MarketUpdate, SeqMarketUpdate};
use crate::spsc::{Consumer, Producer};
use crate::transport::PacketTx;

pub struct MarketDataPublisher<T: PacketTx> {
    from_engine: Consumer<MarketUpdate>,
    to_snapshot: Producer<SeqMarketUpdate>,
    stream: T,
    next_inc_seq: u64,
}

impl<T: PacketTx> MarketDataPublisher<T> {
    pub fn new(
        from_engine: Consumer<MarketUpdate>,
        to_snapshot: Producer<SeqMarketUpdate>,
        stream: T,
    ) -> Self {
        Self {
            from_engine,
            to_snapshot,
            stream,
            next_inc_seq: 1,
        }
    }

    /// Publishes everything queued right now. Returns the number of
    /// updates published.
    pub fn poll(&mut self) -> usize {
        let mut published = 0;
        let mut frame = [0u8; SeqMarketUpdate::ENCODED_LEN];
        while let Some(update) = self.from_engine.read_slot() {
            let framed = SeqMarketUpdate {
                seq: self.next_inc_seq,
                update: *update,
            };
            self.from_engine.commit_read();

            framed.encode(&mut frame);
            self.stream.send(&frame);
            // The synthesizer sees exactly what went on the wire, seq
            // number included.
            self.to_snapshot.push(framed);

            self.next_inc_seq += 1;
            published += 1;
        }
        published
    }

    pub fn run(&mut self, running: &AtomicBool, core: Option<usize>) {
        if let Some(core) = core {
            affinity::pin_to_core(core);
        }
        info!("market data publisher loop starting");
        while running.load(Ordering::Acquire) {
            if self.poll() == 0 {
                std::hint::spin_loop();
            }
        }
        info!("market data publisher loop stopped");
    }
}
