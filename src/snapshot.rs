//! Snapshot synthesizer: the periodic full-book stream.
//!
//! Maintains an independent image of every resting order by replaying the
//! incremental stream forwarded from the publisher, and republishes the
//! whole image as a self-contained cycle on the snapshot transport at a
//! fixed cadence. The image never aliases matcher memory; it is
//! reconstructed purely from the public update stream, which is also what
//! makes it a correctness check on that stream.
//!
//! A cycle looks like:
//!
//! ```text
//! SNAPSHOT_START (market_order_id = incremental cursor)
//!   per ticker: CLEAR, then one ADD per live order
//! SNAPSHOT_END   (market_order_id = same cursor)
//! ```
//!
//! with the cycle's own sequence numbers restarting at 0, so a consumer
//! can treat any cycle in isolation.

use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::affinity;
use crate::pool::{Pool, PoolIdx};
use crate::protocol::{MarketUpdate, MarketUpdateType, SeqMarketUpdate};
use crate::spsc::Consumer;
use crate::transport::PacketTx;
use crate::types::{
    now_nanos, Nanos, OrderId, Price, Priority, Qty, Side, TickerId, MAX_ORDER_IDS, MAX_TICKERS,
    ORDER_ID_INVALID, PRICE_INVALID, PRIORITY_INVALID, QTY_INVALID,
};

/// One resting order as the public stream describes it.
#[derive(Clone, Copy, Debug)]
struct ImageOrder {
    market_order_id: OrderId,
    side: Side,
    price: Price,
    qty: Qty,
    priority: Priority,
}

impl Default for ImageOrder {
    fn default() -> Self {
        Self {
            market_order_id: ORDER_ID_INVALID,
            side: Side::Buy,
            price: PRICE_INVALID,
            qty: QTY_INVALID,
            priority: PRIORITY_INVALID,
        }
    }
}

pub struct SnapshotSynthesizer<T: PacketTx> {
    from_publisher: Consumer<SeqMarketUpdate>,
    stream: T,
    /// Per-ticker map from market order id to image slot. Bounded by the
    /// pool below, which is sized for every client order id on every
    /// ticker being live at once.
    images: Vec<FxHashMap<OrderId, PoolIdx>>,
    pool: Pool<ImageOrder>,
    /// Incremental cursor: sequence number of the last applied update.
    last_inc_seq: u64,
    snapshot_period: Nanos,
    last_snapshot_at: Nanos,
}

impl<T: PacketTx> SnapshotSynthesizer<T> {
    pub fn new(
        from_publisher: Consumer<SeqMarketUpdate>,
        stream: T,
        snapshot_period: Nanos,
    ) -> Self {
        Self {
            from_publisher,
            stream,
            images: (0..MAX_TICKERS).map(|_| FxHashMap::default()).collect(),
            pool: Pool::new("snapshot image", MAX_TICKERS * MAX_ORDER_IDS),
            last_inc_seq: 0,
            snapshot_period,
            last_snapshot_at: 0,
        }
    }

    /// Applies one forwarded incremental to the image.
    ///
    /// The producer is the in-process publisher over an SPSC ring, so a
    /// sequence discontinuity here, like an ADD for a live id or a
    /// MODIFY/CANCEL for a dead one, is a wiring bug and fatal.
    pub fn apply(&mut self, framed: &SeqMarketUpdate) {
        assert_eq!(
            framed.seq,
            self.last_inc_seq + 1,
            "incremental stream gap inside the exchange"
        );
        let update = &framed.update;
        let image = &mut self.images[update.ticker_id as usize];

        match update.kind {
            MarketUpdateType::Add => {
                let side = update
                    .side
                    .unwrap_or_else(|| panic!("ADD without side: {update:?}"));
                let idx = self.pool.alloc(ImageOrder {
                    market_order_id: update.market_order_id,
                    side,
                    price: update.price,
                    qty: update.qty,
                    priority: update.priority,
                });
                let previous = image.insert(update.market_order_id, idx);
                assert!(
                    previous.is_none(),
                    "ADD for already-live order {}",
                    update.market_order_id
                );
            }
            MarketUpdateType::Modify => {
                let idx = *image
                    .get(&update.market_order_id)
                    .unwrap_or_else(|| panic!("MODIFY for unknown order {}", update.market_order_id));
                let order = self.pool.get_mut(idx);
                debug_assert_eq!(Some(order.side), update.side);
                order.qty = update.qty;
                order.price = update.price;
            }
            MarketUpdateType::Cancel => {
                let idx = image
                    .remove(&update.market_order_id)
                    .unwrap_or_else(|| panic!("CANCEL for unknown order {}", update.market_order_id));
                self.pool.free(idx);
            }
            // Trades do not change resting state; the matcher already
            // emitted the corresponding MODIFY/CANCEL. Snapshot sentinels
            // and CLEAR never appear on the incremental stream.
            MarketUpdateType::Trade
            | MarketUpdateType::Clear
            | MarketUpdateType::SnapshotStart
            | MarketUpdateType::SnapshotEnd
            | MarketUpdateType::Invalid => {}
        }

        self.last_inc_seq = framed.seq;
    }

    /// Emits one full snapshot cycle. Public so tests and operators can
    /// force a cycle outside the cadence.
    pub fn publish_snapshot(&mut self) {
        let mut snap_seq = 0u64;
        let mut frame = [0u8; SeqMarketUpdate::ENCODED_LEN];
        let mut emit = |stream: &mut T, seq: &mut u64, update: MarketUpdate| {
            SeqMarketUpdate { seq: *seq, update }.encode(&mut frame);
            stream.send(&frame);
            *seq += 1;
        };

        emit(
            &mut self.stream,
            &mut snap_seq,
            MarketUpdate {
                kind: MarketUpdateType::SnapshotStart,
                market_order_id: self.last_inc_seq,
                ..Default::default()
            },
        );

        let mut orders_published = 0usize;
        for ticker_id in 0..MAX_TICKERS as TickerId {
            emit(
                &mut self.stream,
                &mut snap_seq,
                MarketUpdate {
                    kind: MarketUpdateType::Clear,
                    ticker_id,
                    ..Default::default()
                },
            );
            for &idx in self.images[ticker_id as usize].values() {
                let order = *self.pool.get(idx);
                emit(
                    &mut self.stream,
                    &mut snap_seq,
                    MarketUpdate {
                        kind: MarketUpdateType::Add,
                        market_order_id: order.market_order_id,
                        ticker_id,
                        side: Some(order.side),
                        price: order.price,
                        qty: order.qty,
                        priority: order.priority,
                    },
                );
                orders_published += 1;
            }
        }

        emit(
            &mut self.stream,
            &mut snap_seq,
            MarketUpdate {
                kind: MarketUpdateType::SnapshotEnd,
                market_order_id: self.last_inc_seq,
                ..Default::default()
            },
        );

        debug!(
            orders = orders_published,
            cursor = self.last_inc_seq,
            "published snapshot cycle"
        );
    }

    /// Drains forwarded incrementals, then publishes a cycle when the
    /// cadence timer says so. The cadence check is a timestamp read, not
    /// a wait.
    pub fn poll(&mut self, now: Nanos) -> usize {
        let mut applied = 0;
        while let Some(framed) = self.from_publisher.read_slot() {
            let framed = *framed;
            self.apply(&framed);
            self.from_publisher.commit_read();
            applied += 1;
        }

        if now - self.last_snapshot_at > self.snapshot_period {
            self.last_snapshot_at = now;
            self.publish_snapshot();
        }
        applied
    }

    pub fn run(&mut self, running: &AtomicBool, core: Option<usize>) {
        if let Some(core) = core {
            affinity::pin_to_core(core);
        }
        info!("snapshot synthesizer loop starting");
        while running.load(Ordering::Acquire) {
            if self.poll(now_nanos()) == 0 {
                std::hint::spin_loop();
            }
        }
        info!("snapshot synthesizer loop stopped");
    }

    /// Live image orders for one ticker, for tests and diagnostics.
    pub fn image_orders(&self, ticker_id: TickerId) -> Vec<(OrderId, Side, Price, Qty, Priority)> {
        let mut orders: Vec<_> = self.images[ticker_id as usize]
            .values()
            .map(|&idx| {
                let o = self.pool.get(idx);
                (o.market_order_id, o.side, o.price, o.qty, o.priority)
            })
            .collect();
        orders.sort_unstable_by_key(|o| o.0);
        orders
    }

    pub fn last_inc_seq(&self) -> u64 {
        self.last_inc_seq
    }
}
