//! Limit order book with price-time priority matching.
//!
//! One book per instrument. Resting liquidity lives in two pools:
//!
//! - an order pool, where each order is a node of its level's circular
//!   FIFO (see [`crate::price_level`])
//! - a level pool, where each live level is a node of its side's circular
//!   list, ordered from most aggressive to least aggressive
//!
//! Lookup paths are all O(1): best bid/ask are direct handles, a price
//! resolves to its level through a direct-address slot (`price mod
//! MAX_PRICE_LEVELS`), and a (client, client order id) pair resolves to
//! its resting order through a dense two-level index for cancels.
//!
//! The book publishes through an [`EventSink`] provided by its owner: the
//! matching engine forwards into the outbound queues, unit tests record.

use tracing::debug;

use crate::pool::{Pool, PoolIdx, NULL_IDX};
use crate::price_level::{self_link, Level, Order};
use crate::protocol::{
    ClientResponse, ClientResponseType, MarketUpdate, MarketUpdateType,
};
use crate::types::{
    ClientId, OrderId, Price, Qty, Side, TickerId, MAX_CLIENTS, MAX_ORDER_IDS, MAX_PRICE_LEVELS,
    ORDER_ID_INVALID, PRICE_INVALID, PRIORITY_INVALID, QTY_INVALID,
};

/// Where the book sends what it produces. The matching engine implements
/// this over its outbound queues and owns the exchange-wide market order
/// id counter; tests implement it with plain vectors.
pub trait EventSink {
    fn client_response(&mut self, response: &ClientResponse);
    fn market_update(&mut self, update: &MarketUpdate);
    /// Next exchange-wide market order id, strictly increasing from 1.
    fn next_market_order_id(&mut self) -> OrderId;
}

pub struct OrderBook {
    ticker_id: TickerId,
    orders: Pool<Order>,
    levels: Pool<Level>,
    /// Most aggressive live level per side, or NULL_IDX.
    best_bid: PoolIdx,
    best_ask: PoolIdx,
    /// Direct-address index `price mod MAX_PRICE_LEVELS -> level`. The
    /// deployment guarantees simultaneously live prices occupy distinct
    /// slots; insertion asserts it.
    level_index: Vec<PoolIdx>,
    /// Dense `client -> client order id -> resting order` index for O(1)
    /// cancels.
    cid_oid: Vec<Vec<PoolIdx>>,
}

impl OrderBook {
    pub fn new(ticker_id: TickerId) -> Self {
        Self {
            ticker_id,
            orders: Pool::new("orders", MAX_ORDER_IDS),
            levels: Pool::new("levels", MAX_PRICE_LEVELS),
            best_bid: NULL_IDX,
            best_ask: NULL_IDX,
            level_index: vec![NULL_IDX; MAX_PRICE_LEVELS],
            cid_oid: vec![vec![NULL_IDX; MAX_ORDER_IDS]; MAX_CLIENTS],
        }
    }

    // ========================================================================
    // Public contract
    // ========================================================================

    /// Processes a new order: acknowledge, cross against the opposite
    /// side while the limit permits, rest any residual.
    pub fn add_order(
        &mut self,
        sink: &mut impl EventSink,
        client_id: ClientId,
        client_order_id: OrderId,
        side: Side,
        price: Price,
        qty: Qty,
    ) {
        let market_order_id = sink.next_market_order_id();
        sink.client_response(&ClientResponse {
            resp_type: ClientResponseType::Accepted,
            client_id,
            ticker_id: self.ticker_id,
            client_order_id,
            market_order_id,
            side: Some(side),
            price,
            exec_qty: 0,
            leaves_qty: qty,
        });

        let leaves_qty = self.cross(sink, client_id, client_order_id, market_order_id, side, price, qty);

        if leaves_qty > 0 {
            let priority = self.next_priority(price);
            let idx = self.orders.alloc(Order {
                ticker_id: self.ticker_id,
                client_id,
                client_order_id,
                market_order_id,
                side,
                price,
                qty: leaves_qty,
                priority,
                prev: NULL_IDX,
                next: NULL_IDX,
            });
            self.insert_order(idx);

            sink.market_update(&MarketUpdate {
                kind: MarketUpdateType::Add,
                market_order_id,
                ticker_id: self.ticker_id,
                side: Some(side),
                price,
                qty: leaves_qty,
                priority,
            });
        }
    }

    /// Cancels a resting order, or rejects when (client, client order id)
    /// does not map to one. Never fatal.
    pub fn cancel_order(
        &mut self,
        sink: &mut impl EventSink,
        client_id: ClientId,
        client_order_id: OrderId,
    ) {
        let idx = if (client_id as usize) < MAX_CLIENTS && (client_order_id as usize) < MAX_ORDER_IDS
        {
            self.cid_oid[client_id as usize][client_order_id as usize]
        } else {
            NULL_IDX
        };

        if idx == NULL_IDX {
            debug!(client_id, client_order_id, "cancel for unknown order");
            sink.client_response(&ClientResponse {
                resp_type: ClientResponseType::CancelRejected,
                client_id,
                ticker_id: self.ticker_id,
                client_order_id,
                market_order_id: ORDER_ID_INVALID,
                side: None,
                price: PRICE_INVALID,
                exec_qty: QTY_INVALID,
                leaves_qty: QTY_INVALID,
            });
            return;
        }

        let order = *self.orders.get(idx);
        sink.market_update(&MarketUpdate {
            kind: MarketUpdateType::Cancel,
            market_order_id: order.market_order_id,
            ticker_id: self.ticker_id,
            side: Some(order.side),
            price: order.price,
            qty: 0,
            priority: order.priority,
        });
        self.remove_order(idx);
        sink.client_response(&ClientResponse {
            resp_type: ClientResponseType::Canceled,
            client_id,
            ticker_id: self.ticker_id,
            client_order_id,
            market_order_id: order.market_order_id,
            side: Some(order.side),
            price: order.price,
            exec_qty: QTY_INVALID,
            leaves_qty: order.qty,
        });
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Crosses the incoming order against the opposite side head-of-book
    /// until its limit no longer permits or it is spent. Returns the
    /// unfilled remainder.
    fn cross(
        &mut self,
        sink: &mut impl EventSink,
        client_id: ClientId,
        client_order_id: OrderId,
        market_order_id: OrderId,
        side: Side,
        price: Price,
        qty: Qty,
    ) -> Qty {
        let mut leaves_qty = qty;
        while leaves_qty > 0 {
            let best_opp = match side {
                Side::Buy => self.best_ask,
                Side::Sell => self.best_bid,
            };
            if best_opp == NULL_IDX {
                break;
            }
            let head = self.levels.get(best_opp).first_order;
            let head_price = self.orders.get(head).price;
            let crosses = match side {
                Side::Buy => price >= head_price,
                Side::Sell => price <= head_price,
            };
            if !crosses {
                break;
            }
            leaves_qty = self.fill_against(
                sink,
                client_id,
                client_order_id,
                market_order_id,
                side,
                head,
                leaves_qty,
            );
        }
        leaves_qty
    }

    /// Executes the incoming order against one resting order (the current
    /// head of the best opposing level) and emits the fill pair, the
    /// trade, and the resting order's lifecycle update.
    fn fill_against(
        &mut self,
        sink: &mut impl EventSink,
        client_id: ClientId,
        client_order_id: OrderId,
        market_order_id: OrderId,
        side: Side,
        resting_idx: PoolIdx,
        mut leaves_qty: Qty,
    ) -> Qty {
        let resting = *self.orders.get(resting_idx);
        let fill_qty = leaves_qty.min(resting.qty);
        leaves_qty -= fill_qty;
        let resting_leaves = resting.qty - fill_qty;
        self.orders.get_mut(resting_idx).qty = resting_leaves;

        sink.client_response(&ClientResponse {
            resp_type: ClientResponseType::Filled,
            client_id,
            ticker_id: self.ticker_id,
            client_order_id,
            market_order_id,
            side: Some(side),
            price: resting.price,
            exec_qty: fill_qty,
            leaves_qty,
        });
        sink.client_response(&ClientResponse {
            resp_type: ClientResponseType::Filled,
            client_id: resting.client_id,
            ticker_id: self.ticker_id,
            client_order_id: resting.client_order_id,
            market_order_id: resting.market_order_id,
            side: Some(resting.side),
            price: resting.price,
            exec_qty: fill_qty,
            leaves_qty: resting_leaves,
        });
        sink.market_update(&MarketUpdate {
            kind: MarketUpdateType::Trade,
            market_order_id: ORDER_ID_INVALID,
            ticker_id: self.ticker_id,
            side: Some(side),
            price: resting.price,
            qty: fill_qty,
            priority: PRIORITY_INVALID,
        });

        if resting_leaves == 0 {
            sink.market_update(&MarketUpdate {
                kind: MarketUpdateType::Cancel,
                market_order_id: resting.market_order_id,
                ticker_id: self.ticker_id,
                side: Some(resting.side),
                price: resting.price,
                qty: resting.qty,
                priority: PRIORITY_INVALID,
            });
            self.remove_order(resting_idx);
        } else {
            sink.market_update(&MarketUpdate {
                kind: MarketUpdateType::Modify,
                market_order_id: resting.market_order_id,
                ticker_id: self.ticker_id,
                side: Some(resting.side),
                price: resting.price,
                qty: resting_leaves,
                priority: resting.priority,
            });
        }

        leaves_qty
    }

    // ========================================================================
    // Structure maintenance
    // ========================================================================

    #[inline]
    fn price_slot(price: Price) -> usize {
        price.rem_euclid(MAX_PRICE_LEVELS as Price) as usize
    }

    #[inline]
    fn level_at(&self, price: Price) -> PoolIdx {
        self.level_index[Self::price_slot(price)]
    }

    #[inline]
    fn best(&self, side: Side) -> PoolIdx {
        match side {
            Side::Buy => self.best_bid,
            Side::Sell => self.best_ask,
        }
    }

    #[inline]
    fn set_best(&mut self, side: Side, idx: PoolIdx) {
        match side {
            Side::Buy => self.best_bid = idx,
            Side::Sell => self.best_ask = idx,
        }
    }

    /// `a` is closer to the top of book than `b` on `side`.
    #[inline]
    fn more_aggressive(side: Side, a: Price, b: Price) -> bool {
        match side {
            Side::Buy => a > b,
            Side::Sell => a < b,
        }
    }

    /// Priority for a new arrival at `price`: 1 on a fresh level, else one
    /// past the level's tail.
    fn next_priority(&self, price: Price) -> u64 {
        let lidx = self.level_at(price);
        if lidx == NULL_IDX {
            return 1;
        }
        self.levels.get(lidx).next_priority(&self.orders)
    }

    /// Links an allocated order into its level (creating the level if this
    /// is the first order at its price) and the cancel index.
    fn insert_order(&mut self, idx: PoolIdx) {
        let (side, price, client_id, client_order_id) = {
            let o = self.orders.get(idx);
            (o.side, o.price, o.client_id, o.client_order_id)
        };

        let lidx = self.level_at(price);
        if lidx == NULL_IDX {
            self_link(&mut self.orders, idx);
            let new_level = self.levels.alloc(Level::new(side, price, idx));
            self.insert_level(new_level);
        } else {
            debug_assert_eq!(self.levels.get(lidx).side, side);
            debug_assert_eq!(self.levels.get(lidx).price, price);
            let level = self.levels.get_mut(lidx);
            level.append_order(&mut self.orders, idx);
        }

        self.cid_oid[client_id as usize][client_order_id as usize] = idx;
    }

    /// Splices a new level into its side's circular list at the position
    /// that keeps the list ordered most to least aggressive, updating the
    /// best pointer when it takes the top.
    fn insert_level(&mut self, lidx: PoolIdx) {
        let (side, price) = {
            let l = self.levels.get(lidx);
            (l.side, l.price)
        };

        let slot = Self::price_slot(price);
        assert!(
            self.level_index[slot] == NULL_IDX,
            "level index collision: price {price} maps to occupied slot {slot}"
        );
        self.level_index[slot] = lidx;

        let best = self.best(side);
        if best == NULL_IDX {
            let l = self.levels.get_mut(lidx);
            l.prev_level = lidx;
            l.next_level = lidx;
            self.set_best(side, lidx);
            return;
        }

        let mut at = best;
        let mut takes_top = false;
        loop {
            let at_price = self.levels.get(at).price;
            if Self::more_aggressive(side, price, at_price) {
                takes_top = at == best;
                break;
            }
            at = self.levels.get(at).next_level;
            if at == best {
                // Least aggressive so far: insert at the tail, which in a
                // cycle is just before the head.
                break;
            }
        }

        // Link lidx before `at`.
        let at_prev = self.levels.get(at).prev_level;
        {
            let l = self.levels.get_mut(lidx);
            l.prev_level = at_prev;
            l.next_level = at;
        }
        self.levels.get_mut(at_prev).next_level = lidx;
        self.levels.get_mut(at).prev_level = lidx;

        if takes_top {
            self.set_best(side, lidx);
        }
    }

    /// Unlinks an order from its level, retiring the level when it was the
    /// last one, and clears the cancel index. Frees the order slot.
    fn remove_order(&mut self, idx: PoolIdx) {
        let (price, client_id, client_order_id) = {
            let o = self.orders.get(idx);
            (o.price, o.client_id, o.client_order_id)
        };

        let lidx = self.level_at(price);
        debug_assert!(lidx != NULL_IDX, "resting order with no level");
        let level = self.levels.get_mut(lidx);
        let now_empty = level.unlink_order(&mut self.orders, idx);
        if now_empty {
            self.remove_level(lidx);
        }

        self.cid_oid[client_id as usize][client_order_id as usize] = NULL_IDX;
        self.orders.free(idx);
    }

    /// Splices a dead level out of its side's circular list and the price
    /// index, promoting the next level when it held the top.
    fn remove_level(&mut self, lidx: PoolIdx) {
        let (side, price, prev, next) = {
            let l = self.levels.get(lidx);
            (l.side, l.price, l.prev_level, l.next_level)
        };

        if next == lidx {
            // Last level on this side.
            self.set_best(side, NULL_IDX);
        } else {
            self.levels.get_mut(prev).next_level = next;
            self.levels.get_mut(next).prev_level = prev;
            if self.best(side) == lidx {
                self.set_best(side, next);
            }
        }

        self.level_index[Self::price_slot(price)] = NULL_IDX;
        self.levels.free(lidx);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn ticker_id(&self) -> TickerId {
        self.ticker_id
    }

    pub fn best_bid_price(&self) -> Option<Price> {
        (self.best_bid != NULL_IDX).then(|| self.levels.get(self.best_bid).price)
    }

    pub fn best_ask_price(&self) -> Option<Price> {
        (self.best_ask != NULL_IDX).then(|| self.levels.get(self.best_ask).price)
    }

    /// The resting order owned by (client, client order id), if live.
    pub fn resting(&self, client_id: ClientId, client_order_id: OrderId) -> Option<&Order> {
        if (client_id as usize) >= MAX_CLIENTS || (client_order_id as usize) >= MAX_ORDER_IDS {
            return None;
        }
        let idx = self.cid_oid[client_id as usize][client_order_id as usize];
        (idx != NULL_IDX).then(|| self.orders.get(idx))
    }

    /// (order count, total quantity) at a live (side, price), or (0, 0).
    pub fn depth(&self, side: Side, price: Price) -> (usize, Qty) {
        let lidx = self.level_at(price);
        if lidx == NULL_IDX {
            return (0, 0);
        }
        let level = self.levels.get(lidx);
        if level.side != side || level.price != price {
            return (0, 0);
        }
        level.depth(&self.orders)
    }

    /// Live level prices on `side`, most aggressive first.
    pub fn level_prices(&self, side: Side) -> Vec<Price> {
        let mut prices = Vec::new();
        let best = self.best(side);
        if best == NULL_IDX {
            return prices;
        }
        let mut at = best;
        loop {
            prices.push(self.levels.get(at).price);
            at = self.levels.get(at).next_level;
            if at == best {
                break;
            }
        }
        prices
    }

    /// Count of resting orders across both sides.
    pub fn resting_order_count(&self) -> usize {
        self.orders.in_use()
    }

    /// Copies of every resting order, walking levels from best outward and
    /// each level FIFO head to tail. Diagnostic use only.
    pub fn resting_orders(&self) -> Vec<Order> {
        let mut out = Vec::with_capacity(self.orders.in_use());
        for side in [Side::Buy, Side::Sell] {
            let best = self.best(side);
            if best == NULL_IDX {
                continue;
            }
            let mut at = best;
            loop {
                let level = self.levels.get(at);
                let mut oidx = level.first_order;
                loop {
                    out.push(*self.orders.get(oidx));
                    oidx = self.orders.get(oidx).next;
                    if oidx == level.first_order {
                        break;
                    }
                }
                at = level.next_level;
                if at == best {
                    break;
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.orders.in_use() == 0
    }

    /// Walks every structure and asserts the book invariants: circular
    /// closure of both list layers, price monotonicity from best outward,
    /// strictly increasing priority along each level FIFO, live orders
    /// with positive quantity, and index consistency. Panics on violation.
    pub fn validate(&self) {
        let mut orders_seen = 0usize;
        let mut levels_seen = 0usize;

        for side in [Side::Buy, Side::Sell] {
            let best = self.best(side);
            if best == NULL_IDX {
                continue;
            }
            let mut last_price: Option<Price> = None;
            let mut at = best;
            loop {
                levels_seen += 1;
                assert!(
                    levels_seen <= self.levels.capacity(),
                    "level list does not close"
                );
                let level = self.levels.get(at);
                assert_eq!(level.side, side, "level on wrong side list");
                assert_eq!(
                    self.level_index[Self::price_slot(level.price)],
                    at,
                    "level index out of sync at price {}",
                    level.price
                );
                if let Some(last) = last_price {
                    assert!(
                        Self::more_aggressive(side, last, level.price),
                        "levels not monotonic from best outward: {last} then {}",
                        level.price
                    );
                }
                last_price = Some(level.price);
                assert_eq!(
                    self.levels.get(level.next_level).prev_level,
                    at,
                    "level links not mutual"
                );

                // Walk the order cycle at this level.
                assert!(level.first_order != NULL_IDX, "live level with no orders");
                let mut oidx = level.first_order;
                let mut last_priority: Option<u64> = None;
                loop {
                    orders_seen += 1;
                    assert!(
                        orders_seen <= self.orders.capacity(),
                        "order cycle does not close"
                    );
                    let order = self.orders.get(oidx);
                    assert_eq!(order.side, side);
                    assert_eq!(order.price, level.price);
                    assert!(order.qty > 0, "resting order with zero qty");
                    assert_eq!(
                        self.cid_oid[order.client_id as usize][order.client_order_id as usize],
                        oidx,
                        "cancel index out of sync"
                    );
                    if let Some(last) = last_priority {
                        assert!(
                            order.priority > last,
                            "priority not increasing along level FIFO"
                        );
                    }
                    last_priority = Some(order.priority);
                    assert_eq!(self.orders.get(order.next).prev, oidx, "order links not mutual");

                    oidx = order.next;
                    if oidx == level.first_order {
                        break;
                    }
                }

                at = level.next_level;
                if at == best {
                    break;
                }
            }
        }

        assert_eq!(
            orders_seen,
            self.orders.in_use(),
            "orders reachable from levels disagree with pool accounting"
        );
        assert_eq!(
            levels_seen,
            self.levels.in_use(),
            "levels reachable from best pointers disagree with pool accounting"
        );
    }
}
