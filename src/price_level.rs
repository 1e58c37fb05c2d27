//! Price level: the FIFO of resting orders at one (side, price).
//!
//! Orders at a level form a circular doubly-linked list threaded through
//! pool handles, oldest at the head. The circular shape makes the tail
//! reachable from the head in O(1) (`head.prev`), which is what priority
//! assignment and tail appends need, and removal from any position is a
//! constant-time splice.
//!
//! Levels themselves carry `prev_level` / `next_level` handles forming the
//! per-side circular list owned by the order book.

use crate::pool::{Pool, PoolIdx, NULL_IDX};
use crate::types::{
    ClientId, OrderId, Price, Priority, Qty, Side, TickerId, CLIENT_ID_INVALID, ORDER_ID_INVALID,
    PRICE_INVALID, PRIORITY_INVALID, QTY_INVALID, TICKER_ID_INVALID,
};

/// A resting order. `prev` / `next` are the intrusive links of the level's
/// circular FIFO; they never dangle while the order is in a book.
#[derive(Clone, Copy, Debug)]
pub struct Order {
    pub ticker_id: TickerId,
    pub client_id: ClientId,
    pub client_order_id: OrderId,
    pub market_order_id: OrderId,
    pub side: Side,
    pub price: Price,
    /// Remaining open quantity; a resting order always has `qty > 0`.
    pub qty: Qty,
    pub priority: Priority,
    pub prev: PoolIdx,
    pub next: PoolIdx,
}

impl Default for Order {
    fn default() -> Self {
        Self {
            ticker_id: TICKER_ID_INVALID,
            client_id: CLIENT_ID_INVALID,
            client_order_id: ORDER_ID_INVALID,
            market_order_id: ORDER_ID_INVALID,
            side: Side::Buy,
            price: PRICE_INVALID,
            qty: QTY_INVALID,
            priority: PRIORITY_INVALID,
            prev: NULL_IDX,
            next: NULL_IDX,
        }
    }
}

/// One live price level. Lives in the book's level pool; dies with its
/// last order.
#[derive(Clone, Copy, Debug)]
pub struct Level {
    pub side: Side,
    pub price: Price,
    /// Oldest order at this price; the FIFO head.
    pub first_order: PoolIdx,
    pub prev_level: PoolIdx,
    pub next_level: PoolIdx,
}

impl Default for Level {
    fn default() -> Self {
        Self {
            side: Side::Buy,
            price: PRICE_INVALID,
            first_order: NULL_IDX,
            prev_level: NULL_IDX,
            next_level: NULL_IDX,
        }
    }
}

impl Level {
    pub fn new(side: Side, price: Price, first_order: PoolIdx) -> Self {
        Self {
            side,
            price,
            first_order,
            prev_level: NULL_IDX,
            next_level: NULL_IDX,
        }
    }

    /// Priority the next arrival at this level gets: one past the tail's.
    #[inline]
    pub fn next_priority(&self, orders: &Pool<Order>) -> Priority {
        let tail = orders.get(self.first_order).prev;
        orders.get(tail).priority + 1
    }

    /// Appends `idx` at the tail of the FIFO (just before `first_order` in
    /// the cycle). The level must already have at least one order; a brand
    /// new level gets its first order self-linked via [`self_link`].
    pub fn append_order(&mut self, orders: &mut Pool<Order>, idx: PoolIdx) {
        let first = self.first_order;
        let tail = orders.get(first).prev;

        orders.get_mut(tail).next = idx;
        {
            let order = orders.get_mut(idx);
            order.prev = tail;
            order.next = first;
        }
        orders.get_mut(first).prev = idx;
    }

    /// Splices `idx` out of the FIFO. Returns `true` when the level is now
    /// empty (the caller must then retire the level itself). The order's
    /// slot is not freed here.
    pub fn unlink_order(&mut self, orders: &mut Pool<Order>, idx: PoolIdx) -> bool {
        let (prev, next) = {
            let order = orders.get(idx);
            (order.prev, order.next)
        };

        if prev == idx {
            // Sole order: the cycle was self-referential.
            debug_assert_eq!(next, idx);
            debug_assert_eq!(self.first_order, idx);
            self.first_order = NULL_IDX;
            return true;
        }

        orders.get_mut(prev).next = next;
        orders.get_mut(next).prev = prev;
        if self.first_order == idx {
            self.first_order = next;
        }

        let order = orders.get_mut(idx);
        order.prev = NULL_IDX;
        order.next = NULL_IDX;
        false
    }

    /// Orders and total quantity at this level, by walking the cycle.
    /// Diagnostic use only.
    pub fn depth(&self, orders: &Pool<Order>) -> (usize, Qty) {
        let mut count = 0usize;
        let mut qty: Qty = 0;
        let mut at = self.first_order;
        if at == NULL_IDX {
            return (0, 0);
        }
        loop {
            let order = orders.get(at);
            count += 1;
            qty += order.qty;
            at = order.next;
            if at == self.first_order {
                break;
            }
        }
        (count, qty)
    }
}

/// Makes a single order the self-linked cycle of a fresh level.
#[inline]
pub fn self_link(orders: &mut Pool<Order>, idx: PoolIdx) {
    let order = orders.get_mut(idx);
    order.prev = idx;
    order.next = idx;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rest(orders: &mut Pool<Order>, coid: OrderId, qty: Qty, priority: Priority) -> PoolIdx {
        orders.alloc(Order {
            ticker_id: 0,
            client_id: 0,
            client_order_id: coid,
            market_order_id: coid,
            side: Side::Buy,
            price: 100,
            qty,
            priority,
            prev: NULL_IDX,
            next: NULL_IDX,
        })
    }

    fn level_with_orders(orders: &mut Pool<Order>, n: u64) -> (Level, Vec<PoolIdx>) {
        let mut handles = Vec::new();
        let first = rest(orders, 0, 10, 1);
        self_link(orders, first);
        handles.push(first);
        let mut level = Level::new(Side::Buy, 100, first);
        for i in 1..n {
            let idx = rest(orders, i, 10, i + 1);
            level.append_order(orders, idx);
            handles.push(idx);
        }
        (level, handles)
    }

    fn walk(level: &Level, orders: &Pool<Order>) -> Vec<OrderId> {
        let mut seen = Vec::new();
        let mut at = level.first_order;
        loop {
            seen.push(orders.get(at).client_order_id);
            at = orders.get(at).next;
            if at == level.first_order {
                break;
            }
        }
        seen
    }

    #[test]
    fn append_keeps_fifo_order() {
        let mut orders: Pool<Order> = Pool::new("orders", 8);
        let (level, _) = level_with_orders(&mut orders, 4);
        assert_eq!(walk(&level, &orders), vec![0, 1, 2, 3]);
        // Tail is reachable from the head in one hop backwards.
        let tail = orders.get(level.first_order).prev;
        assert_eq!(orders.get(tail).client_order_id, 3);
    }

    #[test]
    fn next_priority_is_tail_plus_one() {
        let mut orders: Pool<Order> = Pool::new("orders", 8);
        let (level, _) = level_with_orders(&mut orders, 3);
        assert_eq!(level.next_priority(&orders), 4);
    }

    #[test]
    fn unlink_head_promotes_successor() {
        let mut orders: Pool<Order> = Pool::new("orders", 8);
        let (mut level, handles) = level_with_orders(&mut orders, 3);
        let empty = level.unlink_order(&mut orders, handles[0]);
        assert!(!empty);
        assert_eq!(level.first_order, handles[1]);
        assert_eq!(walk(&level, &orders), vec![1, 2]);
    }

    #[test]
    fn unlink_middle_and_tail() {
        let mut orders: Pool<Order> = Pool::new("orders", 8);
        let (mut level, handles) = level_with_orders(&mut orders, 3);

        assert!(!level.unlink_order(&mut orders, handles[1]));
        assert_eq!(walk(&level, &orders), vec![0, 2]);

        assert!(!level.unlink_order(&mut orders, handles[2]));
        assert_eq!(walk(&level, &orders), vec![0]);
        // Sole survivor is self-linked.
        let only = level.first_order;
        assert_eq!(orders.get(only).prev, only);
        assert_eq!(orders.get(only).next, only);
    }

    #[test]
    fn unlink_last_order_empties_level() {
        let mut orders: Pool<Order> = Pool::new("orders", 4);
        let (mut level, handles) = level_with_orders(&mut orders, 1);
        assert!(level.unlink_order(&mut orders, handles[0]));
        assert_eq!(level.first_order, NULL_IDX);
    }

    #[test]
    fn depth_counts_the_cycle() {
        let mut orders: Pool<Order> = Pool::new("orders", 8);
        let (level, _) = level_with_orders(&mut orders, 4);
        assert_eq!(level.depth(&orders), (4, 40));
    }
}
