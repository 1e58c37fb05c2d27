//! Matching engine: single-threaded loop that owns every order book.
//!
//! Drains the sequenced client-request queue one record at a time and
//! dispatches into the per-instrument book. Everything a book produces is
//! copied into two outbound rings, one toward the order server (client
//! responses) and one toward the market data publisher (market updates).
//! The loop never blocks; an empty input queue is a spin.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::affinity;
use crate::order_book::{EventSink, OrderBook};
use crate::protocol::{ClientRequest, ClientRequestType, ClientResponse, MarketUpdate};
use crate::spsc::{Consumer, Producer};
use crate::types::{OrderId, MAX_TICKERS};

/// Sink wiring book emissions into the outbound queues. Also owns the
/// exchange-wide market order id sequence, so ids are unique across all
/// instruments.
struct QueueSink<'a> {
    responses: &'a mut Producer<ClientResponse>,
    updates: &'a mut Producer<MarketUpdate>,
    next_market_order_id: &'a mut OrderId,
}

impl EventSink for QueueSink<'_> {
    #[inline]
    fn client_response(&mut self, response: &ClientResponse) {
        self.responses.push(*response);
    }

    #[inline]
    fn market_update(&mut self, update: &MarketUpdate) {
        self.updates.push(*update);
    }

    #[inline]
    fn next_market_order_id(&mut self) -> OrderId {
        let id = *self.next_market_order_id;
        *self.next_market_order_id += 1;
        id
    }
}

pub struct MatchingEngine {
    books: Vec<OrderBook>,
    requests: Consumer<ClientRequest>,
    responses: Producer<ClientResponse>,
    updates: Producer<MarketUpdate>,
    next_market_order_id: OrderId,
}

impl MatchingEngine {
    pub fn new(
        requests: Consumer<ClientRequest>,
        responses: Producer<ClientResponse>,
        updates: Producer<MarketUpdate>,
    ) -> Self {
        Self {
            books: (0..MAX_TICKERS as u32).map(OrderBook::new).collect(),
            requests,
            responses,
            updates,
            next_market_order_id: 1,
        }
    }

    /// Dispatches one request into its instrument's book. An invalid
    /// request type past the order server means broken wiring and panics.
    pub fn process(&mut self, request: &ClientRequest) {
        let book = &mut self.books[request.ticker_id as usize];
        let mut sink = QueueSink {
            responses: &mut self.responses,
            updates: &mut self.updates,
            next_market_order_id: &mut self.next_market_order_id,
        };
        match request.req_type {
            ClientRequestType::New => book.add_order(
                &mut sink,
                request.client_id,
                request.order_id,
                request.side,
                request.price,
                request.qty,
            ),
            ClientRequestType::Cancel => {
                book.cancel_order(&mut sink, request.client_id, request.order_id)
            }
            ClientRequestType::Invalid => {
                panic!("matching engine received invalid request type")
            }
        }
    }

    /// Drains whatever is queued right now. Returns the number of
    /// requests processed.
    pub fn poll(&mut self) -> usize {
        let mut processed = 0;
        while let Some(request) = self.requests.read_slot() {
            let request = *request;
            self.process(&request);
            self.requests.commit_read();
            processed += 1;
        }
        processed
    }

    /// Main loop: process to quiescence, then spin on the ingress queue.
    pub fn run(&mut self, running: &AtomicBool, core: Option<usize>) {
        if let Some(core) = core {
            affinity::pin_to_core(core);
        }
        info!("matching engine loop starting");
        while running.load(Ordering::Acquire) {
            if self.poll() == 0 {
                std::hint::spin_loop();
            }
        }
        info!("matching engine loop stopped");
    }

    /// Read access for tests and diagnostics.
    pub fn book(&self, ticker_id: usize) -> &OrderBook {
        &self.books[ticker_id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClientResponseType, MarketUpdateType};
    use crate::spsc::SpscQueue;
    use crate::types::Side;

    struct Harness {
        engine: MatchingEngine,
        requests: Producer<ClientRequest>,
        responses: Consumer<ClientResponse>,
        updates: Consumer<MarketUpdate>,
    }

    fn harness() -> Harness {
        let (req_tx, req_rx) = SpscQueue::new(64).split();
        let (resp_tx, resp_rx) = SpscQueue::new(64).split();
        let (upd_tx, upd_rx) = SpscQueue::new(64).split();
        Harness {
            engine: MatchingEngine::new(req_rx, resp_tx, upd_tx),
            requests: req_tx,
            responses: resp_rx,
            updates: upd_rx,
        }
    }

    fn new_order(client: u32, coid: u64, side: Side, price: i64, qty: u32) -> ClientRequest {
        ClientRequest {
            req_type: ClientRequestType::New,
            client_id: client,
            ticker_id: 0,
            order_id: coid,
            side,
            price,
            qty,
        }
    }

    #[test]
    fn drains_queue_and_emits_on_both_rings() {
        let mut h = harness();
        h.requests.push(new_order(0, 1, Side::Buy, 100, 10));
        h.requests.push(new_order(1, 1, Side::Sell, 100, 10));

        assert_eq!(h.engine.poll(), 2);

        let mut resp_kinds = Vec::new();
        while let Some(r) = h.responses.pop() {
            resp_kinds.push((r.resp_type, r.client_id));
        }
        assert_eq!(
            resp_kinds,
            vec![
                (ClientResponseType::Accepted, 0),
                (ClientResponseType::Accepted, 1),
                (ClientResponseType::Filled, 1),
                (ClientResponseType::Filled, 0),
            ]
        );

        let mut update_kinds = Vec::new();
        while let Some(u) = h.updates.pop() {
            update_kinds.push(u.kind);
        }
        assert_eq!(
            update_kinds,
            vec![
                MarketUpdateType::Add,
                MarketUpdateType::Trade,
                MarketUpdateType::Cancel,
            ]
        );
        assert!(h.engine.book(0).is_empty());
    }

    #[test]
    fn market_order_ids_are_unique_across_books() {
        let mut h = harness();
        let mut on_ticker = new_order(0, 1, Side::Buy, 100, 1);
        h.requests.push(on_ticker);
        on_ticker.ticker_id = 1;
        on_ticker.order_id = 2;
        h.requests.push(on_ticker);
        h.engine.poll();

        let first = h.responses.pop().unwrap();
        let second = h.responses.pop().unwrap();
        assert_eq!(first.market_order_id, 1);
        assert_eq!(second.market_order_id, 2);
    }

    #[test]
    #[should_panic(expected = "invalid request type")]
    fn invalid_request_type_is_fatal() {
        let mut h = harness();
        let mut bad = ClientRequest::default();
        bad.ticker_id = 0;
        h.engine.process(&bad);
    }
}
