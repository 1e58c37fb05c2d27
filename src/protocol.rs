//! Wire protocol records.
//!
//! Three record families cross process boundaries:
//!
//! - `ClientRequest`  - client -> exchange over TCP, framed with a
//!   per-client sequence number
//! - `ClientResponse` - exchange -> client over TCP, framed with a
//!   per-client sequence number
//! - `MarketUpdate`   - exchange -> world over UDP multicast, framed with
//!   the stream sequence number (incremental or snapshot)
//!
//! All encodings are packed little-endian with fixed sizes; a record never
//! spans a frame boundary. The codec is field-by-field (no transmutes), so
//! a malformed byte surfaces as a [`WireError`] instead of undefined book
//! state.

use thiserror::Error;

use crate::types::{
    side_to_wire, ClientId, OrderId, Price, Priority, Qty, Side, TickerId, CLIENT_ID_INVALID,
    ORDER_ID_INVALID, PRICE_INVALID, PRIORITY_INVALID, QTY_INVALID, TICKER_ID_INVALID,
};

/// Decoding failures. These are protocol errors: the caller logs and drops
/// the offending record, nothing halts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("frame too short: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
    #[error("unknown client request type {0}")]
    UnknownRequestType(u8),
    #[error("unknown client response type {0}")]
    UnknownResponseType(u8),
    #[error("unknown market update type {0}")]
    UnknownUpdateType(u8),
    #[error("invalid side byte {0}")]
    BadSide(i8),
}

// ============================================================================
// Little-endian cursor helpers
// ============================================================================

struct Writer<'a> {
    buf: &'a mut [u8],
    at: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, at: 0 }
    }

    #[inline]
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.at..self.at + bytes.len()].copy_from_slice(bytes);
        self.at += bytes.len();
    }

    #[inline]
    fn u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    #[inline]
    fn i8(&mut self, v: i8) {
        self.put(&[v as u8]);
    }

    #[inline]
    fn u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    #[inline]
    fn u64(&mut self, v: u64) {
        self.put(&v.to_le_bytes());
    }

    #[inline]
    fn i64(&mut self, v: i64) {
        self.put(&v.to_le_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], need: usize) -> Result<Self, WireError> {
        if buf.len() < need {
            return Err(WireError::Truncated {
                need,
                got: buf.len(),
            });
        }
        Ok(Self { buf, at: 0 })
    }

    #[inline]
    fn u8(&mut self) -> u8 {
        let v = self.buf[self.at];
        self.at += 1;
        v
    }

    #[inline]
    fn i8(&mut self) -> i8 {
        self.u8() as i8
    }

    #[inline]
    fn u32(&mut self) -> u32 {
        let v = u32::from_le_bytes(self.buf[self.at..self.at + 4].try_into().unwrap());
        self.at += 4;
        v
    }

    #[inline]
    fn u64(&mut self) -> u64 {
        let v = u64::from_le_bytes(self.buf[self.at..self.at + 8].try_into().unwrap());
        self.at += 8;
        v
    }

    #[inline]
    fn i64(&mut self) -> i64 {
        let v = i64::from_le_bytes(self.buf[self.at..self.at + 8].try_into().unwrap());
        self.at += 8;
        v
    }

    #[inline]
    fn side(&mut self) -> Result<Side, WireError> {
        let raw = self.i8();
        Side::from_wire(raw).ok_or(WireError::BadSide(raw))
    }

    #[inline]
    fn opt_side(&mut self) -> Result<Option<Side>, WireError> {
        let raw = self.i8();
        match raw {
            0 => Ok(None),
            _ => Side::from_wire(raw).map(Some).ok_or(WireError::BadSide(raw)),
        }
    }
}

// ============================================================================
// Client request
// ============================================================================

/// Action requested by a trading client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientRequestType {
    /// Reserved zero value; reaching the matcher with it is fatal.
    #[default]
    Invalid = 0,
    New = 1,
    Cancel = 2,
}

impl ClientRequestType {
    fn from_wire(v: u8) -> Result<Self, WireError> {
        match v {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::New),
            2 => Ok(Self::Cancel),
            other => Err(WireError::UnknownRequestType(other)),
        }
    }
}

/// Order request as consumed by the matching engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientRequest {
    pub req_type: ClientRequestType,
    pub client_id: ClientId,
    pub ticker_id: TickerId,
    /// Client-assigned order id.
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
}

impl Default for ClientRequest {
    fn default() -> Self {
        Self {
            req_type: ClientRequestType::Invalid,
            client_id: CLIENT_ID_INVALID,
            ticker_id: TICKER_ID_INVALID,
            order_id: ORDER_ID_INVALID,
            side: Side::Buy,
            price: PRICE_INVALID,
            qty: QTY_INVALID,
        }
    }
}

/// A client request framed with its per-client sequence number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeqClientRequest {
    pub seq: u64,
    pub request: ClientRequest,
}

impl SeqClientRequest {
    /// seq(8) type(1) client(4) ticker(4) oid(8) side(1) price(8) qty(4)
    pub const ENCODED_LEN: usize = 38;

    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(&mut buf[..Self::ENCODED_LEN]);
        w.u64(self.seq);
        w.u8(self.request.req_type as u8);
        w.u32(self.request.client_id);
        w.u32(self.request.ticker_id);
        w.u64(self.request.order_id);
        w.i8(self.request.side.to_wire());
        w.i64(self.request.price);
        w.u32(self.request.qty);
        Self::ENCODED_LEN
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(buf, Self::ENCODED_LEN)?;
        let seq = r.u64();
        let req_type = ClientRequestType::from_wire(r.u8())?;
        let client_id = r.u32();
        let ticker_id = r.u32();
        let order_id = r.u64();
        let side = r.side()?;
        let price = r.i64();
        let qty = r.u32();
        Ok(Self {
            seq,
            request: ClientRequest {
                req_type,
                client_id,
                ticker_id,
                order_id,
                side,
                price,
                qty,
            },
        })
    }
}

// ============================================================================
// Client response
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientResponseType {
    #[default]
    Invalid = 0,
    Accepted = 1,
    Canceled = 2,
    Filled = 3,
    CancelRejected = 4,
}

impl ClientResponseType {
    fn from_wire(v: u8) -> Result<Self, WireError> {
        match v {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::Accepted),
            2 => Ok(Self::Canceled),
            3 => Ok(Self::Filled),
            4 => Ok(Self::CancelRejected),
            other => Err(WireError::UnknownResponseType(other)),
        }
    }
}

/// Execution report sent back to the owning client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientResponse {
    pub resp_type: ClientResponseType,
    pub client_id: ClientId,
    pub ticker_id: TickerId,
    pub client_order_id: OrderId,
    pub market_order_id: OrderId,
    /// Absent on a cancel reject, where no order attributes are known.
    pub side: Option<Side>,
    pub price: Price,
    pub exec_qty: Qty,
    pub leaves_qty: Qty,
}

impl Default for ClientResponse {
    fn default() -> Self {
        Self {
            resp_type: ClientResponseType::Invalid,
            client_id: CLIENT_ID_INVALID,
            ticker_id: TICKER_ID_INVALID,
            client_order_id: ORDER_ID_INVALID,
            market_order_id: ORDER_ID_INVALID,
            side: None,
            price: PRICE_INVALID,
            exec_qty: QTY_INVALID,
            leaves_qty: QTY_INVALID,
        }
    }
}

/// A client response framed with its per-client sequence number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeqClientResponse {
    pub seq: u64,
    pub response: ClientResponse,
}

impl SeqClientResponse {
    /// seq(8) type(1) client(4) ticker(4) coid(8) moid(8) side(1) price(8)
    /// exec(4) leaves(4)
    pub const ENCODED_LEN: usize = 50;

    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(&mut buf[..Self::ENCODED_LEN]);
        w.u64(self.seq);
        w.u8(self.response.resp_type as u8);
        w.u32(self.response.client_id);
        w.u32(self.response.ticker_id);
        w.u64(self.response.client_order_id);
        w.u64(self.response.market_order_id);
        w.i8(side_to_wire(self.response.side));
        w.i64(self.response.price);
        w.u32(self.response.exec_qty);
        w.u32(self.response.leaves_qty);
        Self::ENCODED_LEN
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(buf, Self::ENCODED_LEN)?;
        let seq = r.u64();
        let resp_type = ClientResponseType::from_wire(r.u8())?;
        let client_id = r.u32();
        let ticker_id = r.u32();
        let client_order_id = r.u64();
        let market_order_id = r.u64();
        let side = r.opt_side()?;
        let price = r.i64();
        let exec_qty = r.u32();
        let leaves_qty = r.u32();
        Ok(Self {
            seq,
            response: ClientResponse {
                resp_type,
                client_id,
                ticker_id,
                client_order_id,
                market_order_id,
                side,
                price,
                exec_qty,
                leaves_qty,
            },
        })
    }
}

// ============================================================================
// Market update
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum MarketUpdateType {
    #[default]
    Invalid = 0,
    /// Drop all resting state for the ticker (snapshot stream only).
    Clear = 1,
    Add = 2,
    Modify = 3,
    Cancel = 4,
    Trade = 5,
    SnapshotStart = 6,
    SnapshotEnd = 7,
}

impl MarketUpdateType {
    fn from_wire(v: u8) -> Result<Self, WireError> {
        match v {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::Clear),
            2 => Ok(Self::Add),
            3 => Ok(Self::Modify),
            4 => Ok(Self::Cancel),
            5 => Ok(Self::Trade),
            6 => Ok(Self::SnapshotStart),
            7 => Ok(Self::SnapshotEnd),
            other => Err(WireError::UnknownUpdateType(other)),
        }
    }
}

/// One event on the public market data feed.
///
/// `market_order_id` doubles as the incremental-stream cursor on
/// `SnapshotStart` / `SnapshotEnd` records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarketUpdate {
    pub kind: MarketUpdateType,
    pub market_order_id: OrderId,
    pub ticker_id: TickerId,
    pub side: Option<Side>,
    pub price: Price,
    pub qty: Qty,
    pub priority: Priority,
}

impl Default for MarketUpdate {
    fn default() -> Self {
        Self {
            kind: MarketUpdateType::Invalid,
            market_order_id: ORDER_ID_INVALID,
            ticker_id: TICKER_ID_INVALID,
            side: None,
            price: PRICE_INVALID,
            qty: QTY_INVALID,
            priority: PRIORITY_INVALID,
        }
    }
}

/// A market update framed with its stream sequence number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeqMarketUpdate {
    pub seq: u64,
    pub update: MarketUpdate,
}

impl SeqMarketUpdate {
    /// seq(8) type(1) moid(8) ticker(4) side(1) price(8) qty(4) priority(8)
    pub const ENCODED_LEN: usize = 42;

    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(&mut buf[..Self::ENCODED_LEN]);
        w.u64(self.seq);
        w.u8(self.update.kind as u8);
        w.u64(self.update.market_order_id);
        w.u32(self.update.ticker_id);
        w.i8(side_to_wire(self.update.side));
        w.i64(self.update.price);
        w.u32(self.update.qty);
        w.u64(self.update.priority);
        Self::ENCODED_LEN
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(buf, Self::ENCODED_LEN)?;
        let seq = r.u64();
        let kind = MarketUpdateType::from_wire(r.u8())?;
        let market_order_id = r.u64();
        let ticker_id = r.u32();
        let side = r.opt_side()?;
        let price = r.i64();
        let qty = r.u32();
        let priority = r.u64();
        Ok(Self {
            seq,
            update: MarketUpdate {
                kind,
                market_order_id,
                ticker_id,
                side,
                price,
                qty,
                priority,
            },
        })
    }
}
