//! Core scalar types, sentinels and capacity constants shared by the
//! exchange and trading sides.
//!
//! All identifiers are plain integer aliases with a reserved INVALID value
//! at the top of their numeric range. Capacity bounds are compile-time
//! constants; every container in the hot path is sized from these at
//! construction and never grows.

use std::time::{SystemTime, UNIX_EPOCH};

/// Client-assigned order id, dense per client from 0.
pub type OrderId = u64;
pub const ORDER_ID_INVALID: OrderId = u64::MAX;

/// Instrument id, dense from 0 up to [`MAX_TICKERS`].
pub type TickerId = u32;
pub const TICKER_ID_INVALID: TickerId = u32::MAX;

/// Trading client id, dense from 0 up to [`MAX_CLIENTS`].
pub type ClientId = u32;
pub const CLIENT_ID_INVALID: ClientId = u32::MAX;

/// Fixed-point price in venue ticks.
pub type Price = i64;
pub const PRICE_INVALID: Price = i64::MAX;

/// Order quantity.
pub type Qty = u32;
pub const QTY_INVALID: Qty = u32::MAX;

/// Position in the FIFO queue among orders with the same side and price.
/// Strictly increasing within a price level.
pub type Priority = u64;
pub const PRIORITY_INVALID: Priority = u64::MAX;

/// Nanosecond timestamp.
pub type Nanos = i64;

pub const NANOS_PER_SEC: Nanos = 1_000_000_000;

/// Wall-clock nanoseconds since the epoch, used for receive timestamps
/// and the snapshot cadence check.
#[inline]
pub fn now_nanos() -> Nanos {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as Nanos)
        .unwrap_or(0)
}

/// Order side. The wire representation is +1 for buy, -1 for sell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum Side {
    Buy = 1,
    Sell = -1,
}

impl Side {
    /// Returns the opposite side.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Dense index for side-keyed arrays (buy = 0, sell = 1).
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }

    /// Wire byte: +1 buy, -1 sell.
    #[inline]
    pub const fn to_wire(self) -> i8 {
        self as i8
    }

    /// Decodes a wire byte; 0 is the reserved "no side" value.
    #[inline]
    pub const fn from_wire(v: i8) -> Option<Self> {
        match v {
            1 => Some(Side::Buy),
            -1 => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Encodes an optional side as its wire byte (0 when absent).
#[inline]
pub const fn side_to_wire(side: Option<Side>) -> i8 {
    match side {
        Some(s) => s.to_wire(),
        None => 0,
    }
}

// ============================================================================
// Capacity constants
// ============================================================================
//
// Every queue, pool and index in the pipeline is sized from these at
// startup. They bound memory and make exhaustion a configuration error
// rather than a runtime condition.

/// Number of listed instruments.
pub const MAX_TICKERS: usize = 8;

/// Number of trading clients the exchange accepts.
pub const MAX_CLIENTS: usize = 64;

/// Client order ids per client form a dense range below this bound; it is
/// also the resting-order capacity of each book's pool.
pub const MAX_ORDER_IDS: usize = 16 * 1024;

/// Distinct live price levels per book. Live prices must hash to distinct
/// `price % MAX_PRICE_LEVELS` slots; see the order book's level index.
pub const MAX_PRICE_LEVELS: usize = 256;

/// Capacity of the client request/response queues.
pub const MAX_CLIENT_UPDATES: usize = 64 * 1024;

/// Capacity of the market update queues.
pub const MAX_MARKET_UPDATES: usize = 64 * 1024;

/// Maximum unprocessed client requests buffered by the sequencer within a
/// single receive round, across all connections.
pub const MAX_PENDING_REQUESTS: usize = 1024;
