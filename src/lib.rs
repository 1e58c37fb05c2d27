//! # nanoex
//!
//! A low-latency electronic trading core: the exchange side accepts
//! client orders over a reliable transport and matches them with strict
//! price-time priority; the trading side consumes the resulting market
//! data with gap detection and snapshot recovery.
//!
//! ## Design principles
//!
//! - **Share nothing**: every stage is one pinned thread that exclusively
//!   owns its state; stages talk only through wait-free SPSC rings
//! - **No hot-path allocation**: orders and levels live in pre-sized
//!   pools and link up through 32-bit handles
//! - **O(1) everything**: best-price access, in-level FIFO ops, cancel
//!   lookup and price-to-level resolution are all constant time
//! - **Crash-fast on invariants**: sizing violations and broken internal
//!   streams panic; protocol garbage from the network is logged and
//!   dropped
//!
//! ## Pipeline
//!
//! ```text
//! clients --TCP--> [order server + sequencer] --> [matching engine]
//!                                                   |          |
//!                            client responses <-----+          +--> [publisher] --> incremental stream
//!                                                                       |
//!                                                                       +--> [snapshot synthesizer] --> snapshot stream
//!
//! trading side:  both streams --> [consumer w/ recovery] --> strategy order book
//! ```

pub mod affinity;
pub mod config;
pub mod engine;
pub mod order_book;
pub mod pool;
pub mod price_level;
pub mod protocol;
pub mod publisher;
pub mod recovery;
pub mod sequencer;
pub mod server;
pub mod snapshot;
pub mod spsc;
pub mod transport;
pub mod types;

pub use config::Config;
pub use engine::MatchingEngine;
pub use order_book::{EventSink, OrderBook};
pub use pool::{Pool, PoolIdx, NULL_IDX};
pub use price_level::{Level, Order};
pub use protocol::{
    ClientRequest, ClientRequestType, ClientResponse, ClientResponseType, MarketUpdate,
    MarketUpdateType, SeqClientRequest, SeqClientResponse, SeqMarketUpdate, WireError,
};
pub use publisher::MarketDataPublisher;
pub use recovery::MarketDataConsumer;
pub use sequencer::FifoSequencer;
pub use server::{ClientConn, OrderServer};
pub use snapshot::SnapshotSynthesizer;
pub use spsc::{Consumer, Producer, SpscQueue};
pub use transport::{loopback, LoopbackRx, LoopbackTx, NullTx, PacketRx, PacketTx, MAX_FRAME_LEN};
pub use types::{ClientId, Nanos, OrderId, Price, Priority, Qty, Side, TickerId};
