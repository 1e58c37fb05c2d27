//! Process configuration.
//!
//! Capacity bounds are compile-time constants in [`crate::types`]; this
//! struct only carries the knobs that differ per deployment: where the
//! streams live, how often snapshots go out, and which cores the pinned
//! loops get. Bootstrap deserializes it from whatever config source the
//! process uses and hands the pieces to the component constructors.

use serde::Deserialize;

use crate::types::{Nanos, NANOS_PER_SEC};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interface the order server listens on.
    pub order_iface: String,
    pub order_port: u16,

    /// Incremental market data multicast group.
    pub incremental_group: String,
    pub incremental_port: u16,

    /// Snapshot multicast group.
    pub snapshot_group: String,
    pub snapshot_port: u16,

    /// Seconds between snapshot cycles.
    pub snapshot_period_secs: u64,

    /// Core pins for the pipeline loops; `None` runs unpinned.
    pub server_core: Option<usize>,
    pub engine_core: Option<usize>,
    pub publisher_core: Option<usize>,
    pub snapshot_core: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            order_iface: "lo".to_string(),
            order_port: 12345,
            incremental_group: "233.252.14.1".to_string(),
            incremental_port: 20000,
            snapshot_group: "233.252.14.3".to_string(),
            snapshot_port: 20001,
            snapshot_period_secs: 60,
            server_core: None,
            engine_core: None,
            publisher_core: None,
            snapshot_core: None,
        }
    }
}

impl Config {
    pub fn snapshot_period_nanos(&self) -> Nanos {
        self.snapshot_period_secs as Nanos * NANOS_PER_SEC
    }
}
