//! Byte transport seam.
//!
//! The pipeline only needs two things from the network layer: send a
//! frame, and receive a frame together with the kernel timestamp of when
//! it arrived. Real TCP/UDP multicast wrappers live outside this crate
//! and implement these traits; the in-process [`Loopback`] implementation
//! below backs the integration tests and simulations, riding on the same
//! SPSC ring the rest of the pipeline uses.

use crate::spsc::{Consumer, Producer, SpscQueue};
use crate::types::{now_nanos, Nanos};

/// Largest frame any protocol record needs. Wire records are at most 50
/// bytes; one cache line of payload leaves headroom.
pub const MAX_FRAME_LEN: usize = 64;

/// Non-blocking frame sender. A full transport buffers in its own send
/// path; it never asks the pipeline to wait.
pub trait PacketTx {
    fn send(&mut self, frame: &[u8]);
}

/// Non-blocking frame receiver surfacing a receive timestamp per frame.
pub trait PacketRx {
    /// Copies the next frame into `buf` and returns its length and
    /// receive time, or `None` when nothing is pending.
    fn recv(&mut self, buf: &mut [u8]) -> Option<(usize, Nanos)>;
}

#[derive(Clone, Copy)]
struct Frame {
    len: u16,
    recv_time: Nanos,
    bytes: [u8; MAX_FRAME_LEN],
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            len: 0,
            recv_time: 0,
            bytes: [0; MAX_FRAME_LEN],
        }
    }
}

/// One direction of an in-process link. Frames are timestamped at send,
/// standing in for kernel receive timestamping.
pub struct LoopbackTx {
    inner: Producer<Frame>,
}

pub struct LoopbackRx {
    inner: Consumer<Frame>,
}

/// Creates a connected (tx, rx) pair with room for `capacity` in-flight
/// frames.
pub fn loopback(capacity: usize) -> (LoopbackTx, LoopbackRx) {
    let (tx, rx) = SpscQueue::new(capacity).split();
    (LoopbackTx { inner: tx }, LoopbackRx { inner: rx })
}

impl PacketTx for LoopbackTx {
    fn send(&mut self, frame: &[u8]) {
        assert!(frame.len() <= MAX_FRAME_LEN, "frame exceeds MAX_FRAME_LEN");
        let slot = self.inner.write_slot();
        slot.len = frame.len() as u16;
        slot.recv_time = now_nanos();
        slot.bytes[..frame.len()].copy_from_slice(frame);
        self.inner.commit_write();
    }
}

impl PacketRx for LoopbackRx {
    fn recv(&mut self, buf: &mut [u8]) -> Option<(usize, Nanos)> {
        let frame = self.inner.read_slot()?;
        let len = frame.len as usize;
        let recv_time = frame.recv_time;
        buf[..len].copy_from_slice(&frame.bytes[..len]);
        self.inner.commit_read();
        Some((len, recv_time))
    }
}

impl LoopbackRx {
    /// Frames waiting to be received.
    pub fn pending(&self) -> usize {
        self.inner.len()
    }
}

/// Sink that drops every frame; stands in for an unsubscribed stream.
pub struct NullTx;

impl PacketTx for NullTx {
    fn send(&mut self, _frame: &[u8]) {}
}
