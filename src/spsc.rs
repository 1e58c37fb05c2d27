//! Wait-free single-producer single-consumer ring queue.
//!
//! Every inter-thread hand-off in the pipeline goes through one of these.
//! The backing storage is a block of pre-constructed slots; records are
//! transferred by mutating the next slot in place and then committing, so
//! the steady state moves bytes without allocating or locking.
//!
//! ```text
//! producer:  *tx.write_slot() = record;  tx.commit_write();
//! consumer:  if let Some(r) = rx.read_slot() { use(r); rx.commit_read(); }
//! ```
//!
//! Memory ordering: `commit_write` publishes the slot contents with a
//! Release store on the element counter; `read_slot` observes them with an
//! Acquire load. The write/read cursors themselves are single-owner and
//! need no synchronization.
//!
//! Overrun (committing a write while the ring is full) is a sizing bug,
//! not a runtime condition, and panics. The queue never drops records.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Pads the shared counter to its own cache line so producer and consumer
/// do not false-share with the slot storage.
#[repr(align(64))]
struct CacheAligned<T>(T);

struct Shared<T> {
    slots: Box<[UnsafeCell<T>]>,
    /// Count of committed-but-unread records. The only producer/consumer
    /// shared state.
    len: CacheAligned<AtomicUsize>,
}

// Safety: at most one Producer and one Consumer exist per queue, and a slot
// is only ever accessed by the side that currently owns it (producer up to
// commit_write, consumer after the Acquire load that observed it).
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

/// Fixed-capacity SPSC ring. Construct, then [`split`](Self::split) into
/// the two endpoints and move each to its owning thread.
pub struct SpscQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Default> SpscQueue<T> {
    /// Pre-constructs `capacity` slots. No further allocation occurs.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "spsc capacity must be non-zero");
        let slots: Box<[UnsafeCell<T>]> = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect();
        Self {
            shared: Arc::new(Shared {
                slots,
                len: CacheAligned(AtomicUsize::new(0)),
            }),
        }
    }

    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        (
            Producer {
                shared: Arc::clone(&self.shared),
                write_at: 0,
            },
            Consumer {
                shared: self.shared,
                read_at: 0,
            },
        )
    }
}

/// Write endpoint. `!Clone`; exactly one exists per queue.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    write_at: usize,
}

impl<T> Producer<T> {
    /// Handle to the next write position. Mutate it in place, then call
    /// [`commit_write`](Self::commit_write) to hand it to the consumer.
    ///
    /// Panics if the ring is full: the producer would overtake the
    /// consumer, which only happens when a queue was sized below the burst
    /// it must absorb.
    #[inline]
    pub fn write_slot(&mut self) -> &mut T {
        // Acquire pairs with the consumer's Release in commit_read: once
        // len says the slot is free, the consumer's last read of it has
        // completed.
        assert!(
            self.shared.len.0.load(Ordering::Acquire) < self.shared.slots.len(),
            "spsc overrun: capacity {}",
            self.shared.slots.len()
        );
        // Safety: the slot at write_at is outside the committed window, so
        // the consumer cannot observe it until commit_write below.
        unsafe { &mut *self.shared.slots[self.write_at].get() }
    }

    /// Publishes the slot written via [`write_slot`](Self::write_slot).
    #[inline]
    pub fn commit_write(&mut self) {
        self.write_at = (self.write_at + 1) % self.shared.slots.len();
        self.shared.len.0.fetch_add(1, Ordering::Release);
    }

    /// Copy-in convenience for call sites that already hold the record.
    #[inline]
    pub fn push(&mut self, value: T) {
        *self.write_slot() = value;
        self.commit_write();
    }

    /// Committed records not yet read.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }
}

/// Read endpoint. `!Clone`; exactly one exists per queue.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    read_at: usize,
}

impl<T> Consumer<T> {
    /// Oldest committed record, or `None` when the ring is empty. The
    /// record stays in place until [`commit_read`](Self::commit_read).
    #[inline]
    pub fn read_slot(&self) -> Option<&T> {
        if self.shared.len.0.load(Ordering::Acquire) == 0 {
            return None;
        }
        // Safety: len >= 1 under Acquire means the producer's Release made
        // this slot's contents visible, and the producer will not touch it
        // again until we commit_read past it.
        Some(unsafe { &*self.shared.slots[self.read_at].get() })
    }

    /// Retires the record returned by the last [`read_slot`](Self::read_slot).
    #[inline]
    pub fn commit_read(&mut self) {
        self.read_at = (self.read_at + 1) % self.shared.slots.len();
        let prev = self.shared.len.0.fetch_sub(1, Ordering::Release);
        assert!(prev != 0, "spsc commit_read on empty ring");
    }

    /// Copy-out convenience.
    #[inline]
    pub fn pop(&mut self) -> Option<T>
    where
        T: Copy,
    {
        let value = *self.read_slot()?;
        self.commit_read();
        Some(value)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fifo_order_in_place() {
        let (mut tx, mut rx) = SpscQueue::<u64>::new(4).split();

        for v in 1..=3u64 {
            *tx.write_slot() = v;
            tx.commit_write();
        }
        assert_eq!(rx.len(), 3);

        for expect in 1..=3u64 {
            assert_eq!(rx.read_slot(), Some(&expect));
            rx.commit_read();
        }
        assert!(rx.read_slot().is_none());
    }

    #[test]
    fn wraps_around() {
        let (mut tx, mut rx) = SpscQueue::<u32>::new(2).split();
        for round in 0..10u32 {
            tx.push(round);
            tx.push(round + 100);
            assert_eq!(rx.pop(), Some(round));
            assert_eq!(rx.pop(), Some(round + 100));
        }
        assert!(rx.is_empty());
    }

    #[test]
    #[should_panic(expected = "spsc overrun")]
    fn overrun_is_fatal() {
        let (mut tx, _rx) = SpscQueue::<u8>::new(2).split();
        tx.push(1);
        tx.push(2);
        tx.push(3);
    }

    #[test]
    fn read_slot_does_not_consume() {
        let (mut tx, mut rx) = SpscQueue::<u8>::new(2).split();
        tx.push(7);
        assert_eq!(rx.read_slot(), Some(&7));
        assert_eq!(rx.read_slot(), Some(&7));
        rx.commit_read();
        assert!(rx.read_slot().is_none());
    }

    #[test]
    fn cross_thread_transfer() {
        const N: u64 = 100_000;
        let (mut tx, mut rx) = SpscQueue::<u64>::new(1024).split();

        let producer = thread::spawn(move || {
            for v in 0..N {
                // Spin until a slot frees up; the test ring is tiny.
                while tx.len() == tx.capacity() {
                    std::hint::spin_loop();
                }
                tx.push(v);
            }
        });

        let mut expected = 0u64;
        while expected < N {
            if let Some(&v) = rx.read_slot() {
                assert_eq!(v, expected);
                rx.commit_read();
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
    }
}
