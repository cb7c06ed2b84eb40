//! Cross-core queue: fixed-capacity, lock-free, single-producer /
//! single-consumer ring.
//!
//! The baseband side owns the [`Producer`], the event dispatcher owns the
//! [`Consumer`]. Neither handle is `Clone` and both operate through
//! `&mut self`, so the SPSC discipline is enforced by ownership.
//!
//! Overflow policy is drop-newest: `push` on a full ring hands the value
//! back in [`QueueFull`] and bumps the shared `dropped` counter. The
//! consumer never sees a gap or a reordering.
//!
//! ```text
//!  baseband core                         application core
//!  ┌──────────┐  push   ┌───────────┐  pop   ┌────────────┐
//!  │ Producer │───────▶│   ring    │──────▶│  Consumer  │
//!  └──────────┘        └───────────┘        └────────────┘
//!        │ head (Release)       ▲ tail (Release)
//!        └── QueueProbe::is_empty (interrupt bridge)
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Returned by [`Producer::push`] when the ring is full; carries the
/// rejected value.
pub struct QueueFull<T>(pub T);

impl<T> QueueFull<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueFull(..)")
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cross-core queue full")
    }
}

impl<T> std::error::Error for QueueFull<T> {}

// ---------------------------------------------------------------------------
// Ring storage
// ---------------------------------------------------------------------------

struct Ring<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Total values ever pushed. Written only by the producer.
    head: AtomicUsize,
    /// Total values ever popped. Written only by the consumer.
    tail: AtomicUsize,
    dropped: AtomicU64,
}

// SAFETY: a slot is accessed by at most one side at a time. The producer
// only writes slot `head % cap` while `head - tail < cap`, the consumer
// only reads slot `tail % cap` while `tail != head`, and each side publishes
// its index with Release after touching the slot.
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "cross-core queue capacity must be non-zero");
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ring {
            slots,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Occupancy as seen from any thread. `tail` is read first so it can
    /// never be ahead of the `head` it is compared with; the result may
    /// still be stale and is capped at the capacity.
    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail).min(self.capacity())
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let mut tail = *self.tail.get_mut();
        while tail != head {
            let slot = &mut self.slots[tail % self.slots.len()];
            // SAFETY: every slot in tail..head holds an initialized value
            // that was never popped.
            unsafe { slot.get_mut().assume_init_drop() };
            tail = tail.wrapping_add(1);
        }
    }
}

/// Create a queue holding at most `capacity` values.
///
/// # Panics
/// If `capacity` is zero.
pub fn channel<T: Send>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let ring = Arc::new(Ring::with_capacity(capacity));
    (
        Producer {
            ring: Arc::clone(&ring),
        },
        Consumer { ring },
    )
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

/// Write end. Lives on the baseband side.
pub struct Producer<T> {
    ring: Arc<Ring<T>>,
}

impl<T: Send> Producer<T> {
    /// Enqueue without blocking. On a full ring the value is handed back.
    pub fn push(&mut self, value: T) -> Result<(), QueueFull<T>> {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);
        let tail = ring.tail.load(Ordering::Acquire);

        if head.wrapping_sub(tail) >= ring.capacity() {
            ring.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(QueueFull(value));
        }

        let slot = &ring.slots[head % ring.capacity()];
        // SAFETY: sole producer; the slot is outside tail..head so the
        // consumer does not touch it until `head` is published below.
        unsafe { (*slot.get()).write(value) };
        ring.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Read-only view for the interrupt bridge.
    pub fn probe(&self) -> QueueProbe<T> {
        QueueProbe {
            ring: Arc::clone(&self.ring),
        }
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.ring.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Values rejected because the ring was full.
    pub fn dropped(&self) -> u64 {
        self.ring.dropped.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Read end. Drained only by the event dispatcher.
pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
}

impl<T: Send> Consumer<T> {
    pub fn pop(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);
        let head = ring.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let slot = &ring.slots[tail % ring.capacity()];
        // SAFETY: sole consumer; the slot is inside tail..head, so the
        // producer initialized it and will not write it again until
        // `tail` is published below.
        let value = unsafe { (*slot.get()).assume_init_read() };
        ring.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Pop until empty, in FIFO order. Returns the number handled.
    ///
    /// Values pushed while draining are handled in the same call.
    pub fn drain(&mut self, mut handler: impl FnMut(T)) -> usize {
        let mut n = 0;
        while let Some(value) = self.pop() {
            handler(value);
            n += 1;
        }
        n
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn dropped(&self) -> u64 {
        self.ring.dropped.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Occupancy view that neither pushes nor pops. Safe to poll from
/// interrupt context.
pub struct QueueProbe<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Clone for QueueProbe<T> {
    fn clone(&self) -> Self {
        QueueProbe {
            ring: Arc::clone(&self.ring),
        }
    }
}

impl<T> QueueProbe<T> {
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let (tx, mut rx) = channel::<u32>(4);
        assert!(tx.is_empty());
        assert!(rx.is_empty());
        assert_eq!(rx.pop(), None);
        assert_eq!(tx.capacity(), 4);
    }

    #[test]
    fn test_fifo_ordering() {
        let (mut tx, mut rx) = channel(8);
        for i in 0..5 {
            tx.push(i).unwrap();
        }
        assert_eq!(rx.len(), 5);
        let mut seen = Vec::new();
        assert_eq!(rx.drain(|v| seen.push(v)), 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_full_drops_newest() {
        let (mut tx, mut rx) = channel(2);
        tx.push("a").unwrap();
        tx.push("b").unwrap();
        assert!(tx.is_full());

        let rejected = tx.push("c").unwrap_err();
        assert_eq!(rejected.into_inner(), "c");
        assert_eq!(tx.dropped(), 1);
        assert_eq!(rx.dropped(), 1);

        // Oldest values are kept, in order.
        assert_eq!(rx.pop(), Some("a"));
        assert_eq!(rx.pop(), Some("b"));
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn test_wraparound() {
        let (mut tx, mut rx) = channel(3);
        for round in 0..10 {
            tx.push(round * 2).unwrap();
            tx.push(round * 2 + 1).unwrap();
            assert_eq!(rx.pop(), Some(round * 2));
            assert_eq!(rx.pop(), Some(round * 2 + 1));
        }
        assert!(rx.is_empty());
        assert_eq!(tx.dropped(), 0);
    }

    #[test]
    fn test_probe_tracks_occupancy() {
        let (mut tx, mut rx) = channel(4);
        let probe = tx.probe();
        assert!(probe.is_empty());
        tx.push(1u8).unwrap();
        assert_eq!(probe.len(), 1);
        rx.pop();
        assert!(probe.is_empty());
    }

    #[test]
    fn test_pending_values_dropped_with_queue() {
        let marker = Arc::new(());
        {
            let (mut tx, _rx) = channel(4);
            tx.push(Arc::clone(&marker)).unwrap();
            tx.push(Arc::clone(&marker)).unwrap();
            assert_eq!(Arc::strong_count(&marker), 3);
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_cross_thread_order_preserved() {
        let (mut tx, mut rx) = channel::<u32>(16);
        let producer = std::thread::spawn(move || {
            let mut sent = 0u32;
            while sent < 10_000 {
                if tx.push(sent).is_ok() {
                    sent += 1;
                } else {
                    std::thread::yield_now();
                }
            }
        });

        let mut expected = 0u32;
        while expected < 10_000 {
            match rx.pop() {
                Some(v) => {
                    assert_eq!(v, expected);
                    expected += 1;
                }
                None => std::thread::yield_now(),
            }
        }
        producer.join().unwrap();
    }

    #[test]
    fn test_probe_len_bounded_under_contention() {
        use std::sync::atomic::AtomicBool;

        let (mut tx, mut rx) = channel::<u32>(4);
        let probe = tx.probe();
        let done = Arc::new(AtomicBool::new(false));

        let observer = {
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut max_seen = 0;
                while !done.load(Ordering::Relaxed) {
                    max_seen = max_seen.max(probe.len());
                    std::thread::yield_now();
                }
                max_seen
            })
        };
        let consumer = {
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut popped = 0u32;
                while popped < 20_000 {
                    match rx.pop() {
                        Some(_) => popped += 1,
                        None => std::thread::yield_now(),
                    }
                }
                done.store(true, Ordering::Relaxed);
            })
        };

        let mut sent = 0u32;
        while sent < 20_000 {
            if tx.push(sent).is_ok() {
                sent += 1;
            } else {
                std::thread::yield_now();
            }
        }
        consumer.join().unwrap();
        assert!(observer.join().unwrap() <= 4);
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn test_zero_capacity_rejected() {
        let _ = channel::<u8>(0);
    }
}
