//! Bounded single-producer/single-consumer queue between two contexts.
//!
//! # Index Scheme
//!
//! Capacity is a power of two `N = 2^k`. Each side owns a binary index
//! `k + 1` bits wide; the low `k` bits address a slot and the top bit counts
//! laps. Indices are published Gray-coded, so successive published values
//! differ in exactly one bit, and the other side only ever looks at its
//! synchronized (two steps old or newer) copy:
//!
//! - **Empty** (consumer side): own index equals the observed producer index.
//! - **Full** (producer side): own index and the observed consumer index differ
//!   only in the top bit, i.e. the producer is exactly one lap ahead.
//!
//! A stale observation can only make the producer think the queue is fuller,
//! or the consumer think it is emptier, than it really is. Neither side can
//! overwrite unread data or read unwritten data.
//!
//! # Ordering
//!
//! Slot writes happen before the `Release` store of the producer index; the
//! consumer samples that index with `Acquire` before touching the slot. The
//! same pairing protects slot reuse in the other direction.
//!
//! # Flow Control
//!
//! [`Producer::write`] into a full queue is a silent no-op returning `false`.
//! [`Consumer::read`] on an empty queue returns `None`.

use crate::relay::Synchronizer;
use crate::storage::{dual_port, Port};
use crate::{FifoError, MAX_CAPACITY, SETTLE_STEPS};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::trace;

fn to_gray(bin: u32) -> u32 {
    bin ^ (bin >> 1)
}

fn from_gray(gray: u32) -> u32 {
    let mut bin = gray;
    let mut shift = gray >> 1;
    while shift != 0 {
        bin ^= shift;
        shift >>= 1;
    }
    bin
}

/// Published indices, one writer each.
#[derive(Debug, Default)]
struct Indices {
    write_gray: AtomicU32,
    read_gray: AtomicU32,
}

/// Create a queue of `capacity` words and split it into its two ends.
///
/// # Errors
/// Returns [`FifoError`] if `capacity` is zero, not a power of two, or larger
/// than [`MAX_CAPACITY`].
pub fn channel(capacity: usize) -> Result<(Producer, Consumer), FifoError> {
    if capacity == 0 {
        return Err(FifoError::ZeroCapacity);
    }
    if !capacity.is_power_of_two() {
        return Err(FifoError::CapacityNotPowerOfTwo(capacity));
    }
    if capacity > MAX_CAPACITY {
        return Err(FifoError::CapacityTooLarge(capacity));
    }

    let (write_port, read_port) = dual_port(capacity);
    let indices = Arc::new(Indices::default());
    let geometry = Geometry::new(capacity);

    Ok((
        Producer {
            port: write_port,
            indices: indices.clone(),
            geometry,
            write_bin: 0,
            read_sync: Synchronizer::new(0),
        },
        Consumer {
            port: read_port,
            indices,
            geometry,
            read_bin: 0,
            write_sync: Synchronizer::new(0),
        },
    ))
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    /// Slot count, also the value of the lap bit
    capacity: u32,
    /// Mask over the full `k + 1`-bit index
    index_mask: u32,
}

impl Geometry {
    fn new(capacity: usize) -> Self {
        let capacity = capacity as u32;
        Self {
            capacity,
            index_mask: (capacity << 1).wrapping_sub(1),
        }
    }

    fn slot(&self, index: u32) -> usize {
        (index & (self.capacity - 1)) as usize
    }

    fn next(&self, index: u32) -> u32 {
        index.wrapping_add(1) & self.index_mask
    }

    fn occupancy(&self, write: u32, read: u32) -> usize {
        (write.wrapping_sub(read) & self.index_mask) as usize
    }
}

fn publish(target: &AtomicU32, previous: u32, next: u32) {
    let gray = to_gray(next);
    debug_assert!(
        (to_gray(previous) ^ gray).count_ones() == 1,
        "published index must change by exactly one bit"
    );
    target.store(gray, Ordering::Release);
}

// =============================================================================
// Producer
// =============================================================================

/// Writing end, owned by the producer context.
#[derive(Debug)]
pub struct Producer {
    port: Port,
    indices: Arc<Indices>,
    geometry: Geometry,
    write_bin: u32,
    /// Gray-coded consumer index as seen from this context
    read_sync: Synchronizer<u32>,
}

impl Producer {
    /// Append `word`. Returns `false` and stores nothing if the queue is full.
    pub fn write(&mut self, word: u32) -> bool {
        if self.is_full() {
            trace!(word, "queue full, word dropped");
            return false;
        }

        self.port.write(self.geometry.slot(self.write_bin), word);
        let next = self.geometry.next(self.write_bin);
        publish(&self.indices.write_gray, self.write_bin, next);
        self.write_bin = next;
        true
    }

    /// Whether the slot the next write would land on is still unread, as far
    /// as this context can currently tell.
    pub fn is_full(&self) -> bool {
        let read_bin = from_gray(self.read_sync.value());
        (self.write_bin ^ read_bin) == self.geometry.capacity
    }

    /// Advance the relay carrying the consumer index by one producer step.
    pub fn tick(&mut self) {
        let observed = self.indices.read_gray.load(Ordering::Acquire);
        self.read_sync.step(observed);
    }

    /// Tick until everything the consumer has published is visible here.
    pub fn settle(&mut self) {
        for _ in 0..SETTLE_STEPS {
            self.tick();
        }
    }

    /// Words queued, as far as this context can currently tell (an upper bound).
    pub fn occupancy(&self) -> usize {
        let read_bin = from_gray(self.read_sync.value());
        self.geometry.occupancy(self.write_bin, read_bin)
    }

    /// Return to the power-on state: index zero, nothing observed.
    ///
    /// Must be applied together with [`Consumer::reset`] while both contexts
    /// are held in reset.
    pub fn reset(&mut self) {
        self.write_bin = 0;
        self.indices.write_gray.store(0, Ordering::Release);
        self.read_sync.force(0);
    }

    /// Slot count.
    pub fn capacity(&self) -> usize {
        self.geometry.capacity as usize
    }
}

// =============================================================================
// Consumer
// =============================================================================

/// Reading end, owned by the consumer context.
#[derive(Debug)]
pub struct Consumer {
    port: Port,
    indices: Arc<Indices>,
    geometry: Geometry,
    read_bin: u32,
    /// Gray-coded producer index as seen from this context
    write_sync: Synchronizer<u32>,
}

impl Consumer {
    /// Take the oldest word, or `None` if the queue looks empty from here.
    pub fn read(&mut self) -> Option<u32> {
        if self.is_empty() {
            return None;
        }

        let word = self.port.read(self.geometry.slot(self.read_bin));
        let next = self.geometry.next(self.read_bin);
        publish(&self.indices.read_gray, self.read_bin, next);
        self.read_bin = next;
        Some(word)
    }

    /// Whether both indices, as known in this context, are bit-for-bit equal.
    pub fn is_empty(&self) -> bool {
        to_gray(self.read_bin) == self.write_sync.value()
    }

    /// Advance the relay carrying the producer index by one consumer step.
    pub fn tick(&mut self) {
        let observed = self.indices.write_gray.load(Ordering::Acquire);
        self.write_sync.step(observed);
    }

    /// Tick until everything the producer has published is visible here.
    pub fn settle(&mut self) {
        for _ in 0..SETTLE_STEPS {
            self.tick();
        }
    }

    /// Words available, as far as this context can currently tell (a lower bound).
    pub fn occupancy(&self) -> usize {
        let write_bin = from_gray(self.write_sync.value());
        self.geometry.occupancy(write_bin, self.read_bin)
    }

    /// Return to the power-on state. See [`Producer::reset`].
    pub fn reset(&mut self) {
        self.read_bin = 0;
        self.indices.read_gray.store(0, Ordering::Release);
        self.write_sync.force(0);
    }

    /// Slot count.
    pub fn capacity(&self) -> usize {
        self.geometry.capacity as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_gray_roundtrip_is_unit_distance() {
        for bin in 0u32..1024 {
            assert_eq!(from_gray(to_gray(bin)), bin);
            let step = to_gray(bin) ^ to_gray(bin + 1);
            assert_eq!(step.count_ones(), 1);
        }
    }

    #[test]
    fn test_capacity_validation() {
        assert_eq!(channel(0).unwrap_err(), FifoError::ZeroCapacity);
        assert_eq!(
            channel(12).unwrap_err(),
            FifoError::CapacityNotPowerOfTwo(12)
        );
        assert_eq!(
            channel(MAX_CAPACITY * 2).unwrap_err(),
            FifoError::CapacityTooLarge(MAX_CAPACITY * 2)
        );
        assert!(channel(1).is_ok());
    }

    #[test]
    fn test_starts_empty_not_full() {
        let (producer, consumer) = channel(8).unwrap();
        assert!(consumer.is_empty());
        assert!(!producer.is_full());
        assert_eq!(producer.occupancy(), 0);
    }

    #[test]
    fn test_write_invisible_until_settled() {
        let (mut producer, mut consumer) = channel(8).unwrap();
        assert!(producer.write(1));

        consumer.tick();
        assert!(consumer.is_empty());
        consumer.tick();
        assert!(!consumer.is_empty());
        assert_eq!(consumer.read(), Some(1));
        assert_eq!(consumer.read(), None);
    }

    #[test]
    fn test_full_after_capacity_writes_and_extra_write_is_noop() {
        let capacity = 8;
        let (mut producer, mut consumer) = channel(capacity).unwrap();

        for word in 0..capacity as u32 {
            assert!(producer.write(100 + word));
        }
        assert!(producer.is_full());
        assert_eq!(producer.occupancy(), capacity);

        // Overflow is silently dropped
        assert!(!producer.write(999));

        consumer.settle();
        let drained: Vec<u32> = std::iter::from_fn(|| consumer.read()).collect();
        assert_eq!(drained, (100..100 + capacity as u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_full_clears_only_after_consumer_index_relayed() {
        let (mut producer, mut consumer) = channel(4).unwrap();
        for word in 0..4 {
            producer.write(word);
        }
        consumer.settle();
        assert_eq!(consumer.read(), Some(0));

        assert!(producer.is_full());
        producer.tick();
        assert!(producer.is_full());
        producer.tick();
        assert!(!producer.is_full());
        assert!(producer.write(4));
        assert!(producer.is_full());
    }

    #[test]
    fn test_full_and_empty_never_both_true_when_settled() {
        let capacity = 4;
        let (mut producer, mut consumer) = channel(capacity).unwrap();

        // Walk through several laps with mixed write/read patterns
        for round in 0..40u32 {
            let writes = (round % 5) as usize;
            let reads = ((round * 3) % 4) as usize;
            for i in 0..writes {
                producer.write(round * 10 + i as u32);
            }
            consumer.settle();
            for _ in 0..reads {
                consumer.read();
            }
            producer.settle();
            consumer.settle();

            assert!(
                !(producer.is_full() && consumer.is_empty()),
                "round {round}: full and empty at once"
            );
            assert_eq!(producer.occupancy(), consumer.occupancy());
        }
    }

    #[test]
    fn test_capacity_one() {
        let (mut producer, mut consumer) = channel(1).unwrap();
        assert!(producer.write(7));
        assert!(producer.is_full());
        assert!(!producer.write(8));

        consumer.settle();
        assert_eq!(consumer.read(), Some(7));
        producer.settle();
        assert!(!producer.is_full());
        assert!(producer.write(9));
        consumer.settle();
        assert_eq!(consumer.read(), Some(9));
    }

    #[test]
    fn test_reset_returns_to_empty() {
        let (mut producer, mut consumer) = channel(4).unwrap();
        producer.write(1);
        producer.write(2);
        consumer.settle();

        producer.reset();
        consumer.reset();
        consumer.settle();
        producer.settle();

        assert!(consumer.is_empty());
        assert!(!producer.is_full());
        assert_eq!(consumer.read(), None);
    }

    #[test]
    fn test_concurrent_stream_in_order_no_duplicates() {
        let (mut producer, mut consumer) = channel(16).unwrap();
        let total: u32 = 20_000;

        let writer = thread::spawn(move || {
            let mut next = 0;
            while next < total {
                producer.tick();
                if producer.write(next) {
                    next += 1;
                } else {
                    thread::yield_now();
                }
            }
        });

        let reader = thread::spawn(move || {
            let mut received = Vec::with_capacity(total as usize);
            while received.len() < total as usize {
                consumer.tick();
                match consumer.read() {
                    Some(word) => received.push(word),
                    None => thread::yield_now(),
                }
            }
            received
        });

        writer.join().unwrap();
        let received = reader.join().unwrap();
        assert_eq!(received, (0..total).collect::<Vec<_>>());
    }
}
