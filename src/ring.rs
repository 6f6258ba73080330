/*!
 * Lock-Free Bounded Ring Buffer
 *
 * Fixed-capacity multi-producer/multi-consumer queue built on per-slot
 * sequence numbers. Operations never block: a full or empty buffer is
 * routine backpressure reported through the return value, not an error.
 *
 * # Algorithm
 *
 * Each slot carries a sequence number. The slot at index `pos & mask`
 * is writable when its sequence equals the producer position `pos` and
 * readable when it equals `pos + 1`. Producers and consumers reserve a
 * position with a CAS on the tail/head counter, then publish by storing
 * the next sequence number with release semantics. Dequeue re-arms the
 * slot at `pos + capacity` rather than `pos + 2`, so a producer a full
 * lap behind can tell the slot genuinely wrapped instead of mistaking a
 * stale sequence for a free slot.
 *
 * # Performance
 *
 * - No allocation after construction
 * - Head and tail live on separate cache lines to prevent false sharing
 * - CAS retries re-read the winner's counter; no backoff needed
 */

use crate::errors::CapacityError;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One queue slot: generation counter plus (possibly absent) item
struct Slot<T> {
    /// Writable at position `pos` when equal to `pos`, readable when
    /// equal to `pos + 1`
    sequence: AtomicUsize,
    item: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded MPMC lock-free queue
///
/// Capacity is fixed at construction and must be a power of two >= 2.
/// Any number of threads may enqueue and dequeue concurrently; the
/// order of successfully committed operations is FIFO.
///
/// # Examples
///
/// ```
/// use hybrid_sync::RingBuffer;
///
/// let queue = RingBuffer::with_capacity(4);
/// assert!(queue.try_enqueue(7).is_ok());
/// assert_eq!(queue.try_dequeue(), Some(7));
/// assert_eq!(queue.try_dequeue(), None);
/// ```
pub struct RingBuffer<T> {
    /// Dequeue position, monotonically increasing
    head: CachePadded<AtomicUsize>,
    /// Enqueue position, monotonically increasing
    tail: CachePadded<AtomicUsize>,
    slots: Box<[Slot<T>]>,
    mask: usize,
}

// Safety: items move through the slots with exclusive access brokered
// by the sequence-number protocol; a reserved slot is touched by exactly
// one thread until it republishes the sequence.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two or is less than 2.
    /// These are precondition violations, not recoverable conditions;
    /// use [`RingBuffer::try_with_capacity`] when the capacity comes
    /// from configuration.
    pub fn with_capacity(capacity: usize) -> Self {
        match Self::try_with_capacity(capacity) {
            Ok(buffer) => buffer,
            Err(e) => panic!("invalid ring buffer capacity: {e}"),
        }
    }

    /// Fallible constructor for configuration-sourced capacities
    pub fn try_with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        if capacity < 2 {
            return Err(CapacityError::TooSmall(capacity));
        }
        if !capacity.is_power_of_two() {
            return Err(CapacityError::NotPowerOfTwo(capacity));
        }

        let slots = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                item: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Ok(Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            slots,
            mask: capacity - 1,
        })
    }

    /// Number of items this buffer can hold
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Approximate number of queued items
    ///
    /// Exact when no operation is in flight; advisory under concurrency.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.capacity())
    }

    /// Whether the buffer is observed empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Try to enqueue an item without blocking.
    ///
    /// Returns `Err(item)` when the buffer is full, handing the rejected
    /// item back. Fullness is routine backpressure, not a fault.
    pub fn try_enqueue(&self, item: T) -> Result<(), T> {
        let mut tail = self.tail.load(Ordering::Relaxed);

        loop {
            let slot = &self.slots[tail & self.mask];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = (sequence as isize).wrapping_sub(tail as isize);

            if diff == 0 {
                // Slot free at our position; race other producers for it.
                match self.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // Reserved. The item write must precede the
                        // sequence store: the release publish is what
                        // makes the item visible to consumers.
                        unsafe { (*slot.item.get()).write(item) };
                        slot.sequence
                            .store(tail.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    // Lost the race; the failed CAS handed us the newer
                    // tail, so the next iteration makes progress.
                    Err(current) => tail = current,
                }
            } else if diff < 0 {
                // Slot not yet re-armed by the dequeuer one lap ago.
                // Confirm against head before declaring fullness: that
                // dequeuer may have reserved without publishing yet.
                let head = self.head.load(Ordering::Acquire);
                if tail.wrapping_sub(head) >= self.capacity() {
                    return Err(item);
                }

                // Dequeue in flight on this slot; wait it out.
                std::hint::spin_loop();
                tail = self.tail.load(Ordering::Relaxed);
            } else {
                // Another producer already filled this position; the
                // counter is necessarily newer than what we read.
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Try to dequeue an item without blocking.
    ///
    /// Returns `None` when the buffer is observed empty.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut head = self.head.load(Ordering::Relaxed);

        loop {
            let slot = &self.slots[head & self.mask];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = (sequence as isize).wrapping_sub(head.wrapping_add(1) as isize);

            if diff == 0 {
                // Slot filled at our position; race other consumers.
                match self.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // Reserved. Move the item out, then re-arm the
                        // slot a full lap ahead.
                        let item = unsafe { (*slot.item.get()).assume_init_read() };
                        slot.sequence
                            .store(head.wrapping_add(self.capacity()), Ordering::Release);
                        return Some(item);
                    }
                    Err(current) => head = current,
                }
            } else if diff < 0 {
                // Nothing published at our position. Empty unless a
                // producer reserved ahead and has not published yet;
                // dequeue must stay in order, so wait that one out.
                let tail = self.tail.load(Ordering::Acquire);
                if (tail as isize).wrapping_sub(head as isize) <= 0 {
                    return None;
                }

                std::hint::spin_loop();
                head = self.head.load(Ordering::Relaxed);
            } else {
                // Another consumer already emptied this position.
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        // Items still queued are owned by the buffer; drop them.
        while self.try_dequeue().is_some() {}
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}
