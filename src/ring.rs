//! Bounded single-producer single-consumer ring channel.
//!
//! The producer half lives on the render thread, so sending never blocks,
//! never allocates and never takes a lock. Single ownership of each half is
//! enforced by the types: neither half is `Clone`.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Ring<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    /// Next slot to read. Written by the consumer only.
    head: AtomicUsize,
    /// Next slot to write. Written by the producer only.
    tail: AtomicUsize,
}

// SAFETY: a slot is only accessed by the producer before it publishes the
// slot through `tail` (Release), and by the consumer after it observes
// that publication (Acquire) and before it hands the slot back through
// `head` (Release).
unsafe impl<T: Send> Sync for Ring<T> {}
unsafe impl<T: Send> Send for Ring<T> {}

impl<T> Ring<T> {
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let mut head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        while head != tail {
            // SAFETY: slots in head..tail hold initialized values that were
            // never read.
            unsafe { self.slots[head & self.mask].get_mut().assume_init_drop() };
            head = head.wrapping_add(1);
        }
    }
}

/// Creates a channel holding at least `capacity` items. The capacity is
/// rounded up to a power of two.
pub fn ring_channel<T: Send>(capacity: usize) -> (RingProducer<T>, RingConsumer<T>) {
    let capacity = capacity.max(2).next_power_of_two();
    let slots = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect();
    let ring = Arc::new(Ring {
        slots,
        mask: capacity - 1,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });
    (
        RingProducer {
            ring: Arc::clone(&ring),
        },
        RingConsumer { ring },
    )
}

pub struct RingProducer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> RingProducer<T> {
    /// Enqueues `value`, or hands it back when the channel is full.
    #[inline]
    pub fn try_send(&mut self, value: T) -> Result<(), T> {
        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);
        let head = ring.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) == ring.capacity() {
            return Err(value);
        }
        // SAFETY: the slot is outside head..tail, so the consumer does not
        // touch it until the store below publishes it.
        unsafe { (*ring.slots[tail & ring.mask].get()).write(value) };
        ring.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Enqueues `value`; returns false and drops it when the channel is full.
    #[inline]
    pub fn send(&mut self, value: T) -> bool {
        self.try_send(value).is_ok()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RingConsumer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> RingConsumer<T> {
    /// Takes the oldest item, if any.
    #[inline]
    pub fn receive(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);
        let tail = ring.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        // SAFETY: the slot is inside head..tail, published by the producer's
        // Release store of `tail`, and is read exactly once.
        let value = unsafe { (*ring.slots[head & ring.mask].get()).assume_init_read() };
        ring.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
