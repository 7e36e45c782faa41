//! Single-producer single-consumer byte ring between a real-time callback
//! and a worker thread.
//!
//! Backed by `ringbuf`'s lock-free heap ring. Neither half allocates after
//! construction. A full ring rejects a whole write rather than splitting it,
//! so a buffer either lands intact or is counted as dropped by the caller.

use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};

/// Writing half, owned by the callback side.
pub struct RingProducer {
    producer: HeapProd<u8>,
}

impl RingProducer {
    pub fn capacity(&self) -> usize {
        self.producer.capacity().get()
    }

    /// Bytes that can be pushed right now.
    #[inline]
    pub fn vacant(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Push every part in order, or nothing when they do not all fit.
    pub fn push_all(&mut self, parts: &[&[u8]]) -> bool {
        let needed: usize = parts.iter().map(|part| part.len()).sum();
        if needed > self.producer.vacant_len() {
            return false;
        }
        for part in parts {
            self.producer.push_slice(part);
        }
        true
    }

    /// Push as much of `data` as fits. Returns the bytes taken.
    #[inline]
    pub fn push(&mut self, data: &[u8]) -> usize {
        self.producer.push_slice(data)
    }
}

/// Reading half, owned by the worker side.
pub struct RingConsumer {
    consumer: HeapCons<u8>,
}

impl RingConsumer {
    /// Bytes queued and ready to read.
    #[inline]
    pub fn occupied(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Fill as much of `out` as is queued. Returns the bytes read.
    #[inline]
    pub fn pop_into(&mut self, out: &mut [u8]) -> usize {
        self.consumer.pop_slice(out)
    }

    /// Append everything queued to `out`. Does not allocate when `out` has
    /// spare capacity for the ring's contents.
    pub fn drain_into(&mut self, out: &mut Vec<u8>) -> usize {
        let start = out.len();
        out.resize(start + self.consumer.occupied_len(), 0);
        let read = self.consumer.pop_slice(&mut out[start..]);
        out.truncate(start + read);
        read
    }

    /// Discard everything queued. Returns the bytes discarded.
    pub fn clear(&mut self) -> usize {
        self.consumer.clear()
    }
}

/// Split a new ring of `capacity` bytes (at least one) into its halves.
pub fn byte_ring(capacity: usize) -> (RingProducer, RingConsumer) {
    let (producer, consumer) = HeapRb::<u8>::new(capacity.max(1)).split();
    (RingProducer { producer }, RingConsumer { consumer })
}
