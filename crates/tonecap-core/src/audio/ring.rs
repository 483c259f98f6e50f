//! Lock-free block queue between the capture callback and the session thread
//!
//! Captured audio leaves the real-time thread as fixed-capacity
//! [`SampleBlock`]s moved through a single-producer/single-consumer ring.
//! Blocks store their frames inline, so pushing never allocates and a
//! rejected block is dropped without touching the heap.
//!
//! When the consumer falls behind, [`BlockProducer::try_push`] returns
//! `false` and the drop is counted; the counter is shared with the
//! consumer side so the session can report it.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Maximum number of frames a single block can carry
pub const MAX_BLOCK_FRAMES: usize = 2048;

/// One callback period's worth of mono samples
///
/// Frames live inline in the block; moving a block across the ring is a
/// plain memory copy with no allocation.
#[derive(Clone)]
pub struct SampleBlock {
    frames: [f32; MAX_BLOCK_FRAMES],
    len: usize,
}

impl SampleBlock {
    /// Create an empty block
    pub fn new() -> Self {
        Self {
            frames: [0.0; MAX_BLOCK_FRAMES],
            len: 0,
        }
    }

    /// Create a block holding a copy of `samples`
    ///
    /// Samples beyond [`MAX_BLOCK_FRAMES`] are ignored.
    pub fn from_slice(samples: &[f32]) -> Self {
        let mut block = Self::new();
        let n = samples.len().min(MAX_BLOCK_FRAMES);
        block.frames[..n].copy_from_slice(&samples[..n]);
        block.len = n;
        block
    }

    /// Append samples from `iter` until the block holds `limit` frames
    ///
    /// `limit` is capped at [`MAX_BLOCK_FRAMES`]. Returns how many samples
    /// were appended.
    pub fn fill_from<I>(&mut self, iter: &mut I, limit: usize) -> usize
    where
        I: Iterator<Item = f32>,
    {
        let limit = limit.min(MAX_BLOCK_FRAMES);
        let start = self.len;
        while self.len < limit {
            match iter.next() {
                Some(sample) => {
                    self.frames[self.len] = sample;
                    self.len += 1;
                }
                None => break,
            }
        }
        self.len - start
    }

    /// Samples held by this block
    pub fn as_slice(&self) -> &[f32] {
        &self.frames[..self.len]
    }

    /// Number of frames in this block
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block holds no frames
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the block cannot take more frames
    pub fn is_full(&self) -> bool {
        self.len == MAX_BLOCK_FRAMES
    }
}

impl Default for SampleBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SampleBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBlock").field("len", &self.len).finish()
    }
}

/// Constructor for the split producer/consumer pair
pub struct SampleRingBuffer;

impl SampleRingBuffer {
    /// Create a ring holding `capacity` blocks, split into its two halves
    ///
    /// `capacity` is rounded up to the next power of two (minimum 1) and is
    /// fixed for the ring's lifetime.
    ///
    /// # Example
    /// ```
    /// use tonecap_core::audio::ring::{SampleBlock, SampleRingBuffer};
    ///
    /// let (mut tx, mut rx) = SampleRingBuffer::with_capacity(3);
    /// assert_eq!(tx.capacity(), 4);
    /// assert!(tx.try_push(SampleBlock::from_slice(&[0.25, -0.25])));
    /// assert_eq!(rx.try_pop().unwrap().as_slice(), &[0.25, -0.25]);
    /// ```
    pub fn with_capacity(capacity: usize) -> (BlockProducer, BlockConsumer) {
        let capacity = capacity.max(1).next_power_of_two();
        let (producer, consumer) = HeapRb::<SampleBlock>::new(capacity).split();
        let dropped = Arc::new(AtomicU64::new(0));

        (
            BlockProducer {
                inner: producer,
                dropped: Arc::clone(&dropped),
                capacity,
            },
            BlockConsumer {
                inner: consumer,
                dropped,
                capacity,
            },
        )
    }
}

/// Writer half, owned by the capture callback
pub struct BlockProducer {
    inner: HeapProd<SampleBlock>,
    dropped: Arc<AtomicU64>,
    capacity: usize,
}

impl BlockProducer {
    /// Push a block without blocking
    ///
    /// Returns `false` when the ring is full; the block is discarded and
    /// counted as dropped.
    #[inline]
    pub fn try_push(&mut self, block: SampleBlock) -> bool {
        match self.inner.try_push(block) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Blocks dropped so far because the ring was full
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Ring capacity in blocks
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Reader half, owned by the session thread
pub struct BlockConsumer {
    inner: HeapCons<SampleBlock>,
    dropped: Arc<AtomicU64>,
    capacity: usize,
}

impl BlockConsumer {
    /// Pop the oldest block without blocking
    #[inline]
    pub fn try_pop(&mut self) -> Option<SampleBlock> {
        self.inner.try_pop()
    }

    /// Pop every queued block, appending samples to `out` in order
    ///
    /// Returns the number of samples appended.
    pub fn drain_into(&mut self, out: &mut Vec<f32>) -> usize {
        let before = out.len();
        while let Some(block) = self.try_pop() {
            out.extend_from_slice(block.as_slice());
        }
        out.len() - before
    }

    /// Number of blocks waiting to be read
    pub fn queued_blocks(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Blocks the producer dropped because the ring was full
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Ring capacity in blocks
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
