// SampleRing - lock-free single-producer single-consumer rolling sample store
//
// The capture callback appends mono samples; the inference worker reads the
// most recent window. Unlike a queue, old data is overwritten rather than
// drained: only the latest `capacity` samples are meaningful.
//
// Synchronization:
// - `write_index` is a freely incrementing u64 (modulo `capacity` only at
//   access time), stored with Release after all sample stores for a block
//   and loaded with Acquire by the reader. Any sample at an index below the
//   observed write index was therefore written in full.
// - Sample cells are relaxed AtomicU32 bit-stores. A cell overwritten while
//   the reader copies it yields a stale-or-fresh value, never a torn one;
//   the 0.5 s of slack capacity above the window keeps the overlap region
//   out of the window the worker actually reads.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct RingShared {
    capacity: usize,
    write_index: AtomicU64,
    samples: Box<[AtomicU32]>,
}

/// Fixed-capacity mono sample ring, split into SPSC halves
pub struct SampleRing;

impl SampleRing {
    /// Allocate a ring and split it into writer/consumer halves.
    ///
    /// All allocation happens here; the writer half is allocation-free and
    /// lock-free afterwards and safe to drive from an audio callback.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn with_capacity(capacity: usize) -> (RingWriter, RingReader) {
        assert!(capacity > 0, "ring capacity must be greater than 0");

        let samples = (0..capacity)
            .map(|_| AtomicU32::new(0f32.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let shared = Arc::new(RingShared {
            capacity,
            write_index: AtomicU64::new(0),
            samples,
        });

        (
            RingWriter {
                shared: Arc::clone(&shared),
            },
            RingReader { shared },
        )
    }
}

/// Producer half, owned by the capture context
pub struct RingWriter {
    shared: Arc<RingShared>,
}

impl RingWriter {
    /// Append a block of samples, overwriting the oldest data on wrap.
    ///
    /// Stores every sample before publishing the advanced write index, so a
    /// reader that observes the new index observes the new samples.
    pub fn write(&mut self, samples: &[f32]) {
        let start = self.shared.write_index.load(Ordering::Relaxed);
        let capacity = self.shared.capacity as u64;
        for (i, &sample) in samples.iter().enumerate() {
            let idx = ((start + i as u64) % capacity) as usize;
            self.shared.samples[idx].store(sample.to_bits(), Ordering::Relaxed);
        }
        self.shared
            .write_index
            .store(start + samples.len() as u64, Ordering::Release);
    }

    /// Total samples ever written
    pub fn samples_written(&self) -> u64 {
        self.shared.write_index.load(Ordering::Relaxed)
    }
}

/// Consumer half, owned by the inference worker
#[derive(Debug)]
pub struct RingReader {
    shared: Arc<RingShared>,
}

impl RingReader {
    /// Copy the most recent `out.len()` samples into `out`, newest at
    /// `out[out.len() - 1]`.
    ///
    /// If fewer samples have ever been written (or `out` is longer than the
    /// ring), the front of `out` is zero-filled. Never blocks; callable
    /// concurrently with `write`.
    pub fn read_latest(&self, out: &mut [f32]) {
        if out.is_empty() {
            return;
        }

        let total = self.shared.write_index.load(Ordering::Acquire);
        let capacity = self.shared.capacity as u64;
        let take = (out.len() as u64).min(total).min(capacity) as usize;
        let lead = out.len() - take;

        out[..lead].fill(0.0);

        let start = total - take as u64;
        for (i, slot) in out[lead..].iter_mut().enumerate() {
            let idx = ((start + i as u64) % capacity) as usize;
            *slot = f32::from_bits(self.shared.samples[idx].load(Ordering::Relaxed));
        }
    }

    /// Ring capacity in samples
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Total samples ever written
    pub fn samples_written(&self) -> u64 {
        self.shared.write_index.load(Ordering::Acquire)
    }
}
