//! Audio primitives: the capture-to-worker sample ring and the resampler.
//!
//! The ring is the only shared memory between the capture context and the
//! inference worker; everything else crosses on message queues.

pub mod resampler;
pub mod ring_buffer;

pub use resampler::LinearResampler;
pub use ring_buffer::{RingReader, RingWriter, SampleRing};
