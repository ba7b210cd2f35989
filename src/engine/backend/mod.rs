//! Capture backends for the verifier controller.
//!
//! A backend owns the capture context: it acquires an input source, learns
//! its sample rate, sizes the sample ring, and appends mono samples from
//! the capture callback. The controller receives the consumer half of the
//! ring plus the negotiated rate and wires them into the inference worker.

use tokio::sync::mpsc;

use crate::audio::ring_buffer::RingReader;
use crate::error::AudioError;

/// Context handed to a backend when the controller starts a session
pub struct CaptureStartContext {
    /// Rolling window length the worker will read, seconds
    pub window_sec: f64,
    /// Extra ring capacity above the window, seconds; keeps the writer's
    /// overwrite frontier out of the window the worker reads
    pub ring_slack_sec: f64,
    /// Channel for mid-session capture faults (device loss, stream errors)
    pub fault_tx: mpsc::UnboundedSender<AudioError>,
}

impl CaptureStartContext {
    /// Ring capacity in samples for a negotiated device rate
    pub fn ring_capacity(&self, sample_rate: u32) -> usize {
        ((self.window_sec + self.ring_slack_sec) * sample_rate as f64).ceil() as usize
    }
}

/// What a started backend hands back to the controller
#[derive(Debug)]
pub struct CaptureLink {
    /// Device sample rate the ring is filled at
    pub sample_rate: u32,
    /// Consumer half of the sample ring
    pub reader: RingReader,
}

/// Trait implemented by capture sources.
///
/// `start` must be cheap to retry after failure; `stop` must be idempotent.
pub trait CaptureBackend: Send + Sync {
    fn start(&self, ctx: CaptureStartContext) -> Result<CaptureLink, AudioError>;
    fn stop(&self) -> Result<(), AudioError>;
}

mod cpal;
mod fixture;

pub use self::cpal::CpalCaptureBackend;
pub use fixture::FixtureCaptureBackend;
