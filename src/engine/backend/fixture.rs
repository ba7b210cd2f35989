//! Fixture capture backend: deterministic PCM without hardware.
//!
//! Feeds a pre-rendered sample buffer into the ring from a dedicated
//! thread, paced at the nominal device rate so the scheduler sees the same
//! timing as live capture. After the buffer is exhausted the feed continues
//! with silence, like an open microphone after the strings are damped.
//!
//! End-to-end tests and the CLI `verify` command run the exact production
//! pipeline on top of this backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::ring_buffer::SampleRing;
use crate::error::AudioError;

use super::{CaptureBackend, CaptureLink, CaptureStartContext};

/// Samples written per feed iteration
const FEED_BLOCK: usize = 512;

/// Deterministic capture backend over a fixed sample buffer
pub struct FixtureCaptureBackend {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    realtime: bool,
    fail_with: Option<AudioError>,
    device_loss_after: Option<Duration>,
    shutdown_flag: Arc<AtomicBool>,
    feed_thread: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl FixtureCaptureBackend {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
            realtime: true,
            fail_with: None,
            device_loss_after: None,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            feed_thread: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Disable real-time pacing (feed as fast as the ring accepts)
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Make `start` fail with the given error, for controller error-path tests
    pub fn failing(err: AudioError) -> Self {
        let mut backend = Self::new(Vec::new(), 48000);
        backend.fail_with = Some(err);
        backend
    }

    /// Report `DeviceUnavailable` through the fault channel after `after`,
    /// then stop feeding; simulates the microphone being unplugged
    pub fn with_device_loss_after(mut self, after: Duration) -> Self {
        self.device_loss_after = Some(after);
        self
    }
}

impl CaptureBackend for FixtureCaptureBackend {
    fn start(&self, ctx: CaptureStartContext) -> Result<CaptureLink, AudioError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }
        self.shutdown_flag.store(false, Ordering::SeqCst);

        let (mut writer, reader) = SampleRing::with_capacity(ctx.ring_capacity(self.sample_rate));

        let samples = Arc::clone(&self.samples);
        let sample_rate = self.sample_rate;
        let realtime = self.realtime;
        let device_loss_after = self.device_loss_after;
        let fault_tx = ctx.fault_tx.clone();
        let shutdown_flag = Arc::clone(&self.shutdown_flag);

        let handle = thread::spawn(move || {
            let block_period = Duration::from_secs_f64(FEED_BLOCK as f64 / sample_rate as f64);
            let started = Instant::now();
            let silence = [0.0f32; FEED_BLOCK];
            let mut cursor = 0usize;

            while !shutdown_flag.load(Ordering::Relaxed) {
                if let Some(after) = device_loss_after {
                    if started.elapsed() >= after {
                        let _ = fault_tx.send(AudioError::DeviceUnavailable {
                            details: "fixture device loss".to_string(),
                        });
                        break;
                    }
                }

                if cursor < samples.len() {
                    let end = (cursor + FEED_BLOCK).min(samples.len());
                    writer.write(&samples[cursor..end]);
                    cursor = end;
                } else {
                    writer.write(&silence);
                }

                if realtime {
                    thread::sleep(block_period);
                } else if cursor >= samples.len() {
                    // fixture exhausted; idle instead of spinning on silence
                    thread::sleep(Duration::from_millis(1));
                }
            }
        });

        let mut handle_guard =
            self.feed_thread
                .lock()
                .map_err(|_| AudioError::LockPoisoned {
                    component: "feed_thread".to_string(),
                })?;
        *handle_guard = Some(handle);

        Ok(CaptureLink {
            sample_rate: self.sample_rate,
            reader,
        })
    }

    fn stop(&self) -> Result<(), AudioError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown_flag.store(true, Ordering::SeqCst);
        let mut handle_guard =
            self.feed_thread
                .lock()
                .map_err(|_| AudioError::LockPoisoned {
                    component: "feed_thread".to_string(),
                })?;
        if let Some(handle) = handle_guard.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn ctx() -> (CaptureStartContext, mpsc::UnboundedReceiver<AudioError>) {
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        (
            CaptureStartContext {
                window_sec: 0.01,
                ring_slack_sec: 0.01,
                fault_tx,
            },
            fault_rx,
        )
    }

    #[test]
    fn test_feeds_samples_into_ring() {
        let samples: Vec<f32> = (0..2048).map(|i| i as f32 / 2048.0).collect();
        let backend = FixtureCaptureBackend::new(samples, 48000).with_realtime(false);
        let (ctx, _fault_rx) = ctx();
        let link = backend.start(ctx).unwrap();
        assert_eq!(link.sample_rate, 48000);

        // wait until the feed thread has written the whole fixture
        let deadline = Instant::now() + Duration::from_secs(1);
        while link.reader.samples_written() < 2048 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(link.reader.samples_written() >= 2048);
        backend.stop().unwrap();
    }

    #[test]
    fn test_start_fails_when_configured() {
        let backend = FixtureCaptureBackend::failing(AudioError::PermissionDenied);
        let (ctx, _fault_rx) = ctx();
        match backend.start(ctx) {
            Err(AudioError::PermissionDenied) => {}
            other => panic!("expected PermissionDenied, got {:?}", other),
        }
    }

    #[test]
    fn test_device_loss_reports_fault() {
        let backend = FixtureCaptureBackend::new(vec![0.0; 512], 48000)
            .with_device_loss_after(Duration::from_millis(10));
        let (ctx, mut fault_rx) = ctx();
        let _link = backend.start(ctx).unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        let mut fault = None;
        while fault.is_none() && Instant::now() < deadline {
            fault = fault_rx.try_recv().ok();
            thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(fault, Some(AudioError::DeviceUnavailable { .. })));
        backend.stop().unwrap();
    }

    #[test]
    fn test_stop_idempotent() {
        let backend = FixtureCaptureBackend::new(vec![0.0; 64], 48000).with_realtime(false);
        let (ctx, _fault_rx) = ctx();
        backend.start(ctx).unwrap();
        assert!(backend.stop().is_ok());
        assert!(backend.stop().is_ok());
    }
}
