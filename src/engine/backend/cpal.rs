//! CPAL-based microphone capture for desktop platforms.
//!
//! CPAL's `Stream` is not `Send`, so a dedicated thread owns the stream and
//! runs until signaled to stop. The negotiated sample rate (and the
//! consumer half of the ring it sizes) travels back to the caller over a
//! one-shot handshake channel.
//!
//! The capture callback mixes input channels to mono by arithmetic mean and
//! appends to the ring; its scratch buffer is preallocated so the callback
//! neither allocates nor blocks. Echo cancellation, noise suppression, and
//! gain control are host concerns: callers must disable them on the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};

use crate::audio::ring_buffer::{RingWriter, SampleRing};
use crate::error::AudioError;

use super::{CaptureBackend, CaptureLink, CaptureStartContext};

/// Scratch capacity for the mono downmix; larger than any realistic
/// callback block so the callback never reallocates
const MIX_SCRATCH_SAMPLES: usize = 1 << 15;

/// How long `start` waits for the stream thread to report readiness
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Microphone capture backend using the default CPAL input device
pub struct CpalCaptureBackend {
    shutdown_flag: Arc<AtomicBool>,
    stream_thread: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl CpalCaptureBackend {
    pub fn new() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            stream_thread: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    fn map_stream_error(err: &cpal::StreamError) -> AudioError {
        match err {
            cpal::StreamError::DeviceNotAvailable => AudioError::DeviceUnavailable {
                details: "device disconnected".to_string(),
            },
            other => AudioError::StreamFailure {
                reason: format!("{}", other),
            },
        }
    }
}

impl Default for CpalCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Downmix an interleaved block to mono by arithmetic mean and append it
fn mix_into_ring<T, F>(data: &[T], channels: usize, scratch: &mut Vec<f32>, writer: &mut RingWriter, to_f32: F)
where
    T: Copy,
    F: Fn(T) -> f32,
{
    scratch.clear();
    if channels == 1 {
        scratch.extend(data.iter().map(|&s| to_f32(s)));
    } else {
        for frame in data.chunks_exact(channels) {
            let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
            scratch.push(sum / channels as f32);
        }
    }
    writer.write(scratch);
}

impl CaptureBackend for CpalCaptureBackend {
    fn start(&self, ctx: CaptureStartContext) -> Result<CaptureLink, AudioError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }
        self.shutdown_flag.store(false, Ordering::SeqCst);

        let shutdown_flag = Arc::clone(&self.shutdown_flag);
        let fault_tx = ctx.fault_tx.clone();

        let (link_tx, link_rx) = std::sync::mpsc::channel::<Result<CaptureLink, AudioError>>();

        let stream_handle = thread::spawn(move || {
            let host = cpal::default_host();

            let device = match host.default_input_device() {
                Some(d) => d,
                None => {
                    let _ = link_tx.send(Err(AudioError::DeviceUnavailable {
                        details: "no input device available".to_string(),
                    }));
                    return;
                }
            };

            let supported_config = match device.default_input_config() {
                Ok(c) => c,
                Err(e) => {
                    let _ = link_tx.send(Err(AudioError::StreamOpenFailed {
                        reason: format!("failed to get default input config: {}", e),
                    }));
                    return;
                }
            };

            let sample_rate = supported_config.sample_rate().0;
            let channels = supported_config.channels() as usize;

            log::info!(
                "[CpalCapture] Input config: {} Hz, {} channels, {:?}",
                sample_rate,
                channels,
                supported_config.sample_format()
            );

            let (mut writer, reader) = SampleRing::with_capacity(ctx.ring_capacity(sample_rate));
            let mut scratch: Vec<f32> = Vec::with_capacity(MIX_SCRATCH_SAMPLES);

            let config = StreamConfig {
                channels: supported_config.channels(),
                sample_rate: supported_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            let shutdown_cb = Arc::clone(&shutdown_flag);
            let fault_err = fault_tx.clone();
            let err_fn = move |err: cpal::StreamError| {
                let mapped = CpalCaptureBackend::map_stream_error(&err);
                log::error!("[CpalCapture] Stream error: {}", err);
                let _ = fault_err.send(mapped);
            };

            let stream = match supported_config.sample_format() {
                SampleFormat::F32 => device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if shutdown_cb.load(Ordering::Relaxed) {
                            return;
                        }
                        mix_into_ring(data, channels, &mut scratch, &mut writer, |s| s);
                    },
                    err_fn,
                    None,
                ),
                SampleFormat::I16 => device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        if shutdown_cb.load(Ordering::Relaxed) {
                            return;
                        }
                        mix_into_ring(data, channels, &mut scratch, &mut writer, |s| {
                            s as f32 / 32768.0
                        });
                    },
                    err_fn,
                    None,
                ),
                SampleFormat::U16 => device.build_input_stream(
                    &config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        if shutdown_cb.load(Ordering::Relaxed) {
                            return;
                        }
                        mix_into_ring(data, channels, &mut scratch, &mut writer, |s| {
                            (s as f32 - 32768.0) / 32768.0
                        });
                    },
                    err_fn,
                    None,
                ),
                other => {
                    let _ = link_tx.send(Err(AudioError::StreamOpenFailed {
                        reason: format!("unsupported sample format: {:?}", other),
                    }));
                    return;
                }
            };

            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    let mapped = match e {
                        cpal::BuildStreamError::DeviceNotAvailable => {
                            AudioError::DeviceUnavailable {
                                details: "device disappeared while opening stream".to_string(),
                            }
                        }
                        other => AudioError::StreamOpenFailed {
                            reason: format!("failed to build input stream: {}", other),
                        },
                    };
                    let _ = link_tx.send(Err(mapped));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = link_tx.send(Err(AudioError::StreamOpenFailed {
                    reason: format!("failed to start stream: {}", e),
                }));
                return;
            }

            log::info!("[CpalCapture] Capture started at {} Hz", sample_rate);
            let _ = link_tx.send(Ok(CaptureLink {
                sample_rate,
                reader,
            }));

            // the stream lives in this thread's scope until shutdown
            while !shutdown_flag.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(50));
            }

            drop(stream);
            log::info!("[CpalCapture] Stream thread exiting");
        });

        let link = match link_rx.recv_timeout(HANDSHAKE_TIMEOUT) {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = stream_handle.join();
                return Err(e);
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                self.shutdown_flag.store(true, Ordering::SeqCst);
                let _ = stream_handle.join();
                return Err(AudioError::StreamOpenFailed {
                    reason: "timeout waiting for capture stream to start".to_string(),
                });
            }
        };

        let mut handle_guard = self
            .stream_thread
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "stream_thread".to_string(),
            })?;
        *handle_guard = Some(stream_handle);

        Ok(link)
    }

    fn stop(&self) -> Result<(), AudioError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown_flag.store(true, Ordering::SeqCst);

        let mut handle_guard = self
            .stream_thread
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "stream_thread".to_string(),
            })?;
        if let Some(handle) = handle_guard.take() {
            let _ = handle.join();
            log::info!("[CpalCapture] Stream thread stopped");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_to_mono_mean() {
        let (mut writer, reader) = SampleRing::with_capacity(16);
        let mut scratch = Vec::with_capacity(16);
        // stereo frames: (0.2, 0.4), (1.0, 0.0)
        mix_into_ring(
            &[0.2f32, 0.4, 1.0, 0.0],
            2,
            &mut scratch,
            &mut writer,
            |s| s,
        );
        let mut out = [0.0f32; 2];
        reader.read_latest(&mut out);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mix_mono_passthrough_with_conversion() {
        let (mut writer, reader) = SampleRing::with_capacity(16);
        let mut scratch = Vec::with_capacity(16);
        mix_into_ring(&[16384i16, -16384], 1, &mut scratch, &mut writer, |s| {
            s as f32 / 32768.0
        });
        let mut out = [0.0f32; 2];
        reader.read_latest(&mut out);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let backend = CpalCaptureBackend::new();
        assert!(backend.stop().is_ok());
        assert!(backend.stop().is_ok());
    }
}
