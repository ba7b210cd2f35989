//! ChordVerifier: the controller that owns the pipeline.
//!
//! Public surface: `start` / `stop` / `set_expected` / `subscribe_verdicts`
//! / `verdict_stream`. The controller owns the capture backend, the sample
//! ring, the inference worker, and the command queue; verdicts fan out over
//! a broadcast channel so any number of consumers can subscribe, before or
//! after `start`.
//!
//! Status machine: `Idle → Loading → Listening → (Error | Idle)`.
//! `Listening` is the only state in which verdicts flow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Instant;

use futures::Stream;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::VerifierConfig;
use crate::engine::backend::{CaptureBackend, CaptureStartContext, CpalCaptureBackend};
use crate::engine::worker::{spawn_worker, WorkerCommand, WorkerContext};
use crate::error::{log_audio_error, AudioError, ConfigError, ErrorCode, VerifierError};
use crate::transcribe::{ModelTranscriber, SpectralPitchModel, Transcriber};
use crate::verdict::Verdict;
use crate::verify::chord::ChordSpec;

/// Extra ring capacity above the rolling window, seconds
const RING_SLACK_SEC: f64 = 0.5;

/// Verdict broadcast buffer; at a 40 ms cadence this holds several seconds
/// of backlog before slow subscribers lag
const VERDICT_CHANNEL_CAPACITY: usize = 256;

/// Command queue depth; `set_expected` bursts never realistically exceed this
const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierStatus {
    Idle,
    Loading,
    Listening,
    Error,
}

type TranscriberFactory = dyn Fn(&VerifierConfig) -> Box<dyn Transcriber> + Send + Sync;

/// The verifier controller
pub struct ChordVerifier {
    config: VerifierConfig,
    backend: Arc<dyn CaptureBackend>,
    transcriber_factory: Arc<TranscriberFactory>,
    status: Arc<RwLock<VerifierStatus>>,
    verdict_tx: broadcast::Sender<Verdict>,
    command_tx: Mutex<Option<rtrb::Producer<WorkerCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    running: AtomicBool,
    pending_spec: Mutex<Option<ChordSpec>>,
}

impl ChordVerifier {
    /// Create a controller over the default microphone backend and the
    /// bundled spectral transcriber.
    pub fn new(config: VerifierConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        // eager channel: subscribing before start() must work
        let (verdict_tx, _) = broadcast::channel(VERDICT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            backend: Arc::new(CpalCaptureBackend::new()),
            transcriber_factory: Arc::new(default_transcriber),
            status: Arc::new(RwLock::new(VerifierStatus::Idle)),
            verdict_tx,
            command_tx: Mutex::new(None),
            worker: Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            pending_spec: Mutex::new(None),
        })
    }

    /// Substitute the capture backend (fixture playback, tests)
    pub fn with_backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Substitute the transcriber built at each `start`
    pub fn with_transcriber_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&VerifierConfig) -> Box<dyn Transcriber> + Send + Sync + 'static,
    {
        self.transcriber_factory = Arc::new(factory);
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn status(&self) -> VerifierStatus {
        *self
            .status
            .read()
            .unwrap_or_else(|err| err.into_inner())
    }

    fn set_status(&self, status: VerifierStatus) {
        *self
            .status
            .write()
            .unwrap_or_else(|err| err.into_inner()) = status;
    }

    /// Acquire the device, warm the adapter, and begin ticking.
    ///
    /// Requires an ambient tokio runtime for the fault-drain task and
    /// stream adapters. Fails with `PermissionDenied`, `DeviceUnavailable`,
    /// or an adapter `InitFailed`; any failure leaves status at `Error`.
    pub fn start(&self) -> Result<(), VerifierError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning.into());
        }
        self.shutdown.store(false, Ordering::SeqCst);
        self.set_status(VerifierStatus::Loading);

        let (fault_tx, fault_rx) = mpsc::unbounded_channel::<AudioError>();

        let ctx = CaptureStartContext {
            window_sec: self.config.window_sec,
            ring_slack_sec: RING_SLACK_SEC,
            fault_tx,
        };

        let link = match self.backend.start(ctx) {
            Ok(link) => link,
            Err(err) => {
                log_audio_error(&err, "start");
                return Err(self.fail_start(err.into()));
            }
        };

        // warm the adapter with one silent inference so the first real tick
        // pays no lazy-setup latency
        let mut transcriber = (self.transcriber_factory)(&self.config);
        if let Err(err) = transcriber.warm_up() {
            let _ = self.backend.stop();
            log::error!("[Verifier] Adapter warm-up failed: code={}", err.code());
            return Err(self.fail_start(err.into()));
        }

        let (mut command_tx, command_rx) = rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY);
        if let Some(spec) = self
            .pending_spec
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
        {
            let _ = command_tx.push(WorkerCommand::SetExpected(spec));
        }

        let handle = spawn_worker(WorkerContext {
            reader: link.reader,
            transcriber,
            config: self.config.clone(),
            device_rate: link.sample_rate,
            commands: command_rx,
            verdict_tx: self.verdict_tx.clone(),
            shutdown: Arc::clone(&self.shutdown),
            session_start: Instant::now(),
        });

        *self
            .command_tx
            .lock()
            .unwrap_or_else(|err| err.into_inner()) = Some(command_tx);
        *self.worker.lock().unwrap_or_else(|err| err.into_inner()) = Some(handle);

        self.spawn_fault_drain(fault_rx);
        self.set_status(VerifierStatus::Listening);
        log::info!(
            "[Verifier] Listening at {} Hz device rate",
            link.sample_rate
        );
        Ok(())
    }

    fn fail_start(&self, err: VerifierError) -> VerifierError {
        self.running.store(false, Ordering::SeqCst);
        self.set_status(VerifierStatus::Error);
        let _ = self.verdict_tx.send(Verdict::Error {
            message: err.message(),
        });
        err
    }

    /// Route mid-session capture faults into the verdict stream; fatal ones
    /// tear the session down and park status at `Error`.
    fn spawn_fault_drain(&self, mut fault_rx: mpsc::UnboundedReceiver<AudioError>) {
        let verdict_tx = self.verdict_tx.clone();
        let status = Arc::clone(&self.status);
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            while let Some(err) = fault_rx.recv().await {
                log_audio_error(&err, "capture");
                let _ = verdict_tx.send(Verdict::Error {
                    message: err.message(),
                });
                if err.is_fatal() {
                    *status.write().unwrap_or_else(|e| e.into_inner()) = VerifierStatus::Error;
                    shutdown.store(true, Ordering::SeqCst);
                    break;
                }
            }
        });
    }

    /// Cancel the scheduler, release the device, discard the ring.
    /// Idempotent: a second call has no observable effect.
    pub fn stop(&self) -> Result<(), AudioError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown.store(true, Ordering::SeqCst);
        let backend_result = self.backend.stop();

        *self
            .command_tx
            .lock()
            .unwrap_or_else(|err| err.into_inner()) = None;
        if let Some(handle) = self
            .worker
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take()
        {
            let _ = handle.join();
        }

        self.set_status(VerifierStatus::Idle);
        log::info!("[Verifier] Stopped");
        backend_result
    }

    /// Atomically replace the verification target.
    ///
    /// Validated at the call site: an invalid spec changes nothing. The new
    /// target takes effect at the next tick boundary and resets the policy
    /// confirmation state.
    pub fn set_expected(&self, spec: ChordSpec) -> Result<(), VerifierError> {
        spec.validate()?;

        *self
            .pending_spec
            .lock()
            .unwrap_or_else(|err| err.into_inner()) = Some(spec.clone());

        if self.running.load(Ordering::SeqCst) {
            let mut guard = self
                .command_tx
                .lock()
                .map_err(|_| AudioError::LockPoisoned {
                    component: "command_tx".to_string(),
                })?;
            if let Some(tx) = guard.as_mut() {
                tx.push(WorkerCommand::SetExpected(spec)).map_err(|_| {
                    AudioError::StreamFailure {
                        reason: "command queue full".to_string(),
                    }
                })?;
            }
        }
        Ok(())
    }

    /// Subscribe to the verdict stream. Works before `start`; each
    /// subscriber receives an independent copy of every verdict.
    pub fn subscribe_verdicts(&self) -> broadcast::Receiver<Verdict> {
        self.verdict_tx.subscribe()
    }

    /// Async stream adapter over the verdict subscription
    pub fn verdict_stream(&self) -> impl Stream<Item = Verdict> + Unpin {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut broadcast_rx = self.verdict_tx.subscribe();
        tokio::spawn(async move {
            while let Ok(verdict) = broadcast_rx.recv().await {
                if tx.send(verdict).is_err() {
                    break;
                }
            }
        });
        UnboundedReceiverStream::new(rx)
    }
}

fn default_transcriber(config: &VerifierConfig) -> Box<dyn Transcriber> {
    Box::new(ModelTranscriber::new(Box::new(SpectralPitchModel::new(
        config.model_sample_rate,
        config.min_f0_hz,
        config.max_f0_hz,
        config.a4_hz,
    ))))
}
