//! Inference worker: the tick loop.
//!
//! A dedicated thread drives the pipeline every `tick_ms`: read the latest
//! window from the ring, resample to the model rate, zero-pad to the model
//! window, transcribe, aggregate, verify, dispatch verdicts. Single-flight:
//! inference runs synchronously on this thread, and tick deadlines that
//! elapse while it runs are dropped rather than queued, so verdicts stay
//! anchored to current audio.
//!
//! Commands from the controller cross on a bounded lock-free SPSC queue and
//! are drained at tick boundaries; a new expected chord therefore takes
//! effect at the next tick, never mid-pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rtrb::Consumer;
use tokio::sync::broadcast;

use crate::audio::resampler::LinearResampler;
use crate::audio::ring_buffer::RingReader;
use crate::config::VerifierConfig;
use crate::transcribe::Transcriber;
use crate::verdict::Verdict;
use crate::verify::aggregator::TemporalAggregator;
use crate::verify::chord::ChordSpec;
use crate::verify::policy::PolicyEngine;

/// Poll granularity while waiting for the next tick; keeps command and
/// shutdown handling responsive without busy-waiting
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Controller-to-worker messages, applied at tick boundaries
pub enum WorkerCommand {
    SetExpected(ChordSpec),
}

/// Everything the worker thread owns
pub struct WorkerContext {
    pub reader: RingReader,
    pub transcriber: Box<dyn Transcriber>,
    pub config: VerifierConfig,
    pub device_rate: u32,
    pub commands: Consumer<WorkerCommand>,
    pub verdict_tx: broadcast::Sender<Verdict>,
    pub shutdown: Arc<AtomicBool>,
    pub session_start: Instant,
}

/// Spawn the inference worker thread.
///
/// All buffers are allocated here and reused every tick; the loop itself
/// does not allocate beyond what the transcriber needs internally.
pub fn spawn_worker(ctx: WorkerContext) -> JoinHandle<()> {
    thread::spawn(move || run(ctx))
}

fn run(ctx: WorkerContext) {
    let WorkerContext {
        reader,
        mut transcriber,
        config,
        device_rate,
        mut commands,
        verdict_tx,
        shutdown,
        session_start,
    } = ctx;

    let window_samples = config.window_samples(device_rate);
    let model_window = config.model_window_samples;
    let mut window_buf = vec![0.0f32; window_samples];
    let mut model_input = vec![0.0f32; model_window];

    let resampler = LinearResampler::new(device_rate, config.model_sample_rate);
    let full_out = resampler.output_len(window_samples);
    // Short windows are front-padded with zeros; long ones pass the
    // trailing subrange, per the adapter contract.
    let (pad, input_skip) = if full_out >= model_window {
        let skip_out = full_out - model_window;
        let skip_in =
            (skip_out as f64 * device_rate as f64 / config.model_sample_rate as f64) as usize;
        (0usize, skip_in.min(window_samples))
    } else {
        (model_window - full_out, 0usize)
    };

    let mut aggregator = TemporalAggregator::new(config.aggregator_max_len);
    let mut policy = PolicyEngine::from_config(&config);

    let tick_period = Duration::from_millis(config.tick_ms);
    let mut next_tick = Instant::now();
    let mut dropped_ticks: u64 = 0;

    log::info!(
        "[Worker] Starting tick loop: {} ms cadence, {} samples window at {} Hz",
        config.tick_ms,
        window_samples,
        device_rate
    );

    loop {
        while let Ok(command) = commands.pop() {
            match command {
                WorkerCommand::SetExpected(spec) => {
                    log::info!("[Worker] Expected chord replaced: {:?}", spec.pcs);
                    policy.set_expected(spec);
                }
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let now = Instant::now();
        if now < next_tick {
            thread::sleep((next_tick - now).min(IDLE_SLEEP));
            continue;
        }

        reader.read_latest(&mut window_buf);
        resampler.resample(&window_buf[input_skip..], &mut model_input[pad..]);

        let inference_start = Instant::now();
        match transcriber.evaluate(&model_input) {
            Ok(notes) => {
                let inference_ms = inference_start.elapsed().as_secs_f64() * 1000.0;
                let t = session_start.elapsed().as_secs_f64();

                let _ = verdict_tx.send(Verdict::Notes {
                    t,
                    notes: notes.clone(),
                });
                let _ = verdict_tx.send(Verdict::Tick { t, inference_ms });

                let fused = aggregator.push(notes);
                if let Some(verdict) = policy.evaluate(&fused, t) {
                    let _ = verdict_tx.send(verdict);
                }
            }
            Err(err) => {
                log::warn!("[Worker] Inference failed: {}", err);
                let _ = verdict_tx.send(Verdict::Error {
                    message: err.to_string(),
                });
            }
        }

        // single-flight: deadlines that elapsed during inference are dropped
        next_tick += tick_period;
        let now = Instant::now();
        let mut dropped_this_pass = 0u64;
        while next_tick <= now {
            next_tick += tick_period;
            dropped_this_pass += 1;
        }
        if dropped_this_pass > 0 {
            dropped_ticks += dropped_this_pass;
            tracing::debug!(dropped = dropped_this_pass, "inference overran the tick period");
        }
    }

    if dropped_ticks > 0 {
        log::info!("[Worker] Exiting; {} ticks dropped under load", dropped_ticks);
    } else {
        log::info!("[Worker] Exiting");
    }
}
