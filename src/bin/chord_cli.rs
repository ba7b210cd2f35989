use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;

use chord_trainer::engine::backend::FixtureCaptureBackend;
use chord_trainer::testing::fixtures::{load_wav, render_signal, TestSignal};
use chord_trainer::verify::chord::COMMON_CHORDS;
use chord_trainer::{ChordSpec, ChordVerifier, Verdict, VerifierConfig};

#[derive(Parser, Debug)]
#[command(
    name = "chord_cli",
    about = "Streaming chord verification harness for guitar practice"
)]
struct Cli {
    /// JSON config file overriding pipeline defaults
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a WAV file or a synthesized chord through the full pipeline
    Verify {
        /// Expected chord: a name ("Em") or pitch classes ("E,G,B" / "4,7,11")
        #[arg(long)]
        chord: String,
        /// WAV file to feed; synthesized from --play when omitted
        #[arg(long)]
        wav: Option<PathBuf>,
        /// MIDI notes to synthesize, comma separated (e.g. "52,55,59")
        #[arg(long)]
        play: Option<String>,
        /// Seconds to run before reporting
        #[arg(long, default_value_t = 3.0)]
        duration: f64,
        /// Also print Tick and Notes verdicts
        #[arg(long)]
        raw: bool,
    },
    /// Listen on the default microphone and stream verdicts until Ctrl-C
    Listen {
        #[arg(long)]
        chord: String,
        /// Also print Tick and Notes verdicts
        #[arg(long)]
        raw: bool,
    },
    /// List the built-in chord table
    Chords,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().init();

    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => VerifierConfig::load_from_file(path),
        None => VerifierConfig::default(),
    };

    match cli.command {
        Commands::Verify {
            chord,
            wav,
            play,
            duration,
            raw,
        } => run_verify(config, &chord, wav, play, duration, raw).await,
        Commands::Listen { chord, raw } => run_listen(config, &chord, raw).await,
        Commands::Chords => run_chords(),
    }
}

async fn run_verify(
    config: VerifierConfig,
    chord: &str,
    wav: Option<PathBuf>,
    play: Option<String>,
    duration: f64,
    raw: bool,
) -> Result<ExitCode> {
    let spec = ChordSpec::parse(chord).with_context(|| format!("parsing chord {:?}", chord))?;

    let (samples, sample_rate) = match (wav, play) {
        (Some(path), _) => {
            let fixture = load_wav(&path).with_context(|| format!("loading {:?}", path))?;
            (fixture.samples, fixture.sample_rate)
        }
        (None, Some(play)) => {
            let midis = parse_midis(&play)?;
            let samples = render_signal(
                &TestSignal::Chord {
                    midis,
                    partials: 2,
                    decay_per_sec: 0.3,
                },
                48_000,
                (duration * 1000.0) as u32,
                0.6,
            );
            (samples, 48_000)
        }
        (None, None) => bail!("verify needs either --wav or --play"),
    };

    let verifier = ChordVerifier::new(config)
        .context("invalid configuration")?
        .with_backend(Arc::new(FixtureCaptureBackend::new(samples, sample_rate)));

    let matches = stream_verdicts(&verifier, spec, Some(duration), raw).await?;
    verifier.stop().context("stopping verifier")?;

    if matches > 0 {
        println!("MATCH ({} confirmations)", matches);
        Ok(ExitCode::from(0))
    } else {
        println!("NO MATCH");
        Ok(ExitCode::from(2))
    }
}

async fn run_listen(config: VerifierConfig, chord: &str, raw: bool) -> Result<ExitCode> {
    let spec = ChordSpec::parse(chord).with_context(|| format!("parsing chord {:?}", chord))?;
    let verifier = ChordVerifier::new(config).context("invalid configuration")?;

    let matches = stream_verdicts(&verifier, spec, None, raw).await?;
    verifier.stop().context("stopping verifier")?;
    println!("{} confirmed matches", matches);
    Ok(ExitCode::from(0))
}

/// Drive the verifier and print verdict JSON lines. Runs for `duration`
/// seconds, or until Ctrl-C when `duration` is `None`. Returns the number
/// of `Match` verdicts seen.
async fn stream_verdicts(
    verifier: &ChordVerifier,
    spec: ChordSpec,
    duration: Option<f64>,
    raw: bool,
) -> Result<u64> {
    let mut rx = verifier.subscribe_verdicts();
    verifier
        .start()
        .map_err(|e| anyhow::anyhow!("start failed: {}", e))?;
    verifier
        .set_expected(spec)
        .map_err(|e| anyhow::anyhow!("set_expected failed: {}", e))?;

    let deadline = duration.map(|d| tokio::time::Instant::now() + Duration::from_secs_f64(d));
    let mut matches = 0u64;

    loop {
        let verdict = if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, rx.recv()).await {
                Ok(result) => result,
                Err(_) => break,
            }
        } else {
            tokio::select! {
                result = rx.recv() => result,
                _ = tokio::signal::ctrl_c() => break,
            }
        };

        match verdict {
            Ok(verdict) => {
                if let Verdict::Match { .. } = verdict {
                    matches += 1;
                }
                let printable = raw || !matches!(verdict, Verdict::Tick { .. } | Verdict::Notes { .. });
                if printable {
                    println!("{}", serde_json::to_string(&verdict)?);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                eprintln!("verdict stream lagged, {} dropped", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    Ok(matches)
}

fn run_chords() -> Result<ExitCode> {
    for (name, spec) in COMMON_CHORDS.iter() {
        let pcs: Vec<String> = spec.pcs.iter().map(|pc| pc.to_string()).collect();
        println!("{:<3} {}", name, pcs.join(" "));
    }
    Ok(ExitCode::from(0))
}

fn parse_midis(input: &str) -> Result<Vec<i32>> {
    input
        .split(',')
        .map(|tok| {
            tok.trim()
                .parse::<i32>()
                .with_context(|| format!("invalid MIDI number {:?}", tok))
        })
        .collect()
}
