//! Deterministic test doubles: rendered PCM fixtures and scripted
//! transcribers. Shipped in the library (not `#[cfg(test)]`) so the CLI
//! harness and integration tests can drive the exact production pipeline
//! without hardware.

pub mod fixtures;
pub mod scripted;

pub use fixtures::{load_wav, render_chord, render_signal, RenderedFixture, TestSignal};
pub use scripted::ScriptedTranscriber;
