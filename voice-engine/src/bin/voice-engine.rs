//! `voice-engine` CLI: a development aid, not the production entry point.
//! `serve` is a placeholder that accepts no connections; `simulate` drives a
//! `VoiceSession` against a scripted provider and prints its envelope
//! stream as JSON lines, for local smoke-testing without an upstream
//! credential.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;

use voice_engine::simulate::{SimulatedProvider, StdoutTransport};
use voice_engine::{EngineConfig, VoiceEngine};
use voice_protocol::{build_envelope, AudioCodec, AudioFrame, EnvelopeType, FrameKind};
use voice_session::{SessionState, VoiceSession};

#[derive(Parser)]
#[command(name = "voice-engine")]
#[command(about = "Voice session engine CLI")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file overriding the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose (debug-level) logging.
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Placeholder: loads configuration and idles until interrupted.
    Serve,
    /// Drives one session against a scripted provider, printing envelopes.
    Simulate {
        /// Milliseconds of synthetic speech to feed before committing.
        #[arg(long, default_value_t = 200)]
        speech_ms: u32,
        /// Text said to the scripted provider instead of real STT.
        #[arg(long, default_value = "hello there")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_target(false)
        .init();

    let config = EngineConfig::load(cli.config.as_deref()).context("loading engine config")?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Simulate { speech_ms, text } => simulate(config, speech_ms, &text).await,
    }
}

async fn serve(config: EngineConfig) -> anyhow::Result<()> {
    let engine = VoiceEngine::new(config);
    tracing::info!("voice-engine serve placeholder started, accepting no connections; press ctrl-c to exit");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    engine.sessions.shutdown();
    tracing::info!("voice-engine shutting down");
    Ok(())
}

async fn simulate(config: EngineConfig, speech_ms: u32, text: &str) -> anyhow::Result<()> {
    let mut session = VoiceSession::new(
        "simulate-session",
        config.session_defaults.clone(),
        Box::new(SimulatedProvider::new()),
        Box::new(StdoutTransport),
        None,
    );

    let start_env = build_envelope(EnvelopeType::SessionStart, json!({}), "simulate-session", None);
    session.start(&start_env).await.context("starting simulated session")?;

    let frame_ms: u32 = 20;
    let sample_rate_hz = config.session_defaults.input_sample_rate_hz;
    let bytes_per_frame = (sample_rate_hz as u64 * frame_ms as u64 / 1000 * 2) as usize;
    let frame_count = (speech_ms / frame_ms).max(1);
    for seq in 0..frame_count {
        let frame = AudioFrame {
            kind: FrameKind::Input,
            codec: AudioCodec::Pcm16,
            channels: 1,
            sample_rate_hz,
            seq,
            duration_ms: frame_ms as u16,
            bytes: synthetic_pcm(bytes_per_frame, seq),
        };
        session.on_audio(frame).await.context("feeding synthetic audio")?;
    }

    let commit_env = build_envelope(
        EnvelopeType::AudioCommit,
        json!({ "reason": "simulate_cli", "force_response": true }),
        "simulate-session",
        None,
    );
    session.on_control(commit_env).await.context("committing synthetic turn")?;

    // text.input alongside the audio turn, so `create_text_turn` is exercised too.
    let text_env = build_envelope(EnvelopeType::TextInput, json!({ "text": text }), "simulate-session", None);
    session.on_control(text_env).await.context("sending text turn")?;

    let deadline = tokio::time::sleep(Duration::from_secs(3));
    tokio::pin!(deadline);
    loop {
        if session.state() == SessionState::Ready || session.state() == SessionState::Stopped {
            break;
        }
        tokio::select! {
            _ = &mut deadline => {
                tracing::warn!("simulate: timed out waiting for a settled session state");
                break;
            }
            Some(event) = session.next_event() => {
                let _ = session.handle_event(event).await;
            }
        }
    }

    session.stop("simulate_complete").await;
    Ok(())
}

/// A simple non-silent PCM16 tone, distinct enough per frame to trip the VAD
/// threshold without needing a real audio source.
fn synthetic_pcm(byte_len: usize, seq: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(byte_len);
    let mut phase: i32 = (seq as i32 * 37) % 360;
    while bytes.len() < byte_len {
        let sample = (8000.0 * (phase as f64).to_radians().sin()) as i16;
        bytes.extend_from_slice(&sample.to_le_bytes());
        phase = (phase + 20) % 360;
    }
    bytes.truncate(byte_len);
    bytes
}
