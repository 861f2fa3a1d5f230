use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tap_calibration::calibration::estimator::{summarize, OffsetStatistics};
use tap_calibration::testing::{run_simulation, SimulatedPlayer};
use tap_calibration::{
    estimate_offset, AppConfig, CalibrationConfig, CalibrationEvent, CalibrationResult,
    CalibrationSession, ErrorCode, JudgementOffsetStore, MonotonicClock, SessionState,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "calibration_cli",
    about = "Measure the audio/input offset between a metronome and your taps"
)]
struct Cli {
    /// JSON config file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(flatten)]
    overrides: SessionOverrides,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SessionOverrides {
    /// Metronome tempo in beats per minute
    #[arg(long, global = true)]
    bpm: Option<f64>,
    /// Beats played before measurement starts
    #[arg(long, global = true)]
    count_in: Option<u32>,
    /// Beats played during measurement
    #[arg(long, global = true)]
    beats: Option<u32>,
    /// Leading measurement beats whose taps are ignored
    #[arg(long, global = true)]
    discard: Option<u32>,
}

impl SessionOverrides {
    fn apply(&self, config: &mut CalibrationConfig) {
        if let Some(bpm) = self.bpm {
            config.bpm = bpm;
        }
        if let Some(count_in) = self.count_in {
            config.count_in_beats = count_in;
        }
        if let Some(beats) = self.beats {
            config.total_beats = beats;
        }
        if let Some(discard) = self.discard {
            config.discard_first_beats = discard;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Calibrate in real time: press Enter on every beat, `q` + Enter cancels
    Live {
        /// Scheduling tick period in milliseconds
        #[arg(long, default_value_t = 2)]
        tick_ms: u64,
    },
    /// Run a deterministic session against a simulated player
    Simulate {
        /// Player's systematic lateness in milliseconds (negative = early)
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        bias_ms: f64,
        /// Uniform timing jitter in milliseconds
        #[arg(long, default_value_t = 10.0)]
        jitter_ms: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Skip every Nth beat (0 = never)
        #[arg(long, default_value_t = 0)]
        miss_every: u32,
        /// Push every Nth tap far off the beat (0 = never)
        #[arg(long, default_value_t = 0)]
        stray_every: u32,
    },
    /// Estimate an offset from raw tap offsets given in seconds
    Estimate {
        #[arg(required = true, allow_negative_numbers = true)]
        offsets: Vec<f64>,
    },
}

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let app = cli
        .config
        .as_ref()
        .map(AppConfig::load_from_file)
        .unwrap_or_default();
    let mut config = app.calibration.clone();
    cli.overrides.apply(&mut config);

    match cli.command {
        Commands::Live { tick_ms } => run_live(&app, config, tick_ms),
        Commands::Simulate {
            bias_ms,
            jitter_ms,
            seed,
            miss_every,
            stray_every,
        } => {
            let player = SimulatedPlayer::new(bias_ms / 1000.0, jitter_ms / 1000.0, seed)
                .with_miss_every(miss_every)
                .with_stray_every(stray_every);
            run_simulate(&config, player)
        }
        Commands::Estimate { offsets } => run_estimate(&offsets),
    }
}

fn run_live(app: &AppConfig, config: CalibrationConfig, tick_ms: u64) -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .context("building tokio runtime")?;
    let outcome = runtime.block_on(live_session(app, config, tick_ms));
    // The stdin reader may still be parked on a blocking read
    runtime.shutdown_background();
    outcome
}

async fn live_session(app: &AppConfig, config: CalibrationConfig, tick_ms: u64) -> Result<ExitCode> {
    let store = Arc::new(Mutex::new(JudgementOffsetStore::new(
        app.settings.offset_clamp_seconds,
    )));
    let mut session = CalibrationSession::new(config, MonotonicClock::new())
        .with_event_buffer(app.events.buffer_size)
        .with_tick_player(|_index: u32, _total: u32| eprint!("\x07"))
        .with_settings_sink(Arc::clone(&store));
    let mut rx = session.subscribe();

    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    eprintln!("Press Enter on every beat. Type q + Enter to cancel.");
    session
        .start_calibration()
        .context("starting calibration")?;
    print_events(&mut rx)?;

    while session.is_running() {
        tokio::select! {
            _ = ticker.tick() => {
                session.tick();
            }
            line = lines.next_line(), if stdin_open => {
                match line.context("reading stdin")? {
                    Some(text) if text.trim().eq_ignore_ascii_case("q") => {
                        session.cancel_calibration();
                    }
                    Some(_) => {
                        session.register_tap();
                    }
                    None => stdin_open = false,
                }
            }
        }
        print_events(&mut rx)?;
    }
    print_events(&mut rx)?;

    let stored = store
        .lock()
        .map(|s| s.judgement_offset())
        .unwrap_or_default();
    tracing::info!(offset_seconds = stored, "judgement offset after calibration");

    Ok(exit_code_for(session.state()))
}

#[derive(Serialize)]
struct SimulationSummary {
    final_state: SessionState,
    taps_sent: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<CalibrationResult>,
}

fn run_simulate(config: &CalibrationConfig, mut player: SimulatedPlayer) -> Result<ExitCode> {
    let report = run_simulation(config, &mut player).context("running simulated calibration")?;

    for event in &report.events {
        println!("{}", serde_json::to_string(event)?);
    }
    let summary = SimulationSummary {
        final_state: report.final_state,
        taps_sent: report.taps_sent,
        result: report.result,
    };
    println!("{}", serde_json::to_string(&summary)?);

    Ok(exit_code_for(report.final_state))
}

#[derive(Serialize)]
struct EstimateReport {
    sample_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    statistics: Option<OffsetStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<CalibrationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorPayload>,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: i32,
    message: String,
}

fn run_estimate(offsets: &[f64]) -> Result<ExitCode> {
    let outcome = estimate_offset(offsets);
    let report = EstimateReport {
        sample_count: offsets.len(),
        statistics: (!offsets.is_empty()).then(|| summarize(offsets)),
        result: outcome.as_ref().ok().copied(),
        error: outcome.as_ref().err().map(|err| ErrorPayload {
            code: err.code(),
            message: err.message(),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if outcome.is_ok() {
        ExitCode::from(0)
    } else {
        ExitCode::from(2)
    })
}

fn print_events(rx: &mut Receiver<CalibrationEvent>) -> Result<()> {
    loop {
        match rx.try_recv() {
            Ok(event) => println!("{}", serde_json::to_string(&event)?),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event output lagged");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(()),
        }
    }
}

fn exit_code_for(state: SessionState) -> ExitCode {
    match state {
        SessionState::Completed => ExitCode::from(0),
        _ => ExitCode::from(2),
    }
}
