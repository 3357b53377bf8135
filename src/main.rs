//! Hopper CLI
//!
//! Runs a play session against the desktop (with the `desktop` and
//! `desktop-ml` features) or against the built-in simulated game, and reads
//! operator commands from stdin.

use clap::Parser;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use hopper::config::{ConfigError, OperatorCommand, Settings, SharedParameters};
use hopper::dataset::label_file;
use hopper::input::{Actuator, InputError, PressActuator};
use hopper::runtime::{Session, SessionError, SessionStatus};
use hopper::vision::{parse_corners, parse_point, CaptureRegion, SimulatedGame, VisionError};
use hopper::{ScreenPoint, VisionSystem};

/// Frame size used by `--simulate` when no region is configured
const SIMULATED_REGION: CaptureRegion = CaptureRegion::new(0, 0, 400, 800);

#[derive(Parser, Debug)]
#[command(name = "hopper", version, about = "Vision-driven auto-player for jump games")]
struct Cli {
    /// Settings file (JSON); missing file means defaults
    #[arg(long, default_value = "hopper.json")]
    config: PathBuf,

    /// Write the effective settings to the config file and exit
    #[arg(long)]
    save_config: bool,

    /// Capture region as LEFT,TOP,WIDTH,HEIGHT
    #[arg(long, value_name = "LEFT,TOP,WIDTH,HEIGHT", conflicts_with = "corners")]
    region: Option<CaptureRegion>,

    /// Capture region as two opposite corners X1,Y1,X2,Y2
    #[arg(long, value_name = "X1,Y1,X2,Y2", value_parser = parse_corners)]
    corners: Option<CaptureRegion>,

    /// Screen point to press (defaults to the region center)
    #[arg(long, value_name = "X,Y", value_parser = parse_point)]
    press_point: Option<ScreenPoint>,

    /// ONNX detector model
    #[arg(long)]
    model: Option<PathBuf>,

    /// Press seconds per pixel
    #[arg(long)]
    factor: Option<f64>,

    /// Stabilization wait in seconds
    #[arg(long)]
    stabilize: Option<f64>,

    /// Commit wait in seconds
    #[arg(long)]
    commit: Option<f64>,

    /// Detector confidence threshold
    #[arg(long)]
    confidence: Option<f32>,

    /// Play the built-in simulated game instead of the screen
    #[arg(long)]
    simulate: bool,

    /// Seed for the simulated game
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Start playing immediately
    #[arg(long)]
    autostart: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Vision(#[from] VisionError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[cfg_attr(
        not(all(feature = "desktop-ml", not(feature = "desktop"))),
        allow(dead_code)
    )]
    #[error("{0}")]
    Unsupported(&'static str),
}

type Backends = (VisionSystem, Box<dyn Actuator + Send>);

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let settings = effective_settings(&cli)?;

    if cli.save_config {
        settings.save(&cli.config)?;
        log::info!("Settings written to {}", cli.config.display());
        return Ok(());
    }

    let (backends, game) = if cli.simulate {
        let region = settings.capture.region.unwrap_or(SIMULATED_REGION);
        let game = SimulatedGame::new((region.width, region.height), cli.seed);
        log::info!("Simulated game, seed {}", cli.seed);
        let backends: Backends = (
            VisionSystem::simulated(&game),
            Box::new(PressActuator::new(game.pointer())),
        );
        (backends, Some(game))
    } else {
        (desktop_backends(&settings)?, None)
    };

    let mut settings = settings;
    if cli.simulate && settings.capture.region.is_none() {
        settings.capture.region = Some(SIMULATED_REGION);
    }

    let params = SharedParameters::new(settings.timing)?;
    let mut session = Session::new(settings, params)?;
    session.on_lock(|event| {
        log::debug!(
            "Lock frame {}x{} labels:\n{}",
            event.frame.width(),
            event.frame.height(),
            label_file(&event.observation).trim_end()
        );
    });

    let (vision, actuator) = backends;
    session.launch(vision, actuator)?;
    if cli.autostart {
        session.start_play();
    }

    println!("Commands: start | stop | status | factor N | stabilize S | commit S | confidence C | snapshot PATH | quit");
    operator_loop(&session)?;

    session.shutdown();
    if let Some(game) = game {
        let (landed, missed) = game.score();
        log::info!("Simulated score: {} landed, {} missed", landed, missed);
    }
    Ok(())
}

fn effective_settings(cli: &Cli) -> Result<Settings, ConfigError> {
    let mut settings = Settings::load_or_default(&cli.config)?;

    if let Some(region) = cli.region.or(cli.corners) {
        settings.capture.region = Some(region);
    }
    if let Some(point) = cli.press_point {
        settings.capture.press_point = Some(point);
    }
    if let Some(model) = &cli.model {
        settings.detector.model_path = Some(model.clone());
    }
    if let Some(factor) = cli.factor {
        settings.timing.factor = factor;
    }
    if let Some(stabilize) = cli.stabilize {
        settings.timing.stabilize_seconds = stabilize;
    }
    if let Some(commit) = cli.commit {
        settings.timing.commit_seconds = commit;
    }
    if let Some(confidence) = cli.confidence {
        settings.timing.confidence_threshold = confidence;
    }

    settings.validate()?;
    Ok(settings)
}

#[cfg(all(feature = "desktop", feature = "desktop-ml"))]
fn desktop_backends(settings: &Settings) -> Result<Backends, AppError> {
    use hopper::input::EnigoPointer;
    use hopper::vision::{OnnxDetector, ScreenCapture};

    let region = settings
        .capture
        .region
        .ok_or(SessionError::NoCaptureRegion)?;
    let detector = OnnxDetector::load(&settings.detector).map_err(SessionError::NoDetector)?;
    let source = ScreenCapture::new(region)?;
    let actuator: Box<dyn Actuator + Send> = Box::new(PressActuator::new(EnigoPointer::new()?));

    Ok((
        VisionSystem::new(Box::new(source), Box::new(detector)),
        actuator,
    ))
}

#[cfg(not(all(feature = "desktop", feature = "desktop-ml")))]
fn desktop_backends(settings: &Settings) -> Result<Backends, AppError> {
    #[cfg(not(feature = "desktop-ml"))]
    {
        let err = hopper::vision::models::runtime_unavailable(&settings.detector);
        Err(SessionError::NoDetector(err).into())
    }
    #[cfg(feature = "desktop-ml")]
    {
        let _ = settings;
        Err(AppError::Unsupported(
            "screen capture and input need the desktop feature; try --simulate",
        ))
    }
}

fn operator_loop(session: &Session) -> Result<(), AppError> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<OperatorCommand>() {
            Ok(command) => command,
            Err(e) => {
                log::warn!("{}", e);
                continue;
            }
        };

        match command {
            OperatorCommand::Start => session.start_play(),
            OperatorCommand::Stop => session.stop_play(),
            OperatorCommand::Status => print_status(&session.status()),
            OperatorCommand::Snapshot(path) => match session.latest_preview() {
                Some(preview) => match preview.save(&path) {
                    Ok(()) => log::info!("Saved preview to {}", path),
                    Err(e) => log::warn!("Failed to save {}: {}", path, e),
                },
                None => log::warn!("No frame captured yet"),
            },
            OperatorCommand::Quit => break,
            parameter => match parameter.apply(session.parameters()) {
                Ok(_) => {
                    let p = session.parameters().snapshot();
                    log::info!(
                        "Parameters: factor {:.5}, stabilize {:.2}s, commit {:.2}s, confidence {:.2}",
                        p.factor,
                        p.stabilize_seconds,
                        p.commit_seconds,
                        p.confidence_threshold
                    );
                }
                Err(e) => log::warn!("{}", e),
            },
        }
    }
    Ok(())
}

fn print_status(status: &SessionStatus) {
    println!("{}", status.message);
    println!(
        "  distance {:.0}px -> {:.3}s press | jumps {}: {} ok / {} failed ({} imprecise) | frames {} ({} dropped)",
        status.current_distance,
        status.preview_duration,
        status.stats.attempts(),
        status.stats.presses,
        status.stats.failures,
        status.stats.imprecise_presses,
        status.frames,
        status.dropped_observations
    );
    if let (Some(planned), Some(actual)) = (status.stats.last_planned, status.stats.last_actual) {
        println!("  last jump: planned {:.3}s, actual {:.3}s", planned, actual);
    }
    if let Some(err) = &status.last_error {
        println!("  last sensing error: {}", err);
    }
    match serde_json::to_string(status) {
        Ok(json) => log::debug!("{}", json),
        Err(e) => log::debug!("Status not serializable: {}", e),
    }
}
