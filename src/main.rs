// src/main.rs

mod camera;
mod color_analysis;
mod config;
mod debug;
mod detection;
mod motor;
mod navigation;
mod preprocessing;
mod shutdown;
mod stats;
mod types;

use anyhow::{bail, Result};
use camera::{open_frame_source, FrameSource};
use debug::{DebugImageWriter, DebugSink, NullDebugSink};
use motor::{open_motors, MotorActuator};
use navigation::NavigationStateMachine;
use stats::RunStats;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use types::{Config, Device, Frame, LoggingConfig};

const CONFIG_ENV: &str = "LANE_ROVER_CONFIG";
const DEFAULT_CONFIG: &str = "config.yaml";

fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
}

fn debug_mode_forced() -> bool {
    std::env::var("DEBUG_MODE")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Console logging plus an optional file copy. Keep the guard alive until
/// exit so buffered file lines are flushed.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lane_rover={}", logging.level)));

    let appender = logging.file_target().map(|(dir, name)| {
        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(name)
            .build(dir)
    });
    let (file_writer, guard, file_error) = match appender {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard), None)
        }
        Some(Err(e)) => (None, None, Some(e)),
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_writer.map(|writer| fmt::layer().with_ansi(false).with_writer(writer)))
        .init();

    if let Some(e) = file_error {
        warn!("Log file disabled: {}", e);
    }
    guard
}

fn open_debug_sink(config: &Config) -> Box<dyn DebugSink> {
    if !config.debug.enabled {
        return Box::new(NullDebugSink);
    }
    match DebugImageWriter::create(&config.debug.output_dir) {
        Ok(writer) => Box::new(writer),
        Err(e) => {
            warn!("Debug images disabled: {:#}", e);
            Box::new(NullDebugSink)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let path = config_path();
    let loaded = Config::load_or_default(&path);
    let fallback = LoggingConfig::default();
    let _log_guard = init_logging(loaded.as_ref().map(|c| &c.logging).unwrap_or(&fallback));

    info!("🤖 Lane rover starting");
    let mut config = loaded?;
    if Path::new(&path).exists() {
        info!("✓ Configuration loaded from {}", path);
    } else {
        warn!("Config file {} not found, using defaults", path);
    }
    if debug_mode_forced() {
        config.debug.enabled = true;
    }

    info!(
        "Speeds: default={:.2} turn={:.2} slow={:.2} curve={:.2}",
        config.motion.default_speed,
        config.motion.turn_speed,
        config.motion.slow_speed,
        config.motion.curve_speed
    );

    let mut motors = match open_motors(&config.motors) {
        Device::Ready(motors) => motors,
        Device::Unavailable { reason } => {
            error!("Motor controller unavailable: {}", reason);
            bail!("motor controller unavailable: {}", reason);
        }
    };
    info!("✓ Motors ready");

    let mut source = match open_frame_source(&config.camera) {
        Device::Ready(source) => source,
        Device::Unavailable { reason } => {
            error!("Frame source unavailable: {}", reason);
            if let Err(e) = motors.release() {
                error!("Motor release failed: {:#}", e);
            }
            bail!("frame source unavailable: {}", reason);
        }
    };

    let warmup = source.warmup();
    if !warmup.is_zero() {
        info!("Camera warming up for {:?}", warmup);
        tokio::time::sleep(warmup).await;
    }
    info!("✓ Frame source ready");

    let mut nav = NavigationStateMachine::new(&config).with_debug_sink(open_debug_sink(&config));

    info!("🏁 Control loop running (Ctrl-C to stop)");
    let started = Instant::now();
    let stats = run_control_loop(&config, &mut nav, motors.as_mut(), source.as_mut()).await;

    let report = shutdown::shutdown(motors.as_mut(), source.as_mut(), nav.debug_sink_mut());
    stats.log_summary(started.elapsed());
    if !report.is_clean() {
        warn!("{} shutdown step(s) failed", report.failures.len());
    }
    Ok(())
}

async fn run_control_loop(
    config: &Config,
    nav: &mut NavigationStateMachine,
    motors: &mut dyn MotorActuator,
    source: &mut dyn FrameSource,
) -> RunStats {
    let mut stats = RunStats::default();
    let retry_delay = Duration::from_millis(config.control.capture_retry_delay_ms);

    let mut ticker = tokio::time::interval(Duration::from_millis(config.control.cycle_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let stop_signal = tokio::signal::ctrl_c();
    tokio::pin!(stop_signal);

    let mut frame_index = 0u64;
    loop {
        tokio::select! {
            _ = &mut stop_signal => {
                info!("Interrupt received");
                break;
            }
            _ = ticker.tick() => {}
        }

        if source.is_exhausted() {
            info!("📭 Frame source exhausted");
            break;
        }

        let image = match source.capture() {
            Ok(Some(image)) => Some(image),
            Ok(None) => {
                debug!("Empty frame, retrying in {:?}", retry_delay);
                None
            }
            Err(e) => {
                warn!("Frame capture failed: {:#}", e);
                None
            }
        };

        let Some(image) = image else {
            stats.record_skipped();
            let interrupted = tokio::select! {
                _ = &mut stop_signal => true,
                _ = tokio::time::sleep(retry_delay) => false,
            };
            if interrupted {
                info!("Interrupt received");
                break;
            }
            continue;
        };

        let frame = Frame {
            image,
            index: frame_index,
            captured_at: Instant::now(),
        };
        frame_index += 1;

        let report = nav.step(&frame.image, frame.captured_at);
        report.command.apply(motors);
        stats.record(&report);

        if frame.index % 100 == 0 {
            debug!(
                "frame {}: {} ({:?})",
                frame.index,
                report.command.name(),
                nav.state().name()
            );
        }
    }

    stats
}
