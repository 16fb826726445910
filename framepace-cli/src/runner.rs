//! Player setup and the blocking run loop for `fpace`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::ArgMatches;
use log::{debug, error, info, warn};
use serde_json::json;

use framepace_lib::diagnostics::reporter::{PlaybackReport, Reporter};
use framepace_lib::sink::rodio_output::RodioSinkProvider;
use framepace_lib::sink::virtual_device::VirtualSinkProvider;
use framepace_lib::sink::SinkProvider;
use framepace_lib::source::symphonia::SymphoniaSource;
use framepace_lib::source::synthetic::{SyntheticConfig, SyntheticSource};
use framepace_lib::source::FrameSource;
use framepace_lib::{Delivery, PlaybackSettings, Player, PlayerError, PlayerEvent, SessionStats};

const PROGRESS_INTERVAL_MS: u64 = 250;
const JITTER_PROBABILITY: f64 = 0.05;
const JITTER_MAX_STALL_MS: u64 = 40;

/// Run the CLI command and return an exit code.
pub fn run(args: &ArgMatches) -> Result<i32, PlayerError> {
    if let Some(("settings", _)) = args.subcommand() {
        let json = serde_json::to_string_pretty(&PlaybackSettings::default())
            .map_err(|err| PlayerError::Settings(err.into()))?;
        println!("{}", json);
        return Ok(0);
    }

    let settings = match args.get_one::<String>("settings") {
        Some(path) => PlaybackSettings::from_json_file(path)?,
        None => PlaybackSettings::default(),
    };

    let synthetic = args.get_flag("synthetic");
    let locator = match args.get_one::<String>("INPUT") {
        Some(input) => input.clone(),
        None if synthetic => "synthetic".to_string(),
        None => {
            error!("no input given");
            return Ok(-1);
        }
    };

    let failed = Arc::new(AtomicBool::new(false));
    let video_frames = Arc::new(AtomicU64::new(0));
    let delivery = build_delivery(failed.clone(), video_frames.clone());

    let mut builder = Player::builder(source_factory(args), delivery).settings(settings);
    if let Some(ms) = args.get_one::<i64>("max-read-ahead-ms") {
        builder = builder.max_read_ahead_ms(*ms);
    }
    if let Some(provider) = sink_provider(args) {
        builder = builder.sink_provider(provider);
    }
    let player = builder.build();

    let reporter = args.get_flag("progress").then(|| {
        let report: Arc<Mutex<dyn Fn(PlaybackReport) + Send>> =
            Arc::new(Mutex::new(|report: PlaybackReport| {
                info!(
                    "{:?} {:.2}s clock {} video {} audio {}",
                    report.state,
                    report.elapsed_ms as f64 / 1000.0,
                    if report.clock_active { "device" } else { "wall" },
                    report.video_delivered,
                    report.audio_delivered
                );
            }));
        Reporter::new(
            player.clone(),
            report,
            Duration::from_millis(PROGRESS_INTERVAL_MS),
        )
    });

    if !player.start(&locator) {
        return Ok(1);
    }
    if let Some(reporter) = &reporter {
        reporter.start();
    }

    let stop_after = args
        .get_one::<u64>("stop-after-ms")
        .map(|ms| Duration::from_millis(*ms));
    if !player.wait_until_finished(stop_after) {
        info!("stopping after {:?}", stop_after.unwrap_or_default());
    }
    player.stop();

    if let Some(reporter) = &reporter {
        reporter.stop();
    }

    let stats = player.stats();
    debug!("rendered {} video frames", video_frames.load(Ordering::Relaxed));
    print_summary(&locator, &stats);

    Ok(if failed.load(Ordering::Relaxed) { 1 } else { 0 })
}

fn source_factory(
    args: &ArgMatches,
) -> impl Fn() -> Box<dyn FrameSource + Send> + Send + Sync + 'static {
    let synthetic = args.get_flag("synthetic").then(|| {
        let seconds = args.get_one::<f64>("seconds").copied().unwrap_or(3.0);
        SyntheticConfig {
            duration: Duration::from_secs_f64(seconds.max(0.0)),
            ..SyntheticConfig::default()
        }
    });
    let jitter_seed = args.get_one::<u64>("jitter-seed").copied();

    move || -> Box<dyn FrameSource + Send> {
        match &synthetic {
            Some(config) => {
                let source = SyntheticSource::new(config.clone());
                match jitter_seed {
                    Some(seed) => Box::new(source.with_jitter(
                        seed,
                        JITTER_PROBABILITY,
                        Duration::from_millis(JITTER_MAX_STALL_MS),
                    )),
                    None => Box::new(source),
                }
            }
            None => Box::new(SymphoniaSource::new()),
        }
    }
}

fn sink_provider(args: &ArgMatches) -> Option<Arc<dyn SinkProvider>> {
    if args.get_flag("no-audio") {
        None
    } else if args.get_flag("virtual-audio") {
        Some(Arc::new(VirtualSinkProvider::new()))
    } else {
        Some(Arc::new(RodioSinkProvider::new()))
    }
}

fn build_delivery(failed: Arc<AtomicBool>, video_frames: Arc<AtomicU64>) -> Delivery {
    Delivery::new(move |frame, relative_us| {
        let count = video_frames.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(image) = frame.image.as_ref() {
            if count % 30 == 1 {
                debug!(
                    "video frame {} at {:.3}s ({}x{})",
                    count,
                    relative_us as f64 / 1_000_000.0,
                    image.width,
                    image.height
                );
            }
        }
        Ok(())
    })
    .with_events(move |event| match event {
        PlayerEvent::DimensionsDetected {
            width,
            height,
            pixel_format,
        } => info!("video {}x{} {:?}", width, height, pixel_format),
        PlayerEvent::PlaybackStarted => info!("playback started"),
        PlayerEvent::EndOfMedia => info!("end of media"),
        PlayerEvent::Error { message, cause } => {
            let fatal = cause.as_ref().map(|err| err.is_fatal()).unwrap_or(false);
            if fatal {
                error!("{}", message);
                failed.store(true, Ordering::Relaxed);
            } else {
                warn!("{}", message);
            }
        }
    })
}

fn print_summary(locator: &str, stats: &SessionStats) {
    let summary = json!({
        "input": locator,
        "state": format!("{:?}", stats.state),
        "elapsed_ms": stats.elapsed_us / 1000,
        "device_clock_seen": stats.device_clock_seen,
        "iterations": stats.iterations,
        "backpressure_suspensions": stats.backpressure_suspensions,
        "longest_suspension_ms": stats.longest_suspension.as_millis() as u64,
        "video_delivered": stats.video.delivered,
        "video_failed": stats.video.failed,
        "audio_delivered": stats.audio.delivered,
        "audio_failed": stats.audio.failed,
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(text) => println!("{}", text),
        Err(err) => warn!("failed to render summary: {}", err),
    }
}
