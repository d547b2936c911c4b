//! CaptureLink — relay a capture helper's frames and synthesize touch input.
//!
//! ```text
//! capturelink run game.exe            helper → shared memory → frame bridge
//! capturelink run --entry game.win    target (and launch command) from a file
//! capturelink run game.exe --touch-events hands.jsonl
//! capturelink touch-replay hands.jsonl
//! ```
//!
//! Ctrl-C cancels the session; every helper spawned by this process is then
//! terminated through the global registry.

mod cli;

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use capturelink_capture::{
    FixedSurfaceParams, HelperRegistry, NativeRenderPlugin, OsLauncher, RenderBackend,
    TracingBackend,
};
use capturelink_core::{CaptureTarget, SessionConfig, TouchConfig};
use capturelink_session::{
    parse_line, CaptureSession, HeadlessHost, ReplayDriver, ReplayEvent, SessionOutcome,
};
use capturelink_touch::{
    LoggingInjector, OsScreenGeometry, OsTouchInjector, ScreenGeometry, TouchContactManager,
    TouchInjector,
};
use clap::Parser;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

type OsTouchManager = TouchContactManager<Box<dyn TouchInjector>, OsScreenGeometry>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("CaptureLink v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Commands::Run { target, entry, helper, render_plugin, no_cursor, touch_events } => {
            if let Some(helper) = helper {
                config.helper_path = helper;
            }
            if render_plugin.is_some() {
                config.render_plugin_path = render_plugin;
            }
            let mut target = match (entry, target) {
                (Some(entry), _) => CaptureTarget::from_entry_file(&entry)
                    .with_context(|| format!("reading launch entry {}", entry.display()))?,
                (None, Some(raw)) => CaptureTarget::parse(&raw),
                (None, None) => bail!("a target or --entry is required"),
            };
            target.hide_cursor |= no_cursor;
            run_capture(config, target, touch_events.as_deref()).await
        }
        Commands::TouchReplay { events, tick_ms } => {
            let pause = tick_ms.map(Duration::from_millis);
            touch_replay(config, &events, pause).await
        }
    }
}

async fn run_capture(
    config: SessionConfig,
    target: CaptureTarget,
    touch_events: Option<&Path>,
) -> Result<()> {
    let backend: Box<dyn RenderBackend> = match &config.render_plugin_path {
        Some(path) => Box::new(
            NativeRenderPlugin::load(path)
                .with_context(|| format!("loading render plugin {}", path.display()))?,
        ),
        None => Box::new(TracingBackend::default()),
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping");
            ctrl_c.cancel();
            HelperRegistry::global().terminate_all();
        }
    });

    let tick = config.tick_interval();
    let touch = match touch_events {
        Some(path) => Some((open_events(path)?, Arc::new(Mutex::new(os_touch_manager(config.touch.clone()))))),
        None => None,
    };

    let mut session = CaptureSession::new(
        config,
        target,
        OsLauncher,
        backend,
        HeadlessHost::new(FixedSurfaceParams::default()),
        HelperRegistry::global(),
        cancel.clone(),
    );
    if let Some((_, manager)) = &touch {
        session.attach_touch(Arc::clone(manager));
    }

    let stop_touch = cancel.child_token();
    let (outcome, replayed) = tokio::join!(
        async {
            let outcome = session.run().await;
            stop_touch.cancel();
            outcome
        },
        async {
            match touch {
                Some((events, manager)) => {
                    replay_events(events, &manager, Some(tick), &stop_touch).await.map(Some)
                }
                None => Ok(None),
            }
        },
    );

    let stray = HelperRegistry::global().terminate_all();
    if stray > 0 {
        warn!("Terminated {stray} capture helper(s) still running at exit");
    }

    let outcome = match outcome {
        SessionOutcome::CaptureEnded | SessionOutcome::Cancelled => Ok(()),
        SessionOutcome::Aborted(e) => Err(e).context("capture session aborted"),
    };
    replayed?;
    outcome
}

async fn touch_replay(mut config: SessionConfig, events: &Path, pause: Option<Duration>) -> Result<()> {
    config.touch.test_mode = true;
    let manager = Mutex::new(os_touch_manager(config.touch));
    replay_events(open_events(events)?, &manager, pause, &CancellationToken::new()).await?;
    Ok(())
}

fn os_touch_manager(config: TouchConfig) -> OsTouchManager {
    let injector: Box<dyn TouchInjector> = match OsTouchInjector::new() {
        Ok(injector) => Box::new(injector),
        Err(e) => {
            warn!("OS touch injection unavailable ({e}); logging contacts instead");
            Box::new(LoggingInjector::default())
        }
    };
    TouchContactManager::new(config, injector, OsScreenGeometry)
}

/// `-` reads stdin.
fn open_events(events: &Path) -> Result<Box<dyn BufRead>> {
    if events == Path::new("-") {
        return Ok(Box::new(BufReader::new(std::io::stdin())));
    }
    let file = std::fs::File::open(events)
        .with_context(|| format!("opening {}", events.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Apply every event to `manager`, pausing after each tick, until the input
/// ends or `stop` fires. All contacts are lifted before returning.
async fn replay_events<I: TouchInjector, G: ScreenGeometry>(
    reader: Box<dyn BufRead>,
    manager: &Mutex<TouchContactManager<I, G>>,
    pause: Option<Duration>,
    stop: &CancellationToken,
) -> Result<ReplayDriver> {
    let mut driver = ReplayDriver::new();
    for (number, line) in reader.lines().enumerate() {
        if stop.is_cancelled() {
            break;
        }
        let line = line.context("reading replay input")?;
        let Some(event) = parse_line(&line)
            .with_context(|| format!("line {}: invalid event", number + 1))?
        else {
            continue;
        };
        driver.apply(&mut *manager.lock(), &event);
        if let (ReplayEvent::Tick, Some(pause)) = (&event, pause) {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    manager.lock().release_all();
    info!(
        "Replay finished: {} tick(s), {} contact record(s) submitted",
        driver.ticks(),
        driver.submitted()
    );
    Ok(driver)
}
