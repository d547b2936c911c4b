use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "capturelink",
    about = "Relay frames from a capture helper and synthesize touch input",
    author,
    version,
    propagate_version = true
)]
pub struct Cli {
    /// JSON session configuration.
    #[arg(long, global = true, env = "CAPTURELINK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Capture a window, hooked window, external source, or the desktop.
    Run {
        /// `game.exe`, `hook:game.exe`, `spout:Sender`, or `desktop`.
        #[arg(required_unless_present = "entry", conflicts_with = "entry")]
        target: Option<String>,
        /// Launch-entry file (.win, .txt, .bat, .exe, .lnk, .url).
        #[arg(long)]
        entry: Option<PathBuf>,
        /// Capture helper executable.
        #[arg(long, env = "CAPTURELINK_HELPER")]
        helper: Option<PathBuf>,
        /// Native render plugin DLL.
        #[arg(long)]
        render_plugin: Option<PathBuf>,
        /// Ask the helper to hide the cursor.
        #[arg(long)]
        no_cursor: bool,
        /// Replay JSON-lines hand events into the captured window, one tick
        /// event per session tick.
        #[arg(long)]
        touch_events: Option<PathBuf>,
    },
    /// Replay JSON-lines hand events through the touch contact manager.
    TouchReplay {
        /// Event file, or `-` for stdin.
        events: PathBuf,
        /// Wall-clock pause after each tick event, in milliseconds.
        #[arg(long)]
        tick_ms: Option<u64>,
    },
}
