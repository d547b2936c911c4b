//! Capture targets and launch-entry parsing.
//!
//! A session captures exactly one [`CaptureTarget`]. Targets come either from
//! a bare identifier string (`"game.exe"`, `"spout:Sender"`, `"desktop"`) or
//! from a launch-entry file on disk:
//!
//! | extension | identifier | launch command |
//! |-----------|------------|----------------|
//! | `.win`, `.txt` | file contents | sibling `.bat`, if present |
//! | `.bat`, `.exe`, `.lnk`, `.url` | file stem | the file itself |
//! | anything else | file stem | none |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Well-known segment name used by the helper in desktop mode.
pub const DESKTOP_SHM_NAME: &str = "DesktopCapture_SHM";

const NO_CURSOR_FLAG: &str = "--no-cursor";
const EXTERNAL_PREFIX: &str = "spout:";
const HOOK_PREFIX: &str = "hook:";

// MARK: - CaptureMode

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Helper captures the top-level window of a named process.
    ProcessWindow,
    /// Helper launches the target itself and hooks its presentation.
    HookedWindow,
    /// An external producer already publishes frames; no helper is started.
    ExternalSource,
    /// Helper captures the primary monitor.
    Desktop,
}

// MARK: - CaptureTarget

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTarget {
    pub mode: CaptureMode,
    pub identifier: String,
    #[serde(default)]
    pub launch_command: Option<PathBuf>,
    #[serde(default)]
    pub hide_cursor: bool,
}

impl CaptureTarget {
    pub fn new(mode: CaptureMode, identifier: impl Into<String>) -> Self {
        Self {
            mode,
            identifier: identifier.into(),
            launch_command: None,
            hide_cursor: false,
        }
    }

    /// Interpret a bare identifier, honouring the `spout:` / `hook:` prefixes
    /// and the `desktop` keyword.
    pub fn parse(raw: &str) -> Self {
        let cleaned = unquote(raw.trim());

        if cleaned.eq_ignore_ascii_case("desktop") {
            return Self::new(CaptureMode::Desktop, "desktop");
        }
        if let Some(rest) = strip_prefix_ignore_case(cleaned, EXTERNAL_PREFIX) {
            return Self::new(CaptureMode::ExternalSource, rest.trim());
        }
        if let Some(rest) = strip_prefix_ignore_case(cleaned, HOOK_PREFIX) {
            return Self::new(CaptureMode::HookedWindow, rest.trim());
        }
        Self::new(CaptureMode::ProcessWindow, cleaned)
    }

    /// Build a target from a launch-entry file.
    pub fn from_entry_file(path: &Path) -> std::io::Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_owned();

        let target = match extension.as_str() {
            "win" | "txt" => {
                let content = std::fs::read_to_string(path)?;
                let mut content = content.replace('\u{FEFF}', "");
                let hide_cursor = content.contains(NO_CURSOR_FLAG);
                if hide_cursor {
                    content = content.replace(NO_CURSOR_FLAG, "");
                }
                let batch = path.with_extension("bat");
                let mut target = Self::parse(content.trim());
                target.hide_cursor = hide_cursor;
                target.launch_command = batch.is_file().then_some(batch);
                target
            }
            "bat" | "exe" | "lnk" | "url" => {
                let mut target = Self::parse(&stem);
                target.launch_command = Some(path.to_path_buf());
                target
            }
            _ => Self::parse(&stem),
        };

        debug!(
            "Launch entry {} → mode={:?} id='{}' launch={:?} hide_cursor={}",
            path.display(),
            target.mode,
            target.identifier,
            target.launch_command,
            target.hide_cursor
        );
        Ok(target)
    }

    /// Name of the shared-memory segment the producer writes for this target.
    pub fn shm_name(&self) -> String {
        match self.mode {
            CaptureMode::Desktop => DESKTOP_SHM_NAME.to_owned(),
            CaptureMode::ExternalSource => self.identifier.clone(),
            CaptureMode::ProcessWindow | CaptureMode::HookedWindow => {
                format!("{}_SHM", self.identifier)
            }
        }
    }

    /// Whether frames come from a helper process this module supervises.
    pub fn needs_helper(&self) -> bool {
        !matches!(self.mode, CaptureMode::ExternalSource)
    }

    /// Command-line flags for the helper executable.
    pub fn helper_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self.mode {
            CaptureMode::Desktop => args.push("--desktop".to_owned()),
            _ => {
                args.push("--target".to_owned());
                args.push(self.identifier.clone());
            }
        }
        args.push("--memname".to_owned());
        args.push(self.shm_name());
        if self.mode == CaptureMode::HookedWindow {
            args.push("--hook".to_owned());
        }
        if self.hide_cursor {
            args.push(NO_CURSOR_FLAG.to_owned());
        }
        args
    }
}

fn unquote(s: &str) -> &str {
    if s.len() > 1 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}
