use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::CaptureLinkError;
use crate::types::Resolution;

/// Session-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path to the capture helper executable.
    #[serde(alias = "helperPath")]
    pub helper_path: PathBuf,
    /// Working directory for the helper; defaults to the executable's directory.
    #[serde(alias = "helperWorkingDir")]
    pub helper_working_dir: Option<PathBuf>,
    /// Native render plugin library, if a GPU copy path is available.
    #[serde(alias = "renderPluginPath")]
    pub render_plugin_path: Option<PathBuf>,
    /// Duration of one cooperative tick.
    #[serde(alias = "tickIntervalMs")]
    pub tick_interval_ms: u64,
    /// Helper runs shorter than this are "target not found yet".
    #[serde(alias = "fastExitThresholdMs")]
    pub fast_exit_threshold_ms: u64,
    /// Pause before relaunching after a fast exit.
    #[serde(alias = "relaunchDelayMs")]
    pub relaunch_delay_ms: u64,
    /// Directory holding file-backed segments on non-Windows hosts.
    #[serde(alias = "shmDir")]
    pub shm_dir: PathBuf,
    pub ambient: AmbientConfig,
    pub touch: TouchConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            helper_path: PathBuf::from("UserData/WindowCapture/GraphicsCapture.exe"),
            helper_working_dir: None,
            render_plugin_path: None,
            tick_interval_ms: 16,
            fast_exit_threshold_ms: 2_000,
            relaunch_delay_ms: 1_000,
            shm_dir: PathBuf::from("/dev/shm"),
            ambient: AmbientConfig::default(),
            touch: TouchConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, CaptureLinkError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| CaptureLinkError::ConfigurationInvalid {
            reason: format!("{}: {e}", path.display()),
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn fast_exit_threshold(&self) -> Duration {
        Duration::from_millis(self.fast_exit_threshold_ms)
    }

    pub fn relaunch_delay(&self) -> Duration {
        Duration::from_millis(self.relaunch_delay_ms)
    }

    /// Executable file name used to recognise stray helper processes.
    pub fn helper_process_name(&self) -> String {
        self.helper_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn helper_working_dir(&self) -> PathBuf {
        self.helper_working_dir.clone().unwrap_or_else(|| {
            self.helper_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }
}

/// Ambient-light probe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientConfig {
    pub enabled: bool,
    /// Number of intermediate half-size surfaces before the 1×1 probe.
    #[serde(alias = "maxChainLength")]
    pub max_chain_length: usize,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self { enabled: true, max_chain_length: 4 }
    }
}

/// Touch synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchConfig {
    /// Fingertip offset from the tracked hand point, in the hand's local frame.
    #[serde(alias = "primaryOffset")]
    pub primary_offset: [f32; 2],
    #[serde(alias = "secondaryOffset")]
    pub secondary_offset: [f32; 2],
    pub pressure: u32,
    #[serde(alias = "contactRadiusPx")]
    pub contact_radius_px: i32,
    /// Map onto the whole desktop instead of the captured window.
    #[serde(alias = "testMode")]
    pub test_mode: bool,
    /// Desktop size used when the OS cannot report one.
    #[serde(alias = "desktopResolution")]
    pub desktop_resolution: Resolution,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            primary_offset: [0.0, 0.0],
            secondary_offset: [0.0, 0.0],
            pressure: 512,
            contact_radius_px: 2,
            test_mode: false,
            desktop_resolution: Resolution::FHD,
        }
    }
}
