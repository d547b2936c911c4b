use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureLinkError {
    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("Helper launch failed: {0}")]
    Launch(#[from] LaunchError),

    #[error("Render backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Frame bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Shared memory error: {0}")]
    Channel(#[from] ChannelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureLinkError {
    /// Configuration-class failures abort a session; everything else is retried or tolerated.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::ConfigurationInvalid { .. } | Self::Backend(_) => true,
            Self::Launch(e) => e.is_configuration(),
            Self::Bridge(_) | Self::Channel(_) | Self::Io(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("helper executable not found at {path}")]
    ExecutableMissing { path: PathBuf },

    #[error("not permitted to start {path}: {source}")]
    SpawnDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    pub fn is_configuration(&self) -> bool {
        // Every launch failure means the session cannot run as configured.
        true
    }

    pub fn from_spawn(path: PathBuf, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::ExecutableMissing { path },
            std::io::ErrorKind::PermissionDenied => Self::SpawnDenied { path, source },
            _ => Self::Spawn { path, source },
        }
    }
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("segment '{name}' is {len} bytes, header needs {needed}")]
    Truncated { name: String, len: usize, needed: usize },

    #[error("segment '{name}' disappeared or was recreated")]
    Vanished { name: String },

    #[error("shared memory IO: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("render plugin not found at {path}")]
    LibraryMissing { path: PathBuf },

    #[error("render plugin is missing entry point `{name}`")]
    MissingEntryPoint { name: &'static str },

    #[error("native render plugins are not supported on this platform")]
    Unsupported,
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("host could not allocate a {width}x{height} texture: {reason}")]
    TextureAllocation { width: u32, height: u32, reason: String },
}

#[derive(Error, Debug)]
pub enum InjectError {
    #[error("touch injection is not available on this platform")]
    Unsupported,

    #[error("touch injection initialisation failed: {reason}")]
    InitFailed { reason: String },

    #[error("OS rejected touch batch of {count} contacts: {reason}")]
    Rejected { count: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_errors_classify_by_kind() {
        let missing = LaunchError::from_spawn(
            PathBuf::from("helper.exe"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(missing, LaunchError::ExecutableMissing { .. }));

        let denied = LaunchError::from_spawn(
            PathBuf::from("helper.exe"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(denied, LaunchError::SpawnDenied { .. }));
    }

    #[test]
    fn only_configuration_errors_abort() {
        let launch: CaptureLinkError =
            LaunchError::ExecutableMissing { path: PathBuf::from("x") }.into();
        assert!(launch.is_configuration());

        let backend: CaptureLinkError = BackendError::MissingEntryPoint { name: "SetSharedHandle" }.into();
        assert!(backend.is_configuration());

        let channel: CaptureLinkError = ChannelError::Vanished { name: "a_SHM".into() }.into();
        assert!(!channel.is_configuration());
    }
}
