//! Error types for MediaKiosk core operations.
//!
//! Errors are grouped by domain ([`DeviceError`], [`MediaError`], [`PlaybackError`], ...)
//! and wrapped by the crate-wide [`Error`]. Nothing in the core is fatal to the
//! process: device and media errors are recovered locally, playback errors are
//! surfaced to the owning session.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error category, used for logging and for deciding whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Block device, mount or notification failures.
    Device,
    /// Media directory or classification failures.
    Media,
    /// Playback engine or session failures.
    Playback,
    /// Cross-context channel failures.
    Channel,
    /// WiFi / connectivity failures.
    Network,
    /// External process failures.
    Process,
    /// File system failures.
    FileSystem,
    /// Invalid or unreadable configuration.
    Configuration,
    /// Anything else.
    Internal,
}

/// Errors raised while watching, mounting or resolving block devices.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The mount tool failed for a device.
    #[error("Failed to mount {device}: {reason}")]
    MountFailed {
        /// Device path, e.g. `/dev/sdb1`.
        device: String,
        /// Tool output or failure reason.
        reason: String,
    },

    /// The device has no mount point (yet).
    #[error("No mount point for {device} after {attempts} attempt(s)")]
    MountPointUnavailable {
        /// Device path.
        device: String,
        /// Number of lookups performed.
        attempts: u32,
    },

    /// The notification source could not be read.
    #[error("Device notification source failed: {reason}")]
    NotificationSource {
        /// Failure reason.
        reason: String,
    },

    /// The watcher thread could not be started.
    #[error("Failed to start device watcher: {reason}")]
    WatcherStart {
        /// Failure reason.
        reason: String,
    },
}

/// Errors raised while reading media directories.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The directory could not be listed.
    #[error("Cannot read media directory {path}: {reason}")]
    Unreadable {
        /// Directory that failed.
        path: PathBuf,
        /// Failure reason.
        reason: String,
    },
}

/// Errors raised by playback engines and sessions.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The engine failed to load an item.
    #[error("Failed to open {path}: {reason}")]
    OpenFailed {
        /// Item that failed.
        path: PathBuf,
        /// Failure reason.
        reason: String,
    },

    /// The engine failed while controlling an already loaded item.
    #[error("Playback engine error: {0}")]
    Engine(String),

    /// Index outside the item list.
    #[error("Item index {index} out of range for {len} item(s)")]
    InvalidIndex {
        /// Requested index.
        index: usize,
        /// Number of items.
        len: usize,
    },

    /// The session has already been closed.
    #[error("Playback session is closed")]
    SessionClosed,

    /// The operation is not available for this kind of session.
    #[error("{operation} is not supported by {kind} sessions")]
    Unsupported {
        /// Operation name.
        operation: &'static str,
        /// Session kind name.
        kind: &'static str,
    },
}

/// Errors raised by the device event channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The consumer side has been dropped.
    #[error("Event channel closed")]
    Closed,
}

/// Errors raised by the network collaborator.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The network tool could not be executed.
    #[error("Network command failed: {0}")]
    CommandFailed(String),

    /// The probe address could not be parsed.
    #[error("Invalid probe address {address}: {reason}")]
    InvalidProbeAddress {
        /// Configured address.
        address: String,
        /// Parse failure.
        reason: String,
    },
}

/// Errors raised when launching or controlling external processes.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process could not be spawned.
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed {
        /// Program name.
        program: String,
        /// Failure reason.
        reason: String,
    },

    /// The process could not be signalled or killed.
    #[error("Failed to control process {pid}: {reason}")]
    ControlFailed {
        /// Process id.
        pid: u32,
        /// Failure reason.
        reason: String,
    },
}

/// File system errors.
#[derive(Debug, Error)]
pub enum FileSystemError {
    /// Reading a file failed.
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// File path.
        path: PathBuf,
        /// Failure reason.
        reason: String,
    },

    /// Writing a file failed.
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// File path.
        path: PathBuf,
        /// Failure reason.
        reason: String,
    },

    /// Creating a directory failed.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// Directory path.
        path: PathBuf,
        /// Failure reason.
        reason: String,
    },
}

/// Errors that can occur in MediaKiosk core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Device error.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Media error.
    #[error(transparent)]
    Media(#[from] MediaError),

    /// Playback error.
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// Channel error.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Network error.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Process error.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// File system error.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a mount failure.
    pub fn mount_failed(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Device(DeviceError::MountFailed {
            device: device.into(),
            reason: reason.into(),
        })
    }

    /// Create a playback open failure.
    pub fn open_failed(path: &Path, reason: impl Into<String>) -> Self {
        Self::Playback(PlaybackError::OpenFailed {
            path: path.to_path_buf(),
            reason: reason.into(),
        })
    }

    /// Create a process spawn failure.
    pub fn spawn_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Process(ProcessError::SpawnFailed {
            program: program.into(),
            reason: reason.into(),
        })
    }

    /// Get the error category.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Device(_) => ErrorKind::Device,
            Self::Media(_) => ErrorKind::Media,
            Self::Playback(_) => ErrorKind::Playback,
            Self::Channel(_) => ErrorKind::Channel,
            Self::Network(_) => ErrorKind::Network,
            Self::Process(_) => ErrorKind::Process,
            Self::FileSystem(_) | Self::Io(_) => ErrorKind::FileSystem,
            Self::Configuration(_) | Self::Serialization(_) => ErrorKind::Configuration,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same operation later may succeed.
    ///
    /// Devices that are still settling and network commands are transient;
    /// everything else needs a change of input.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Device(
                DeviceError::MountFailed { .. }
                    | DeviceError::MountPointUnavailable { .. }
                    | DeviceError::NotificationSource { .. }
            ) | Self::Network(NetworkError::CommandFailed(_))
        )
    }
}
