//! `MediaKiosk` Core Library
//!
//! This crate provides the core functionality for the `MediaKiosk` application:
//! - USB hot-plug watching with mounting and media classification
//! - An unbounded FIFO event channel from the watcher to the UI context
//! - Playback sessions for audio, video (with presentation mode) and slideshows
//! - WiFi configuration through NetworkManager
//! - Streaming sites opened in an external browser
//! - Application configuration management
//!
//! # Threading
//!
//! Only the device watcher runs on its own thread. Everything else is owned by
//! the UI context and driven by periodic calls to [`UsbSession::tick`],
//! [`UsbSession::pump`] and [`StreamingSession::poll`].
//!
//! # Error Handling
//!
//! Errors are typed per domain and gathered in [`Error`]. See the [`error`]
//! module for details.
//!
//! ```rust,ignore
//! use mediakiosk_core::{Error, Result};
//!
//! fn do_something() -> Result<()> {
//!     // Your code here
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod media;
pub mod network;
pub mod playback;
pub mod streaming;
pub mod timer;
pub mod usb_session;

pub use channel::{DeviceEvent, EventReceiver, EventSender, event_channel};
pub use config::{
    AppConfig, ConfigManager, NetworkConfig, PlaybackConfig, PlayerCommand, PlayersConfig,
    ScreenSize, StreamingConfig, UsbConfig, WatcherConfig,
};
pub use device::{
    DeviceAction, DeviceNotification, DeviceWatcher, DeviceWatcherHandle, MountProvider,
    NotificationSource, PartitionTableSource, UdisksMountProvider,
};
pub use error::{
    ChannelError, DeviceError, Error, ErrorKind, FileSystemError, MediaError, NetworkError,
    PlaybackError, ProcessError, Result,
};
pub use media::{
    AUDIO_EXTENSIONS, IMAGE_EXTENSIONS, MediaCategory, MediaClassifier, MediaSet,
    VIDEO_EXTENSIONS,
};
pub use network::{ConnectOutcome, NetworkPanel, NetworkProvider, NmcliNetworkProvider, PAGE_SIZE};
pub use playback::{
    EndOfMediaNotifier, EngineEvent, EngineEventKind, EngineFactory, ExternalPlayerEngine,
    MediaEngine, PlaybackFailure, PlaybackPhase, PlaybackSession, PlaybackState, SessionKind,
    SessionView,
};
pub use streaming::{
    BrowserLauncher, ExternalProcessLauncher, StreamingService, StreamingSession, WindowGeometry,
};
pub use timer::{ArmedTimer, Clock, ManualClock, SystemClock, TimerPurpose, TimerSlot};
pub use usb_session::{Affordances, LaunchOutcome, UsbSession};
