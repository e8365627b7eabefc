//! UI-side state of the USB screen.
//!
//! [`UsbSession`] caches the media of the inserted volume, tracks which
//! category buttons are enabled and owns at most one playback window.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channel::{DeviceEvent, EventReceiver};
use crate::config::PlaybackConfig;
use crate::media::{MediaCategory, MediaSet};
use crate::playback::{EngineFactory, PlaybackSession, SessionKind};
use crate::timer::Clock;

/// Enabled state of the three category buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Affordances {
    /// Photos button.
    pub photos: bool,
    /// Video button.
    pub video: bool,
    /// Music button.
    pub audio: bool,
}

impl Affordances {
    /// Enable exactly the categories that hold files.
    #[must_use]
    pub fn from_media(media: &MediaSet) -> Self {
        Self {
            photos: !media.images.is_empty(),
            video: !media.video.is_empty(),
            audio: !media.audio.is_empty(),
        }
    }

    /// Whether a category's button is enabled.
    #[must_use]
    pub const fn is_enabled(&self, category: MediaCategory) -> bool {
        match category {
            MediaCategory::Photos => self.photos,
            MediaCategory::Audio => self.audio,
            MediaCategory::Video => self.video,
        }
    }

    /// Whether any button is enabled.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.photos || self.video || self.audio
    }
}

/// Result of opening a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A playback window was opened.
    Opened {
        /// Kind of the new session.
        kind: SessionKind,
    },
    /// The category has no files; stay on the USB screen.
    NotFound {
        /// Inline message to show.
        message: &'static str,
    },
}

struct PlaybackWindow {
    category: MediaCategory,
    session: PlaybackSession,
    returned: Rc<Cell<bool>>,
}

/// Cached media, category buttons and the open playback window.
pub struct UsbSession {
    receiver: EventReceiver,
    media: MediaSet,
    affordances: Affordances,
    window: Option<PlaybackWindow>,
    engines: Box<dyn EngineFactory>,
    clock: Arc<dyn Clock>,
    timings: PlaybackConfig,
}

impl UsbSession {
    /// Create a session draining `receiver`.
    #[must_use]
    pub fn new(
        receiver: EventReceiver,
        engines: Box<dyn EngineFactory>,
        clock: Arc<dyn Clock>,
        timings: PlaybackConfig,
    ) -> Self {
        Self {
            receiver,
            media: MediaSet::default(),
            affordances: Affordances::default(),
            window: None,
            engines,
            clock,
            timings,
        }
    }

    /// Cached media of the current volume.
    #[must_use]
    pub const fn media(&self) -> &MediaSet {
        &self.media
    }

    /// Category button state.
    #[must_use]
    pub const fn affordances(&self) -> Affordances {
        self.affordances
    }

    /// Session of the open window.
    #[must_use]
    pub fn window(&self) -> Option<&PlaybackSession> {
        self.window.as_ref().map(|window| &window.session)
    }

    /// Mutable session of the open window, for user commands.
    pub fn window_mut(&mut self) -> Option<&mut PlaybackSession> {
        self.window.as_mut().map(|window| &mut window.session)
    }

    /// Category shown in the open window.
    #[must_use]
    pub fn window_category(&self) -> Option<MediaCategory> {
        self.window.as_ref().map(|window| window.category)
    }

    /// Apply every queued device event in arrival order.
    pub fn tick(&mut self) {
        let events = self.receiver.drain_all();
        if events.is_empty() {
            return;
        }
        debug!("Applying {} device event(s)", events.len());

        for event in events {
            match event {
                DeviceEvent::Added { device, media } => {
                    info!(
                        device = %device,
                        images = media.images.len(),
                        audio = media.audio.len(),
                        video = media.video.len(),
                        "USB media available"
                    );
                    self.affordances = Affordances::from_media(&media);
                    self.media = media;
                }
                DeviceEvent::Removed { device } => {
                    info!(device = %device, "USB media removed");
                    self.media = MediaSet::default();
                    self.affordances = Affordances::default();
                    self.close_window();
                }
            }
        }
    }

    /// Open a playback window for `category`.
    ///
    /// Any open window is closed first. Slideshows and music start at the
    /// first item; video opens on its selector.
    pub fn launch(&mut self, category: MediaCategory) -> LaunchOutcome {
        let items = self.media.items(category);
        if items.is_empty() {
            info!("Cannot open {}: nothing on the volume", category);
            return LaunchOutcome::NotFound {
                message: category.not_found_message(),
            };
        }
        let items = items.to_vec();

        self.close_window();

        let kind = SessionKind::for_category(category);
        let returned = Rc::new(Cell::new(false));
        let flag = Rc::clone(&returned);
        let mut session = PlaybackSession::new(
            kind,
            items,
            self.engines.create(kind),
            Arc::clone(&self.clock),
            self.timings,
        )
        .with_on_close(move || flag.set(true));

        if kind != SessionKind::Video
            && let Err(e) = session.play(0)
        {
            warn!("Failed to start {} session: {}", kind, e);
        }

        info!("Opened {} window", kind);
        self.window = Some(PlaybackWindow {
            category,
            session,
            returned,
        });
        LaunchOutcome::Opened { kind }
    }

    /// Drive the open window and drop it once it has closed.
    pub fn pump(&mut self) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        window.session.pump();
        if window.returned.get() {
            debug!("Returning to USB screen");
            self.window = None;
        }
    }

    /// Close the open window, if any.
    pub fn close_window(&mut self) {
        if let Some(mut window) = self.window.take() {
            window.session.close();
        }
    }
}
