//! Playback sessions.
//!
//! A [`PlaybackSession`] plays a list of items through a [`MediaEngine`] and
//! advances through them on its own. Its [`SessionKind`] fixes the timing:
//! audio and video advance when the item duration has elapsed, slideshows on a
//! fixed interval, and video presentation mode on the engine's end-of-media
//! report.
//!
//! All state is owned by the UI context. Timers are cooperative and engine
//! reports are queued; both are acted on in [`PlaybackSession::pump`].

pub mod engine;
pub mod external;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use engine::{EndOfMediaNotifier, EngineEvent, EngineEventKind, EngineFactory, MediaEngine};
pub use external::ExternalPlayerEngine;

use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::media::MediaCategory;
use crate::timer::{Clock, TimerPurpose, TimerSlot};

/// The three session specializations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Music, timed by track duration.
    Audio,
    /// Video, timed by clip duration; supports presentation mode.
    Video,
    /// Images on a fixed interval.
    Slideshow,
}

impl SessionKind {
    /// Session kind used to open a media category.
    #[must_use]
    pub const fn for_category(category: MediaCategory) -> Self {
        match category {
            MediaCategory::Photos => Self::Slideshow,
            MediaCategory::Audio => Self::Audio,
            MediaCategory::Video => Self::Video,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Slideshow => "slideshow",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    /// No item loaded.
    Idle,
    /// An item is playing.
    Playing,
    /// An item is loaded but suspended.
    Paused,
    /// Resources released; the owner has been told.
    Closed,
}

/// What the session's window should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionView {
    /// The item list to pick from.
    Selector,
    /// The player surface.
    Player,
    /// Nothing; the window is gone.
    Closed,
}

/// Position within the item list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Items in play order.
    pub items: Vec<PathBuf>,
    /// Index of the current item; always `< items.len()` when items exist.
    pub current_index: usize,
    /// Whether output is running.
    pub is_playing: bool,
    /// Whether a video presentation is running.
    pub is_presentation_mode: bool,
    /// Time left on the advance timer when paused.
    pub remaining: Option<Duration>,
}

/// An item the engine could not play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackFailure {
    /// Index of the item.
    pub index: usize,
    /// The item.
    pub path: PathBuf,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for PlaybackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cannot play {}: {}", self.path.display(), self.reason)
    }
}

/// Generic playback state machine.
///
/// `Idle → Playing ⇄ Paused → Idle` via [`stop`](Self::stop), and `Closed`
/// after [`close`](Self::close).
pub struct PlaybackSession {
    kind: SessionKind,
    state: PlaybackState,
    phase: PlaybackPhase,
    engine: Box<dyn MediaEngine>,
    clock: Arc<dyn Clock>,
    timings: PlaybackConfig,
    timer: TimerSlot,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    generation: u64,
    consecutive_failures: usize,
    last_failure: Option<PlaybackFailure>,
    on_close: Option<Box<dyn FnOnce()>>,
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("kind", &self.kind)
            .field("phase", &self.phase)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl PlaybackSession {
    /// Create an idle session over `items`.
    #[must_use]
    pub fn new(
        kind: SessionKind,
        items: Vec<PathBuf>,
        engine: Box<dyn MediaEngine>,
        clock: Arc<dyn Clock>,
        timings: PlaybackConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            kind,
            state: PlaybackState {
                items,
                current_index: 0,
                is_playing: false,
                is_presentation_mode: false,
                remaining: None,
            },
            phase: PlaybackPhase::Idle,
            engine,
            clock,
            timings,
            timer: TimerSlot::new(),
            events_tx,
            events_rx,
            generation: 0,
            consecutive_failures: 0,
            last_failure: None,
            on_close: None,
        }
    }

    /// Register the callback fired once when the session closes.
    #[must_use]
    pub fn with_on_close(mut self, on_close: impl FnOnce() + 'static) -> Self {
        self.on_close = Some(Box::new(on_close));
        self
    }

    /// Session kind.
    #[must_use]
    pub const fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Current list position and flags.
    #[must_use]
    pub const fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    /// Index of the current item.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.state.current_index
    }

    /// Current item, if the list is not empty.
    #[must_use]
    pub fn current_item(&self) -> Option<&Path> {
        self.state
            .items
            .get(self.state.current_index)
            .map(PathBuf::as_path)
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.phase == PlaybackPhase::Closed
    }

    /// What the window should show.
    #[must_use]
    pub const fn view(&self) -> SessionView {
        match self.phase {
            PlaybackPhase::Idle => SessionView::Selector,
            PlaybackPhase::Playing | PlaybackPhase::Paused => SessionView::Player,
            PlaybackPhase::Closed => SessionView::Closed,
        }
    }

    /// The most recent item that failed to play.
    #[must_use]
    pub const fn last_failure(&self) -> Option<&PlaybackFailure> {
        self.last_failure.as_ref()
    }

    /// Take the most recent failure, so it is reported only once.
    pub const fn take_failure(&mut self) -> Option<PlaybackFailure> {
        self.last_failure.take()
    }

    /// Play the item at `index`, leaving presentation mode.
    ///
    /// An item the engine cannot open is recorded as the last failure and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::SessionClosed` after close and
    /// `PlaybackError::InvalidIndex` when `index` is out of range.
    pub fn play(&mut self, index: usize) -> Result<()> {
        self.ensure_open()?;
        self.check_index(index)?;
        self.state.is_presentation_mode = false;
        self.reset_failures();
        self.start_item(index);
        Ok(())
    }

    /// Suspend the current item and remember how long its timer had left.
    ///
    /// Does nothing unless playing.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to pause.
    pub fn pause(&mut self) -> Result<()> {
        if self.phase != PlaybackPhase::Playing {
            return Ok(());
        }
        self.engine.pause()?;

        let purpose = self.timer.armed().map(|timer| timer.purpose);
        let left = self.timer.cancel(self.clock.now());
        self.state.remaining = match purpose {
            Some(TimerPurpose::Advance) => left,
            _ => None,
        };
        self.phase = PlaybackPhase::Paused;
        self.state.is_playing = false;
        debug!(remaining = ?self.state.remaining, "Paused {} session", self.kind);
        Ok(())
    }

    /// Continue the current item, re-arming for the time it had left.
    ///
    /// Does nothing unless paused.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to resume.
    pub fn resume(&mut self) -> Result<()> {
        if self.phase != PlaybackPhase::Paused {
            return Ok(());
        }
        self.engine.resume()?;

        self.phase = PlaybackPhase::Playing;
        self.state.is_playing = true;
        if !self.state.is_presentation_mode {
            match self.state.remaining.take() {
                Some(remaining) => {
                    self.timer
                        .arm(TimerPurpose::Advance, self.clock.now(), remaining);
                }
                None => self.arm_for_current_item(),
            }
        }
        debug!("Resumed {} session", self.kind);
        Ok(())
    }

    /// Move to the following item, wrapping at the end.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::SessionClosed` after close and
    /// `PlaybackError::InvalidIndex` when there are no items.
    pub fn next(&mut self) -> Result<()> {
        self.step(1)
    }

    /// Move to the preceding item, wrapping at the start.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::SessionClosed` after close and
    /// `PlaybackError::InvalidIndex` when there are no items.
    pub fn previous(&mut self) -> Result<()> {
        let len = self.state.items.len();
        self.step(len.saturating_sub(1))
    }

    /// Start a video presentation: every item once, from the first.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Unsupported` for non-video sessions,
    /// `PlaybackError::SessionClosed` after close and
    /// `PlaybackError::InvalidIndex` when there are no items.
    pub fn start_presentation(&mut self) -> Result<()> {
        if self.kind != SessionKind::Video {
            return Err(PlaybackError::Unsupported {
                operation: "presentation",
                kind: self.kind.name(),
            }
            .into());
        }
        self.ensure_open()?;
        self.check_index(0)?;

        info!("Starting presentation of {} videos", self.state.items.len());
        self.timer.cancel(self.clock.now());
        self.state.is_presentation_mode = true;
        self.reset_failures();
        self.start_item(0);
        Ok(())
    }

    /// Stop output and return to the selector. Safe to repeat.
    pub fn stop(&mut self) {
        if self.phase == PlaybackPhase::Closed {
            return;
        }
        self.timer.cancel(self.clock.now());
        self.release_item();
        self.generation += 1;

        self.phase = PlaybackPhase::Idle;
        self.state.is_playing = false;
        self.state.is_presentation_mode = false;
        self.state.remaining = None;
        self.consecutive_failures = 0;
    }

    /// Stop, release everything and tell the owner. Safe to repeat.
    pub fn close(&mut self) {
        if self.phase == PlaybackPhase::Closed {
            return;
        }
        self.stop();
        self.phase = PlaybackPhase::Closed;
        while self.events_rx.try_recv().is_ok() {}
        info!("Closed {} session", self.kind);

        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }

    /// Act on queued engine reports and a due timer.
    pub fn pump(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            if self.phase == PlaybackPhase::Closed {
                return;
            }
            if event.generation != self.generation {
                debug!(
                    "Discarding stale engine report for generation {}",
                    event.generation
                );
                continue;
            }
            self.on_engine_event(event.kind);
        }

        if self.phase != PlaybackPhase::Playing {
            return;
        }
        match self.timer.take_due(self.clock.now()) {
            Some(TimerPurpose::Advance) => {
                debug!("Advance timer fired");
                self.advance();
            }
            Some(TimerPurpose::ProbeDuration) => self.arm_for_current_item(),
            Some(TimerPurpose::LivenessCheck) | None => {}
        }
    }

    fn on_engine_event(&mut self, kind: EngineEventKind) {
        match kind {
            EngineEventKind::EndOfMedia => {
                if self.state.is_presentation_mode && self.phase == PlaybackPhase::Playing {
                    self.advance();
                } else {
                    debug!("Ignoring end of media outside presentation mode");
                }
            }
            EngineEventKind::Failed(reason) => {
                let index = self.state.current_index;
                if let Some(next) = self.record_failure(index, reason) {
                    self.start_item(next);
                }
            }
        }
    }

    fn step(&mut self, offset: usize) -> Result<()> {
        self.ensure_open()?;
        let len = self.state.items.len();
        self.check_index(0)?;

        self.timer.cancel(self.clock.now());
        let index = (self.state.current_index + offset) % len;
        self.reset_failures();
        self.start_item(index);
        Ok(())
    }

    /// Automatic move to the next item. The current item played through.
    fn advance(&mut self) {
        self.consecutive_failures = 0;
        let len = self.state.items.len();
        let next = self.state.current_index + 1;
        if self.state.is_presentation_mode && next >= len {
            info!("Presentation finished");
            self.stop();
            return;
        }
        self.start_item(next % len);
    }

    /// Play `index`, skipping forward over items the engine rejects.
    ///
    /// Opening is not proof the item plays, so the failure streak is kept.
    fn start_item(&mut self, mut index: usize) {
        loop {
            match self.try_start(index) {
                Ok(()) => return,
                Err(e) => match self.record_failure(index, e.to_string()) {
                    Some(next) => index = next,
                    None => return,
                },
            }
        }
    }

    /// Record a failed item and pick the item to try next, if any.
    fn record_failure(&mut self, index: usize, reason: String) -> Option<usize> {
        let path = self.state.items.get(index).cloned().unwrap_or_default();
        warn!("Playback failed for {}: {}", path.display(), reason);
        self.last_failure = Some(PlaybackFailure {
            index,
            path,
            reason,
        });
        self.consecutive_failures += 1;

        let len = self.state.items.len();
        if self.consecutive_failures >= len {
            warn!("Every item failed; returning to selection");
            self.stop();
            return None;
        }
        if self.state.is_presentation_mode && index + 1 >= len {
            info!("Presentation finished");
            self.stop();
            return None;
        }
        Some((index + 1) % len)
    }

    fn try_start(&mut self, index: usize) -> Result<()> {
        self.timer.cancel(self.clock.now());
        self.state.remaining = None;
        self.release_item();
        self.generation += 1;
        self.state.current_index = index;

        let path = self
            .state
            .items
            .get(index)
            .cloned()
            .ok_or(PlaybackError::InvalidIndex {
                index,
                len: self.state.items.len(),
            })?;
        let notifier = EndOfMediaNotifier::new(self.events_tx.clone(), self.generation);
        self.engine.open(&path, notifier)?;
        self.engine.play()?;

        self.phase = PlaybackPhase::Playing;
        self.state.is_playing = true;
        debug!("Playing {} ({})", path.display(), self.kind);
        if !self.state.is_presentation_mode {
            self.arm_for_current_item();
        }
        Ok(())
    }

    /// Arm the advance timer for the current item, or probe for its length.
    fn arm_for_current_item(&mut self) {
        let now = self.clock.now();
        match self.kind {
            SessionKind::Slideshow => {
                self.timer
                    .arm(TimerPurpose::Advance, now, self.timings.slideshow_interval());
            }
            SessionKind::Audio | SessionKind::Video => match self.engine.length() {
                Some(length) => {
                    let left = length.saturating_sub(self.engine.position());
                    self.timer.arm(TimerPurpose::Advance, now, left);
                }
                None => {
                    self.timer.arm(
                        TimerPurpose::ProbeDuration,
                        now,
                        self.timings.duration_probe_interval(),
                    );
                }
            },
        }
    }

    fn release_item(&mut self) {
        if self.engine.is_active()
            && let Err(e) = self.engine.stop()
        {
            warn!("Failed to stop {} engine: {}", self.kind, e);
        }
        self.state.is_playing = false;
    }

    /// A user command starts a fresh failure streak.
    fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
        self.last_failure = None;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.phase == PlaybackPhase::Closed {
            return Err(PlaybackError::SessionClosed.into());
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let len = self.state.items.len();
        if index >= len {
            return Err(PlaybackError::InvalidIndex { index, len }.into());
        }
        Ok(())
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.release_item();
    }
}
