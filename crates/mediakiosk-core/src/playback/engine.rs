//! Playback engine interface.
//!
//! Engines may report end-of-media from their own threads. Those reports go
//! through an [`EndOfMediaNotifier`] into the owning session's queue and are
//! only acted upon when the session pumps on the UI context.

use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;

use super::SessionKind;
use crate::error::Result;

/// What an engine reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEventKind {
    /// The loaded item played to its end.
    EndOfMedia,
    /// The loaded item stopped with an error.
    Failed(String),
}

/// A report from an engine, tagged with the load it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    /// Load generation the report refers to.
    pub generation: u64,
    /// What happened.
    pub kind: EngineEventKind,
}

/// Sending half handed to an engine with each loaded item.
///
/// Safe to move to another thread. Reports sent after the session has moved
/// on to another item carry a stale generation and are discarded.
#[derive(Debug, Clone)]
pub struct EndOfMediaNotifier {
    tx: mpsc::UnboundedSender<EngineEvent>,
    generation: u64,
}

impl EndOfMediaNotifier {
    pub(crate) const fn new(tx: mpsc::UnboundedSender<EngineEvent>, generation: u64) -> Self {
        Self { tx, generation }
    }

    /// Report that the item finished.
    pub fn end_of_media(&self) {
        self.send(EngineEventKind::EndOfMedia);
    }

    /// Report that the item failed while playing.
    pub fn failed(&self, reason: impl Into<String>) {
        self.send(EngineEventKind::Failed(reason.into()));
    }

    /// Load generation this notifier reports for.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    fn send(&self, kind: EngineEventKind) {
        // The session may already be gone; nothing left to tell.
        let _ = self.tx.send(EngineEvent {
            generation: self.generation,
            kind,
        });
    }
}

/// An audio/video/image output driven by a playback session.
#[cfg_attr(test, mockall::automock)]
pub trait MediaEngine {
    /// Load an item. `notifier` reports the end of this item.
    fn open(&mut self, path: &Path, notifier: EndOfMediaNotifier) -> Result<()>;

    /// Start the loaded item.
    fn play(&mut self) -> Result<()>;

    /// Suspend output.
    fn pause(&mut self) -> Result<()>;

    /// Continue after [`MediaEngine::pause`].
    fn resume(&mut self) -> Result<()>;

    /// Stop output and release the loaded item.
    fn stop(&mut self) -> Result<()>;

    /// Whether an item is loaded.
    fn is_active(&self) -> bool;

    /// Item duration, once the engine knows it.
    fn length(&self) -> Option<Duration>;

    /// Playback position within the item.
    fn position(&self) -> Duration;
}

/// Creates an engine for each new session.
pub trait EngineFactory {
    /// Engine suitable for `kind`.
    fn create(&self, kind: SessionKind) -> Box<dyn MediaEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn(SessionKind) -> Box<dyn MediaEngine>,
{
    fn create(&self, kind: SessionKind) -> Box<dyn MediaEngine> {
        self(kind)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = EndOfMediaNotifier::new(tx, 7);

        let remote = notifier.clone();
        std::thread::spawn(move || remote.end_of_media())
            .join()
            .unwrap();
        notifier.failed("decoder crashed");

        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent {
                generation: 7,
                kind: EngineEventKind::EndOfMedia
            }
        );
        assert_eq!(
            rx.try_recv().unwrap().kind,
            EngineEventKind::Failed("decoder crashed".to_string())
        );
    }

    #[test]
    fn test_notifier_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        EndOfMediaNotifier::new(tx, 1).end_of_media();
    }

    #[test]
    fn test_closure_factory() {
        let factory = |_kind: SessionKind| -> Box<dyn MediaEngine> {
            let mut engine = MockMediaEngine::new();
            engine.expect_is_active().return_const(false);
            Box::new(engine)
        };
        let engine = factory.create(SessionKind::Audio);
        assert!(!engine.is_active());
    }
}
