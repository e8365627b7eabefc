//! Playback session behavior through the public API.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use mediakiosk_core::{
    EndOfMediaNotifier, Error, ManualClock, MediaEngine, PlaybackConfig, PlaybackError,
    PlaybackSession, Result, SessionKind, SessionView,
};

// =============================================================================
// Fake engine
// =============================================================================

#[derive(Default)]
struct Recorder {
    opened: Vec<PathBuf>,
    notifiers: Vec<EndOfMediaNotifier>,
    pauses: usize,
    resumes: usize,
}

struct ScriptedEngine {
    recorder: Rc<RefCell<Recorder>>,
    length: Option<Duration>,
    active: bool,
}

impl MediaEngine for ScriptedEngine {
    fn open(&mut self, path: &Path, notifier: EndOfMediaNotifier) -> Result<()> {
        if path.extension().is_some_and(|ext| ext == "broken") {
            return Err(Error::open_failed(path, "cannot decode"));
        }
        let mut recorder = self.recorder.borrow_mut();
        recorder.opened.push(path.to_path_buf());
        recorder.notifiers.push(notifier);
        self.active = true;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.recorder.borrow_mut().pauses += 1;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.recorder.borrow_mut().resumes += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn length(&self) -> Option<Duration> {
        self.length
    }

    fn position(&self) -> Duration {
        Duration::ZERO
    }
}

struct Fixture {
    clock: ManualClock,
    recorder: Rc<RefCell<Recorder>>,
    session: PlaybackSession,
}

impl Fixture {
    fn new(kind: SessionKind, items: &[&str]) -> Self {
        let clock = ManualClock::new();
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let engine = ScriptedEngine {
            recorder: Rc::clone(&recorder),
            length: Some(Duration::from_secs(30)),
            active: false,
        };
        let session = PlaybackSession::new(
            kind,
            items.iter().map(PathBuf::from).collect(),
            Box::new(engine),
            Arc::new(clock.clone()),
            PlaybackConfig::default(),
        );
        Self {
            clock,
            recorder,
            session,
        }
    }

    fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    fn last_notifier(&self) -> EndOfMediaNotifier {
        self.recorder
            .borrow()
            .notifiers
            .last()
            .cloned()
            .expect("an item was opened")
    }
}

// =============================================================================
// Navigation
// =============================================================================

#[test]
fn test_next_cycles_back_to_start() {
    let items = ["/m/1.jpg", "/m/2.jpg", "/m/3.jpg", "/m/4.jpg"];
    let mut fx = Fixture::new(SessionKind::Slideshow, &items);
    fx.session.play(1).unwrap();

    for _ in 0..items.len() {
        fx.session.next().unwrap();
    }
    assert_eq!(fx.session.current_index(), 1);
}

#[test]
fn test_previous_then_next_returns_to_same_item() {
    let mut fx = Fixture::new(SessionKind::Audio, &["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"]);
    for start in 0..3 {
        fx.session.play(start).unwrap();
        fx.session.previous().unwrap();
        fx.session.next().unwrap();
        assert_eq!(fx.session.current_index(), start);
    }
}

#[test]
fn test_single_photo_next_stays_on_it() {
    let mut fx = Fixture::new(SessionKind::Slideshow, &["/m/a.jpg"]);
    fx.session.play(0).unwrap();
    fx.session.next().unwrap();
    assert_eq!(fx.session.current_item(), Some(Path::new("/m/a.jpg")));
}

#[test]
fn test_play_out_of_range() {
    let mut fx = Fixture::new(SessionKind::Audio, &["/m/a.mp3"]);
    let err = fx.session.play(3).unwrap_err();
    assert!(matches!(
        err,
        Error::Playback(PlaybackError::InvalidIndex { index: 3, len: 1 })
    ));
}

// =============================================================================
// Timers
// =============================================================================

#[test]
fn test_slideshow_pause_keeps_remaining_interval() {
    let mut fx = Fixture::new(SessionKind::Slideshow, &["/m/1.jpg", "/m/2.jpg"]);
    fx.session.play(0).unwrap();

    fx.advance(Duration::from_secs(2));
    fx.session.pause().unwrap();
    assert_eq!(fx.session.state().remaining, Some(Duration::from_secs(3)));

    fx.advance(Duration::from_secs(60));
    fx.session.pump();
    assert_eq!(fx.session.current_index(), 0);

    fx.session.resume().unwrap();
    fx.advance(Duration::from_millis(2999));
    fx.session.pump();
    assert_eq!(fx.session.current_index(), 0);

    fx.advance(Duration::from_millis(1));
    fx.session.pump();
    assert_eq!(fx.session.current_index(), 1);

    let recorder = fx.recorder.borrow();
    assert_eq!((recorder.pauses, recorder.resumes), (1, 1));
}

#[test]
fn test_audio_advances_after_track_length() {
    let mut fx = Fixture::new(SessionKind::Audio, &["/m/a.mp3", "/m/b.mp3"]);
    fx.session.play(1).unwrap();

    fx.advance(Duration::from_secs(30));
    fx.session.pump();
    assert_eq!(fx.session.current_index(), 0);
    assert!(fx.session.state().is_playing);
}

// =============================================================================
// Presentation
// =============================================================================

#[test]
fn test_presentation_plays_each_video_once() {
    let mut fx = Fixture::new(SessionKind::Video, &["/m/v1.mp4", "/m/v2.mp4", "/m/v3.mp4"]);
    assert_eq!(fx.session.view(), SessionView::Selector);

    fx.session.start_presentation().unwrap();
    assert!(fx.session.state().is_presentation_mode);
    let first = fx.last_notifier();

    first.end_of_media();
    fx.session.pump();
    assert_eq!(fx.session.current_index(), 1);

    // A late report for the first video must not skip the second.
    first.end_of_media();
    fx.session.pump();
    assert_eq!(fx.session.current_index(), 1);

    fx.last_notifier().end_of_media();
    fx.session.pump();
    assert_eq!(fx.session.current_index(), 2);
    assert_eq!(fx.session.view(), SessionView::Player);

    fx.last_notifier().end_of_media();
    fx.session.pump();
    assert_eq!(fx.session.view(), SessionView::Selector);
    assert!(!fx.session.state().is_presentation_mode);
    assert_eq!(
        fx.recorder.borrow().opened,
        vec![
            PathBuf::from("/m/v1.mp4"),
            PathBuf::from("/m/v2.mp4"),
            PathBuf::from("/m/v3.mp4")
        ]
    );
}

#[test]
fn test_presentation_ignores_length_timer() {
    let mut fx = Fixture::new(SessionKind::Video, &["/m/v1.mp4", "/m/v2.mp4"]);
    fx.session.start_presentation().unwrap();

    fx.advance(Duration::from_secs(120));
    fx.session.pump();
    assert_eq!(fx.session.current_index(), 0);
}

#[test]
fn test_presentation_rejected_for_music() {
    let mut fx = Fixture::new(SessionKind::Audio, &["/m/a.mp3"]);
    assert!(matches!(
        fx.session.start_presentation(),
        Err(Error::Playback(PlaybackError::Unsupported { .. }))
    ));
}

// =============================================================================
// Failures and closing
// =============================================================================

#[test]
fn test_broken_item_is_skipped_and_reported() {
    let mut fx = Fixture::new(SessionKind::Audio, &["/m/a.broken", "/m/b.mp3"]);
    fx.session.play(0).unwrap();

    assert_eq!(fx.session.current_index(), 1);
    let failure = fx.session.last_failure().unwrap();
    assert_eq!(failure.path, PathBuf::from("/m/a.broken"));
    assert!(failure.to_string().starts_with("Cannot play"));
}

#[test]
fn test_all_items_broken_returns_to_selector() {
    let mut fx = Fixture::new(SessionKind::Video, &["/m/a.broken", "/m/b.broken"]);
    fx.session.play(0).unwrap();
    assert_eq!(fx.session.view(), SessionView::Selector);
    assert!(fx.session.last_failure().is_some());
}

#[test]
fn test_items_failing_while_playing_return_to_selector() {
    let mut fx = Fixture::new(SessionKind::Audio, &["/m/a.mp3", "/m/b.mp3"]);
    fx.session.play(0).unwrap();

    for _ in 0..10 {
        if fx.session.view() != SessionView::Player {
            break;
        }
        fx.last_notifier().failed("player exited with status 1");
        fx.session.pump();
    }

    assert_eq!(fx.session.view(), SessionView::Selector);
    assert_eq!(fx.recorder.borrow().opened.len(), 2);
    assert_eq!(
        fx.session.last_failure().unwrap().path,
        PathBuf::from("/m/b.mp3")
    );
}

#[test]
fn test_close_fires_callback_once_and_blocks_further_commands() {
    let closes = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&closes);
    let fx = Fixture::new(SessionKind::Audio, &["/m/a.mp3"]);
    let mut session = fx.session.with_on_close(move || *counter.borrow_mut() += 1);

    session.play(0).unwrap();
    session.close();
    session.close();
    assert_eq!(*closes.borrow(), 1);
    assert_eq!(session.view(), SessionView::Closed);
    assert!(matches!(
        session.next(),
        Err(Error::Playback(PlaybackError::SessionClosed))
    ));
}
