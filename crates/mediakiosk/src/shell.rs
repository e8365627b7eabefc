//! Text front end of the kiosk: menu commands and screen rendering.

use std::fmt::Write as _;
use std::str::FromStr;

use mediakiosk_core::{
    ConnectOutcome, LaunchOutcome, MediaCategory, NetworkPanel, PlaybackSession, SessionKind,
    SessionView, StreamingSession, UsbSession,
};
use tracing::{debug, warn};

/// Screen shown outside a playback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Network / USB / Streaming / Exit.
    Main,
    /// WiFi status and network list.
    Network,
    /// Category buttons for the inserted volume.
    Usb,
    /// Streaming service buttons.
    Streaming,
}

/// A line typed at the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Redraw the current screen.
    Show,
    /// Go to a screen.
    Open(Screen),
    /// Leave the current screen or playback window.
    Back,
    /// Quit the kiosk.
    Exit,
    /// Open a playback window for a category.
    Launch(MediaCategory),
    /// Play an item, 0-based.
    Play(usize),
    /// Next item.
    Next,
    /// Previous item.
    Previous,
    /// Pause playback.
    Pause,
    /// Resume playback.
    Resume,
    /// Play every video once.
    Present,
    /// Stop and return to the item list.
    Stop,
    /// Rescan WiFi networks.
    Refresh,
    /// Previous page of networks.
    PageUp,
    /// Next page of networks.
    PageDown,
    /// Toggle the selected network.
    Select(String),
    /// Join the selected network.
    Connect(String),
    /// Open a streaming service, 0-based.
    Stream(usize),
    /// Close the streaming browser.
    CloseBrowser,
}

/// Why a line was not understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Empty line.
    #[error("Empty command")]
    Empty,
    /// First word is not a command.
    #[error("Unknown command '{0}'")]
    Unknown(String),
    /// A required argument is missing.
    #[error("'{command}' needs {what}")]
    MissingArgument {
        /// The command.
        command: &'static str,
        /// What to add.
        what: &'static str,
    },
    /// A numbered command got something other than a positive number.
    #[error("'{0}' is not a valid number")]
    InvalidNumber(String),
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));

        let command = match word.to_ascii_lowercase().as_str() {
            "" => return Err(ParseError::Empty),
            "show" | "help" | "?" => Self::Show,
            "main" => Self::Open(Screen::Main),
            "network" | "wifi" => Self::Open(Screen::Network),
            "usb" => Self::Open(Screen::Usb),
            "streaming" => Self::Open(Screen::Streaming),
            "back" => Self::Back,
            "exit" | "quit" => Self::Exit,
            "photos" => Self::Launch(MediaCategory::Photos),
            "music" => Self::Launch(MediaCategory::Audio),
            "video" => Self::Launch(MediaCategory::Video),
            "play" => Self::Play(position("play", rest)?),
            "next" => Self::Next,
            "prev" | "previous" => Self::Previous,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "present" => Self::Present,
            "stop" => Self::Stop,
            "refresh" => Self::Refresh,
            "up" => Self::PageUp,
            "down" => Self::PageDown,
            "select" => Self::Select(argument("select", "a network name", rest)?),
            "connect" => Self::Connect(argument("connect", "a password", rest)?),
            "stream" => Self::Stream(position("stream", rest)?),
            "close" => Self::CloseBrowser,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// 1-based position typed by the user, as a 0-based index.
fn position(command: &'static str, rest: &str) -> Result<usize, ParseError> {
    if rest.is_empty() {
        return Err(ParseError::MissingArgument {
            command,
            what: "a number",
        });
    }
    match rest.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(ParseError::InvalidNumber(rest.to_string())),
    }
}

fn argument(command: &'static str, what: &'static str, rest: &str) -> Result<String, ParseError> {
    if rest.is_empty() {
        return Err(ParseError::MissingArgument { command, what });
    }
    Ok(rest.to_string())
}

/// Whether the loop should keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading commands.
    Continue,
    /// Shut down.
    Exit,
}

/// All UI-context state of the kiosk.
pub struct Kiosk {
    screen: Screen,
    usb: UsbSession,
    network: NetworkPanel,
    streaming: StreamingSession,
}

impl Kiosk {
    /// Start on the main menu.
    #[must_use]
    pub const fn new(usb: UsbSession, network: NetworkPanel, streaming: StreamingSession) -> Self {
        Self {
            screen: Screen::Main,
            usb,
            network,
            streaming,
        }
    }

    /// Current screen.
    #[must_use]
    pub const fn screen(&self) -> Screen {
        self.screen
    }

    /// USB screen state.
    #[must_use]
    pub const fn usb(&self) -> &UsbSession {
        &self.usb
    }

    /// Apply queued device events.
    pub fn tick(&mut self) {
        self.usb.tick();
    }

    /// Drive playback timers and the streaming liveness check.
    pub fn pump(&mut self) {
        self.usb.pump();
        self.streaming.poll();
    }

    /// Close the playback window and the browser.
    pub fn shutdown(&mut self) {
        self.usb.close_window();
        self.streaming.close_browser();
    }

    /// Run one command. Returns a message for the user, if any.
    pub fn handle(&mut self, command: Command) -> (Flow, Option<String>) {
        debug!(?command, screen = ?self.screen, "Handling command");
        let message = match command {
            Command::Exit => {
                self.shutdown();
                return (Flow::Exit, None);
            }
            Command::Show => None,
            Command::Open(screen) => {
                if screen == Screen::Network {
                    self.network.refresh();
                }
                self.usb.close_window();
                self.screen = screen;
                None
            }
            Command::Back => self.back(),
            Command::Launch(category) => self.launch(category),
            Command::Refresh => {
                self.network.refresh();
                None
            }
            Command::PageUp => {
                self.network.page_up();
                None
            }
            Command::PageDown => {
                self.network.page_down();
                None
            }
            Command::Select(ssid) => {
                self.network.select(&ssid);
                None
            }
            Command::Connect(password) => Some(match self.network.submit(&password) {
                ConnectOutcome::Connected(ssid) => format!("Connected to {ssid}"),
                ConnectOutcome::Failed(ssid) => format!("Could not connect to {ssid}"),
                ConnectOutcome::NoSelection => "Select a network first".to_string(),
            }),
            Command::Stream(index) => match self.streaming.open(index) {
                Ok(()) => None,
                Err(e) => {
                    warn!("Failed to open streaming service: {}", e);
                    Some(e.to_string())
                }
            },
            Command::CloseBrowser => {
                self.streaming.close_browser();
                None
            }
            playback => self.playback(playback),
        };
        (Flow::Continue, message)
    }

    fn back(&mut self) -> Option<String> {
        if self.usb.window().is_some() {
            self.usb.close_window();
        } else {
            self.screen = Screen::Main;
        }
        None
    }

    fn launch(&mut self, category: MediaCategory) -> Option<String> {
        self.screen = Screen::Usb;
        match self.usb.launch(category) {
            LaunchOutcome::Opened { .. } => None,
            LaunchOutcome::NotFound { message } => Some(message.to_string()),
        }
    }

    fn playback(&mut self, command: Command) -> Option<String> {
        let Some(session) = self.usb.window_mut() else {
            return Some("Nothing is playing".to_string());
        };
        let result = match command {
            Command::Play(index) => session.play(index),
            Command::Next => session.next(),
            Command::Previous => session.previous(),
            Command::Pause => session.pause(),
            Command::Resume => session.resume(),
            Command::Present => session.start_presentation(),
            Command::Stop => {
                session.stop();
                Ok(())
            }
            other => {
                debug!(?other, "Not a playback command");
                Ok(())
            }
        };
        match result {
            Ok(()) => session.take_failure().map(|failure| failure.to_string()),
            Err(e) => Some(e.to_string()),
        }
    }

    /// Text of the current screen.
    #[must_use]
    pub fn render(&self) -> String {
        if let Some(session) = self.usb.window() {
            return render_window(session);
        }

        let mut out = String::new();
        match self.screen {
            Screen::Main => out.push_str("== Main ==\n  network | usb | streaming | exit\n"),
            Screen::Network => {
                let status = if self.network.is_connected() {
                    "Connected"
                } else {
                    "Not connected"
                };
                let _ = writeln!(out, "== Network ({status}) ==");
                for ssid in self.network.visible() {
                    let marker = if self.network.selected() == Some(ssid.as_str()) {
                        '*'
                    } else {
                        ' '
                    };
                    let _ = writeln!(out, " {marker} {ssid}");
                }
                out.push_str("  select <ssid> | connect <password> | up | down | refresh | back\n");
            }
            Screen::Usb => {
                let affordances = self.usb.affordances();
                out.push_str("== USB ==\n");
                for category in MediaCategory::ALL {
                    let state = if affordances.is_enabled(category) {
                        "ready"
                    } else {
                        "-"
                    };
                    let _ = writeln!(out, "  {:<7} {state}", command_word(category));
                }
                out.push_str("  back\n");
            }
            Screen::Streaming => {
                let _ = writeln!(
                    out,
                    "== Streaming ({}) ==",
                    self.streaming.open_service().unwrap_or("closed")
                );
                for (i, service) in self.streaming.services().iter().enumerate() {
                    let _ = writeln!(out, "  {}. {}", i + 1, service.name);
                }
                out.push_str("  stream <n> | close | back\n");
            }
        }
        out
    }
}

const fn command_word(category: MediaCategory) -> &'static str {
    match category {
        MediaCategory::Photos => "photos",
        MediaCategory::Audio => "music",
        MediaCategory::Video => "video",
    }
}

fn render_window(session: &PlaybackSession) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", session.kind());
    match session.view() {
        SessionView::Selector | SessionView::Closed => {
            for (i, item) in session.state().items.iter().enumerate() {
                let name = item.file_name().map_or_else(
                    || item.display().to_string(),
                    |name| name.to_string_lossy().into_owned(),
                );
                let _ = writeln!(out, "  {}. {name}", i + 1);
            }
            let present = if session.kind() == SessionKind::Video {
                "present | "
            } else {
                ""
            };
            let _ = writeln!(out, "  play <n> | {present}back");
        }
        SessionView::Player => {
            let state = session.state();
            let item = session
                .current_item()
                .map_or_else(String::new, |path| path.display().to_string());
            let status = if state.is_playing { "playing" } else { "paused" };
            let _ = writeln!(
                out,
                "  [{}/{}] {item} ({status})",
                state.current_index + 1,
                state.items.len()
            );
            out.push_str("  next | prev | pause | resume | stop | back\n");
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use mediakiosk_core::{
        DeviceEvent, EndOfMediaNotifier, Error, ExternalProcessLauncher, ManualClock, MediaEngine,
        MediaSet, NetworkProvider, PlaybackConfig, Result, StreamingConfig, WindowGeometry,
        event_channel,
    };

    use super::*;

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("usb".parse::<Command>(), Ok(Command::Open(Screen::Usb)));
        assert_eq!("  NEXT ".parse::<Command>(), Ok(Command::Next));
        assert_eq!("music".parse::<Command>(), Ok(Command::Launch(MediaCategory::Audio)));
        assert_eq!("quit".parse::<Command>(), Ok(Command::Exit));
    }

    #[test]
    fn test_parse_numbers_are_one_based() {
        assert_eq!("play 1".parse::<Command>(), Ok(Command::Play(0)));
        assert_eq!("stream 6".parse::<Command>(), Ok(Command::Stream(5)));
        assert_eq!(
            "play 0".parse::<Command>(),
            Err(ParseError::InvalidNumber("0".to_string()))
        );
        assert_eq!(
            "play".parse::<Command>(),
            Err(ParseError::MissingArgument {
                command: "play",
                what: "a number"
            })
        );
    }

    #[test]
    fn test_parse_keeps_argument_text() {
        assert_eq!(
            "select My Home Net".parse::<Command>(),
            Ok(Command::Select("My Home Net".to_string()))
        );
        assert_eq!(
            "connect p4ss word".parse::<Command>(),
            Ok(Command::Connect("p4ss word".to_string()))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(ParseError::Empty));
        assert_eq!(
            "dance".parse::<Command>(),
            Err(ParseError::Unknown("dance".to_string()))
        );
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    struct OfflineNetwork;

    impl NetworkProvider for OfflineNetwork {
        fn is_connected(&self) -> bool {
            false
        }
        fn scan_networks(&self) -> Vec<String> {
            vec!["Cafe".to_string()]
        }
        fn connect(&self, _ssid: &str, _password: &str) -> bool {
            false
        }
    }

    struct NoBrowser;

    impl ExternalProcessLauncher for NoBrowser {
        fn launch(&mut self, _url: &str, _geometry: WindowGeometry) -> Result<()> {
            Ok(())
        }
        fn is_alive(&mut self) -> bool {
            true
        }
        fn terminate(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct NullEngine {
        active: bool,
    }

    impl MediaEngine for NullEngine {
        fn open(&mut self, path: &Path, _notifier: EndOfMediaNotifier) -> Result<()> {
            if path.extension().is_some_and(|ext| ext == "broken") {
                return Err(Error::open_failed(path, "cannot decode"));
            }
            self.active = true;
            Ok(())
        }
        fn play(&mut self) -> Result<()> {
            Ok(())
        }
        fn pause(&mut self) -> Result<()> {
            Ok(())
        }
        fn resume(&mut self) -> Result<()> {
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
            Some(Duration::from_secs(60))
        }
        fn position(&self) -> Duration {
            Duration::ZERO
        }
    }

    fn kiosk_with_video() -> Kiosk {
        let (tx, rx) = event_channel();
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new());
        let engines = |_kind: SessionKind| -> Box<dyn MediaEngine> { Box::new(NullEngine::default()) };
        let mut usb = UsbSession::new(rx, Box::new(engines), clock.clone(), PlaybackConfig::default());
        tx.put(DeviceEvent::Added {
            device: "sdb1".to_string(),
            media: MediaSet {
                images: Vec::new(),
                audio: Vec::new(),
                video: vec![
                    PathBuf::from("/m/v0.broken"),
                    PathBuf::from("/m/v1.mp4"),
                    PathBuf::from("/m/v2.mp4"),
                ],
            },
        })
        .unwrap();
        usb.tick();

        Kiosk::new(
            usb,
            NetworkPanel::new(Box::new(OfflineNetwork)),
            StreamingSession::new(Box::new(NoBrowser), StreamingConfig::default(), clock),
        )
    }

    #[test]
    fn test_video_opens_on_selector() {
        let mut kiosk = kiosk_with_video();
        let (flow, message) = kiosk.handle(Command::Launch(MediaCategory::Video));
        assert_eq!(flow, Flow::Continue);
        assert_eq!(message, None);
        assert_eq!(kiosk.usb().window().unwrap().view(), SessionView::Selector);
        assert!(kiosk.render().contains("present"));

        kiosk.handle(Command::Play(2));
        assert!(kiosk.render().contains("[3/3]"));
    }

    #[test]
    fn test_failure_message_shown_once() {
        let mut kiosk = kiosk_with_video();
        kiosk.handle(Command::Launch(MediaCategory::Video));

        let (_, message) = kiosk.handle(Command::Play(0));
        assert!(message.unwrap().starts_with("Cannot play /m/v0.broken"));
        assert_eq!(kiosk.usb().window().unwrap().current_index(), 1);

        let (_, message) = kiosk.handle(Command::Pause);
        assert_eq!(message, None);
        let (_, message) = kiosk.handle(Command::Next);
        assert_eq!(message, None);
    }

    #[test]
    fn test_missing_category_message() {
        let mut kiosk = kiosk_with_video();
        let (_, message) = kiosk.handle(Command::Launch(MediaCategory::Photos));
        assert_eq!(
            message.as_deref(),
            Some(MediaCategory::Photos.not_found_message())
        );
        assert_eq!(kiosk.screen(), Screen::Usb);
    }

    #[test]
    fn test_back_closes_window_then_leaves_screen() {
        let mut kiosk = kiosk_with_video();
        kiosk.handle(Command::Launch(MediaCategory::Video));
        kiosk.handle(Command::Back);
        assert!(kiosk.usb().window().is_none());
        assert_eq!(kiosk.screen(), Screen::Usb);

        kiosk.handle(Command::Back);
        assert_eq!(kiosk.screen(), Screen::Main);
    }

    #[test]
    fn test_playback_command_without_window() {
        let mut kiosk = kiosk_with_video();
        let (_, message) = kiosk.handle(Command::Next);
        assert_eq!(message.as_deref(), Some("Nothing is playing"));
    }

    #[test]
    fn test_connect_without_selection() {
        let mut kiosk = kiosk_with_video();
        kiosk.handle(Command::Open(Screen::Network));
        assert!(kiosk.render().contains("Cafe"));
        let (_, message) = kiosk.handle(Command::Connect("secret".to_string()));
        assert_eq!(message.as_deref(), Some("Select a network first"));
    }

    #[test]
    fn test_exit_closes_everything() {
        let mut kiosk = kiosk_with_video();
        kiosk.handle(Command::Stream(0));
        kiosk.handle(Command::Launch(MediaCategory::Video));
        let (flow, _) = kiosk.handle(Command::Exit);
        assert_eq!(flow, Flow::Exit);
        assert!(kiosk.usb().window().is_none());
        kiosk.handle(Command::Open(Screen::Streaming));
        assert!(kiosk.render().contains("(closed)"));
    }
}
