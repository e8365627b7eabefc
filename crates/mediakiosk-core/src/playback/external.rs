//! Media engine that runs an external player process per item.
//!
//! Pausing stops the process with `SIGSTOP` and resuming continues it with
//! `SIGCONT`, both sent through `kill`. The item duration is read with
//! `ffprobe` on a background thread. A waiter thread reports end-of-media when
//! the player exits on its own.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::SessionKind;
use super::engine::{EndOfMediaNotifier, MediaEngine};
use crate::config::{PlayerCommand, PlayersConfig};
use crate::error::{Error, PlaybackError, ProcessError, Result};

struct RunningPlayer {
    pid: u32,
    stopped: Arc<AtomicBool>,
    waiter: Option<JoinHandle<()>>,
    started_at: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

struct LoadedItem {
    path: PathBuf,
    notifier: EndOfMediaNotifier,
    duration: Arc<OnceLock<Duration>>,
    player: Option<RunningPlayer>,
}

/// [`MediaEngine`] backed by a player program such as `mpv`.
pub struct ExternalPlayerEngine {
    command: PlayerCommand,
    ffprobe: Option<String>,
    loaded: Option<LoadedItem>,
}

impl ExternalPlayerEngine {
    /// Engine running `command`; durations are probed with `ffprobe` when given.
    #[must_use]
    pub const fn new(command: PlayerCommand, ffprobe: Option<String>) -> Self {
        Self {
            command,
            ffprobe,
            loaded: None,
        }
    }

    /// Engine configured for a session kind. Slideshows skip duration probing.
    #[must_use]
    pub fn for_kind(kind: SessionKind, players: &PlayersConfig) -> Self {
        match kind {
            SessionKind::Audio => Self::new(players.audio.clone(), Some(players.ffprobe.clone())),
            SessionKind::Video => Self::new(players.video.clone(), Some(players.ffprobe.clone())),
            SessionKind::Slideshow => Self::new(players.image.clone(), None),
        }
    }

    fn loaded_player(&mut self) -> Result<&mut RunningPlayer> {
        self.loaded
            .as_mut()
            .and_then(|loaded| loaded.player.as_mut())
            .ok_or_else(|| PlaybackError::Engine("no player running".to_string()).into())
    }

    fn spawn_player(&self, loaded: &LoadedItem) -> Result<RunningPlayer> {
        let program = self.command.program.clone();
        debug!("Starting {} {:?} {}", program, self.command.args, loaded.path.display());

        let mut child = Command::new(&program)
            .args(&self.command.args)
            .arg(&loaded.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::open_failed(&loaded.path, format!("failed to start {program}: {e}")))?;
        let pid = child.id();

        let stopped = Arc::new(AtomicBool::new(false));
        let waiter_stopped = Arc::clone(&stopped);
        let notifier = loaded.notifier.clone();
        let waiter = thread::Builder::new()
            .name("player-waiter".to_string())
            .spawn(move || {
                let status = child.wait();
                if waiter_stopped.load(Ordering::SeqCst) {
                    return;
                }
                match status {
                    Ok(status) if status.success() => notifier.end_of_media(),
                    Ok(status) => notifier.failed(format!("{program} exited with {status}")),
                    Err(e) => notifier.failed(format!("failed to wait for {program}: {e}")),
                }
            });

        match waiter {
            Ok(waiter) => Ok(RunningPlayer {
                pid,
                stopped,
                waiter: Some(waiter),
                started_at: Instant::now(),
                paused_at: None,
                paused_total: Duration::ZERO,
            }),
            Err(e) => {
                let _ = signal(pid, "-KILL");
                Err(Error::open_failed(
                    &loaded.path,
                    format!("failed to watch player: {e}"),
                ))
            }
        }
    }
}

impl MediaEngine for ExternalPlayerEngine {
    fn open(&mut self, path: &Path, notifier: EndOfMediaNotifier) -> Result<()> {
        self.stop()?;
        if !path.is_file() {
            return Err(Error::open_failed(path, "file not found"));
        }

        let duration = Arc::new(OnceLock::new());
        if let Some(ffprobe) = &self.ffprobe {
            let ffprobe = ffprobe.clone();
            let item = path.to_path_buf();
            let slot = Arc::clone(&duration);
            thread::Builder::new()
                .name("duration-probe".to_string())
                .spawn(move || match probe_duration(&ffprobe, &item) {
                    Some(length) => {
                        let _ = slot.set(length);
                    }
                    None => debug!("No duration reported for {}", item.display()),
                })
                .map_err(|e| Error::open_failed(path, format!("failed to probe duration: {e}")))?;
        }

        self.loaded = Some(LoadedItem {
            path: path.to_path_buf(),
            notifier,
            duration,
            player: None,
        });
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let Some(loaded) = self.loaded.as_ref() else {
            return Err(PlaybackError::Engine("no item loaded".to_string()).into());
        };
        if loaded.player.is_some() {
            return Ok(());
        }

        let player = self.spawn_player(loaded)?;
        if let Some(loaded) = self.loaded.as_mut() {
            loaded.player = Some(player);
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        let player = self.loaded_player()?;
        if player.paused_at.is_none() {
            signal(player.pid, "-STOP")?;
            player.paused_at = Some(Instant::now());
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let player = self.loaded_player()?;
        if let Some(paused_at) = player.paused_at {
            signal(player.pid, "-CONT")?;
            player.paused_total += paused_at.elapsed();
            player.paused_at = None;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(loaded) = self.loaded.take() else {
            return Ok(());
        };
        let Some(mut player) = loaded.player else {
            return Ok(());
        };

        player.stopped.store(true, Ordering::SeqCst);
        if player.paused_at.is_some() {
            let _ = signal(player.pid, "-CONT");
        }
        let terminated = signal(player.pid, "-TERM");

        let Some(waiter) = player.waiter.take() else {
            return terminated;
        };
        if terminated.is_err() && !waiter.is_finished() {
            warn!("Player {} may still be running", player.pid);
            return terminated;
        }
        if waiter.join().is_err() {
            warn!("Player waiter for {} panicked", loaded.path.display());
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.loaded.is_some()
    }

    fn length(&self) -> Option<Duration> {
        self.loaded
            .as_ref()
            .and_then(|loaded| loaded.duration.get().copied())
    }

    fn position(&self) -> Duration {
        self.loaded
            .as_ref()
            .and_then(|loaded| loaded.player.as_ref())
            .map_or(Duration::ZERO, |player| {
                let now = player.paused_at.unwrap_or_else(Instant::now);
                now.duration_since(player.started_at)
                    .saturating_sub(player.paused_total)
            })
    }
}

impl Drop for ExternalPlayerEngine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop player: {}", e);
        }
    }
}

/// Send a signal to a process with `kill`.
fn signal(pid: u32, signal: &str) -> Result<()> {
    let output = Command::new("kill")
        .args([signal, &pid.to_string()])
        .output()
        .map_err(|e| ProcessError::ControlFailed {
            pid,
            reason: e.to_string(),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(ProcessError::ControlFailed {
            pid,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into())
    }
}

/// Ask `ffprobe` for the container duration of `path`.
fn probe_duration(ffprobe: &str, path: &Path) -> Option<Duration> {
    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }
    parse_ffprobe_duration(&output.stdout)
}

fn parse_ffprobe_duration(stdout: &[u8]) -> Option<Duration> {
    let json: serde_json::Value = serde_json::from_slice(stdout).ok()?;
    let seconds: f64 = json["format"]["duration"].as_str()?.trim().parse().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use super::*;
    use crate::playback::engine::{EngineEvent, EngineEventKind};

    fn notifier() -> (EndOfMediaNotifier, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EndOfMediaNotifier::new(tx, 3), rx)
    }

    #[test]
    fn test_parse_ffprobe_duration() {
        let json = br#"{"format":{"filename":"a.mp3","duration":"184.320000"}}"#;
        assert_eq!(
            parse_ffprobe_duration(json),
            Some(Duration::from_secs_f64(184.32))
        );
        assert_eq!(parse_ffprobe_duration(br#"{"format":{}}"#), None);
        assert_eq!(parse_ffprobe_duration(br#"{"format":{"duration":"N/A"}}"#), None);
        assert_eq!(parse_ffprobe_duration(b"not json"), None);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let mut engine = ExternalPlayerEngine::new(PlayerCommand::new("true", &[]), None);
        let (notifier, _rx) = notifier();
        let err = engine
            .open(Path::new("/nonexistent/clip.mp4"), notifier)
            .unwrap_err();
        assert!(matches!(err, Error::Playback(PlaybackError::OpenFailed { .. })));
        assert!(!engine.is_active());
    }

    #[test]
    fn test_play_without_open_fails() {
        let mut engine = ExternalPlayerEngine::new(PlayerCommand::new("true", &[]), None);
        assert!(engine.play().is_err());
        assert!(engine.pause().is_err());
        assert_eq!(engine.position(), Duration::ZERO);
    }

    #[cfg(unix)]
    #[test]
    fn test_player_exit_reports_end_of_media() {
        let temp_dir = TempDir::new().unwrap();
        let item = temp_dir.path().join("a.jpg");
        std::fs::write(&item, b"x").unwrap();

        let mut engine = ExternalPlayerEngine::new(PlayerCommand::new("true", &[]), None);
        let (notifier, mut rx) = notifier();
        engine.open(&item, notifier).unwrap();
        engine.play().unwrap();
        assert!(engine.is_active());
        assert_eq!(engine.length(), None);

        let deadline = Instant::now() + Duration::from_secs(5);
        let event = loop {
            if let Ok(event) = rx.try_recv() {
                break event;
            }
            assert!(Instant::now() < deadline, "no end of media reported");
            thread::sleep(Duration::from_millis(10));
        };
        assert_eq!(event.generation, 3);
        assert_eq!(event.kind, EngineEventKind::EndOfMedia);
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_kills_player_without_report() {
        let temp_dir = TempDir::new().unwrap();
        let item = temp_dir.path().join("a.mp3");
        std::fs::write(&item, b"x").unwrap();

        let player = PlayerCommand::new("sh", &["-c", "exec sleep 30", "player"]);
        let mut engine = ExternalPlayerEngine::new(player, None);
        let (notifier, mut rx) = notifier();
        engine.open(&item, notifier).unwrap();
        engine.play().unwrap();
        engine.pause().unwrap();
        engine.resume().unwrap();
        engine.stop().unwrap();

        assert!(!engine.is_active());
        thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());
    }
}
