//! Streaming services opened in an external browser window.

use std::process::{Child, Command};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ScreenSize, StreamingConfig};
use crate::error::{Error, ProcessError, Result};
use crate::timer::{Clock, TimerPurpose, TimerSlot};

/// A streaming site offered on the streaming screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingService {
    /// Button label.
    pub name: String,
    /// Address opened in the browser.
    pub url: String,
}

impl StreamingService {
    /// Create a service entry.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Services offered out of the box.
    #[must_use]
    pub fn default_catalog() -> Vec<Self> {
        vec![
            Self::new("Netflix", "https://www.netflix.com"),
            Self::new("Prime", "https://www.primevideo.com"),
            Self::new("HBO", "https://www.hbomax.com"),
            Self::new("Disney", "https://www.disneyplus.com"),
            Self::new("Deezer", "https://www.deezer.com"),
            Self::new("Spotify", "https://www.spotify.com"),
        ]
    }
}

/// Position and size of an external window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl WindowGeometry {
    /// Full-width window below a top bar one tenth of the screen tall.
    #[must_use]
    pub const fn below_top_bar(screen: ScreenSize) -> Self {
        let bar = screen.height / 10;
        Self {
            x: 0,
            y: bar,
            width: screen.width,
            height: screen.height - bar,
        }
    }
}

/// Launches and supervises one external process showing a URL.
#[cfg_attr(test, mockall::automock)]
pub trait ExternalProcessLauncher {
    /// Open `url` in a window at `geometry`.
    fn launch(&mut self, url: &str, geometry: WindowGeometry) -> Result<()>;

    /// Whether the launched process is still running.
    fn is_alive(&mut self) -> bool;

    /// Force the process to exit.
    fn terminate(&mut self) -> Result<()>;
}

/// [`ExternalProcessLauncher`] running a Chromium-style browser in app mode.
#[derive(Debug)]
pub struct BrowserLauncher {
    browser: String,
    child: Option<Child>,
}

impl BrowserLauncher {
    /// Launcher for the `browser` executable.
    pub fn new(browser: impl Into<String>) -> Self {
        Self {
            browser: browser.into(),
            child: None,
        }
    }

    /// Browser arguments for `url` at `geometry`.
    #[must_use]
    pub fn args(url: &str, geometry: WindowGeometry) -> Vec<String> {
        vec![
            format!("--window-size={},{}", geometry.width, geometry.height),
            format!("--window-position={},{}", geometry.x, geometry.y),
            "--disable-extensions".to_string(),
            "--disable-plugins".to_string(),
            format!("--app={url}"),
        ]
    }
}

impl ExternalProcessLauncher for BrowserLauncher {
    fn launch(&mut self, url: &str, geometry: WindowGeometry) -> Result<()> {
        self.terminate()?;

        let args = Self::args(url, geometry);
        debug!("Executing command: {} {:?}", self.browser, args);
        let child = Command::new(&self.browser)
            .args(&args)
            .spawn()
            .map_err(|e| Error::spawn_failed(&self.browser, e.to_string()))?;

        info!("Opened {} (pid {})", url, child.id());
        self.child = Some(child);
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("Browser exited with {}", status);
                self.child = None;
                false
            }
            Err(e) => {
                warn!("Failed to poll browser: {}", e);
                false
            }
        }
    }

    fn terminate(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let pid = child.id();
        if let Ok(Some(_)) = child.try_wait() {
            return Ok(());
        }

        child.kill().map_err(|e| ProcessError::ControlFailed {
            pid,
            reason: e.to_string(),
        })?;
        child.wait().map_err(|e| ProcessError::ControlFailed {
            pid,
            reason: e.to_string(),
        })?;
        debug!("Browser {} terminated", pid);
        Ok(())
    }
}

impl Drop for BrowserLauncher {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!("Failed to close browser: {}", e);
        }
    }
}

/// State of the streaming screen: the catalogue and the open browser.
pub struct StreamingSession {
    launcher: Box<dyn ExternalProcessLauncher>,
    config: StreamingConfig,
    clock: Arc<dyn Clock>,
    timer: TimerSlot,
    open_service: Option<String>,
}

impl StreamingSession {
    /// Create a session with no browser open.
    #[must_use]
    pub fn new(
        launcher: Box<dyn ExternalProcessLauncher>,
        config: StreamingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            launcher,
            config,
            clock,
            timer: TimerSlot::new(),
            open_service: None,
        }
    }

    /// Offered services.
    #[must_use]
    pub fn services(&self) -> &[StreamingService] {
        &self.config.services
    }

    /// Name of the service shown in the browser, if one is open.
    #[must_use]
    pub fn open_service(&self) -> Option<&str> {
        self.open_service.as_deref()
    }

    /// Whether the browser is open.
    #[must_use]
    pub const fn is_browser_open(&self) -> bool {
        self.open_service.is_some()
    }

    /// Open the service at `index` in the browser.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for an unknown index, or the launcher's
    /// error if the browser cannot be started.
    pub fn open(&mut self, index: usize) -> Result<()> {
        let service = self.config.services.get(index).cloned().ok_or_else(|| {
            Error::Configuration(format!("No streaming service at position {index}"))
        })?;

        let geometry = WindowGeometry::below_top_bar(self.config.screen);
        self.launcher.launch(&service.url, geometry)?;

        info!("Streaming {}", service.name);
        self.open_service = Some(service.name);
        self.timer.arm(
            TimerPurpose::LivenessCheck,
            self.clock.now(),
            self.config.liveness_interval(),
        );
        Ok(())
    }

    /// Check the browser when the liveness timer is due.
    pub fn poll(&mut self) {
        if self.timer.take_due(self.clock.now()) != Some(TimerPurpose::LivenessCheck) {
            return;
        }
        if self.launcher.is_alive() {
            self.timer.arm(
                TimerPurpose::LivenessCheck,
                self.clock.now(),
                self.config.liveness_interval(),
            );
        } else {
            info!("Browser closed");
            self.open_service = None;
        }
    }

    /// Force the browser closed.
    pub fn close_browser(&mut self) {
        self.timer.cancel(self.clock.now());
        if self.open_service.take().is_some()
            && let Err(e) = self.launcher.terminate()
        {
            warn!("Failed to close browser: {}", e);
        }
    }
}
