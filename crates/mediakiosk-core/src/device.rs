//! USB hot-plug watching.
//!
//! This module provides:
//! - Partition add/remove notifications via the [`NotificationSource`] trait and
//!   the [`PartitionTableSource`] implementation (polls `/proc/partitions`)
//! - Mounting and mount-point lookup via the [`MountProvider`] trait and the
//!   [`UdisksMountProvider`] implementation
//! - The [`DeviceWatcher`] background thread that turns notifications into
//!   [`DeviceEvent`]s on the event channel

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::Disks;
use tracing::{debug, error, info, warn};

use crate::channel::{DeviceEvent, EventSender};
use crate::config::WatcherConfig;
use crate::error::{DeviceError, Error, Result};
use crate::media::MediaClassifier;

/// Kind of partition change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    /// A partition appeared.
    Add,
    /// A partition went away.
    Remove,
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// A partition change reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNotification {
    /// What happened.
    pub action: DeviceAction,
    /// Kernel partition name, e.g. `sdb1`.
    pub device_name: String,
}

impl DeviceNotification {
    /// Partition `name` appeared.
    pub fn add(name: impl Into<String>) -> Self {
        Self {
            action: DeviceAction::Add,
            device_name: name.into(),
        }
    }

    /// Partition `name` went away.
    pub fn remove(name: impl Into<String>) -> Self {
        Self {
            action: DeviceAction::Remove,
            device_name: name.into(),
        }
    }

    /// Block device node, e.g. `/dev/sdb1`.
    #[must_use]
    pub fn device_path(&self) -> PathBuf {
        Path::new("/dev").join(&self.device_name)
    }
}

/// Source of partition add/remove notifications.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSource: Send {
    /// Wait up to `timeout` for the next notification.
    ///
    /// Returns `Ok(None)` when nothing happened within the timeout.
    fn next_notification(&mut self, timeout: Duration) -> Result<Option<DeviceNotification>>;
}

/// Trait for mounting block devices and finding where they are mounted.
#[cfg_attr(test, mockall::automock)]
pub trait MountProvider: Send {
    /// Mount a device, best-effort.
    fn mount(&self, device_path: &Path) -> Result<()>;

    /// Current mount point of a device, if mounted.
    fn mount_point_of(&self, device_path: &Path) -> Option<PathBuf>;
}

// =============================================================================
// Partition table source
// =============================================================================

/// Notification source that polls the kernel partition table.
///
/// Each poll diffs the set of partition names against the previous poll. When
/// `usb_only` is set, only partitions whose sysfs node resolves through a USB
/// bus are reported.
pub struct PartitionTableSource {
    partitions_path: PathBuf,
    sysfs_block: PathBuf,
    usb_only: bool,
    report_existing: bool,
    poll_interval: Duration,
    known: Option<BTreeSet<String>>,
    pending: VecDeque<DeviceNotification>,
}

impl PartitionTableSource {
    /// Create a source reading `/proc/partitions` and `/sys/class/block`.
    #[must_use]
    pub fn new(config: &WatcherConfig) -> Self {
        Self {
            partitions_path: PathBuf::from("/proc/partitions"),
            sysfs_block: PathBuf::from("/sys/class/block"),
            usb_only: config.usb_only,
            report_existing: config.report_existing,
            poll_interval: config.poll_interval(),
            known: None,
            pending: VecDeque::new(),
        }
    }

    /// Read the partition table and sysfs tree from other locations.
    #[must_use]
    pub fn with_paths(mut self, partitions_path: PathBuf, sysfs_block: PathBuf) -> Self {
        self.partitions_path = partitions_path;
        self.sysfs_block = sysfs_block;
        self
    }

    fn is_partition(&self, name: &str) -> bool {
        self.sysfs_block.join(name).join("partition").exists()
    }

    fn is_usb(&self, name: &str) -> bool {
        fs::canonicalize(self.sysfs_block.join(name))
            .is_ok_and(|resolved| resolved.to_string_lossy().contains("/usb"))
    }

    fn scan(&self) -> Result<BTreeSet<String>> {
        let content = fs::read_to_string(&self.partitions_path).map_err(|e| {
            DeviceError::NotificationSource {
                reason: format!("Failed to read {}: {e}", self.partitions_path.display()),
            }
        })?;

        Ok(parse_partition_names(&content)
            .into_iter()
            .filter(|name| self.is_partition(name))
            .filter(|name| !self.usb_only || self.is_usb(name))
            .collect())
    }

    fn refresh(&mut self) -> Result<()> {
        let current = self.scan()?;

        match self.known.take() {
            None => {
                if self.report_existing {
                    self.pending
                        .extend(current.iter().map(DeviceNotification::add));
                }
            }
            Some(previous) => {
                self.pending.extend(
                    previous
                        .difference(&current)
                        .map(DeviceNotification::remove),
                );
                self.pending
                    .extend(current.difference(&previous).map(DeviceNotification::add));
            }
        }

        self.known = Some(current);
        Ok(())
    }
}

impl NotificationSource for PartitionTableSource {
    fn next_notification(&mut self, timeout: Duration) -> Result<Option<DeviceNotification>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(notification) = self.pending.pop_front() {
                return Ok(Some(notification));
            }

            self.refresh()?;
            if let Some(notification) = self.pending.pop_front() {
                return Ok(Some(notification));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

/// Partition names listed in `/proc/partitions` content.
///
/// Header lines and virtual devices (loop, ram, zram) are skipped.
fn parse_partition_names(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts.as_slice() {
                [major, _, _, name] if major.parse::<u32>().is_ok() => Some(*name),
                _ => None,
            }
        })
        .filter(|name| {
            !(name.starts_with("loop") || name.starts_with("ram") || name.starts_with("zram"))
        })
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Mount provider
// =============================================================================

/// Mount provider backed by `udisksctl` and `/proc/mounts`.
pub struct UdisksMountProvider {
    mounts_path: PathBuf,
}

impl UdisksMountProvider {
    /// Create a provider reading `/proc/mounts`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mounts_path: PathBuf::from("/proc/mounts"),
        }
    }

    /// Read the mount table from another location.
    #[must_use]
    pub fn with_mounts_path(mounts_path: PathBuf) -> Self {
        Self { mounts_path }
    }

    fn execute_command(&self, program: &str, args: &[&str]) -> Result<std::process::Output> {
        debug!("Executing command: {} {:?}", program, args);
        Command::new(program)
            .args(args)
            .output()
            .map_err(|e| Error::Internal(format!("Failed to execute {program}: {e}")))
    }

    fn disks_mount_point(device_path: &Path) -> Option<PathBuf> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .find(|disk| Path::new(disk.name()) == device_path)
            .map(|disk| disk.mount_point().to_path_buf())
    }
}

impl Default for UdisksMountProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MountProvider for UdisksMountProvider {
    fn mount(&self, device_path: &Path) -> Result<()> {
        let device_str = device_path.to_string_lossy();
        info!("Mounting device: {}", device_str);

        let output = self
            .execute_command("udisksctl", &["mount", "-b", &device_str])
            .map_err(|e| Error::mount_failed(device_str.to_string(), e.to_string()))?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            debug!("udisksctl: {}", stdout.trim());
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("AlreadyMounted") {
            debug!("{} is already mounted", device_str);
            return Ok(());
        }

        Err(Error::mount_failed(
            device_str.to_string(),
            stderr.trim().to_string(),
        ))
    }

    fn mount_point_of(&self, device_path: &Path) -> Option<PathBuf> {
        match fs::read_to_string(&self.mounts_path) {
            Ok(mounts) => {
                if let Some(mount_point) = find_mount_point(&mounts, device_path) {
                    return Some(mount_point);
                }
            }
            Err(e) => warn!("Failed to read {}: {}", self.mounts_path.display(), e),
        }

        Self::disks_mount_point(device_path)
    }
}

/// Mount point of `device_path` in `/proc/mounts` content.
fn find_mount_point(mounts: &str, device_path: &Path) -> Option<PathBuf> {
    let device_str = device_path.to_string_lossy();
    mounts.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(source), Some(target)) if source == device_str => {
                Some(PathBuf::from(decode_octal_escapes(target)))
            }
            _ => None,
        }
    })
}

/// Undo the `\NNN` octal escaping the kernel applies to mount table fields.
fn decode_octal_escapes(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\'
            && let Some(digits) = bytes.get(i + 1..i + 4)
            && digits.iter().all(|b| (b'0'..=b'7').contains(b))
            && let Ok(code) =
                u8::from_str_radix(&String::from_utf8_lossy(digits), 8)
        {
            decoded.push(code);
            i += 4;
            continue;
        }
        decoded.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

// =============================================================================
// Device watcher
// =============================================================================

/// Handle for controlling a running device watcher.
///
/// The watcher thread is never joined; dropping the handle leaves it running
/// until the process exits or the event receiver is dropped.
#[derive(Debug, Clone)]
pub struct DeviceWatcherHandle {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl DeviceWatcherHandle {
    /// Ask the watcher to stop after the notification it is handling.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether the watcher thread is still looping.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Turns partition notifications into [`DeviceEvent`]s.
///
/// On add the device is mounted (best-effort), its mount point resolved with
/// exponential backoff, and its top level classified. On remove a
/// [`DeviceEvent::Removed`] is published unconditionally.
pub struct DeviceWatcher {
    source: Box<dyn NotificationSource>,
    mounts: Box<dyn MountProvider>,
    classifier: MediaClassifier,
    config: WatcherConfig,
    recent_adds: HashMap<String, Instant>,
}

impl DeviceWatcher {
    /// Create a watcher over the given collaborators.
    #[must_use]
    pub fn new(
        source: Box<dyn NotificationSource>,
        mounts: Box<dyn MountProvider>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            source,
            mounts,
            classifier: MediaClassifier::new(),
            config,
            recent_adds: HashMap::new(),
        }
    }

    /// Watcher over the partition table and `udisksctl`.
    #[must_use]
    pub fn with_system_sources(config: WatcherConfig) -> Self {
        Self::new(
            Box::new(PartitionTableSource::new(&config)),
            Box::new(UdisksMountProvider::new()),
            config,
        )
    }

    /// Start the watcher on a dedicated `device-watcher` thread.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::WatcherStart` if the thread cannot be spawned.
    pub fn spawn(self, sender: EventSender) -> Result<DeviceWatcherHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let handle = DeviceWatcherHandle {
            stop: Arc::clone(&stop),
            running: Arc::clone(&running),
        };

        thread::Builder::new()
            .name("device-watcher".to_string())
            .spawn(move || {
                let _guard = RunningGuard(running);
                self.run(&sender, &stop);
            })
            .map_err(|e| DeviceError::WatcherStart {
                reason: e.to_string(),
            })?;

        info!("Device watcher started");
        Ok(handle)
    }

    /// Watch loop. Returns when `stop` is set or the receiver is gone.
    pub fn run(mut self, sender: &EventSender, stop: &AtomicBool) {
        let poll_interval = self.config.poll_interval();
        let mut failures = 0u32;

        while !stop.load(Ordering::SeqCst) {
            let notification = self.source.next_notification(poll_interval);
            if notification.is_ok() {
                failures = 0;
            }
            match notification {
                Ok(Some(notification)) => {
                    if let Some(event) = self.handle_notification(&notification)
                        && let Err(e) = sender.put(event)
                    {
                        info!("Device watcher exiting: {}", e);
                        break;
                    }
                }
                Ok(None) => {
                    if sender.is_closed() {
                        info!("Device watcher exiting: event channel closed");
                        break;
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = source_error_backoff(&e, poll_interval, failures);
                    error!(
                        kind = ?e.kind(),
                        retryable = e.is_retryable(),
                        "Device notification failed: {}; retrying in {:?}",
                        e,
                        delay
                    );
                    thread::sleep(delay);
                }
            }
        }

        debug!("Device watcher stopped");
    }

    /// Translate one notification into the event to publish, if any.
    pub fn handle_notification(&mut self, notification: &DeviceNotification) -> Option<DeviceEvent> {
        let device = notification.device_name.clone();
        match notification.action {
            DeviceAction::Remove => {
                info!("Device removed: {}", device);
                self.recent_adds.remove(&device);
                Some(DeviceEvent::Removed { device })
            }
            DeviceAction::Add => {
                let now = Instant::now();
                if let Some(last) = self.recent_adds.get(&device)
                    && now.duration_since(*last) < self.config.debounce_window()
                {
                    debug!("Ignoring duplicate add for {}", device);
                    return None;
                }

                let device_path = notification.device_path();
                if let Err(e) = self.mounts.mount(&device_path) {
                    warn!("{}", e);
                }

                let mount_point = match self.resolve_mount_point(&device, &device_path) {
                    Ok(mount_point) => mount_point,
                    Err(e) => {
                        warn!("{}; ignoring device", e);
                        return None;
                    }
                };

                let media = self.classifier.classify_or_empty(&mount_point);
                info!(
                    device = %device,
                    files = media.len(),
                    "Device added at {}",
                    mount_point.display()
                );
                self.recent_adds.insert(device.clone(), now);
                Some(DeviceEvent::Added { device, media })
            }
        }
    }

    fn resolve_mount_point(&self, device: &str, device_path: &Path) -> Result<PathBuf> {
        let attempts = self.config.mount_retry_attempts.max(1);
        let mut delay = self.config.mount_retry_delay();

        for attempt in 1..=attempts {
            if let Some(mount_point) = self.mounts.mount_point_of(device_path) {
                return Ok(mount_point);
            }
            if attempt < attempts {
                debug!(
                    "No mount point for {} yet (attempt {}), retrying in {:?}",
                    device, attempt, delay
                );
                thread::sleep(delay);
                delay = delay.saturating_mul(2);
            }
        }

        Err(DeviceError::MountPointUnavailable {
            device: device.to_string(),
            attempts,
        }
        .into())
    }
}

/// Longest pause between reads of a failing notification source, in polls.
const MAX_SOURCE_BACKOFF_POLLS: u32 = 16;

/// Pause after the `failures`-th consecutive source error.
///
/// Transient errors back off exponentially from one poll interval; anything
/// else waits the maximum straight away.
fn source_error_backoff(error: &Error, poll_interval: Duration, failures: u32) -> Duration {
    let polls = if error.is_retryable() {
        1u32.checked_shl(failures.saturating_sub(1))
            .unwrap_or(MAX_SOURCE_BACKOFF_POLLS)
            .min(MAX_SOURCE_BACKOFF_POLLS)
    } else {
        MAX_SOURCE_BACKOFF_POLLS
    };
    poll_interval * polls
}
