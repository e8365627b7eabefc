//! WiFi configuration.
//!
//! [`NmcliNetworkProvider`] shells out to NetworkManager; [`NetworkPanel`]
//! holds the state of the network screen.

use std::net::{SocketAddr, TcpStream};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::error::{Error, NetworkError, Result};

/// Networks shown per page on the network screen.
pub const PAGE_SIZE: usize = 7;

/// Connectivity and WiFi operations.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkProvider {
    /// Whether the internet is reachable.
    fn is_connected(&self) -> bool;

    /// SSIDs currently visible.
    fn scan_networks(&self) -> Vec<String>;

    /// Join a network. Returns whether it worked.
    fn connect(&self, ssid: &str, password: &str) -> bool;
}

/// [`NetworkProvider`] backed by `nmcli` and a TCP reachability probe.
#[derive(Debug, Clone)]
pub struct NmcliNetworkProvider {
    interface: String,
    probe_address: SocketAddr,
    probe_timeout: Duration,
}

impl NmcliNetworkProvider {
    /// Create a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::InvalidProbeAddress` if the probe address is not
    /// an `ip:port` pair.
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let probe_address = config.probe_address.parse().map_err(|e: std::net::AddrParseError| {
            NetworkError::InvalidProbeAddress {
                address: config.probe_address.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            interface: config.interface.clone(),
            probe_address,
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
        })
    }

    fn nmcli(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!("Executing command: nmcli {:?}", args);
        Command::new("nmcli")
            .args(args)
            .output()
            .map_err(|e| Error::Network(NetworkError::CommandFailed(e.to_string())))
    }
}

impl NetworkProvider for NmcliNetworkProvider {
    fn is_connected(&self) -> bool {
        TcpStream::connect_timeout(&self.probe_address, self.probe_timeout).is_ok()
    }

    fn scan_networks(&self) -> Vec<String> {
        let args = [
            "-t", "-f", "SSID", "dev", "wifi", "list", "ifname", &self.interface,
        ];
        match self.nmcli(&args) {
            Ok(output) if output.status.success() => {
                parse_ssids(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                warn!(
                    "WiFi scan failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                Vec::new()
            }
            Err(e) => {
                warn!("WiFi scan failed: {}", e);
                Vec::new()
            }
        }
    }

    fn connect(&self, ssid: &str, password: &str) -> bool {
        let args = [
            "dev", "wifi", "connect", ssid, "password", password, "ifname", &self.interface,
        ];
        match self.nmcli(&args) {
            Ok(output) => output.status.success(),
            Err(e) => {
                warn!("WiFi connect failed: {}", e);
                false
            }
        }
    }
}

/// SSIDs in `nmcli -t` output, trimmed, without blank lines.
fn parse_ssids(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|ssid| !ssid.is_empty())
        .map(str::to_string)
        .collect()
}

/// Result of submitting a password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Joined the network.
    Connected(String),
    /// The network refused or could not be reached.
    Failed(String),
    /// No network was selected.
    NoSelection,
}

/// State of the network screen.
pub struct NetworkPanel {
    provider: Box<dyn NetworkProvider>,
    connected: bool,
    networks: Vec<String>,
    offset: usize,
    selected: Option<String>,
}

impl NetworkPanel {
    /// Create the panel and load its initial state.
    #[must_use]
    pub fn new(provider: Box<dyn NetworkProvider>) -> Self {
        let mut panel = Self {
            provider,
            connected: false,
            networks: Vec::new(),
            offset: 0,
            selected: None,
        };
        panel.connected = panel.provider.is_connected();
        panel.refresh();
        panel
    }

    /// Whether the internet was reachable at the last check.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// All known networks, sorted and unique.
    #[must_use]
    pub fn networks(&self) -> &[String] {
        &self.networks
    }

    /// Networks on the current page.
    #[must_use]
    pub fn visible(&self) -> &[String] {
        let end = (self.offset + PAGE_SIZE).min(self.networks.len());
        self.networks.get(self.offset..end).unwrap_or_default()
    }

    /// Selected SSID.
    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Rescan and go back to the first page.
    pub fn refresh(&mut self) {
        let mut networks = self.provider.scan_networks();
        networks.sort();
        networks.dedup();
        debug!("Found {} WiFi network(s)", networks.len());
        self.networks = networks;
        self.offset = 0;
    }

    /// Show the previous page.
    pub fn page_up(&mut self) {
        self.offset = self.offset.saturating_sub(PAGE_SIZE);
    }

    /// Show the next page, if there is one.
    pub fn page_down(&mut self) {
        if self.offset + PAGE_SIZE < self.networks.len() {
            self.offset += PAGE_SIZE;
        }
    }

    /// Select `ssid`, or deselect it if it is already selected.
    pub fn select(&mut self, ssid: &str) {
        if self.selected.as_deref() == Some(ssid) {
            self.selected = None;
        } else {
            self.selected = Some(ssid.to_string());
        }
    }

    /// Connect to the selected network with `password`.
    pub fn submit(&mut self, password: &str) -> ConnectOutcome {
        let Some(ssid) = self.selected.take() else {
            return ConnectOutcome::NoSelection;
        };

        let joined = self.provider.connect(&ssid, password);
        self.connected = self.provider.is_connected();
        if joined {
            info!("Connected to {}", ssid);
            ConnectOutcome::Connected(ssid)
        } else {
            warn!("Failed to connect to {}", ssid);
            ConnectOutcome::Failed(ssid)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use mockall::predicate::eq;

    use super::*;

    fn provider_with(networks: &[&str]) -> MockNetworkProvider {
        let networks: Vec<String> = networks.iter().map(ToString::to_string).collect();
        let mut provider = MockNetworkProvider::new();
        provider.expect_is_connected().return_const(false);
        provider
            .expect_scan_networks()
            .returning(move || networks.clone());
        provider
    }

    #[test]
    fn test_parse_ssids() {
        assert_eq!(
            parse_ssids("HomeNet\n\n  Cafe  \nHomeNet\n"),
            vec!["HomeNet", "Cafe", "HomeNet"]
        );
    }

    #[test]
    fn test_panel_sorts_and_dedupes() {
        let panel = NetworkPanel::new(Box::new(provider_with(&["b", "a", "b", "c"])));
        assert_eq!(panel.networks(), ["a", "b", "c"]);
        assert!(!panel.is_connected());
    }

    #[test]
    fn test_panel_paging() {
        let names: Vec<String> = (0..16).map(|i| format!("net{i:02}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut panel = NetworkPanel::new(Box::new(provider_with(&refs)));

        assert_eq!(panel.visible().len(), 7);
        assert_eq!(panel.visible()[0], "net00");
        panel.page_down();
        panel.page_down();
        assert_eq!(panel.visible(), ["net14", "net15"]);
        panel.page_down();
        assert_eq!(panel.visible()[0], "net14");
        panel.page_up();
        assert_eq!(panel.visible()[0], "net07");
        panel.page_up();
        panel.page_up();
        assert_eq!(panel.visible()[0], "net00");
    }

    #[test]
    fn test_select_toggles() {
        let mut panel = NetworkPanel::new(Box::new(provider_with(&["a"])));
        panel.select("a");
        assert_eq!(panel.selected(), Some("a"));
        panel.select("a");
        assert_eq!(panel.selected(), None);
    }

    #[test]
    fn test_submit_connects_selected_network() {
        let mut provider = MockNetworkProvider::new();
        let mut checks = 0;
        provider.expect_is_connected().times(2).returning(move || {
            checks += 1;
            checks > 1
        });
        provider
            .expect_scan_networks()
            .returning(|| vec!["Cafe".to_string()]);
        provider
            .expect_connect()
            .with(eq("Cafe"), eq("secret"))
            .times(1)
            .return_const(true);

        let mut panel = NetworkPanel::new(Box::new(provider));
        panel.select("Cafe");
        assert_eq!(
            panel.submit("secret"),
            ConnectOutcome::Connected("Cafe".to_string())
        );
        assert!(panel.is_connected());
        assert_eq!(panel.selected(), None);
    }

    #[test]
    fn test_submit_without_selection() {
        let mut provider = provider_with(&[]);
        provider.expect_connect().never();
        let mut panel = NetworkPanel::new(Box::new(provider));
        assert_eq!(panel.submit("secret"), ConnectOutcome::NoSelection);
    }

    #[test]
    fn test_failed_connect() {
        let mut provider = provider_with(&["Cafe"]);
        provider.expect_connect().return_const(false);
        let mut panel = NetworkPanel::new(Box::new(provider));
        panel.select("Cafe");
        assert_eq!(
            panel.submit("wrong"),
            ConnectOutcome::Failed("Cafe".to_string())
        );
    }

    #[test]
    fn test_invalid_probe_address() {
        let config = NetworkConfig {
            probe_address: "not-an-address".to_string(),
            ..NetworkConfig::default()
        };
        assert!(matches!(
            NmcliNetworkProvider::new(&config),
            Err(Error::Network(NetworkError::InvalidProbeAddress { .. }))
        ));
        assert!(NmcliNetworkProvider::new(&NetworkConfig::default()).is_ok());
    }
}
