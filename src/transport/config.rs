use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the desktop connects to the phone running the controller emulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// No emulator link; the socket thread is never started.
    Off,
    /// Phone attached over USB; requires a one-shot adb port forward per
    /// connection cycle.
    #[default]
    Usb,
    /// Phone reachable over the local network.
    Wifi,
}

/// Connection settings for the emulator event stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub mode: LinkMode,
    /// Address of the phone when forwarded over USB.
    pub usb_host: String,
    /// Address of the phone when it acts as a WiFi hotspot.
    pub wifi_host: String,
    pub port: u16,
    /// Blocking-read timeout on the event socket, in milliseconds.
    pub read_timeout_ms: u64,
    /// Minimum time between connection attempt starts, in milliseconds.
    pub min_retry_interval_ms: u64,
    /// Program used for the USB port-forwarding side effect.
    pub adb_program: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mode: LinkMode::Usb,
            usb_host: "127.0.0.1".to_string(),
            wifi_host: "192.168.43.1".to_string(),
            port: 7003,
            read_timeout_ms: 5000,
            min_retry_interval_ms: 1000,
            adb_program: "adb".to_string(),
        }
    }
}

impl LinkConfig {
    /// The address dialed for the configured mode.
    pub fn host(&self) -> &str {
        match self.mode {
            LinkMode::Wifi => &self.wifi_host,
            _ => &self.usb_host,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn min_retry_interval(&self) -> Duration {
        Duration::from_millis(self.min_retry_interval_ms)
    }
}
