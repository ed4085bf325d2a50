//! Configuration type definitions

use heapless::String;

use crate::frame::LineLayout;
use crate::network::{DEFAULT_CONNECT_ATTEMPTS, POLL_INTERVAL_MS};
use crate::subscriber::{SessionOptions, DEFAULT_KEEPALIVE_S, DEFAULT_PORT};

/// Maximum SSID length (802.11 limit)
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length (WPA2 passphrase limit)
pub const MAX_SECRET_LEN: usize = 64;

/// Maximum broker host name length
pub const MAX_HOST_LEN: usize = 64;

/// Maximum client id / user name length
pub const MAX_NAME_LEN: usize = 32;

/// Maximum topic length
pub const MAX_TOPIC_LEN: usize = 64;

/// Station credentials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WifiConfig {
    pub ssid: String<MAX_SSID_LEN>,
    /// Empty for an open network
    pub password: String<MAX_SECRET_LEN>,
}

/// Broker address, credentials and topic
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BrokerConfig {
    pub host: String<MAX_HOST_LEN>,
    pub port: u16,
    pub client_id: String<MAX_NAME_LEN>,
    pub username: Option<String<MAX_NAME_LEN>>,
    pub password: Option<String<MAX_SECRET_LEN>>,
    pub topic: String<MAX_TOPIC_LEN>,
    /// Session keepalive in seconds
    pub keepalive_s: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            client_id: String::new(),
            username: None,
            password: None,
            topic: String::new(),
            keepalive_s: DEFAULT_KEEPALIVE_S,
        }
    }
}

impl BrokerConfig {
    /// CONNECT parameters for this broker
    pub fn session_options(&self) -> SessionOptions<'_> {
        SessionOptions {
            client_id: &self.client_id,
            username: self.username.as_deref(),
            // A password is only sent together with a user name
            password: self.username.as_ref().and(self.password.as_deref()),
            keepalive_s: self.keepalive_s,
        }
    }
}

/// Display geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayConfig {
    /// Width in pixels
    pub width: u16,
    /// Height in pixels
    pub height: u16,
    /// Vertical distance between lines in pixels
    pub line_height: u16,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 64,
            line_height: 10,
        }
    }
}

impl DisplayConfig {
    pub fn layout(&self) -> LineLayout {
        LineLayout::new(self.line_height)
    }
}

/// Timing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingConfig {
    /// Link status polls before giving up (one per second)
    pub connect_attempts: u8,
    /// How long the assigned address stays on screen
    pub address_dwell_ms: u32,
    /// Pause between broker polls
    pub poll_interval_ms: u32,
    /// Pause before a device reset after a transport failure
    pub restart_delay_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            address_dwell_ms: 2_000,
            poll_interval_ms: POLL_INTERVAL_MS,
            restart_delay_ms: 5_000,
        }
    }
}

impl TimingConfig {
    /// Poll iterations between keepalive pings
    ///
    /// Pings go out once half the keepalive has passed. `None` when the
    /// keepalive is disabled.
    pub fn ping_every(&self, keepalive_s: u16) -> Option<u32> {
        if keepalive_s == 0 {
            return None;
        }
        let half_ms = u32::from(keepalive_s) * 1_000 / 2;
        Some((half_ms / self.poll_interval_ms.max(1)).max(1))
    }
}

/// Complete node configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeConfig {
    pub wifi: WifiConfig,
    pub broker: BrokerConfig,
    pub display: DisplayConfig,
    pub timing: TimingConfig,
}
