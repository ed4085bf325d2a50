//! Network connector
//!
//! Brings the station link up once at boot. The connector issues a single
//! join request and then polls the link once per second; there is no backoff
//! and no second join.

use core::net::Ipv4Addr;

use embassy_futures::select::{select, Either};
use embedded_hal_async::delay::DelayNs;

use crate::traits::WifiLink;

/// Interval between link status polls
pub const POLL_INTERVAL_MS: u32 = 1_000;

/// Default number of status polls before giving up
pub const DEFAULT_CONNECT_ATTEMPTS: u8 = 10;

/// Station link status
///
/// Mirrors the CYW43 link status codes: `0..=3` are progress states, negative
/// codes are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkStatus {
    /// Radio idle
    Down,
    /// Association in progress
    Joining,
    /// Associated, waiting for DHCP
    NoIp,
    /// Associated with an address
    Up,
    /// Join failed
    Failed,
    /// Access point not found
    NoNetwork,
    /// Authentication rejected
    BadAuth,
    /// Any other code
    Other(i32),
}

impl LinkStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Down,
            1 => Self::Joining,
            2 => Self::NoIp,
            3 => Self::Up,
            -1 => Self::Failed,
            -2 => Self::NoNetwork,
            -3 => Self::BadAuth,
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Down => 0,
            Self::Joining => 1,
            Self::NoIp => 2,
            Self::Up => 3,
            Self::Failed => -1,
            Self::NoNetwork => -2,
            Self::BadAuth => -3,
            Self::Other(code) => *code,
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }

    /// The link will not make further progress on its own
    pub fn is_settled(&self) -> bool {
        let code = self.code();
        code < 0 || code >= 3
    }
}

/// Why the link never came up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectFailure {
    /// Link was still coming up after every poll
    Timeout { attempts: u8 },
    /// Link settled in a state other than up
    Rejected(LinkStatus),
}

/// Join `ssid` and wait for an address
///
/// Sleeps [`POLL_INTERVAL_MS`] before each status poll. A link that reports
/// up on poll `k` returns after exactly `k` sleeps; one that never does
/// fails after `attempts` polls. A failure code ends the wait early. A join
/// request still pending after the whole poll budget is a timeout.
pub async fn connect<W, D>(
    link: &mut W,
    delay: &mut D,
    ssid: &str,
    password: &str,
    attempts: u8,
) -> Result<Ipv4Addr, ConnectFailure>
where
    W: WifiLink,
    D: DelayNs,
{
    info!("Joining network {}", ssid);
    let budget_ms = u32::from(attempts) * POLL_INTERVAL_MS;
    if let Either::Second(()) = select(link.join(ssid, password), delay.delay_ms(budget_ms)).await {
        warn!("Join request still pending after {} ms", budget_ms);
        return Err(ConnectFailure::Timeout { attempts });
    }

    for attempt in 1..=attempts {
        delay.delay_ms(POLL_INTERVAL_MS).await;

        let status = link.status();
        debug!("Link status {} after poll {}", status.code(), attempt);

        if status.is_up() {
            if let Some(address) = link.address() {
                return Ok(address);
            }
        } else if status.is_settled() {
            warn!("Join rejected with status {}", status.code());
            return Err(ConnectFailure::Rejected(status));
        }
    }

    warn!("Link not up after {} polls", attempts);
    Err(ConnectFailure::Timeout { attempts })
}
