//! Station-mode wireless link

use core::net::Ipv4Addr;

use crate::network::LinkStatus;

/// A radio that can join an access point
pub trait WifiLink {
    /// Start joining the named network
    ///
    /// Returns once the join request has been issued. Progress and the
    /// outcome are observed through [`WifiLink::status`].
    async fn join(&mut self, ssid: &str, password: &str);

    /// Current link status
    fn status(&mut self) -> LinkStatus;

    /// Address assigned to the station, once it has one
    fn address(&self) -> Option<Ipv4Addr>;
}
