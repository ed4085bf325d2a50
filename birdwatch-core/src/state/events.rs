//! Events that drive node state transitions

/// Node events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Display initialized and cleared
    DisplayReady,
    /// Station link reported up with an address
    WifiUp,
    /// Station link never came up
    WifiFailed,
    /// Broker session is being opened
    BrokerOpening,
    /// Handler registered and SUBSCRIBE sent
    Subscribed,
    /// Broker session failed
    TransportFailed,
    /// Device restarted
    Reboot,
}
