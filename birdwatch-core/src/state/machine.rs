//! State machine definition

use super::events::Event;

/// Node states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeState {
    /// Power-on, display being initialized
    Booting,
    /// Waiting for the station link
    WifiConnecting,
    /// Link up, address shown
    WifiConnected,
    /// Opening the broker session
    BrokerConnecting,
    /// Polling for detections
    Serving,
    /// Transport failed; waiting before a device reset
    Restarting,
    /// Link never came up; terminal
    FatalWifiFailure,
}

/// Coarse view of a single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl NodeState {
    /// Check if this state can only be left by power cycling
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::FatalWifiFailure)
    }

    /// State of the station link
    pub fn wifi_connection(&self) -> ConnectionState {
        use NodeState::*;

        match self {
            Booting => ConnectionState::Disconnected,
            WifiConnecting => ConnectionState::Connecting,
            WifiConnected | BrokerConnecting | Serving | Restarting => ConnectionState::Connected,
            FatalWifiFailure => ConnectionState::Failed,
        }
    }

    /// State of the broker session
    pub fn broker_connection(&self) -> ConnectionState {
        use NodeState::*;

        match self {
            Booting | WifiConnecting | WifiConnected | FatalWifiFailure => {
                ConnectionState::Disconnected
            }
            BrokerConnecting => ConnectionState::Connecting,
            Serving => ConnectionState::Connected,
            Restarting => ConnectionState::Failed,
        }
    }

    /// Process an event and return the next state
    ///
    /// Events that do not apply to the current state leave it unchanged.
    pub fn transition(self, event: Event) -> Self {
        use Event::*;
        use NodeState::*;

        match (self, event) {
            (Booting, DisplayReady) => WifiConnecting,

            (WifiConnecting, WifiUp) => WifiConnected,
            (WifiConnecting, WifiFailed) => FatalWifiFailure,

            (WifiConnected, BrokerOpening) => BrokerConnecting,

            // Open and subscribe failures restart like serving failures
            (BrokerConnecting, Subscribed) => Serving,
            (BrokerConnecting, TransportFailed) => Restarting,

            (Serving, TransportFailed) => Restarting,

            (Restarting, Reboot) => Booting,

            // Default: stay in current state
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Event::*;

    #[test]
    fn test_happy_path() {
        let events = [DisplayReady, WifiUp, BrokerOpening, Subscribed];
        let expected = [
            NodeState::WifiConnecting,
            NodeState::WifiConnected,
            NodeState::BrokerConnecting,
            NodeState::Serving,
        ];

        let mut state = NodeState::Booting;
        for (event, next) in events.into_iter().zip(expected) {
            state = state.transition(event);
            assert_eq!(state, next);
        }
    }

    #[test]
    fn test_fatal_only_from_wifi_connecting() {
        assert_eq!(
            NodeState::WifiConnecting.transition(WifiFailed),
            NodeState::FatalWifiFailure
        );

        let others = [
            NodeState::Booting,
            NodeState::WifiConnected,
            NodeState::BrokerConnecting,
            NodeState::Serving,
            NodeState::Restarting,
        ];
        for state in others {
            assert_ne!(state.transition(WifiFailed), NodeState::FatalWifiFailure);
        }
    }

    #[test]
    fn test_fatal_is_terminal() {
        let events = [
            DisplayReady,
            WifiUp,
            WifiFailed,
            BrokerOpening,
            Subscribed,
            TransportFailed,
            Reboot,
        ];
        for event in events {
            assert_eq!(
                NodeState::FatalWifiFailure.transition(event),
                NodeState::FatalWifiFailure
            );
        }
        assert!(NodeState::FatalWifiFailure.is_terminal());
        assert!(!NodeState::Restarting.is_terminal());
    }

    #[test]
    fn test_transport_failure_restarts() {
        assert_eq!(NodeState::Serving.transition(TransportFailed), NodeState::Restarting);
        assert_eq!(
            NodeState::BrokerConnecting.transition(TransportFailed),
            NodeState::Restarting
        );
        assert_eq!(NodeState::Restarting.transition(Reboot), NodeState::Booting);
    }

    #[test]
    fn test_unrelated_events_ignored() {
        assert_eq!(NodeState::Booting.transition(WifiUp), NodeState::Booting);
        assert_eq!(NodeState::Serving.transition(Reboot), NodeState::Serving);
        assert_eq!(NodeState::WifiConnected.transition(Subscribed), NodeState::WifiConnected);
    }

    #[test]
    fn test_connection_views() {
        assert_eq!(NodeState::Booting.wifi_connection(), ConnectionState::Disconnected);
        assert_eq!(NodeState::WifiConnecting.wifi_connection(), ConnectionState::Connecting);
        assert_eq!(NodeState::Serving.wifi_connection(), ConnectionState::Connected);
        assert_eq!(NodeState::FatalWifiFailure.wifi_connection(), ConnectionState::Failed);

        assert_eq!(NodeState::WifiConnected.broker_connection(), ConnectionState::Disconnected);
        assert_eq!(NodeState::BrokerConnecting.broker_connection(), ConnectionState::Connecting);
        assert_eq!(NodeState::Serving.broker_connection(), ConnectionState::Connected);
        assert_eq!(NodeState::Restarting.broker_connection(), ConnectionState::Failed);
    }
}
