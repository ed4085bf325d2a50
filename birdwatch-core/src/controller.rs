//! Node controller
//!
//! Owns the display, the station link, the broker link and the delay
//! source, and walks the node through its states:
//!
//! ```text
//! Booting → WifiConnecting → WifiConnected → BrokerConnecting → Serving → Restarting
//!                  ↓
//!          FatalWifiFailure
//! ```
//!
//! [`NodeController::run`] only returns to ask the caller for a device reset
//! ([`Halt::Restart`]) or to report that the link never came up
//! ([`Halt::Fatal`]).

use core::net::Ipv4Addr;

use embassy_futures::select::select;
use embedded_hal_async::delay::DelayNs;

use crate::config::{NodeConfig, TimingConfig};
use crate::detection::DetectionEvent;
use crate::frame::{address_frame, waiting_frame, wifi_error_frame};
use crate::network::{connect, ConnectFailure};
use crate::state::{ConnectionState, Event, NodeState};
use crate::subscriber::{MessageHandler, Subscriber, TransportError};
use crate::traits::{BrokerLink, DisplaySurface, WifiLink};

/// How long a DISCONNECT may take before the link is dropped anyway
pub const DISCONNECT_GRACE_MS: u32 = 500;

/// Why the controller stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Halt {
    /// Transport failed; reset the device
    Restart(TransportError),
    /// Station link never came up; do not restart
    Fatal(ConnectFailure),
}

/// Shows each detection on the display
pub struct DetectionHandler<'d, D> {
    display: &'d mut D,
}

impl<'d, D: DisplaySurface> DetectionHandler<'d, D> {
    pub fn new(display: &'d mut D) -> Self {
        Self { display }
    }
}

impl<D: DisplaySurface> MessageHandler for DetectionHandler<'_, D> {
    async fn on_message(&mut self, topic: &str, payload: &[u8]) {
        match DetectionEvent::parse(payload) {
            Ok(event) => {
                let frame = event.to_frame();
                self.display.render(None).await;
                self.display.render(Some(&frame)).await;
            }
            Err(e) => {
                // Keep the previous detection on screen
                warn!("Ignoring payload on {}: {}", topic, e);
            }
        }
    }
}

/// Top-level node logic
pub struct NodeController<D, W, B, T> {
    display: D,
    wifi: W,
    broker: B,
    delay: T,
    config: NodeConfig,
    state: NodeState,
}

impl<D, W, B, T> NodeController<D, W, B, T>
where
    D: DisplaySurface,
    W: WifiLink,
    B: BrokerLink,
    T: DelayNs,
{
    /// Create a controller from initialized devices
    ///
    /// The display must already be initialized; a display that fails to
    /// come up is a boot failure for the caller to handle.
    pub fn new(display: D, wifi: W, broker: B, delay: T, config: NodeConfig) -> Self {
        Self {
            display,
            wifi,
            broker,
            delay,
            config,
            state: NodeState::Booting,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn wifi_connection(&self) -> ConnectionState {
        self.state.wifi_connection()
    }

    pub fn broker_connection(&self) -> ConnectionState {
        self.state.broker_connection()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Release the devices
    pub fn into_parts(self) -> (D, W, B, T) {
        (self.display, self.wifi, self.broker, self.delay)
    }

    /// Run the node until it has to stop
    pub async fn run(&mut self) -> Halt {
        self.apply(Event::Reboot);

        self.display.render(None).await;
        self.apply(Event::DisplayReady);

        let address = match self.join_network().await {
            Ok(address) => address,
            Err(failure) => {
                self.display.render(Some(&wifi_error_frame())).await;
                self.apply(Event::WifiFailed);
                return Halt::Fatal(failure);
            }
        };
        self.apply(Event::WifiUp);
        self.show_address(address).await;

        self.display.render(None).await;
        self.display.render(Some(&waiting_frame())).await;

        let error = self.serve().await;
        warn!("Broker session failed: {}", error);
        self.apply(Event::TransportFailed);
        self.delay.delay_ms(self.config.timing.restart_delay_ms).await;
        Halt::Restart(error)
    }

    fn apply(&mut self, event: Event) {
        advance(&mut self.state, event);
    }

    async fn join_network(&mut self) -> Result<Ipv4Addr, ConnectFailure> {
        let wifi = &self.config.wifi;
        connect(
            &mut self.wifi,
            &mut self.delay,
            &wifi.ssid,
            &wifi.password,
            self.config.timing.connect_attempts,
        )
        .await
    }

    async fn show_address(&mut self, address: Ipv4Addr) {
        let [a, b, c, d] = address.octets();
        info!("Link up at {}.{}.{}.{}", a, b, c, d);
        self.display.render(Some(&address_frame(address))).await;
        self.delay.delay_ms(self.config.timing.address_dwell_ms).await;
    }

    /// Open the session and poll it until it fails
    async fn serve(&mut self) -> TransportError {
        self.apply(Event::BrokerOpening);

        let Self {
            display,
            broker,
            delay,
            config,
            state,
            ..
        } = self;

        let options = config.broker.session_options();
        let mut session =
            match Subscriber::open(broker, &config.broker.host, config.broker.port, &options).await {
                Ok(session) => session,
                Err(e) => return e,
            };
        session.set_handler(DetectionHandler::new(display));

        let error = match session.subscribe(&config.broker.topic).await {
            Ok(()) => {
                advance(state, Event::Subscribed);
                info!("Serving");
                poll_forever(&mut session, delay, &config.timing, config.broker.keepalive_s).await
            }
            Err(e) => e,
        };

        let _ = select(session.disconnect(), delay.delay_ms(DISCONNECT_GRACE_MS)).await;
        session.close();
        error
    }
}

fn advance(state: &mut NodeState, event: Event) {
    let next = state.transition(event);
    if next != *state {
        debug!("{} -> {}", *state, next);
        *state = next;
    }
}

/// Poll the session once per interval, pinging when the keepalive is due
async fn poll_forever<L, H, T>(
    session: &mut Subscriber<'_, L, H>,
    delay: &mut T,
    timing: &TimingConfig,
    keepalive_s: u16,
) -> TransportError
where
    L: BrokerLink,
    H: MessageHandler,
    T: DelayNs,
{
    let ping_every = timing.ping_every(keepalive_s);
    let mut polls_since_ping = 0u32;

    loop {
        if let Err(e) = session.poll().await {
            return e;
        }

        polls_since_ping += 1;
        if ping_every.is_some_and(|every| polls_since_ping >= every) {
            polls_since_ping = 0;
            if let Err(e) = session.ping().await {
                return e;
            }
        }

        delay.delay_ms(timing.poll_interval_ms).await;
    }
}
