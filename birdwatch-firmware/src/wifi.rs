//! CYW43 station link
//!
//! Brings up the Pico W radio and the embassy-net stack (DHCP), and exposes
//! the station as a [`WifiLink`].
//!
//! The radio's control handle lives in [`join_task`]. A join request is
//! handed to it and its outcome read back through signals, so the link's
//! status polls keep running while the radio associates.

use core::net::Ipv4Addr;

use birdwatch_core::config::{MAX_SECRET_LEN, MAX_SSID_LEN};
use birdwatch_core::network::LinkStatus;
use birdwatch_core::traits::WifiLink;
use cyw43::JoinOptions;
use cyw43_pio::{PioSpi, DEFAULT_CLOCK_DIVIDER};
use defmt::*;
use embassy_executor::Spawner;
use embassy_net::{Config, Stack, StackResources};
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIN_23, PIN_24, PIN_25, PIN_29, PIO0};
use embassy_rp::pio::Pio;
use embassy_rp::Peri;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::String;
use static_cell::StaticCell;

use crate::Irqs;

/// DHCP, DNS and the broker socket
const STACK_SOCKETS: usize = 3;

const NET_SEED: u64 = 0x0b1d_5eed_feed_cafe;

/// Pico W radio wiring
pub struct RadioPins {
    pub pwr: Peri<'static, PIN_23>,
    pub cs: Peri<'static, PIN_25>,
    pub pio: Peri<'static, PIO0>,
    pub dio: Peri<'static, PIN_24>,
    pub clk: Peri<'static, PIN_29>,
    pub dma: Peri<'static, DMA_CH0>,
}

struct JoinRequest {
    ssid: String<MAX_SSID_LEN>,
    password: String<MAX_SECRET_LEN>,
}

/// Credentials for the join task
static JOIN_REQUEST: Signal<CriticalSectionRawMutex, JoinRequest> = Signal::new();

/// Outcome of the last join, as the radio's status code on failure
static JOIN_RESULT: Signal<CriticalSectionRawMutex, Result<(), u32>> = Signal::new();

#[derive(Clone, Copy)]
enum JoinState {
    Idle,
    Joining,
    Joined,
    Failed,
}

/// Station interface of the CYW43
pub struct Cyw43Link {
    stack: Stack<'static>,
    join: JoinState,
}

impl WifiLink for Cyw43Link {
    async fn join(&mut self, ssid: &str, password: &str) {
        let (Ok(ssid), Ok(password)) = (String::try_from(ssid), String::try_from(password)) else {
            warn!("Credentials too long for the radio");
            self.join = JoinState::Failed;
            return;
        };

        JOIN_RESULT.reset();
        JOIN_REQUEST.signal(JoinRequest { ssid, password });
        self.join = JoinState::Joining;
    }

    fn status(&mut self) -> LinkStatus {
        if let JoinState::Joining = self.join {
            match JOIN_RESULT.try_take() {
                Some(Ok(())) => self.join = JoinState::Joined,
                Some(Err(status)) => {
                    warn!("Join failed, status {}", status);
                    self.join = JoinState::Failed;
                }
                None => {}
            }
        }

        match self.join {
            JoinState::Idle => LinkStatus::Down,
            JoinState::Joining => LinkStatus::Joining,
            JoinState::Failed => LinkStatus::Failed,
            JoinState::Joined if self.stack.config_v4().is_some() => LinkStatus::Up,
            JoinState::Joined if self.stack.is_link_up() => LinkStatus::NoIp,
            JoinState::Joined => LinkStatus::Joining,
        }
    }

    fn address(&self) -> Option<Ipv4Addr> {
        self.stack.config_v4().map(|config| config.address.address())
    }
}

/// Power up the radio and start the network stack
///
/// Spawns the radio and stack runners. The returned link has not joined
/// anything yet; the stack handle is shared with the broker socket.
pub async fn start(spawner: Spawner, pins: RadioPins) -> (Cyw43Link, Stack<'static>) {
    let fw = cyw43_firmware::CYW43_43439A0;
    let clm = cyw43_firmware::CYW43_43439A0_CLM;

    let pwr = Output::new(pins.pwr, Level::Low);
    let cs = Output::new(pins.cs, Level::High);
    let mut pio = Pio::new(pins.pio, Irqs);
    let spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        pins.dio,
        pins.clk,
        pins.dma,
    );

    static STATE: StaticCell<cyw43::State> = StaticCell::new();
    let state = STATE.init(cyw43::State::new());
    let (net_device, mut control, runner) = cyw43::new(state, pwr, spi, fw).await;
    spawner.spawn(unwrap!(cyw43_task(runner)));

    control.init(clm).await;
    control
        .set_power_management(cyw43::PowerManagementMode::PowerSave)
        .await;
    info!("Radio initialized");

    static RESOURCES: StaticCell<StackResources<STACK_SOCKETS>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        net_device,
        Config::dhcpv4(Default::default()),
        RESOURCES.init(StackResources::new()),
        NET_SEED,
    );
    spawner.spawn(unwrap!(net_task(runner)));
    spawner.spawn(unwrap!(join_task(control)));

    let link = Cyw43Link {
        stack,
        join: JoinState::Idle,
    };
    (link, stack)
}

/// Run join requests against the radio, one at a time
#[embassy_executor::task]
async fn join_task(mut control: cyw43::Control<'static>) -> ! {
    loop {
        let request = JOIN_REQUEST.wait().await;
        info!("Joining {}", request.ssid.as_str());
        let options = if request.password.is_empty() {
            JoinOptions::new_open()
        } else {
            JoinOptions::new(request.password.as_bytes())
        };

        let result = control.join(&request.ssid, options).await;
        JOIN_RESULT.signal(result.map_err(|e| e.status));
    }
}

#[embassy_executor::task]
async fn cyw43_task(
    runner: cyw43::Runner<'static, Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>,
) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}
