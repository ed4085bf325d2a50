//! Birdwatch - bird detection display
//!
//! Firmware for a Raspberry Pi Pico W with a 128x64 SSD1306 OLED on I2C0
//! (SDA on GP4, SCL on GP5). Joins WiFi, subscribes to the detection topic on
//! the broker and shows the latest detection.
//!
//! A broken link to the broker resets the board; failing to join WiFi leaves
//! the error on screen and halts.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::i2c::{self, I2c};
use embassy_rp::peripherals::{I2C0, PIO0};
use embassy_time::Delay;
use {defmt_rtt as _, panic_probe as _};

use birdwatch_core::config::parse_config;
use birdwatch_core::{Halt, NodeController};
use birdwatch_drivers::display::{OledSurface, Ssd1306};

mod broker;
mod wifi;

/// Node configuration compiled into the firmware
/// Edit node.toml and rebuild to customize
const EMBEDDED_CONFIG: &str = include_str!("../node.toml");

/// SSD1306 fast-mode bus clock
const I2C_FREQUENCY_HZ: u32 = 400_000;

bind_interrupts!(struct Irqs {
    I2C0_IRQ => i2c::InterruptHandler<I2C0>;
    PIO0_IRQ_0 => embassy_rp::pio::InterruptHandler<PIO0>;
});

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Birdwatch firmware starting...");

    let p = embassy_rp::init(Default::default());

    // Also checked by build.rs
    let config = match parse_config(EMBEDDED_CONFIG) {
        Ok(config) => config,
        Err(e) => defmt::panic!("node.toml rejected: {}", e),
    };
    info!(
        "Config loaded: ssid={}, broker={}:{}, topic={}",
        config.wifi.ssid.as_str(),
        config.broker.host.as_str(),
        config.broker.port,
        config.broker.topic.as_str()
    );

    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = I2C_FREQUENCY_HZ;
    let bus = I2c::new_async(p.I2C0, p.PIN_5, p.PIN_4, Irqs, i2c_config);

    let mut oled = match Ssd1306::new(bus, config.display.width, config.display.height) {
        Ok(oled) => oled,
        Err(e) => defmt::panic!("Unsupported panel {}x{}", e.width, e.height),
    };
    if let Err(e) = oled.init().await {
        defmt::panic!("Display init failed: {}", e);
    }
    info!("Display initialized");
    let display = OledSurface::new(oled, config.display.layout());

    let radio = wifi::RadioPins {
        pwr: p.PIN_23,
        cs: p.PIN_25,
        pio: p.PIO0,
        dio: p.PIN_24,
        clk: p.PIN_29,
        dma: p.DMA_CH0,
    };
    let (link, stack) = wifi::start(spawner, radio).await;
    let broker = broker::TcpBroker::new(stack);

    let mut node = NodeController::new(display, link, broker, Delay, config);
    match node.run().await {
        Halt::Restart(e) => {
            warn!("Broker session lost ({}), resetting", e);
            cortex_m::peripheral::SCB::sys_reset();
        }
        Halt::Fatal(failure) => defmt::panic!("WiFi unavailable: {}", failure),
    }
}
