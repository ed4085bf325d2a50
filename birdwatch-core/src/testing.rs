//! Scripted fakes for host tests

use core::net::Ipv4Addr;

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use std::collections::VecDeque;
use std::string::{String, ToString};
use std::vec::Vec;

use crate::frame::DisplayFrame;
use crate::network::LinkStatus;
use crate::subscriber::TransportError;
use crate::traits::{BrokerLink, DisplaySurface, WifiLink};

/// Station link that replays a list of status codes
///
/// The last code repeats once the script runs out. With `hang_join` set the
/// join request never completes.
pub struct ScriptedLink {
    pub codes: Vec<i32>,
    pub polls: usize,
    pub joined: Option<(String, String)>,
    pub address: Ipv4Addr,
    pub hang_join: bool,
}

impl ScriptedLink {
    pub fn new(codes: &[i32]) -> Self {
        Self {
            codes: codes.to_vec(),
            polls: 0,
            joined: None,
            address: Ipv4Addr::new(192, 168, 1, 42),
            hang_join: false,
        }
    }
}

impl WifiLink for ScriptedLink {
    async fn join(&mut self, ssid: &str, password: &str) {
        self.joined = Some((ssid.to_string(), password.to_string()));
        if self.hang_join {
            core::future::pending::<()>().await;
        }
    }

    fn status(&mut self) -> LinkStatus {
        let index = self.polls.min(self.codes.len() - 1);
        self.polls += 1;
        LinkStatus::from_code(self.codes[index])
    }

    fn address(&self) -> Option<Ipv4Addr> {
        Some(self.address)
    }
}

/// Delay that records requested durations instead of sleeping
///
/// A request for exactly `stall_at_ms` is recorded and then never completes.
#[derive(Default)]
pub struct RecordingDelay {
    pub calls_ms: Vec<u32>,
    pub stall_at_ms: Option<u32>,
}

impl RecordingDelay {
    pub fn total_ms(&self) -> u64 {
        self.calls_ms.iter().map(|&ms| u64::from(ms)).sum()
    }
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.delay_ms(ns / 1_000_000).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.calls_ms.push(ms);
        if self.stall_at_ms == Some(ms) {
            core::future::pending::<()>().await;
        }
    }
}

/// One render call as seen by the display
pub type Rendered = Option<Vec<String>>;

/// Display that records every render call
#[derive(Default)]
pub struct RecordingDisplay {
    pub renders: Vec<Rendered>,
}

impl RecordingDisplay {
    pub fn last(&self) -> Option<&Rendered> {
        self.renders.last()
    }
}

pub fn rendered(lines: &[&str]) -> Rendered {
    Some(lines.iter().map(|l| l.to_string()).collect())
}

impl DisplaySurface for RecordingDisplay {
    async fn render(&mut self, frame: Option<&DisplayFrame>) {
        self.renders
            .push(frame.map(|f| f.lines().iter().map(|l| l.as_str().to_string()).collect()));
    }
}

/// Broker byte stream fed from a script
///
/// Once the inbound script is drained the link stays idle for
/// `idle_polls_left` readiness checks, then reports the peer as gone unless
/// `hang_up_when_drained` is cleared. With `stall_disconnect` set a
/// DISCONNECT write never completes.
pub struct ScriptedBroker {
    pub inbound: VecDeque<u8>,
    pub written: Vec<u8>,
    pub opened: Option<(String, u16)>,
    pub open_error: Option<TransportError>,
    pub idle_polls_left: usize,
    pub hang_up_when_drained: bool,
    pub stall_disconnect: bool,
    pub closed: bool,
}

impl ScriptedBroker {
    pub fn new(inbound: &[u8]) -> Self {
        Self {
            inbound: inbound.iter().copied().collect(),
            written: Vec::new(),
            opened: None,
            open_error: None,
            idle_polls_left: 0,
            hang_up_when_drained: true,
            stall_disconnect: false,
            closed: false,
        }
    }

    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }
}

impl ErrorType for ScriptedBroker {
    type Error = ErrorKind;
}

impl Read for ScriptedBroker {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        while n < buf.len() {
            match self.inbound.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for ScriptedBroker {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.closed {
            return Err(ErrorKind::NotConnected);
        }
        if self.stall_disconnect && buf.first() == Some(&0xE0) {
            core::future::pending::<()>().await;
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl BrokerLink for ScriptedBroker {
    async fn open(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        if let Some(error) = self.open_error {
            return Err(error);
        }
        self.opened = Some((host.to_string(), port));
        self.closed = false;
        Ok(())
    }

    fn readable(&mut self) -> Result<bool, TransportError> {
        if !self.inbound.is_empty() {
            Ok(true)
        } else if self.idle_polls_left > 0 {
            self.idle_polls_left -= 1;
            Ok(false)
        } else if self.hang_up_when_drained {
            Err(TransportError::Closed)
        } else {
            Ok(false)
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Accepted CONNACK
pub const CONNACK_OK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

/// Granted SUBACK for packet id 1
pub const SUBACK_OK: [u8; 5] = [0x90, 0x03, 0x00, 0x01, 0x00];

/// Encode a QoS 0 PUBLISH
pub fn publish(topic: &str, payload: &[u8]) -> Vec<u8> {
    let remaining = 2 + topic.len() + payload.len();
    assert!(remaining < 128);
    let mut bytes = std::vec![0x30, remaining as u8, 0x00, topic.len() as u8];
    bytes.extend_from_slice(topic.as_bytes());
    bytes.extend_from_slice(payload);
    bytes
}
