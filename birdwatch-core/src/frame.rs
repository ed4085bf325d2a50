//! Display frames
//!
//! A [`DisplayFrame`] is the complete content of the screen: an ordered list
//! of short text lines. Frames are built on every render request and replace
//! whatever was shown before.

use core::fmt::Write;
use core::net::Ipv4Addr;

use birdwatch_protocol::MAX_PACKET_SIZE;
use heapless::{String, Vec};

/// Maximum number of lines in a frame
pub const MAX_LINES: usize = 8;

/// Maximum bytes per line
///
/// Any field of a deliverable message fits, wrapped in two extra
/// characters. Text wider than the panel is clipped by the surface.
pub const MAX_LINE_LEN: usize = MAX_PACKET_SIZE;

/// Left margin in pixels for every line
pub const LEFT_MARGIN: i32 = 0;

/// A single line of text
pub type Line = String<MAX_LINE_LEN>;

/// Ordered lines of text to show on the display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayFrame {
    lines: Vec<Line, MAX_LINES>,
}

impl DisplayFrame {
    /// Create an empty frame
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a frame from string slices
    ///
    /// Lines past [`MAX_LINES`] are dropped.
    pub fn from_lines(lines: &[&str]) -> Self {
        let mut frame = Self::new();
        for line in lines {
            if !frame.push_line(line) {
                break;
            }
        }
        frame
    }

    /// Append a line, truncating it to [`MAX_LINE_LEN`] bytes at a character
    /// boundary
    ///
    /// Returns `false` if the frame is already full.
    pub fn push_line(&mut self, text: &str) -> bool {
        self.push_parts(&[text])
    }

    /// Append a line made of several pieces
    pub fn push_parts(&mut self, parts: &[&str]) -> bool {
        let mut line = Line::new();
        for part in parts {
            push_truncated(&mut line, part);
        }
        self.lines.push(line).is_ok()
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Append as many whole characters of `text` as fit
fn push_truncated(line: &mut Line, text: &str) {
    for c in text.chars() {
        if line.push(c).is_err() {
            break;
        }
    }
}

/// Vertical placement of frame lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineLayout {
    /// Distance between consecutive baselines in pixels
    pub line_height: u16,
}

/// A line with its pixel position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedLine<'f> {
    pub x: i32,
    pub y: i32,
    pub text: &'f str,
}

impl LineLayout {
    pub const fn new(line_height: u16) -> Self {
        Self { line_height }
    }

    /// Place every line of a frame top to bottom
    ///
    /// A non-empty first line is a header and gets an extra half line of
    /// space below it.
    pub fn place<'f>(&self, frame: &'f DisplayFrame) -> impl Iterator<Item = PlacedLine<'f>> + 'f {
        let line_height = i32::from(self.line_height);
        frame
            .lines()
            .iter()
            .enumerate()
            .scan(0i32, move |y, (index, text)| {
                let placed = PlacedLine {
                    x: LEFT_MARGIN,
                    y: *y,
                    text: text.as_str(),
                };
                if index == 0 && !text.is_empty() {
                    *y += line_height / 2;
                }
                *y += line_height;
                Some(placed)
            })
    }
}

/// Shown while waiting for the first detection
pub fn waiting_frame() -> DisplayFrame {
    DisplayFrame::from_lines(&["", "Waiting", "for a bird", "to sing..."])
}

/// Shown when the station link never comes up
pub fn wifi_error_frame() -> DisplayFrame {
    DisplayFrame::from_lines(&["Can't connect to wifi"])
}

/// Shows the address assigned to the node
pub fn address_frame(address: Ipv4Addr) -> DisplayFrame {
    let mut line = Line::new();
    // "255.255.255.255" always fits
    let _ = write!(line, "{}", address);
    let mut frame = DisplayFrame::new();
    frame.push_line(&line);
    frame
}
