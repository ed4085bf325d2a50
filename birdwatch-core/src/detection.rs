//! Detection events
//!
//! The classifier publishes one comma-separated record per detection:
//!
//! ```text
//! timestamp,location,species,confidence
//! ```
//!
//! Fields are taken by position only. Extra trailing fields are ignored and
//! the timestamp is never shown.

use crate::frame::DisplayFrame;

/// First line of every detection frame
pub const DETECTION_HEADER: &str = "Bird we heard:";

/// Fields a payload must carry to be displayed
pub const MIN_FIELDS: usize = 4;

/// Reasons a payload cannot be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadError {
    /// Payload is not valid UTF-8
    InvalidUtf8,
    /// Fewer than [`MIN_FIELDS`] comma-separated fields
    MissingFields { found: usize },
}

/// A parsed detection record borrowing from the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionEvent<'a> {
    pub timestamp: &'a str,
    pub location: &'a str,
    pub species: &'a str,
    pub confidence: &'a str,
}

impl<'a> DetectionEvent<'a> {
    /// Parse a raw payload
    pub fn parse(payload: &'a [u8]) -> Result<Self, PayloadError> {
        let text = core::str::from_utf8(payload).map_err(|_| PayloadError::InvalidUtf8)?;

        let mut fields = text.split(',');
        let mut next = |found: usize| fields.next().ok_or(PayloadError::MissingFields { found });

        Ok(Self {
            timestamp: next(0)?,
            location: next(1)?,
            species: next(2)?,
            confidence: next(3)?,
        })
    }

    /// Screen layout for this detection
    ///
    /// `["Bird we heard:", species, "(confidence)", "", location]`
    pub fn to_frame(&self) -> DisplayFrame {
        let mut frame = DisplayFrame::new();
        frame.push_line(DETECTION_HEADER);
        frame.push_line(self.species);
        frame.push_parts(&["(", self.confidence, ")"]);
        frame.push_line("");
        frame.push_line(self.location);
        frame
    }
}
