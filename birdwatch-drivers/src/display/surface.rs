//! Text surface on the OLED
//!
//! Renders [`DisplayFrame`]s with a 6x10 mono font. Every render redraws the
//! whole panel from a blank buffer.

use birdwatch_core::frame::{DisplayFrame, LineLayout};
use birdwatch_core::traits::DisplaySurface;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use embedded_hal_async::i2c::I2c;

use super::ssd1306::Ssd1306;

/// [`DisplaySurface`] backed by an SSD1306
pub struct OledSurface<I2C> {
    display: Ssd1306<I2C>,
    layout: LineLayout,
    flush_errors: u32,
}

impl<I2C: I2c> OledSurface<I2C> {
    /// Wrap an initialized display
    pub fn new(display: Ssd1306<I2C>, layout: LineLayout) -> Self {
        Self {
            display,
            layout,
            flush_errors: 0,
        }
    }

    /// Number of renders that failed to reach the panel
    pub fn flush_errors(&self) -> u32 {
        self.flush_errors
    }

    pub fn display(&self) -> &Ssd1306<I2C> {
        &self.display
    }

    fn draw(&mut self, frame: &DisplayFrame) {
        let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
        for line in self.layout.place(frame) {
            // Drawing into the frame buffer cannot fail
            let _ = Text::with_baseline(line.text, Point::new(line.x, line.y), style, Baseline::Top)
                .draw(&mut self.display);
        }
    }
}

impl<I2C: I2c> DisplaySurface for OledSurface<I2C> {
    async fn render(&mut self, frame: Option<&DisplayFrame>) {
        self.display.clear_buffer();
        if let Some(frame) = frame {
            self.draw(frame);
        }

        if self.display.flush().await.is_err() {
            self.flush_errors = self.flush_errors.wrapping_add(1);
            #[cfg(feature = "defmt")]
            defmt::warn!("Display flush failed ({} total)", self.flush_errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::ssd1306::tests::RecordingBus;
    use embassy_futures::block_on;
    use std::vec::Vec;

    fn surface() -> OledSurface<RecordingBus> {
        let display = Ssd1306::new(RecordingBus::default(), 128, 64).unwrap();
        OledSurface::new(display, LineLayout::new(10))
    }

    fn snapshot(surface: &OledSurface<RecordingBus>) -> Vec<bool> {
        let display = surface.display();
        (0..64)
            .flat_map(|y| (0..128).map(move |x| (x, y)))
            .map(|(x, y)| display.pixel(x, y))
            .collect()
    }

    fn lit_rows(surface: &OledSurface<RecordingBus>) -> Vec<usize> {
        let display = surface.display();
        (0..64).filter(|&y| (0..128).any(|x| display.pixel(x, y))).collect()
    }

    #[test]
    fn test_none_clears() {
        let mut surface = surface();
        let frame = DisplayFrame::from_lines(&["Bird we heard:", "Robin"]);
        block_on(surface.render(Some(&frame)));
        assert!(!surface.display().is_blank());

        block_on(surface.render(None));
        assert!(surface.display().is_blank());
    }

    #[test]
    fn test_no_residue_between_frames() {
        let long = DisplayFrame::from_lines(&["Bird we heard:", "Eurasian Blackbird", "(0.92)", "", "Garden"]);
        let short = DisplayFrame::from_lines(&["", "Waiting"]);

        let mut fresh = surface();
        block_on(fresh.render(Some(&short)));

        let mut reused = surface();
        block_on(reused.render(Some(&long)));
        block_on(reused.render(None));
        block_on(reused.render(Some(&short)));

        assert_eq!(snapshot(&reused), snapshot(&fresh));
    }

    #[test]
    fn test_render_is_idempotent() {
        let frame = DisplayFrame::from_lines(&["Bird we heard:", "Robin", "(0.8)"]);
        let mut surface = surface();
        block_on(surface.render(Some(&frame)));
        let first = snapshot(&surface);
        block_on(surface.render(Some(&frame)));
        assert_eq!(snapshot(&surface), first);
    }

    #[test]
    fn test_lines_follow_layout() {
        let mut surface = surface();

        // Header at 0, next line 15 pixels down
        block_on(surface.render(Some(&DisplayFrame::from_lines(&["H", "x"]))));
        let rows = lit_rows(&surface);
        assert!(rows.iter().all(|&y| y < 10 || (15..25).contains(&y)));
        assert!(rows.iter().any(|&y| y >= 15));

        // Empty first line: no header gap, second line starts at 10
        block_on(surface.render(Some(&DisplayFrame::from_lines(&["", "x"]))));
        let rows = lit_rows(&surface);
        assert!(rows.iter().all(|&y| (10..20).contains(&y)));
    }

    #[test]
    fn test_wide_line_clipped_at_panel_edge() {
        let mut surface = surface();
        let frame = DisplayFrame::from_lines(&["Loch Lomond and The Trossachs National Park"]);
        block_on(surface.render(Some(&frame)));

        // 43 glyphs of 6 pixels run past column 127
        let display = surface.display();
        assert!((120..128).any(|x| (0..10).any(|y| display.pixel(x, y))));
        assert_eq!(surface.flush_errors(), 0);
    }

    #[test]
    fn test_bus_error_is_counted_not_raised() {
        let bus = RecordingBus {
            fail: true,
            ..Default::default()
        };
        let mut surface = OledSurface::new(Ssd1306::new(bus, 128, 64).unwrap(), LineLayout::new(10));
        block_on(surface.render(Some(&DisplayFrame::from_lines(&["x"]))));
        block_on(surface.render(None));
        assert_eq!(surface.flush_errors(), 2);
    }

    #[test]
    fn test_flush_reaches_bus() {
        let mut surface = surface();
        block_on(surface.render(Some(&DisplayFrame::from_lines(&["x"]))));
        let bus = surface.display.release();
        let frame = bus.last_frame(8);
        assert!(frame.iter().any(|&b| b != 0));
    }
}
