//! SSD1306 OLED Display Driver
//!
//! Driver for SSD1306-based OLED modules via I2C, up to 128x64 pixels.
//! Drawing happens in a local frame buffer organized as 8-pixel pages; the
//! panel only changes on [`Ssd1306::flush`].

use core::convert::Infallible;

use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::Pixel;
use embedded_hal_async::i2c::I2c;

/// SSD1306 I2C address (0x3D with the address pin pulled high)
pub const SSD1306_ADDR: u8 = 0x3C;

/// Largest supported panel
pub const MAX_WIDTH: usize = 128;
pub const MAX_HEIGHT: usize = 64;
const MAX_PAGES: usize = MAX_HEIGHT / 8;

/// Control byte for a command stream
const CONTROL_COMMAND: u8 = 0x00;

/// Control byte for a data stream
const CONTROL_DATA: u8 = 0x40;

/// SSD1306 commands
mod cmd {
    pub const SET_CONTRAST: u8 = 0x81;
    pub const SET_ENTIRE_ON: u8 = 0xA4;
    pub const SET_NORM_INV: u8 = 0xA6;
    pub const SET_DISP: u8 = 0xAE;
    pub const SET_MEM_ADDR: u8 = 0x20;
    pub const SET_COL_ADDR: u8 = 0x21;
    pub const SET_PAGE_ADDR: u8 = 0x22;
    pub const SET_DISP_START_LINE: u8 = 0x40;
    pub const SET_SEG_REMAP: u8 = 0xA0;
    pub const SET_MUX_RATIO: u8 = 0xA8;
    pub const SET_COM_OUT_DIR: u8 = 0xC0;
    pub const SET_DISP_OFFSET: u8 = 0xD3;
    pub const SET_COM_PIN_CFG: u8 = 0xDA;
    pub const SET_DISP_CLK_DIV: u8 = 0xD5;
    pub const SET_PRECHARGE: u8 = 0xD9;
    pub const SET_VCOM_DESEL: u8 = 0xDB;
    pub const SET_CHARGE_PUMP: u8 = 0x8D;
}

/// Panel size the driver cannot handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GeometryError {
    pub width: u16,
    pub height: u16,
}

/// SSD1306 OLED driver
pub struct Ssd1306<I2C> {
    i2c: I2C,
    width: usize,
    height: usize,
    /// Frame buffer (1 bit per pixel, organized as pages)
    buffer: [[u8; MAX_WIDTH]; MAX_PAGES],
}

impl<I2C> Ssd1306<I2C> {
    /// Create a driver for a `width` x `height` panel
    ///
    /// Height must be a multiple of 8.
    pub fn new(i2c: I2C, width: u16, height: u16) -> Result<Self, GeometryError> {
        let (w, h) = (usize::from(width), usize::from(height));
        if w == 0 || w > MAX_WIDTH || h == 0 || h > MAX_HEIGHT || h % 8 != 0 {
            return Err(GeometryError { width, height });
        }

        Ok(Self {
            i2c,
            width: w,
            height: h,
            buffer: [[0; MAX_WIDTH]; MAX_PAGES],
        })
    }

    fn pages(&self) -> usize {
        self.height / 8
    }

    /// Clear the frame buffer
    pub fn clear_buffer(&mut self) {
        for page in self.buffer.iter_mut() {
            page.fill(0);
        }
    }

    /// Set a single pixel; out-of-range coordinates are ignored
    pub fn set_pixel(&mut self, x: i32, y: i32, on: bool) {
        let (Ok(x), Ok(y)) = (usize::try_from(x), usize::try_from(y)) else {
            return;
        };
        if x >= self.width || y >= self.height {
            return;
        }

        let bit = 1 << (y % 8);
        let byte = &mut self.buffer[y / 8][x];
        if on {
            *byte |= bit;
        } else {
            *byte &= !bit;
        }
    }

    /// Read a pixel back from the frame buffer
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.buffer[y / 8][x] & (1 << (y % 8)) != 0
    }

    /// Check whether every pixel is off
    pub fn is_blank(&self) -> bool {
        self.buffer.iter().all(|page| page.iter().all(|&b| b == 0))
    }

    /// Release the bus
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> Ssd1306<I2C> {
    /// Initialize the display
    ///
    /// Leaves the panel on and blank.
    pub async fn init(&mut self) -> Result<(), I2C::Error> {
        let mux = (self.height - 1) as u8;
        let com_pins = if self.width > 2 * self.height { 0x02 } else { 0x12 };

        let init_cmds: &[u8] = &[
            cmd::SET_DISP, // Off
            cmd::SET_MEM_ADDR,
            0x00, // Horizontal addressing
            cmd::SET_DISP_START_LINE,
            cmd::SET_SEG_REMAP | 0x01, // Column 127 mapped to SEG0
            cmd::SET_MUX_RATIO,
            mux,
            cmd::SET_COM_OUT_DIR | 0x08, // Scan from COM[N] to COM0
            cmd::SET_DISP_OFFSET,
            0x00,
            cmd::SET_COM_PIN_CFG,
            com_pins,
            cmd::SET_DISP_CLK_DIV,
            0x80,
            cmd::SET_PRECHARGE,
            0xF1, // Internal VCC
            cmd::SET_VCOM_DESEL,
            0x30, // 0.83 * Vcc
            cmd::SET_CONTRAST,
            0xFF,
            cmd::SET_ENTIRE_ON, // Output follows RAM
            cmd::SET_NORM_INV,  // Not inverted
            cmd::SET_CHARGE_PUMP,
            0x14,
            cmd::SET_DISP | 0x01, // On
        ];

        for &c in init_cmds {
            self.command(c).await?;
        }

        self.clear_buffer();
        self.flush().await
    }

    /// Send a command to the display
    async fn command(&mut self, cmd: u8) -> Result<(), I2C::Error> {
        self.i2c.write(SSD1306_ADDR, &[CONTROL_COMMAND, cmd]).await
    }

    /// Flush the frame buffer to the display
    pub async fn flush(&mut self) -> Result<(), I2C::Error> {
        let last_column = (self.width - 1) as u8;
        let last_page = (self.pages() - 1) as u8;

        self.command(cmd::SET_COL_ADDR).await?;
        self.command(0).await?;
        self.command(last_column).await?;
        self.command(cmd::SET_PAGE_ADDR).await?;
        self.command(0).await?;
        self.command(last_page).await?;

        // Horizontal addressing wraps to the next page on its own
        let mut data = [0u8; MAX_WIDTH + 1];
        data[0] = CONTROL_DATA;
        for page in 0..self.pages() {
            data[1..=self.width].copy_from_slice(&self.buffer[page][..self.width]);
            self.i2c.write(SSD1306_ADDR, &data[..=self.width]).await?;
        }

        Ok(())
    }
}

impl<I2C> OriginDimensions for Ssd1306<I2C> {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

impl<I2C> DrawTarget for Ssd1306<I2C> {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point.x, point.y, color.is_on());
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let fill = if color.is_on() { 0xFF } else { 0x00 };
        for page in self.buffer.iter_mut() {
            page.fill(fill);
        }
        Ok(())
    }
}
