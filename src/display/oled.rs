//! SSD1306 128×32 OLED panel over I²C.
//!
//! Rows of text are rasterised with `embedded-graphics` into an in-memory
//! frame buffer laid out the way the controller stores it: one byte per
//! column per 8-pixel page. A text row of the 5×8 font is exactly one
//! page, so `flush()` only pushes the pages drawn since the last flush.

use core::convert::Infallible;

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_5X8;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Pixel, Point, Size};
use embedded_graphics::text::{Baseline, Text};
use embedded_graphics::Drawable;
use log::info;

use super::ROWS;
use crate::app::ports::DisplayPort;
use crate::drivers::hw_init;
use crate::error::DisplayError;

pub const WIDTH: usize = 128;
pub const HEIGHT: usize = 32;
const PAGES: usize = HEIGHT / 8;

/// Control byte prefixes.
const CTRL_CMD: u8 = 0x00;
const CTRL_DATA: u8 = 0x40;

/// Power-up sequence for a 128×32 panel with the charge pump enabled.
const INIT_SEQUENCE: &[u8] = &[
    0xAE, // display off
    0xD5, 0x80, // clock divide
    0xA8, 0x1F, // multiplex 32
    0xD3, 0x00, // no offset
    0x40, // start line 0
    0x8D, 0x14, // charge pump on
    0x20, 0x00, // horizontal addressing
    0xA1, // segment remap
    0xC8, // COM scan descending
    0xDA, 0x02, // COM pins for 32 rows
    0x81, 0x8F, // contrast
    0xD9, 0xF1, // pre-charge
    0xDB, 0x40, // VCOMH
    0xA4, // follow RAM
    0xA6, // normal polarity
    0xAF, // display on
];

/// Page-ordered monochrome frame buffer.
pub struct FrameBuffer {
    buf: [u8; WIDTH * PAGES],
    dirty: u8,
}

impl FrameBuffer {
    pub const fn new() -> Self {
        Self {
            buf: [0; WIDTH * PAGES],
            dirty: 0,
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < WIDTH && y < HEIGHT && self.buf[(y / 8) * WIDTH + x] & (1 << (y % 8)) != 0
    }

    fn set(&mut self, x: usize, y: usize, on: bool) {
        let idx = (y / 8) * WIDTH + x;
        let bit = 1 << (y % 8);
        if on {
            self.buf[idx] |= bit;
        } else {
            self.buf[idx] &= !bit;
        }
        self.dirty |= 1 << (y / 8);
    }

    fn clear_page(&mut self, page: usize) {
        self.buf[page * WIDTH..(page + 1) * WIDTH].fill(0);
        self.dirty |= 1 << page;
    }

    fn page(&self, page: usize) -> &[u8] {
        &self.buf[page * WIDTH..(page + 1) * WIDTH]
    }

    pub fn dirty_pages(&self) -> u8 {
        self.dirty
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            let (x, y) = (point.x as usize, point.y as usize);
            if x < WIDTH && y < HEIGHT {
                self.set(x, y, color.is_on());
            }
        }
        Ok(())
    }
}

/// The panel itself.
pub struct Oled {
    addr: u8,
    fb: FrameBuffer,
    ready: bool,
}

impl Oled {
    pub fn new(addr: u8) -> Self {
        Self {
            addr,
            fb: FrameBuffer::new(),
            ready: false,
        }
    }

    pub fn init(&mut self) -> Result<(), DisplayError> {
        let mut cmd = [0u8; 1 + INIT_SEQUENCE.len()];
        cmd[0] = CTRL_CMD;
        cmd[1..].copy_from_slice(INIT_SEQUENCE);
        hw_init::i2c_write(self.addr, &cmd).map_err(|_| DisplayError::BusWriteFailed)?;
        self.ready = true;
        self.fb.dirty = (1 << PAGES) - 1;
        info!("OLED @0x{:02X}: {}x{} ready", self.addr, WIDTH, HEIGHT);
        Ok(())
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.fb
    }

    fn push_page(&self, page: usize) -> Result<(), DisplayError> {
        let window = [CTRL_CMD, 0x21, 0x00, (WIDTH - 1) as u8, 0x22, page as u8, page as u8];
        hw_init::i2c_write(self.addr, &window).map_err(|_| DisplayError::BusWriteFailed)?;
        let mut data = [0u8; 1 + WIDTH];
        data[0] = CTRL_DATA;
        data[1..].copy_from_slice(self.fb.page(page));
        hw_init::i2c_write(self.addr, &data).map_err(|_| DisplayError::BusWriteFailed)
    }
}

impl DisplayPort for Oled {
    fn draw_row(&mut self, row: usize, text: &str) -> Result<(), DisplayError> {
        if row >= ROWS {
            return Ok(());
        }
        self.fb.clear_page(row);
        let style = MonoTextStyle::new(&FONT_5X8, BinaryColor::On);
        let origin = Point::new(0, (row * 8) as i32);
        let _ = Text::with_baseline(text, origin, style, Baseline::Top).draw(&mut self.fb);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        if !self.ready {
            return Err(DisplayError::NotInitialised);
        }
        for page in 0..PAGES {
            if self.fb.dirty & (1 << page) != 0 {
                self.push_page(page)?;
                self.fb.dirty &= !(1 << page);
            }
        }
        Ok(())
    }
}
