//! Clipped pixel writes and 2x text over a linear pixel buffer.
//!
//! A [`Surface`] does not care where its bytes live: on the device it wraps the mapped
//! framebuffer, in tests a plain `Vec<u8>`. Every store goes through the same clipping, so
//! nothing outside `[0, width) x [0, height)` is ever touched, including the padding at the
//! end of each row when the stride is wider than the visible line.

use std::convert::Infallible;
use std::ops::{Deref, DerefMut};

use embedded_graphics::{
    pixelcolor::{Rgb565, Rgb888},
    prelude::*,
    primitives::Rectangle,
    Pixel,
};

use crate::error::DisplayError;
use crate::font;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb565,
    Xrgb8888,
}

impl PixelFormat {
    pub fn from_bits_per_pixel(bits: u32) -> Option<Self> {
        match bits {
            16 => Some(Self::Rgb565),
            32 => Some(Self::Xrgb8888),
            _ => None,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb565 => 2,
            Self::Xrgb8888 => 4,
        }
    }

    /// Native-endian bytes of `color` in this format, padded to 4 bytes.
    fn encode(self, color: Rgb565) -> [u8; 4] {
        match self {
            Self::Rgb565 => {
                let [a, b] = color.into_storage().to_ne_bytes();
                [a, b, 0, 0]
            }
            Self::Xrgb8888 => {
                let wide = Rgb888::from(color);
                let raw = (u32::from(wide.r()) << 16)
                    | (u32::from(wide.g()) << 8)
                    | u32::from(wide.b());
                raw.to_ne_bytes()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    /// Bytes from the start of one row to the start of the next
    pub stride: usize,
    pub format: PixelFormat,
}

impl Geometry {
    /// Rows laid out back to back with no padding.
    pub fn packed(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            stride: width as usize * format.bytes_per_pixel(),
            format,
        }
    }

    /// Bytes needed to hold every visible pixel.
    pub fn visible_len(&self) -> usize {
        if self.width == 0 || self.height == 0 {
            return 0;
        }
        (self.height as usize - 1) * self.stride
            + self.width as usize * self.format.bytes_per_pixel()
    }
}

pub struct Surface<B> {
    geometry: Geometry,
    buf: B,
}

impl<B> Surface<B>
where
    B: Deref<Target = [u8]> + DerefMut,
{
    pub fn new(geometry: Geometry, buf: B) -> Result<Self, DisplayError> {
        let needed = geometry.visible_len();
        let row_bytes = geometry.width as usize * geometry.format.bytes_per_pixel();
        if buf.len() < needed || geometry.stride < row_bytes {
            return Err(DisplayError::TooSmall {
                len: buf.len(),
                needed,
            });
        }
        Ok(Self { geometry, buf })
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Raw stored value at `(x, y)`, or `None` when outside the visible area.
    pub fn raw_pixel(&self, x: i32, y: i32) -> Option<u32> {
        let offset = self.offset(x, y)?;
        let bpp = self.geometry.format.bytes_per_pixel();
        let bytes = &self.buf[offset..offset + bpp];
        Some(match self.geometry.format {
            PixelFormat::Rgb565 => u32::from(u16::from_ne_bytes([bytes[0], bytes[1]])),
            PixelFormat::Xrgb8888 => u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        })
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: Rgb565) {
        self.fill_rect(x, y, 1, 1, color);
    }

    pub fn fill(&mut self, color: Rgb565) {
        self.fill_rect(0, 0, self.geometry.width, self.geometry.height, color);
    }

    /// Fills the part of the rectangle that lies on screen. Anything else is dropped.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb565) {
        let x0 = i64::from(x).max(0);
        let y0 = i64::from(y).max(0);
        let x1 = (i64::from(x) + i64::from(w)).min(i64::from(self.geometry.width));
        let y1 = (i64::from(y) + i64::from(h)).min(i64::from(self.geometry.height));
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let bpp = self.geometry.format.bytes_per_pixel();
        let encoded = self.geometry.format.encode(color);
        let pixel = &encoded[..bpp];
        let stride = self.geometry.stride;
        for row in y0 as usize..y1 as usize {
            let start = row * stride + x0 as usize * bpp;
            let end = row * stride + x1 as usize * bpp;
            for dst in self.buf[start..end].chunks_exact_mut(bpp) {
                dst.copy_from_slice(pixel);
            }
        }
    }

    /// Draws one character with its top-left corner at `(x, y)`, each font pixel as a 2x2
    /// block. Codes outside 7-bit ASCII draw nothing.
    pub fn draw_glyph(&mut self, x: i32, y: i32, code: u32, color: Rgb565) {
        let Some(rows) = font::glyph(code) else {
            return;
        };
        let block = font::SCALE as u32;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..font::GLYPH_SIZE {
                if bits & (1 << col) != 0 {
                    self.fill_rect(
                        x.saturating_add(col * font::SCALE),
                        y.saturating_add(row as i32 * font::SCALE),
                        block,
                        block,
                        color,
                    );
                }
            }
        }
    }

    /// Draws `text` left to right and returns the x just past the last character.
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, color: Rgb565) -> i32 {
        let mut cursor = x;
        for ch in text.chars() {
            self.draw_glyph(cursor, y, u32::from(ch), color);
            cursor = cursor.saturating_add(font::ADVANCE);
        }
        cursor
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        let x = u32::try_from(x).ok().filter(|x| *x < self.geometry.width)?;
        let y = u32::try_from(y).ok().filter(|y| *y < self.geometry.height)?;
        let bpp = self.geometry.format.bytes_per_pixel();
        Some(y as usize * self.geometry.stride + x as usize * bpp)
    }
}

impl<B> OriginDimensions for Surface<B> {
    fn size(&self) -> Size {
        Size::new(self.geometry.width, self.geometry.height)
    }
}

impl<B> DrawTarget for Surface<B>
where
    B: Deref<Target = [u8]> + DerefMut,
{
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point.x, point.y, color);
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        self.fill_rect(
            area.top_left.x,
            area.top_left.y,
            area.size.width,
            area.size.height,
            color,
        );
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(color);
        Ok(())
    }
}
