use std::ops::{Deref, DerefMut};

use embedded_graphics::{
    pixelcolor::{Rgb565, Rgb888},
    prelude::*,
    primitives::{PrimitiveStyleBuilder, Rectangle, StrokeAlignment},
};

use crate::config::ColorScheme;
use crate::font;
use crate::surface::Surface;

pub const TITLE: &str = "Input Test";
pub const FOOTER: &str = "MENU: exit";

const MARGIN: i32 = 4;
const BORDER_WIDTH: u32 = 2;
const BAND_PADDING: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Rgb565,
    pub text: Rgb565,
    pub accent: Rgb565,
    pub border: Rgb565,
}

impl Default for Palette {
    fn default() -> Self {
        Self::from_scheme(&ColorScheme::default())
    }
}

impl Palette {
    pub fn from_scheme(colors: &ColorScheme) -> Self {
        Self {
            background: parse_color(&colors.background, Rgb565::BLUE),
            text: parse_color(&colors.text, Rgb565::WHITE),
            accent: parse_color(&colors.accent, Rgb565::YELLOW),
            border: parse_color(&colors.border, Rgb565::WHITE),
        }
    }
}

fn parse_color(input: &str, fallback: Rgb565) -> Rgb565 {
    let hex = input.trim().trim_start_matches('#');
    if hex.len() == 6 {
        if let Ok(value) = u32::from_str_radix(hex, 16) {
            let r = ((value >> 16) & 0xFF) as u8;
            let g = ((value >> 8) & 0xFF) as u8;
            let b = (value & 0xFF) as u8;
            return Rgb565::from(Rgb888::new(r, g, b));
        }
    }
    tracing::warn!("Invalid color {:?}; using default", input);
    fallback
}

/// The tester's single screen: title, one status line, a hint at the bottom.
#[derive(Debug, Clone, Copy)]
pub struct Screen {
    palette: Palette,
}

impl Screen {
    pub fn new(palette: Palette) -> Self {
        Self { palette }
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    pub fn draw_full<B>(&self, surface: &mut Surface<B>, status: &str)
    where
        B: Deref<Target = [u8]> + DerefMut,
    {
        let (width, height) = (surface.width() as i32, surface.height() as i32);
        surface.fill(self.palette.background);

        let frame = Rectangle::new(
            Point::new(MARGIN, MARGIN),
            Size::new(
                (width - 2 * MARGIN).max(0) as u32,
                (height - 2 * MARGIN).max(0) as u32,
            ),
        );
        let style = PrimitiveStyleBuilder::new()
            .stroke_color(self.palette.border)
            .stroke_width(BORDER_WIDTH)
            .stroke_alignment(StrokeAlignment::Inside)
            .build();
        // drawing into a Surface cannot fail
        let _ = frame.into_styled(style).draw(surface);

        surface.draw_text(centered_x(width, TITLE), height / 4, TITLE, self.palette.accent);
        surface.draw_text(
            centered_x(width, FOOTER),
            height - MARGIN * 2 - font::LINE_HEIGHT * 2,
            FOOTER,
            self.palette.text,
        );
        self.draw_status(surface, status);
    }

    /// Repaints only the status band.
    pub fn draw_status<B>(&self, surface: &mut Surface<B>, status: &str)
    where
        B: Deref<Target = [u8]> + DerefMut,
    {
        let (width, height) = (surface.width() as i32, surface.height() as i32);
        let y = status_y(height);
        let inset = MARGIN + BORDER_WIDTH as i32 * 2;
        surface.fill_rect(
            inset,
            y - BAND_PADDING,
            (width - 2 * inset).max(0) as u32,
            (font::LINE_HEIGHT + 2 * BAND_PADDING) as u32,
            self.palette.background,
        );
        surface.draw_text(centered_x(width, status), y, status, self.palette.text);
    }
}

fn centered_x(width: i32, text: &str) -> i32 {
    (width - font::text_width(text)) / 2
}

fn status_y(height: i32) -> i32 {
    (height - font::LINE_HEIGHT) / 2
}
