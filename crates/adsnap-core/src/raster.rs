//! Raster canvas helpers: colors, resampling and alpha flattening.
//!
//! Canvases are `image::RgbaImage` buffers. All functions return new buffers
//! without modifying their input, except the explicit `fill_rect` / `draw_image`
//! painters which write into a target canvas.

use std::fmt;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{Pixel, Rgb, Rgba};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::geometry::{half_dimensions, Rect};

pub use image::{RgbImage, RgbaImage};

/// Error returned when a color string cannot be parsed.
#[derive(Debug, Error, PartialEq)]
#[error("Invalid color: {0:?} (expected #rgb, #rrggbb or #rrggbbaa)")]
pub struct ColorParseError(pub String);

/// An sRGB color with straight alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// The matte used behind captured banners. A saturated green that rarely
    /// appears in creatives, so uncovered areas are easy to spot.
    pub const MATTE: Color = Color::rgb(0x00, 0xc8, 0x53);
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 255 {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ColorParseError(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(err)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }

        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
        let nibble = |i: usize| {
            u8::from_str_radix(&hex[i..i + 1], 16)
                .map(|v| v * 17)
                .map_err(|_| err())
        };

        match hex.len() {
            3 => Ok(Color::rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
            6 => Ok(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Color {
                r: byte(0)?,
                g: byte(2)?,
                b: byte(4)?,
                a: byte(6)?,
            }),
            _ => Err(err()),
        }
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Create a canvas of the given size filled with `color`.
pub fn filled_canvas(width: u32, height: u32, color: Color) -> RgbaImage {
    RgbaImage::from_pixel(width, height, color.to_rgba())
}

/// Downscale a canvas to exactly half its size (rounded, minimum 1px per side)
/// using Lanczos3 resampling.
///
/// This is a fixed step before encoding and does not depend on the byte budget.
pub fn downscale_half(canvas: &RgbaImage) -> RgbaImage {
    let (width, height) = half_dimensions(canvas.width(), canvas.height());
    imageops::resize(canvas, width, height, FilterType::Lanczos3)
}

/// Composite a canvas over an opaque matte and drop the alpha channel.
pub fn flatten(canvas: &RgbaImage, matte: Color) -> RgbImage {
    let base = Rgb([matte.r, matte.g, matte.b]);
    let mut out = RgbImage::from_pixel(canvas.width(), canvas.height(), base);

    for (dst, src) in out.pixels_mut().zip(canvas.pixels()) {
        let a = src[3] as u32;
        if a == 255 {
            *dst = src.to_rgb();
            continue;
        }
        for c in 0..3 {
            let blended = (src[c] as u32 * a + dst[c] as u32 * (255 - a) + 127) / 255;
            dst[c] = blended as u8;
        }
    }
    out
}

/// Blend a solid color over the device-pixel rectangle `rect` of `canvas`.
///
/// The rectangle is clipped to the canvas bounds.
pub fn fill_rect(canvas: &mut RgbaImage, rect: Rect, color: Color) {
    let Some((x0, y0, x1, y1)) = clip(canvas, rect) else {
        return;
    };
    let px = color.to_rgba();
    for y in y0..y1 {
        for x in x0..x1 {
            canvas.get_pixel_mut(x, y).blend(&px);
        }
    }
}

/// Draw `image` stretched into the device-pixel rectangle `rect`, blending
/// over what is already on the canvas.
pub fn draw_image(canvas: &mut RgbaImage, image: &RgbaImage, rect: Rect) {
    let width = rect.width.round() as u32;
    let height = rect.height.round() as u32;
    if width == 0 || height == 0 || image.width() == 0 || image.height() == 0 {
        return;
    }

    if image.width() == width && image.height() == height {
        imageops::overlay(canvas, image, rect.x.round() as i64, rect.y.round() as i64);
    } else {
        let scaled = imageops::resize(image, width, height, FilterType::Triangle);
        imageops::overlay(canvas, &scaled, rect.x.round() as i64, rect.y.round() as i64);
    }
}

fn clip(canvas: &RgbaImage, rect: Rect) -> Option<(u32, u32, u32, u32)> {
    let x0 = rect.x.round().max(0.0) as u32;
    let y0 = rect.y.round().max(0.0) as u32;
    let x1 = ((rect.x + rect.width).round().max(0.0) as u32).min(canvas.width());
    let y1 = ((rect.y + rect.height).round().max(0.0) as u32).min(canvas.height());
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([
                ((x * 255) / width.max(1)) as u8,
                ((y * 255) / height.max(1)) as u8,
                128,
                255,
            ])
        })
    }

    #[test]
    fn test_color_parse() {
        assert_eq!("#00c853".parse::<Color>().unwrap(), Color::MATTE);
        assert_eq!("#fff".parse::<Color>().unwrap(), Color::WHITE);
        assert_eq!(
            "#11223344".parse::<Color>().unwrap(),
            Color {
                r: 0x11,
                g: 0x22,
                b: 0x33,
                a: 0x44
            }
        );
    }

    #[test]
    fn test_color_parse_errors() {
        assert!("00c853".parse::<Color>().is_err());
        assert!("#00c85".parse::<Color>().is_err());
        assert!("#zzzzzz".parse::<Color>().is_err());
    }

    #[test]
    fn test_color_display() {
        assert_eq!(Color::MATTE.to_string(), "#00c853");
        let c = Color {
            r: 1,
            g: 2,
            b: 3,
            a: 4,
        };
        assert_eq!(c.to_string(), "#01020304");
    }

    #[test]
    fn test_color_serde() {
        let json = serde_json::to_string(&Color::MATTE).unwrap();
        assert_eq!(json, "\"#00c853\"");
        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Color::MATTE);
    }

    #[test]
    fn test_downscale_half_even() {
        let half = downscale_half(&gradient(600, 500));
        assert_eq!(half.dimensions(), (300, 250));
    }

    #[test]
    fn test_downscale_half_odd_and_tiny() {
        assert_eq!(downscale_half(&gradient(301, 3)).dimensions(), (151, 2));
        assert_eq!(downscale_half(&gradient(1, 1)).dimensions(), (1, 1));
    }

    #[test]
    fn test_flatten_transparent_uses_matte() {
        let canvas = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 0]));
        let flat = flatten(&canvas, Color::MATTE);
        assert_eq!(flat.get_pixel(0, 0), &Rgb([0x00, 0xc8, 0x53]));
    }

    #[test]
    fn test_flatten_opaque_keeps_color() {
        let canvas = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let flat = flatten(&canvas, Color::MATTE);
        assert_eq!(flat.get_pixel(1, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_fill_rect_clips_to_canvas() {
        let mut canvas = filled_canvas(10, 10, Color::WHITE);
        fill_rect(&mut canvas, Rect::new(5.0, 5.0, 20.0, 20.0), Color::rgb(0, 0, 0));
        assert_eq!(canvas.get_pixel(4, 4), &Rgba([255, 255, 255, 255]));
        assert_eq!(canvas.get_pixel(9, 9), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_fill_rect_outside_is_noop() {
        let mut canvas = filled_canvas(4, 4, Color::WHITE);
        fill_rect(&mut canvas, Rect::new(10.0, 10.0, 5.0, 5.0), Color::rgb(0, 0, 0));
        assert!(canvas.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
    }

    #[test]
    fn test_draw_image_scales_into_rect() {
        let mut canvas = filled_canvas(20, 20, Color::WHITE);
        let red = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        draw_image(&mut canvas, &red, Rect::new(5.0, 5.0, 10.0, 10.0));

        assert_eq!(canvas.get_pixel(10, 10), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(2, 2), &Rgba([255, 255, 255, 255]));
        assert_eq!(canvas.get_pixel(16, 16), &Rgba([255, 255, 255, 255]));
    }
}
