//! Owned RGB frame buffer with JPEG encode/decode.
//!
//! Capture and on-screen display are external collaborators; everything in
//! this crate works on this plain RGB8 container. JPEG is the lossy wire
//! encoding that bounds producer bandwidth (quality configurable, default
//! 70).

use anyhow::{anyhow, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};

pub const DEFAULT_JPEG_QUALITY: u8 = 70;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    /// Tightly packed RGB8, row-major.
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame buffer size mismatch: got {} bytes, expected {} for {}x{}",
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Status frame the relay serves before the first upstream frame
    /// arrives: dark background with a lighter banner band.
    pub fn placeholder(width: u32, height: u32) -> Self {
        let mut frame = Self::filled(width, height, [16, 16, 16]);
        let band_top = height / 12;
        let band_bottom = height / 12 + height / 16;
        for y in band_top..band_bottom.min(height) {
            for x in 0..width {
                frame.set_pixel(x, y, [200, 200, 200]);
            }
        }
        frame
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels[i..i + 3].copy_from_slice(&rgb);
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder.encode(
            &self.pixels,
            self.width,
            self.height,
            ExtendedColorType::Rgb8,
        )?;
        Ok(out)
    }

    pub fn decode_jpeg(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?.to_rgb8();
        let (width, height) = decoded.dimensions();
        Ok(Self {
            width,
            height,
            pixels: decoded.into_raw(),
        })
    }
}
