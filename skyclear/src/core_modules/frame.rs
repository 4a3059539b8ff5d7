// THEORY:
// `PixelBuffer` is the decoded frame handed to the engine by its I/O collaborators.
// It replaces manual byte-offset arithmetic with a validated view:
//
// 1.  **Validated at construction**: a buffer is `width * height * 3` samples, checked
//     once when it is built. After that every access is indexed by (x, y) or
//     (x, y, channel) and goes through slice bounds checks.
// 2.  **Stride-aware import**: raw interleaved bytes with a row stride wider than the
//     pixel data (as produced by many decoders) are imported through `RowLayout`,
//     which is also validated up front.
// 3.  **Interop**: conversion to and from `image::ImageBuffer<Rgb<u16>>` keeps the
//     encoder/decoder side of the tool a one-liner.

use image::{ImageBuffer, Rgb};

use crate::core_modules::pixel::pixel::{Channel, Pixel};
use crate::error::{Result, SkyclearError};

const CHANNELS: usize = 3;
const BYTES_PER_CHANNEL: usize = 2;

/// Describes how pixels are laid out in a raw little-endian 16-bit byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLayout {
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
    bytes_per_row: usize,
}

impl RowLayout {
    pub fn new(width: u32, height: u32, bytes_per_pixel: usize, bytes_per_row: usize) -> Result<Self> {
        if bytes_per_pixel < CHANNELS * BYTES_PER_CHANNEL {
            return Err(SkyclearError::Malformed(format!(
                "bytes per pixel {bytes_per_pixel} cannot hold three 16-bit channels"
            )));
        }
        if bytes_per_row < width as usize * bytes_per_pixel {
            return Err(SkyclearError::Malformed(format!(
                "row stride {bytes_per_row} is shorter than {width} pixels of {bytes_per_pixel} bytes"
            )));
        }
        Ok(Self { width, height, bytes_per_pixel, bytes_per_row })
    }

    /// Tightly packed RGB16 rows.
    pub fn packed(width: u32, height: u32) -> Self {
        let bytes_per_pixel = CHANNELS * BYTES_PER_CHANNEL;
        Self { width, height, bytes_per_pixel, bytes_per_row: width as usize * bytes_per_pixel }
    }

    pub fn required_len(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        (self.height as usize - 1) * self.bytes_per_row + self.width as usize * self.bytes_per_pixel
    }

    fn offset(&self, x: u32, y: u32, channel: usize) -> usize {
        y as usize * self.bytes_per_row + x as usize * self.bytes_per_pixel + channel * BYTES_PER_CHANNEL
    }
}

/// A decoded frame: interleaved RGB, 16 bits per channel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<Channel>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<Channel>) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(SkyclearError::Malformed(format!(
                "{width}x{height} frame needs {expected} samples, got {}",
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    pub fn filled(width: u32, height: u32, pixel: Pixel) -> Self {
        let data = pixel
            .channels()
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * CHANNELS)
            .collect();
        Self { width, height, data }
    }

    /// Imports little-endian 16-bit samples laid out as described by `layout`.
    pub fn from_le_bytes(layout: RowLayout, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < layout.required_len() {
            return Err(SkyclearError::Malformed(format!(
                "raw frame has {} bytes, layout needs {}",
                bytes.len(),
                layout.required_len()
            )));
        }
        let mut data = Vec::with_capacity(layout.width as usize * layout.height as usize * CHANNELS);
        for y in 0..layout.height {
            for x in 0..layout.width {
                for channel in 0..CHANNELS {
                    let offset = layout.offset(x, y, channel);
                    data.push(u16::from_le_bytes([bytes[offset], bytes[offset + 1]]));
                }
            }
        }
        Ok(Self { width: layout.width, height: layout.height, data })
    }

    pub fn from_rgb16(image: ImageBuffer<Rgb<u16>, Vec<u16>>) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height, data: image.into_raw() }
    }

    pub fn into_rgb16(self) -> ImageBuffer<Rgb<u16>, Vec<u16>> {
        // The length invariant is checked on construction, so from_raw cannot fail here.
        let (width, height) = (self.width, self.height);
        ImageBuffer::from_raw(width, height, self.data)
            .unwrap_or_else(|| ImageBuffer::new(width, height))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height, "({x}, {y}) outside {}x{}", self.width, self.height);
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixel(x, y))
    }

    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        let i = self.index(x, y);
        Pixel::new(self.data[i], self.data[i + 1], self.data[i + 2])
    }

    pub fn channel(&self, x: u32, y: u32, channel: usize) -> Channel {
        assert!(channel < CHANNELS, "channel {channel} out of range");
        self.data[self.index(x, y) + channel]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Pixel) {
        let i = self.index(x, y);
        self.data[i..i + CHANNELS].copy_from_slice(&pixel.channels());
    }

    /// The interleaved samples of row `y`.
    pub fn row(&self, y: u32) -> &[Channel] {
        let start = self.index(0, y);
        &self.data[start..start + self.width as usize * CHANNELS]
    }

    pub fn as_raw(&self) -> &[Channel] {
        &self.data
    }

    /// Fails with `DimensionMismatch` unless `other` has the same size as `self`.
    pub fn ensure_same_dimensions(&self, other: &PixelBuffer, frame: usize) -> Result<()> {
        if self.dimensions() != other.dimensions() {
            return Err(SkyclearError::DimensionMismatch {
                frame,
                expected: self.dimensions(),
                found: other.dimensions(),
            });
        }
        Ok(())
    }
}
