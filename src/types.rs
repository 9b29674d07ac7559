//! Common types used throughout framehub

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Image resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    // Common camera resolutions
    pub const VGA: Self = Self::new(640, 480);
    pub const HD_720P: Self = Self::new(1280, 720);
    pub const FHD_1080P: Self = Self::new(1920, 1080);

    /// Calculate total pixels
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::VGA
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel layout of a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit grayscale (typical for tracking cameras)
    #[default]
    Gray8,
    /// 24-bit RGB
    Rgb24,
    /// 24-bit BGR (common decoder output)
    Bgr24,
    /// 32-bit BGRA
    Bgra,
    /// 32-bit RGBA
    Rgba,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Bgra | PixelFormat::Rgba => 4,
        }
    }
}

/// A decoded image buffer
///
/// Once wrapped in a [`Frame`] an image is only reachable through a shared
/// `Arc`, so it cannot be mutated while other threads hold it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Raw pixel data
    pub data: Vec<u8>,
    /// Image width
    pub width: u32,
    /// Image height
    pub height: u32,
    /// Row stride in bytes
    pub stride: u32,
    /// Pixel format
    pub format: PixelFormat,
}

impl Image {
    /// Create a zeroed image
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        let stride = Self::stride_for(width, format)?;
        let len = (stride as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| Error::InvalidImage(format!("{}x{} {:?}", width, height, format)))?;
        Ok(Self {
            data: vec![0u8; len],
            width,
            height,
            stride,
            format,
        })
    }

    /// Packed row stride for `width` pixels of `format`
    pub fn stride_for(width: u32, format: PixelFormat) -> Result<u32> {
        width
            .checked_mul(format.bytes_per_pixel())
            .ok_or_else(|| Error::InvalidImage(format!("row of {} {:?} pixels", width, format)))
    }

    /// Create an image from existing data
    pub fn from_data(
        data: Vec<u8>,
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
    ) -> Self {
        Self {
            data,
            width,
            height,
            stride,
            format,
        }
    }

    /// Get resolution
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Image size in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// One captured image plus its capture timestamp
///
/// Cloning a frame only bumps the image's reference count; pixel data is
/// never copied on fan-out.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<Image>,
    /// Capture timestamp in milliseconds since the producer's epoch
    pub timestamp_ms: i64,
    /// Producer-assigned frame counter
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: Image, timestamp_ms: i64) -> Self {
        Self::from_shared(Arc::new(image), timestamp_ms)
    }

    /// Wrap an image that is already shared
    pub fn from_shared(image: Arc<Image>, timestamp_ms: i64) -> Self {
        Self {
            image,
            timestamp_ms,
            sequence: 0,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Shared handle to the image
    pub fn image_handle(&self) -> &Arc<Image> {
        &self.image
    }

    /// True if both frames point at the same pixel storage
    pub fn shares_image(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }

    pub fn resolution(&self) -> Resolution {
        self.image.resolution()
    }
}

/// Framerate representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Framerate {
    pub num: u32,
    pub den: u32,
}

impl Framerate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub const FPS_15: Self = Self::new(15, 1);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_60: Self = Self::new(60, 1);

    /// Get framerate as f64
    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// Interval between frames; zero for a degenerate rate
    pub fn frame_interval(&self) -> std::time::Duration {
        if self.num == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_micros(1_000_000 * self.den as u64 / self.num as u64)
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self::FPS_30
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.den == 1 {
            write!(f, "{} fps", self.num)
        } else {
            write!(f, "{:.2} fps", self.as_f64())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_allocation() {
        let image = Image::new(4, 3, PixelFormat::Bgr24).unwrap();
        assert_eq!(image.stride, 12);
        assert_eq!(image.size_bytes(), 36);
        assert_eq!(image.resolution(), Resolution::new(4, 3));
    }

    #[test]
    fn test_oversized_row_rejected() {
        let err = Image::new(u32::MAX, 1, PixelFormat::Rgba).unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
        assert!(Image::stride_for(u32::MAX / 4 + 1, PixelFormat::Bgra).is_err());
        assert_eq!(Image::stride_for(1920, PixelFormat::Rgb24).unwrap(), 5760);
    }

    #[test]
    fn test_frame_clone_shares_image() {
        let image = Image::new(8, 8, PixelFormat::Gray8).unwrap();
        let frame = Frame::new(image, 42).with_sequence(7);
        let copy = frame.clone();

        assert!(frame.shares_image(&copy));
        assert_eq!(Arc::strong_count(frame.image_handle()), 2);
        assert_eq!(copy.timestamp_ms, 42);
        assert_eq!(copy.sequence, 7);

        drop(copy);
        assert_eq!(Arc::strong_count(frame.image_handle()), 1);
    }

    #[test]
    fn test_distinct_frames_do_not_share() {
        let a = Frame::new(Image::new(2, 2, PixelFormat::Gray8).unwrap(), 1);
        let b = Frame::new(Image::new(2, 2, PixelFormat::Gray8).unwrap(), 1);
        assert!(!a.shares_image(&b));
    }

    #[test]
    fn test_framerate_interval() {
        assert_eq!(
            Framerate::FPS_30.frame_interval(),
            std::time::Duration::from_micros(33_333)
        );
        assert_eq!(Framerate::new(0, 1).frame_interval(), std::time::Duration::ZERO);
        assert_eq!(Framerate::FPS_60.to_string(), "60 fps");
    }
}
