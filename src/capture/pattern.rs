//! Synthetic test-pattern source
//!
//! Produces a diagonal gradient that shifts by one pixel per frame, paced to
//! the configured framerate. Useful for exercising the pipeline without a
//! camera attached.

use super::FrameSource;
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::types::{Frame, Framerate, Image, PixelFormat, Resolution};

use std::time::Instant;

/// Test-pattern frame generator
pub struct TestPatternSource {
    resolution: Resolution,
    framerate: Framerate,
    format: PixelFormat,
    frame_limit: Option<u64>,
    sequence: u64,
    epoch: Instant,
    next_deadline: Option<Instant>,
}

impl TestPatternSource {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            resolution: config.resolution,
            framerate: config.framerate,
            format: config.format,
            frame_limit: config.frame_limit,
            sequence: 0,
            epoch: Instant::now(),
            next_deadline: None,
        }
    }

    /// Frames generated so far
    pub fn frames_generated(&self) -> u64 {
        self.sequence
    }

    fn render(&self) -> Result<Image> {
        let stride = Image::stride_for(self.resolution.width, self.format)?;
        let bpp = self.format.bytes_per_pixel() as usize;
        let row_len = stride as usize;
        let shift = self.sequence as usize;

        let mut image = Image::new(self.resolution.width, self.resolution.height, self.format)?;
        if row_len == 0 {
            return Ok(image);
        }
        for (y, row) in image.data.chunks_exact_mut(row_len).enumerate() {
            for (x, pixel) in row.chunks_exact_mut(bpp).enumerate() {
                let value = ((x + y + shift) & 0xff) as u8;
                pixel.fill(value);
            }
        }
        Ok(image)
    }

    fn pace(&mut self) {
        let interval = self.framerate.frame_interval();
        if interval.is_zero() {
            return;
        }

        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }

        // Don't try to catch up after a stall; resync to the current time
        let base = deadline.max(now);
        self.next_deadline = Some(base + interval);
    }
}

impl FrameSource for TestPatternSource {
    fn next_frame(&mut self) -> Result<Frame> {
        if !self.is_active() {
            return Err(Error::CaptureEnded);
        }

        self.pace();

        let timestamp_ms = self.epoch.elapsed().as_millis() as i64;
        let frame = Frame::new(self.render()?, timestamp_ms).with_sequence(self.sequence);
        self.sequence += 1;
        Ok(frame)
    }

    fn is_active(&self) -> bool {
        self.frame_limit
            .map(|limit| self.sequence < limit)
            .unwrap_or(true)
    }

    fn resolution(&self) -> Option<Resolution> {
        Some(self.resolution)
    }

    fn framerate(&self) -> Option<Framerate> {
        Some(self.framerate)
    }
}

impl std::fmt::Debug for TestPatternSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestPatternSource")
            .field("resolution", &self.resolution)
            .field("framerate", &self.framerate)
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(limit: u64) -> SourceConfig {
        SourceConfig::default()
            .with_resolution(8, 4)
            .with_fps(200)
            .with_frame_limit(limit)
    }

    #[test]
    fn test_frame_limit() {
        let mut source = TestPatternSource::new(&config(3));
        for _ in 0..3 {
            assert!(source.next_frame().is_ok());
        }
        assert!(!source.is_active());
        assert!(matches!(source.next_frame(), Err(Error::CaptureEnded)));
        assert_eq!(source.frames_generated(), 3);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let mut source = TestPatternSource::new(&config(10));
        let mut last = i64::MIN;
        let mut sequences = Vec::new();
        while let Ok(frame) = source.next_frame() {
            assert!(frame.timestamp_ms >= last);
            last = frame.timestamp_ms;
            sequences.push(frame.sequence);
        }
        assert_eq!(sequences, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_pattern_shifts_each_frame() {
        let mut source = TestPatternSource::new(&config(2));
        let first = source.next_frame().unwrap();
        let second = source.next_frame().unwrap();

        assert_eq!(first.resolution(), Resolution::new(8, 4));
        assert_eq!(first.image().data[0], 0);
        assert_eq!(second.image().data[0], 1);
        assert_eq!(first.image().size_bytes(), 32);
    }

    #[test]
    fn test_multi_byte_format() {
        let mut source = TestPatternSource::new(&SourceConfig {
            format: PixelFormat::Bgr24,
            ..config(1)
        });
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.image().stride, 24);
        assert_eq!(&frame.image().data[3..6], &[1, 1, 1]);
    }

    #[test]
    fn test_oversized_resolution_is_fatal() {
        let mut source = TestPatternSource::new(&SourceConfig {
            format: PixelFormat::Rgba,
            ..config(1).with_resolution(u32::MAX, 1)
        });
        let err = source.next_frame().unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
        assert!(!err.is_recoverable());
        assert_eq!(source.frames_generated(), 0);
    }

    #[test]
    fn test_paced_to_framerate() {
        let mut source = TestPatternSource::new(&config(5));
        let start = Instant::now();
        while source.next_frame().is_ok() {}
        // First frame is immediate, four intervals follow
        assert!(start.elapsed() >= Framerate::new(200, 1).frame_interval() * 4);
    }
}
