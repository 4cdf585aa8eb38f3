//! Reader contract: the upstream frame synthesizer.
//!
//! A reader turns a frame number into a composed [`Frame`] and deposits it
//! into its cache store as a side effect. The pre-roll worker only ever
//! talks to this trait; timeline-specific extras (preview dimensions,
//! whole-timeline cache clearing) are optional capabilities a reader can
//! expose instead of being reached through downcasts.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::sync::Arc;

use crate::cache::{CacheStore, FrameCache};
use crate::fraction::Fraction;
use crate::frame::Frame;

/// Stream description every reader exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Fraction,
    pub sample_rate: u32,
    pub channels: u32,
    /// Total number of frames, 1-based inclusive.
    pub video_length: i64,
}

impl ReaderInfo {
    /// Stream duration in seconds.
    pub fn duration(&self) -> f64 {
        self.video_length as f64 / self.fps.to_f64()
    }

    /// Nominal audio samples carried by one frame (rounded).
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as f64 / self.fps.to_f64()).round() as usize
    }
}

/// Reader errors
#[derive(Debug)]
pub enum ReaderError {
    /// Requested frame lies outside the timeline. Routine at the edges;
    /// the pre-roll worker swallows it.
    OutOfBounds { frame: i64, video_length: i64 },
    /// Frame synthesis failed. Aborts the current pre-roll pass.
    Decode(String),
}

impl std::fmt::Display for ReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderError::OutOfBounds {
                frame,
                video_length,
            } => write!(f, "frame {} out of bounds (1..={})", frame, video_length),
            ReaderError::Decode(e) => write!(f, "decode error: {}", e),
        }
    }
}

impl std::error::Error for ReaderError {}

/// The upstream frame synthesizer.
pub trait FrameReader: Send + Sync {
    fn info(&self) -> &ReaderInfo;

    /// Produce (or fetch) the frame. Implementations insert the result
    /// into their cache store before returning it.
    fn get_frame(&self, number: i64) -> Result<Arc<Frame>, ReaderError>;

    /// The cache store this reader deposits into.
    fn cache(&self) -> &dyn CacheStore;

    /// Preview-dimension capability (timeline readers render smaller
    /// preview frames; window sizing uses those dimensions).
    fn as_preview_sized(&self) -> Option<&dyn PreviewSized> {
        None
    }

    /// Whole-timeline cache clearing capability.
    fn as_cache_clearable(&self) -> Option<&dyn CacheClearable> {
        None
    }
}

/// Readers whose output is rendered at preview resolution.
pub trait PreviewSized {
    fn preview_width(&self) -> u32;
    fn preview_height(&self) -> u32;
}

/// Readers that can drop every cache layer they own at once.
pub trait CacheClearable {
    fn clear_all_cache(&self);
}

/// Deterministic reader for examples and tests: solid-color frames with a
/// continuous sine tone on every audio channel.
pub struct SyntheticReader {
    info: ReaderInfo,
    cache: FrameCache,
    tone_hz: f32,
}

impl SyntheticReader {
    pub fn new(info: ReaderInfo, max_cache_bytes: u64) -> Self {
        Self {
            info,
            cache: FrameCache::new(max_cache_bytes),
            tone_hz: 440.0,
        }
    }

    pub fn with_tone(mut self, tone_hz: f32) -> Self {
        self.tone_hz = tone_hz;
        self
    }
}

impl FrameReader for SyntheticReader {
    fn info(&self) -> &ReaderInfo {
        &self.info
    }

    fn get_frame(&self, number: i64) -> Result<Arc<Frame>, ReaderError> {
        if number < 1 || number > self.info.video_length {
            return Err(ReaderError::OutOfBounds {
                frame: number,
                video_length: self.info.video_length,
            });
        }
        if let Some(frame) = self.cache.get(number) {
            return Ok(frame);
        }

        let samples = self.info.samples_per_frame();
        let shade = (number % 256) as u8;
        let mut frame = Frame::with_image_and_audio(
            number,
            self.info.width,
            self.info.height,
            image::Rgba([shade, shade, shade, 255]),
            samples,
            self.info.channels as usize,
        );

        // Phase-continuous tone across frame boundaries.
        let first_sample = (number - 1) * samples as i64;
        let tone: Vec<f32> = (0..samples)
            .map(|i| {
                let t = (first_sample + i as i64) as f32 / self.info.sample_rate as f32;
                (TAU * self.tone_hz * t).sin() * 0.5
            })
            .collect();
        for channel in 0..self.info.channels as usize {
            frame
                .add_audio(channel, 0, &tone, 1.0)
                .map_err(|e| ReaderError::Decode(e.to_string()))?;
        }

        let frame = Arc::new(frame);
        self.cache.insert(Arc::clone(&frame));
        Ok(frame)
    }

    fn cache(&self) -> &dyn CacheStore {
        &self.cache
    }

    fn as_cache_clearable(&self) -> Option<&dyn CacheClearable> {
        Some(self)
    }
}

impl CacheClearable for SyntheticReader {
    fn clear_all_cache(&self) {
        self.cache.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ReaderInfo {
        ReaderInfo {
            width: 64,
            height: 36,
            fps: Fraction::new(30, 1),
            sample_rate: 48000,
            channels: 2,
            video_length: 30,
        }
    }

    #[test]
    fn test_info_helpers() {
        let info = info();
        assert!((info.duration() - 1.0).abs() < 1e-9);
        assert_eq!(info.samples_per_frame(), 1600);
    }

    #[test]
    fn test_synthetic_reader_deposits_into_cache() {
        let reader = SyntheticReader::new(info(), 0);
        assert!(!reader.cache().contains(5));

        let frame = reader.get_frame(5).unwrap();
        assert_eq!(frame.number, 5);
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.audio().samples(), 1600);
        assert!(reader.cache().contains(5));
    }

    #[test]
    fn test_synthetic_reader_out_of_bounds() {
        let reader = SyntheticReader::new(info(), 0);
        assert!(matches!(
            reader.get_frame(0),
            Err(ReaderError::OutOfBounds { frame: 0, .. })
        ));
        assert!(matches!(
            reader.get_frame(31),
            Err(ReaderError::OutOfBounds { frame: 31, .. })
        ));
    }

    #[test]
    fn test_synthetic_tone_is_phase_continuous() {
        let reader = SyntheticReader::new(info(), 0).with_tone(100.0);
        let f1 = reader.get_frame(1).unwrap();
        let f2 = reader.get_frame(2).unwrap();

        // Last sample of frame 1 and first of frame 2 are adjacent points
        // on the same sine; at 100 Hz / 48 kHz they are close in value.
        let a = f1.audio().channel(0).unwrap()[1599];
        let b = f2.audio().channel(0).unwrap()[0];
        assert!((a - b).abs() < 0.02);
    }

    #[test]
    fn test_capability_defaults() {
        struct Bare {
            info: ReaderInfo,
            cache: FrameCache,
        }
        impl FrameReader for Bare {
            fn info(&self) -> &ReaderInfo {
                &self.info
            }
            fn get_frame(&self, _n: i64) -> Result<Arc<Frame>, ReaderError> {
                Err(ReaderError::Decode("bare".into()))
            }
            fn cache(&self) -> &dyn CacheStore {
                &self.cache
            }
        }

        let bare = Bare {
            info: info(),
            cache: FrameCache::new(0),
        };
        assert!(bare.as_preview_sized().is_none());
        assert!(bare.as_cache_clearable().is_none());

        let timeline = SyntheticReader::new(info(), 0);
        assert!(timeline.as_cache_clearable().is_some());
    }
}
