//! Frame value type: one image plane plus one multi-channel audio buffer.
//!
//! **Why**: the cache stores fully-composed frames. Keeping image and audio
//! together means a cache hit is everything the display loop needs for one
//! tick of playback.
//!
//! **Used by**: readers (frame synthesis), cache store (residency + byte
//! accounting), pre-roll worker (diagnostic `last_cached_frame`).
//!
//! # Ownership
//!
//! Both buffers are owned exclusively and always allocated. `Clone` is a
//! deep copy: mutating a clone never touches the source. Frames crossing
//! threads are wrapped in `Arc<Frame>` by the cache layer.

use image::{imageops, Rgba, RgbaImage};
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Default image dimensions for constructors that take no image data.
pub const DEFAULT_WIDTH: u32 = 300;
pub const DEFAULT_HEIGHT: u32 = 200;

/// Default audio shape: 2 channels x 1600 samples (one 30 fps frame at an
/// assumed 48 kHz).
pub const DEFAULT_AUDIO_CHANNELS: usize = 2;
pub const DEFAULT_AUDIO_SAMPLES: usize = 1600;

const BLANK_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const AUDIO_ONLY_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Channel order of raw pixel data handed to [`Frame::from_pixels`] /
/// [`Frame::add_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Rgba,
    Rgb,
    Bgra,
    Bgr,
}

impl ChannelLayout {
    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Rgba | ChannelLayout::Bgra => 4,
            ChannelLayout::Rgb | ChannelLayout::Bgr => 3,
        }
    }

    /// Indices of (r, g, b) within one pixel, plus alpha when present.
    fn swizzle(self) -> (usize, usize, usize, Option<usize>) {
        match self {
            ChannelLayout::Rgba => (0, 1, 2, Some(3)),
            ChannelLayout::Rgb => (0, 1, 2, None),
            ChannelLayout::Bgra => (2, 1, 0, Some(3)),
            ChannelLayout::Bgr => (2, 1, 0, None),
        }
    }
}

/// Storage type of raw pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelDepth {
    /// One byte per channel, 0..=255.
    U8,
    /// Native-endian f32 per channel, 0.0..=1.0 (clamped on conversion).
    F32,
}

impl PixelDepth {
    pub fn bytes_per_channel(self) -> usize {
        match self {
            PixelDepth::U8 => 1,
            PixelDepth::F32 => 4,
        }
    }
}

/// Frame errors
#[derive(Debug)]
pub enum FrameError {
    /// `add_audio` target channel or sample window is out of bounds.
    AudioOutOfRange {
        channel: usize,
        start: usize,
        samples: usize,
    },
    /// Raw pixel buffer is smaller than `width * height` requires.
    PixelDataTooShort { expected: usize, actual: usize },
    Image(String),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::AudioOutOfRange {
                channel,
                start,
                samples,
            } => write!(
                f,
                "audio range out of bounds: channel {}, samples {}..{}",
                channel,
                start,
                start + samples
            ),
            FrameError::PixelDataTooShort { expected, actual } => {
                write!(f, "pixel data too short: need {} bytes, got {}", expected, actual)
            }
            FrameError::Image(e) => write!(f, "image error: {}", e),
        }
    }
}

impl std::error::Error for FrameError {}

/// Multi-channel floating-point sample buffer, channel-major.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: usize,
    samples: usize,
    data: Vec<f32>,
}

impl AudioBuffer {
    /// Silence-initialized buffer of `channels x samples`.
    pub fn new(channels: usize, samples: usize) -> Self {
        Self {
            channels,
            samples,
            data: vec![0.0; channels * samples],
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Zero every sample.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    pub fn channel(&self, channel: usize) -> Option<&[f32]> {
        if channel >= self.channels {
            return None;
        }
        Some(&self.data[channel * self.samples..(channel + 1) * self.samples])
    }

    fn channel_mut(&mut self, channel: usize) -> Option<&mut [f32]> {
        if channel >= self.channels {
            return None;
        }
        Some(&mut self.data[channel * self.samples..(channel + 1) * self.samples])
    }

    /// Mix-add `gain * source[i]` into `channel[dest_start + i]`.
    ///
    /// The buffer is left untouched when the channel or the sample window
    /// is out of bounds.
    pub fn add_from(
        &mut self,
        dest_channel: usize,
        dest_start: usize,
        source: &[f32],
        gain: f32,
    ) -> Result<(), FrameError> {
        let out_of_range = || FrameError::AudioOutOfRange {
            channel: dest_channel,
            start: dest_start,
            samples: source.len(),
        };
        if dest_channel >= self.channels {
            return Err(out_of_range());
        }
        let end = dest_start
            .checked_add(source.len())
            .ok_or_else(&out_of_range)?;
        if end > self.samples {
            return Err(out_of_range());
        }

        let dest = self
            .channel_mut(dest_channel)
            .expect("channel bound checked above");
        for (d, s) in dest[dest_start..end].iter_mut().zip(source) {
            *d += gain * s;
        }
        Ok(())
    }

    /// Resident size in bytes.
    pub fn bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// One timeline frame: 1-based frame number, RGBA image, audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 1-based frame index along the timeline.
    pub number: i64,
    image: RgbaImage,
    audio: AudioBuffer,
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Frame {
    /// Blank frame: 300x200 solid color, default silent audio, number 1.
    pub fn new() -> Self {
        Self {
            number: 1,
            image: RgbaImage::from_pixel(DEFAULT_WIDTH, DEFAULT_HEIGHT, BLANK_COLOR),
            audio: AudioBuffer::new(DEFAULT_AUDIO_CHANNELS, DEFAULT_AUDIO_SAMPLES),
        }
    }

    /// Image-only frame filled with a solid color; audio is default silence.
    pub fn with_image(number: i64, width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self {
            number,
            image: RgbaImage::from_pixel(width, height, color),
            audio: AudioBuffer::new(DEFAULT_AUDIO_CHANNELS, DEFAULT_AUDIO_SAMPLES),
        }
    }

    /// Image-only frame from raw pixel bytes; audio is default silence.
    pub fn from_pixels(
        number: i64,
        width: u32,
        height: u32,
        layout: ChannelLayout,
        depth: PixelDepth,
        pixels: &[u8],
    ) -> Result<Self, FrameError> {
        Ok(Self {
            number,
            image: decode_pixels(width, height, layout, depth, pixels)?,
            audio: AudioBuffer::new(DEFAULT_AUDIO_CHANNELS, DEFAULT_AUDIO_SAMPLES),
        })
    }

    /// Audio-only frame (default 300x200 white image).
    pub fn with_audio(number: i64, samples: usize, channels: usize) -> Self {
        Self {
            number,
            image: RgbaImage::from_pixel(DEFAULT_WIDTH, DEFAULT_HEIGHT, AUDIO_ONLY_COLOR),
            audio: AudioBuffer::new(channels, samples),
        }
    }

    /// Image + audio frame.
    pub fn with_image_and_audio(
        number: i64,
        width: u32,
        height: u32,
        color: Rgba<u8>,
        samples: usize,
        channels: usize,
    ) -> Self {
        Self {
            number,
            image: RgbaImage::from_pixel(width, height, color),
            audio: AudioBuffer::new(channels, samples),
        }
    }

    /// Replace the image wholesale with new pixel data.
    pub fn add_image(
        &mut self,
        width: u32,
        height: u32,
        layout: ChannelLayout,
        depth: PixelDepth,
        pixels: &[u8],
    ) -> Result<(), FrameError> {
        self.image = decode_pixels(width, height, layout, depth, pixels)?;
        Ok(())
    }

    /// Mix-add audio samples into one channel. See [`AudioBuffer::add_from`].
    pub fn add_audio(
        &mut self,
        dest_channel: usize,
        dest_start_sample: usize,
        source: &[f32],
        gain: f32,
    ) -> Result<(), FrameError> {
        self.audio.add_from(dest_channel, dest_start_sample, source, gain)
    }

    /// Read-only view of the full RGBA pixel data.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Read-only view of a single scan line, or None past the bottom.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.image.height() {
            return None;
        }
        let stride = self.image.width() as usize * 4;
        let start = y as usize * stride;
        Some(&self.image.as_raw()[start..start + stride])
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn audio(&self) -> &AudioBuffer {
        &self.audio
    }

    /// Resident size of both buffers, used by cache byte accounting.
    pub fn bytes(&self) -> usize {
        self.image.as_raw().len() + self.audio.bytes()
    }

    /// Persist the image as `frame{number}.png` inside `dir`.
    pub fn save_in(&self, dir: impl AsRef<Path>) -> Result<PathBuf, FrameError> {
        let path = dir.as_ref().join(format!("frame{}.png", self.number));
        self.image
            .save(&path)
            .map_err(|e| FrameError::Image(e.to_string()))?;
        Ok(path)
    }

    /// Debug helper: dump the image to the temp dir and log where it went.
    pub fn display(&self) -> Result<PathBuf, FrameError> {
        let path = self.save_in(std::env::temp_dir())?;
        info!("frame {} written to {}", self.number, path.display());
        Ok(path)
    }

    /// Render the audio waveform to an image.
    ///
    /// Canvas is `samples` wide and `200 * channels + 20 * (channels - 1)`
    /// tall. Each channel row draws a vertical line from its midpoint
    /// baseline to `baseline - 100 * sample` (a single point for silent
    /// samples) and is labelled top-left. With `resize`, the result is
    /// scaled to 60% on both axes. Zero samples yields a 720x480 canvas
    /// with a centered notice.
    pub fn render_waveform(&self, resize: bool) -> RgbaImage {
        let samples = self.audio.samples();
        let channels = self.audio.channels();

        if samples == 0 || channels == 0 {
            let mut canvas = RgbaImage::from_pixel(720, 480, WAVE_BG);
            draw_label_centered(&mut canvas, "No Audio Samples Found");
            return canvas;
        }

        let width = samples as u32;
        let row_height = 200u32;
        let padding = 20u32;
        let total_height = row_height * channels as u32 + padding * (channels as u32 - 1);
        let mut canvas = RgbaImage::from_pixel(width, total_height, WAVE_BG);

        for channel in 0..channels {
            let row_top = channel as u32 * (row_height + padding);
            let baseline = row_top + row_height / 2;

            let data = self.audio.channel(channel).expect("channel in range");
            for (x, &sample) in data.iter().enumerate() {
                if sample.abs() > 1.0 {
                    warn!(
                        "over-range audio sample {:.3} (channel {}, sample {})",
                        sample, channel, x
                    );
                }
                if sample != 0.0 {
                    let tip = baseline as i64 - (sample * 100.0) as i64;
                    draw_vline(&mut canvas, x as u32, baseline as i64, tip, WAVE_COLOR);
                } else {
                    canvas.put_pixel(x as u32, baseline, WAVE_COLOR);
                }
            }

            draw_label(
                &mut canvas,
                5,
                row_top as i64 + 5,
                &format!("Channel {}", channel),
            );
        }

        if resize {
            let w = (width as f64 * 0.6) as u32;
            let h = (total_height as f64 * 0.6) as u32;
            canvas = imageops::resize(&canvas, w.max(1), h.max(1), imageops::FilterType::Triangle);
        }

        canvas
    }

    /// Debug helper: render the waveform, dump it to the temp dir, log the
    /// path.
    pub fn display_waveform(&self, resize: bool) -> Result<PathBuf, FrameError> {
        let canvas = self.render_waveform(resize);
        let path = std::env::temp_dir().join(format!("frame{}_waveform.png", self.number));
        canvas
            .save(&path)
            .map_err(|e| FrameError::Image(e.to_string()))?;
        info!("waveform for frame {} written to {}", self.number, path.display());
        Ok(path)
    }
}

/// Convert raw pixel bytes into an RGBA image.
fn decode_pixels(
    width: u32,
    height: u32,
    layout: ChannelLayout,
    depth: PixelDepth,
    pixels: &[u8],
) -> Result<RgbaImage, FrameError> {
    let channels = layout.channels();
    let bpc = depth.bytes_per_channel();
    let expected = width as usize * height as usize * channels * bpc;
    if pixels.len() < expected {
        return Err(FrameError::PixelDataTooShort {
            expected,
            actual: pixels.len(),
        });
    }

    let (ri, gi, bi, ai) = layout.swizzle();
    let read = |px: &[u8], idx: usize| -> u8 {
        match depth {
            PixelDepth::U8 => px[idx],
            PixelDepth::F32 => {
                let off = idx * 4;
                let v = f32::from_ne_bytes([px[off], px[off + 1], px[off + 2], px[off + 3]]);
                (v.clamp(0.0, 1.0) * 255.0) as u8
            }
        }
    };

    let mut image = RgbaImage::new(width, height);
    let px_stride = channels * bpc;
    for (i, px) in pixels[..expected].chunks_exact(px_stride).enumerate() {
        let x = (i % width as usize) as u32;
        let y = (i / width as usize) as u32;
        let a = match ai {
            Some(idx) => read(px, idx),
            None => 255,
        };
        image.put_pixel(x, y, Rgba([read(px, ri), read(px, gi), read(px, bi), a]));
    }
    Ok(image)
}

// ---------------------------------------------------------------------------
// Waveform drawing primitives
// ---------------------------------------------------------------------------

const WAVE_BG: Rgba<u8> = Rgba([0, 0, 0, 255]);
const WAVE_COLOR: Rgba<u8> = Rgba([0, 112, 255, 255]);
const LABEL_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Vertical line between two Y values (either order), clipped to the canvas.
fn draw_vline(canvas: &mut RgbaImage, x: u32, y0: i64, y1: i64, color: Rgba<u8>) {
    if x >= canvas.width() {
        return;
    }
    let (lo, hi) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
    let lo = lo.max(0);
    let hi = hi.min(canvas.height() as i64 - 1);
    if hi < lo {
        return;
    }
    for y in lo..=hi {
        canvas.put_pixel(x, y as u32, color);
    }
}

const GLYPH_WIDTH: i64 = 5;
const GLYPH_HEIGHT: i64 = 7;
const GLYPH_SCALE: i64 = 2;
const GLYPH_SPACING: i64 = 1;

/// 5x7 bitmap glyphs for the debug overlay text (uppercase + digits). Five
/// low bits per row, MSB = leftmost column. Lowercase input is upcased.
const GLYPHS: &[(char, [u8; 7])] = &[
    (' ', [0, 0, 0, 0, 0, 0, 0]),
    ('0', [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E]),
    ('1', [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E]),
    ('2', [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F]),
    ('3', [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E]),
    ('4', [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02]),
    ('5', [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E]),
    ('6', [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E]),
    ('7', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08]),
    ('8', [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E]),
    ('9', [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C]),
    ('A', [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11]),
    ('B', [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E]),
    ('C', [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E]),
    ('D', [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E]),
    ('E', [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F]),
    ('F', [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10]),
    ('G', [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F]),
    ('H', [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11]),
    ('I', [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E]),
    ('J', [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C]),
    ('K', [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11]),
    ('L', [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F]),
    ('M', [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11]),
    ('N', [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11]),
    ('O', [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E]),
    ('P', [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10]),
    ('Q', [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D]),
    ('R', [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11]),
    ('S', [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E]),
    ('T', [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04]),
    ('U', [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E]),
    ('V', [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04]),
    ('W', [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11]),
    ('X', [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11]),
    ('Y', [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04]),
    ('Z', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F]),
];

fn glyph_for(c: char) -> [u8; 7] {
    let upper = c.to_ascii_uppercase();
    GLYPHS
        .iter()
        .find(|(g, _)| *g == upper)
        .map(|(_, rows)| *rows)
        .unwrap_or([0; 7])
}

fn label_width(text: &str) -> i64 {
    text.chars().count() as i64 * (GLYPH_WIDTH + GLYPH_SPACING) * GLYPH_SCALE
}

/// Draw overlay text with the embedded bitmap glyphs.
fn draw_label(canvas: &mut RgbaImage, x: i64, y: i64, text: &str) {
    let mut cursor = x;
    for c in text.chars() {
        let rows = glyph_for(c);
        for (gy, row) in rows.iter().enumerate() {
            for gx in 0..GLYPH_WIDTH {
                if row >> (GLYPH_WIDTH - 1 - gx) & 1 == 0 {
                    continue;
                }
                for sy in 0..GLYPH_SCALE {
                    for sx in 0..GLYPH_SCALE {
                        let px = cursor + gx * GLYPH_SCALE + sx;
                        let py = y + gy as i64 * GLYPH_SCALE + sy;
                        if px >= 0
                            && py >= 0
                            && (px as u32) < canvas.width()
                            && (py as u32) < canvas.height()
                        {
                            canvas.put_pixel(px as u32, py as u32, LABEL_COLOR);
                        }
                    }
                }
            }
        }
        cursor += (GLYPH_WIDTH + GLYPH_SPACING) * GLYPH_SCALE;
    }
}

fn draw_label_centered(canvas: &mut RgbaImage, text: &str) {
    let x = (canvas.width() as i64 - label_width(text)) / 2;
    let y = (canvas.height() as i64 - GLYPH_HEIGHT * GLYPH_SCALE) / 2;
    draw_label(canvas, x, y, text);
}
