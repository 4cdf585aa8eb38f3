//! Downsampled waveform extraction.
//!
//! Walks a reader's frames and reduces one audio channel to a handful of
//! averaged samples per second — a dataset small enough to graph on a
//! timeline clip. 48000 samples per second become, say, 20.

use log::debug;

use crate::reader::{FrameReader, ReaderError};

/// Reduces a reader's audio stream to averaged per-second buckets.
pub struct Waveformer<'r> {
    reader: &'r dyn FrameReader,
}

impl<'r> Waveformer<'r> {
    pub fn new(reader: &'r dyn FrameReader) -> Self {
        Self { reader }
    }

    /// Extract `num_per_second` averaged samples per second from one
    /// channel. With `normalize`, scale the result so the largest
    /// magnitude reaches 1.0.
    ///
    /// The output is sized `num_per_second * (duration + 1)` and
    /// zero-padded past the last full bucket.
    pub fn extract_samples(
        &self,
        channel: usize,
        num_per_second: u32,
        normalize: bool,
    ) -> Result<Vec<f32>, ReaderError> {
        let info = self.reader.info();
        let divisor = (info.sample_rate / num_per_second.max(1)).max(1) as usize;
        let total = (num_per_second as f64 * (info.duration() + 1.0)) as usize;

        let mut extracted = vec![0.0f32; total];
        let mut extracted_index = 0;

        let mut bucket_total = 0.0f32;
        let mut bucket_count = 0usize;
        let mut samples_max = 0.0f32;
        let mut samples_min = 0.0f32;

        for number in 1..=info.video_length {
            let frame = self.reader.get_frame(number)?;
            let Some(samples) = frame.audio().channel(channel) else {
                break;
            };
            for &s in samples {
                bucket_total += s;
                bucket_count += 1;
                if bucket_count == divisor {
                    let avg = bucket_total / divisor as f32;
                    if extracted_index < extracted.len() {
                        extracted[extracted_index] = avg;
                        extracted_index += 1;
                    }
                    samples_max = samples_max.max(avg);
                    samples_min = samples_min.min(avg);
                    bucket_total = 0.0;
                    bucket_count = 0;
                }
            }
        }

        if normalize {
            let scale = (1.0 / samples_max).min(1.0 / samples_min.abs());
            if scale.is_finite() {
                for s in &mut extracted {
                    *s *= scale;
                }
            }
        }

        debug!(
            "waveform: channel {}, {} buckets filled of {}",
            channel, extracted_index, total
        );
        Ok(extracted)
    }
}
