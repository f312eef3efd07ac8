//! Frame filter cache.
//!
//! Building a libswscale conversion pipeline is expensive; one file rarely
//! contains more than a handful of distinct (size, pixel format) combinations,
//! so pipelines are built once per combination and never evicted.  A single
//! cache-wide lock covers both lookup and construction, so two sessions
//! racing on the same key cannot create duplicate pipelines.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::scaling::{Context as Scaler, Flags as ScalingFlags};
use parking_lot::Mutex;

use crate::error::Result;
use crate::types::RgbImage;

/// Exact identity of a conversion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterKey {
    pub width: u32,
    pub height: u32,
    pub format: ffmpeg::format::Pixel,
}

// `Pixel` does not implement `Hash`; hash its discriminant, which is exactly
// what `PartialEq` compares on this fieldless enum.
impl std::hash::Hash for FilterKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.width.hash(state);
        self.height.hash(state);
        std::mem::discriminant(&self.format).hash(state);
    }
}

impl FilterKey {
    pub fn of(frame: &ffmpeg::util::frame::Video) -> Self {
        FilterKey {
            width: frame.width(),
            height: frame.height(),
            format: frame.format(),
        }
    }
}

/// Keyed store of reusable scaler pipelines, one per distinct input format.
pub struct FilterCache {
    pipelines: Mutex<HashMap<FilterKey, Scaler>>,
}

// SAFETY: the scaler contexts are only ever touched while holding
// `pipelines`' mutex, so the cache can be shared between a playback session
// and a background job without data races.
unsafe impl Send for FilterCache {}
unsafe impl Sync for FilterCache {}

impl FilterCache {
    pub fn new() -> Self {
        FilterCache {
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// Convert one decoded frame to RGB24 through the cached pipeline for its
    /// format, building the pipeline on first sight.
    pub fn process(&self, frame: &ffmpeg::util::frame::Video) -> Result<RgbImage> {
        let key = FilterKey::of(frame);

        let mut pipelines = self.pipelines.lock();
        let scaler = match pipelines.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                tracing::debug!(
                    width = key.width,
                    height = key.height,
                    format = ?key.format,
                    "New conversion pipeline"
                );
                v.insert(Scaler::get(
                    key.format,
                    key.width,
                    key.height,
                    ffmpeg::format::Pixel::RGB24,
                    key.width,
                    key.height,
                    ScalingFlags::BICUBIC,
                )?)
            }
        };

        let mut rgb = ffmpeg::util::frame::Video::new(ffmpeg::format::Pixel::RGB24, key.width, key.height);
        scaler.run(frame, &mut rgb)?;

        Ok(RgbImage {
            width: key.width,
            height: key.height,
            stride: rgb.stride(0),
            data: Bytes::copy_from_slice(rgb.data(0)),
        })
    }

    /// Number of distinct pipelines built so far.
    pub fn len(&self) -> usize {
        self.pipelines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.lock().is_empty()
    }
}

impl Default for FilterCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_reuses_pipeline_per_format() {
        crate::ffmpeg_utils::init().unwrap();

        let cache = FilterCache::new();
        assert!(cache.is_empty());

        let frame = ffmpeg::util::frame::Video::new(ffmpeg::format::Pixel::YUV420P, 64, 48);
        cache.process(&frame).unwrap();
        assert_eq!(cache.len(), 1);

        // Same format: no new pipeline.
        cache.process(&frame).unwrap();
        assert_eq!(cache.len(), 1);

        // New size: new pipeline.
        let other = ffmpeg::util::frame::Video::new(ffmpeg::format::Pixel::YUV420P, 32, 24);
        cache.process(&other).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_process_output_dimensions() {
        crate::ffmpeg_utils::init().unwrap();

        let cache = FilterCache::new();
        let frame = ffmpeg::util::frame::Video::new(ffmpeg::format::Pixel::YUV420P, 16, 8);
        let image = cache.process(&frame).unwrap();

        assert_eq!(image.width, 16);
        assert_eq!(image.height, 8);
        assert!(image.stride >= 16 * 3);
        assert_eq!(image.row(7).len(), 16 * 3);
    }
}
