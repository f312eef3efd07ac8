//! Planar float PCM blocks.

/// A fixed block of planar float samples, one buffer per channel.
///
/// Samples are nominally in `[-1, 1]`.  Channel count and frame count are
/// fixed at construction; the block is owned exclusively by whichever stage
/// currently holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffers {
    data: Vec<Vec<f32>>,
}

impl AudioBuffers {
    /// Allocate a zero-filled block of `channels` x `frames` samples.
    pub fn new(channels: usize, frames: usize) -> Self {
        AudioBuffers {
            data: vec![vec![0.0; frames]; channels],
        }
    }

    /// Build a block directly from per-channel sample vectors.
    ///
    /// All channels must hold the same number of frames.
    pub fn from_channels(data: Vec<Vec<f32>>) -> Self {
        debug_assert!(data.windows(2).all(|w| w[0].len() == w[1].len()));
        AudioBuffers { data }
    }

    pub fn channels(&self) -> usize {
        self.data.len()
    }

    pub fn frames(&self) -> usize {
        self.data.first().map(|c| c.len()).unwrap_or(0)
    }

    /// The samples of one channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.data[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.data[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zero_filled() {
        let b = AudioBuffers::new(2, 16);
        assert_eq!(b.channels(), 2);
        assert_eq!(b.frames(), 16);
        assert!(b.channel(0).iter().all(|&s| s == 0.0));
        assert!(b.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_from_channels() {
        let b = AudioBuffers::from_channels(vec![vec![0.5, -0.5], vec![1.0, -1.0]]);
        assert_eq!(b.channels(), 2);
        assert_eq!(b.frames(), 2);
        assert_eq!(b.channel(1), &[1.0, -1.0]);
    }

    #[test]
    fn test_empty_block() {
        let b = AudioBuffers::new(0, 0);
        assert_eq!(b.channels(), 0);
        assert_eq!(b.frames(), 0);
    }
}
