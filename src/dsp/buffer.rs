//! Sample buffers: decoded multichannel audio and the fixed-size blocks
//! the render paths push through a transform.

use std::sync::Arc;

use crate::error::{Result, ToneError};

/// Decoded multichannel float audio, one sample sequence per channel.
///
/// Immutable once built: decode and render produce new buffers. Cloning is
/// cheap (the channel data is shared).
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    channels: Arc<[Vec<f32>]>,
    frame_count: usize,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Build a buffer from planar channel data.
    ///
    /// Requires at least one channel, a non-zero sample rate and every
    /// channel holding the same number of frames. Zero frames is allowed.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if channels.is_empty() {
            return Err(ToneError::InvalidBuffer("no channels".into()));
        }
        if sample_rate == 0 {
            return Err(ToneError::InvalidBuffer("sample rate must be positive".into()));
        }
        let frame_count = channels[0].len();
        if let Some((i, ch)) = channels
            .iter()
            .enumerate()
            .find(|(_, ch)| ch.len() != frame_count)
        {
            return Err(ToneError::InvalidBuffer(format!(
                "channel {i} has {} frames, expected {frame_count}",
                ch.len()
            )));
        }
        Ok(SampleBuffer {
            channels: channels.into(),
            frame_count,
            sample_rate,
        })
    }

    /// Wrap channels produced from an already validated shape.
    pub(crate) fn from_validated(channels: Vec<Vec<f32>>, frame_count: usize, sample_rate: u32) -> Self {
        debug_assert!(channels.iter().all(|ch| ch.len() == frame_count));
        SampleBuffer {
            channels: channels.into(),
            frame_count,
            sample_rate,
        }
    }

    /// Mono convenience constructor.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(vec![samples], sample_rate)
    }

    /// Split frame-major interleaved samples into channels.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Result<Self> {
        if channel_count == 0 {
            return Err(ToneError::InvalidBuffer("no channels".into()));
        }
        if samples.len() % channel_count != 0 {
            return Err(ToneError::InvalidBuffer(format!(
                "{} interleaved samples do not divide into {channel_count} channels",
                samples.len()
            )));
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, &s) in channels.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        Self::new(channels, sample_rate)
    }

    /// Create from interleaved 16-bit signed PCM data.
    pub fn from_i16(pcm: &[i16], channel_count: usize, sample_rate: u32) -> Result<Self> {
        let samples: Vec<f32> = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
        Self::from_interleaved(&samples, channel_count, sample_rate)
    }

    /// A buffer of silence with the given shape.
    pub fn silent(channel_count: usize, frame_count: usize, sample_rate: u32) -> Result<Self> {
        Self::new(vec![vec![0.0; frame_count]; channel_count], sample_rate)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Samples of one channel. Panics if `index` is out of range.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    /// Frame-major interleaved copy of the samples.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frame_count * self.channel_count());
        for frame in 0..self.frame_count {
            for ch in self.channels.iter() {
                out.push(ch[frame]);
            }
        }
        out
    }
}

/// Preallocated planar block of audio, reused for every render quantum so
/// the processing loop never allocates.
#[derive(Debug, Clone)]
pub struct BlockBuffer {
    data: Vec<f32>,
    channels: usize,
    capacity: usize,
    frames: usize,
}

impl BlockBuffer {
    pub fn new(channels: usize, capacity: usize) -> Self {
        BlockBuffer {
            data: vec![0.0; channels * capacity],
            channels,
            capacity,
            frames: capacity,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of valid frames in the current block.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Shrink or restore the active length of the block (up to capacity).
    pub fn set_frames(&mut self, frames: usize) {
        self.frames = frames.min(self.capacity);
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        let start = index * self.capacity;
        &self.data[start..start + self.frames]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        let start = index * self.capacity;
        &mut self.data[start..start + self.frames]
    }

    /// Zero the active region.
    pub fn clear(&mut self) {
        for ch in 0..self.channels {
            self.channel_mut(ch).fill(0.0);
        }
    }

    /// Load frame-major interleaved samples; missing frames are zeroed.
    pub fn read_interleaved(&mut self, samples: &[f32]) {
        let channels = self.channels;
        for ch in 0..channels {
            let start = ch * self.capacity;
            for frame in 0..self.frames {
                self.data[start + frame] = samples.get(frame * channels + ch).copied().unwrap_or(0.0);
            }
        }
    }

    /// Store the active region into `out` as frame-major interleaved samples.
    pub fn write_interleaved(&self, out: &mut [f32]) {
        let channels = self.channels;
        for (frame, chunk) in out.chunks_mut(channels).take(self.frames).enumerate() {
            for (ch, slot) in chunk.iter_mut().enumerate() {
                *slot = self.data[ch * self.capacity + frame];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_channels() {
        let err = SampleBuffer::new(vec![vec![0.0; 4], vec![0.0; 3]], 8000).unwrap_err();
        assert!(matches!(err, ToneError::InvalidBuffer(_)));
    }

    #[test]
    fn rejects_empty_and_zero_rate() {
        assert!(SampleBuffer::new(vec![], 8000).is_err());
        assert!(SampleBuffer::mono(vec![0.0], 0).is_err());
    }

    #[test]
    fn zero_frames_is_allowed() {
        let buf = SampleBuffer::new(vec![vec![], vec![]], 44100).unwrap();
        assert_eq!(buf.frame_count(), 0);
        assert_eq!(buf.channel_count(), 2);
    }

    #[test]
    fn interleave_deinterleave() {
        let buf = SampleBuffer::from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2, 48000).unwrap();
        assert_eq!(buf.frame_count(), 3);
        assert_eq!(buf.channel(0), &[0.1, 0.2, 0.3]);
        assert_eq!(buf.channel(1), &[-0.1, -0.2, -0.3]);
        assert_eq!(buf.to_interleaved(), vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
    }

    #[test]
    fn interleaved_length_must_divide() {
        assert!(SampleBuffer::from_interleaved(&[0.0; 5], 2, 48000).is_err());
    }

    #[test]
    fn from_i16_scales() {
        let buf = SampleBuffer::from_i16(&[0, 16384, -32768], 1, 8000).unwrap();
        assert_eq!(buf.channel(0), &[0.0, 0.5, -1.0]);
    }

    #[test]
    fn duration_from_rate() {
        let buf = SampleBuffer::silent(1, 22050, 44100).unwrap();
        assert!((buf.duration_secs() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn block_interleaved_io() {
        let mut block = BlockBuffer::new(2, 4);
        block.set_frames(3);
        block.read_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(block.channel(0), &[1.0, 3.0, 5.0]);
        assert_eq!(block.channel(1), &[2.0, 4.0, 0.0]);

        let mut out = [9.0; 6];
        block.write_interleaved(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 5.0, 0.0]);
    }

    #[test]
    fn block_frames_capped_at_capacity() {
        let mut block = BlockBuffer::new(1, 8);
        block.set_frames(100);
        assert_eq!(block.frames(), 8);
        block.channel_mut(0).fill(1.0);
        block.clear();
        assert!(block.channel(0).iter().all(|&s| s == 0.0));
    }
}
