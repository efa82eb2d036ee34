//! Pitch shifting without time stretching.
//!
//! The render paths only see the [`PitchShiftTransform`] trait; the bundled
//! [`DelayLineShifter`] is one implementation of it. The pitch offset lives
//! in a [`PitchParam`] shared between the control thread and whichever
//! thread is processing blocks.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use atomic_float::AtomicF32;

use super::buffer::BlockBuffer;
use crate::error::{Result, ToneError};

pub const MIN_PITCH_OFFSET: f32 = -1.0;
pub const MAX_PITCH_OFFSET: f32 = 1.0;

/// Convert a pitch offset (octaves) into a playback ratio.
pub fn offset_to_ratio(offset: f32) -> f32 {
    2.0_f32.powf(offset)
}

/// Cache-line aligned atomic pitch offset.
///
/// Writes are single-word atomic swaps, so the audio thread can read it
/// mid-block without locking. Values are clamped to
/// [`MIN_PITCH_OFFSET`, `MAX_PITCH_OFFSET`]; non-finite values are ignored.
#[derive(Debug)]
#[repr(align(64))]
pub struct PitchParam {
    value: AtomicF32,
}

impl PitchParam {
    pub fn new(offset: f32) -> Self {
        let initial = if offset.is_finite() { clamp_offset(offset) } else { 0.0 };
        PitchParam {
            value: AtomicF32::new(initial),
        }
    }

    pub fn shared(offset: f32) -> Arc<Self> {
        Arc::new(Self::new(offset))
    }

    /// Offset expressed in semitones (12 per unit of offset).
    pub fn from_semitones(semitones: f32) -> Self {
        Self::new(semitones / 12.0)
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Acquire)
    }

    /// Store a new offset. Returns `false` if the value was rejected.
    #[inline]
    pub fn set(&self, offset: f32) -> bool {
        if !offset.is_finite() {
            return false;
        }
        self.value.store(clamp_offset(offset), Ordering::Release);
        true
    }

    #[inline]
    pub fn ratio(&self) -> f32 {
        offset_to_ratio(self.get())
    }
}

impl Default for PitchParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

fn clamp_offset(offset: f32) -> f32 {
    offset.clamp(MIN_PITCH_OFFSET, MAX_PITCH_OFFSET)
}

/// Channel count and sample rate a transform is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub channels: usize,
    pub sample_rate: u32,
}

impl StreamSpec {
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        StreamSpec {
            channels,
            sample_rate,
        }
    }

    /// A stream needs at least one channel and a positive sample rate.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(ToneError::Config("stream needs at least one channel".into()));
        }
        if self.sample_rate == 0 {
            return Err(ToneError::Config("stream sample rate must be positive".into()));
        }
        Ok(())
    }
}

/// A block-based pitch shifter.
///
/// Implementations read their [`PitchParam`] once at the start of each
/// block, so an offset change is heard from the next block on.
pub trait PitchShiftTransform: Send {
    /// Shift the block in place.
    fn process_block(&mut self, block: &mut BlockBuffer);

    /// Frames of delay between input and output.
    fn latency_frames(&self) -> usize {
        0
    }

    /// Drop any buffered history.
    fn reset(&mut self) {}
}

/// Builds a transform bound to a stream and a shared parameter.
pub trait PitchShiftFactory: Send + Sync {
    fn create(&self, spec: StreamSpec, param: Arc<PitchParam>) -> Box<dyn PitchShiftTransform>;
}

impl<F> PitchShiftFactory for F
where
    F: Fn(StreamSpec, Arc<PitchParam>) -> Box<dyn PitchShiftTransform> + Send + Sync,
{
    fn create(&self, spec: StreamSpec, param: Arc<PitchParam>) -> Box<dyn PitchShiftTransform> {
        self(spec, param)
    }
}

/// Factory for [`DelayLineShifter`] with a fixed window length.
#[derive(Debug, Clone, Copy)]
pub struct DelayLineShifterFactory {
    pub window_ms: f32,
}

impl Default for DelayLineShifterFactory {
    fn default() -> Self {
        DelayLineShifterFactory { window_ms: 50.0 }
    }
}

impl PitchShiftFactory for DelayLineShifterFactory {
    fn create(&self, spec: StreamSpec, param: Arc<PitchParam>) -> Box<dyn PitchShiftTransform> {
        Box::new(DelayLineShifter::new(spec, self.window_ms, param))
    }
}

/// Per-channel circular delay line.
#[derive(Debug, Clone)]
struct DelayLine {
    data: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        DelayLine {
            data: vec![0.0; len],
            write_pos: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        self.data[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.data.len();
    }

    /// Sample written `delay` frames before the most recent one, with
    /// linear interpolation between neighbours.
    fn tap(&self, delay: f32) -> f32 {
        let len = self.data.len();
        let newest = (self.write_pos + len - 1) % len;
        let whole = delay as usize;
        let frac = delay - whole as f32;

        let a = self.data[(newest + len - whole % len) % len];
        let b = self.data[(newest + 2 * len - (whole + 1) % len) % len];
        a + frac * (b - a)
    }

    fn clear(&mut self) {
        self.data.fill(0.0);
        self.write_pos = 0;
    }
}

/// Two read taps sweep through a delay line at `ratio` times the write
/// speed, half a window apart, crossfaded with complementary triangular
/// gains. Duration is preserved; pitch moves by `ratio`.
pub struct DelayLineShifter {
    param: Arc<PitchParam>,
    lines: Vec<DelayLine>,
    /// Window in frames (even).
    window: f32,
    /// Position of the first tap within the window, in [0, 1).
    phase: f32,
}

impl DelayLineShifter {
    pub fn new(spec: StreamSpec, window_ms: f32, param: Arc<PitchParam>) -> Self {
        let window_ms = window_ms.clamp(10.0, 100.0);
        let mut window = (window_ms / 1000.0 * spec.sample_rate as f32).round() as usize;
        window = (window.max(4) + 1) & !1;

        DelayLineShifter {
            param,
            lines: (0..spec.channels.max(1)).map(|_| DelayLine::new(window + 2)).collect(),
            window: window as f32,
            phase: 0.0,
        }
    }

    pub fn window_frames(&self) -> usize {
        self.window as usize
    }
}

/// Triangular crossfade gain; `gain(p) + gain(p + 0.5) == 1`.
fn crossfade_gain(phase: f32) -> f32 {
    1.0 - (2.0 * phase - 1.0).abs()
}

impl PitchShiftTransform for DelayLineShifter {
    fn process_block(&mut self, block: &mut BlockBuffer) {
        let ratio = self.param.ratio();
        let step = (1.0 - ratio) / self.window;
        let start_phase = self.phase;
        let mut end_phase = start_phase;

        for (ch, line) in self.lines.iter_mut().enumerate().take(block.channel_count()) {
            let mut phase = start_phase;
            for sample in block.channel_mut(ch).iter_mut() {
                line.push(*sample);

                let phase_b = (phase + 0.5).fract();
                let a = line.tap(phase * self.window) * crossfade_gain(phase);
                let b = line.tap(phase_b * self.window) * crossfade_gain(phase_b);
                *sample = a + b;

                phase = (phase + step).rem_euclid(1.0);
            }
            end_phase = phase;
        }

        self.phase = end_phase;
    }

    fn latency_frames(&self) -> usize {
        self.window as usize / 2
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        self.phase = 0.0;
    }
}
