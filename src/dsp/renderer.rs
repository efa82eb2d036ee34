//! Offline renderer: runs a SampleBuffer through a pitch-shift transform
//! outside real time and collects the full result.

use std::sync::Arc;

use super::buffer::{BlockBuffer, SampleBuffer};
use super::pitch_shift::{
    DelayLineShifterFactory, PitchParam, PitchShiftFactory, PitchShiftTransform, StreamSpec,
};
use super::wav::{EncodedAudioBlob, WavEncoder};

/// Render quantum used when none is configured.
pub const DEFAULT_BLOCK_SIZE: usize = 128;

/// Non-real-time render context sized to one input buffer.
///
/// Consumed by [`OfflineRenderContext::render`], so each render gets a
/// fresh context and no state leaks between renders.
#[derive(Debug)]
pub struct OfflineRenderContext {
    spec: StreamSpec,
    frame_count: usize,
    block_size: usize,
}

impl OfflineRenderContext {
    pub fn new(spec: StreamSpec, frame_count: usize, block_size: usize) -> Self {
        OfflineRenderContext {
            spec,
            frame_count,
            block_size: block_size.max(1),
        }
    }

    /// Context matching the shape of `buffer`.
    pub fn for_buffer(buffer: &SampleBuffer, block_size: usize) -> Self {
        Self::new(
            StreamSpec::new(buffer.channel_count(), buffer.sample_rate()),
            buffer.frame_count(),
            block_size,
        )
    }

    pub fn spec(&self) -> StreamSpec {
        self.spec
    }

    /// Feed `source` through `transform` once, from frame zero, and return
    /// the rendered buffer.
    ///
    /// The transform's latency is compensated: the input is zero padded by
    /// `latency` frames and that many leading output frames are dropped, so
    /// the output is time-aligned and exactly `frame_count` frames long.
    pub fn render(self, source: &SampleBuffer, mut transform: Box<dyn PitchShiftTransform>) -> SampleBuffer {
        let channels = self.spec.channels;
        let latency = transform.latency_frames();
        let total = self.frame_count + latency;

        let mut output = vec![Vec::with_capacity(self.frame_count); channels];
        let mut block = BlockBuffer::new(channels, self.block_size);

        let mut block_start = 0;
        while block_start < total {
            let block_end = (block_start + self.block_size).min(total);
            let this_block = block_end - block_start;
            block.set_frames(this_block);

            // Fill from the source; past its end the block stays silent
            for ch in 0..channels {
                let src = source.channel(ch);
                let dst = block.channel_mut(ch);
                for (i, slot) in dst.iter_mut().enumerate() {
                    *slot = src.get(block_start + i).copied().unwrap_or(0.0);
                }
            }

            transform.process_block(&mut block);

            // Drop the first `latency` frames of output
            let skip = latency.saturating_sub(block_start).min(this_block);
            for (ch, out) in output.iter_mut().enumerate() {
                out.extend_from_slice(&block.channel(ch)[skip..]);
            }

            block_start = block_end;
        }

        for out in &mut output {
            out.truncate(self.frame_count);
        }

        SampleBuffer::from_validated(output, self.frame_count, self.spec.sample_rate)
    }
}

/// Decode-independent half of the harmony path: buffer in, shifted buffer
/// (or WAV blob) out.
#[derive(Clone)]
pub struct OfflineRenderPipeline {
    factory: Arc<dyn PitchShiftFactory>,
    block_size: usize,
    encoder: WavEncoder,
}

impl Default for OfflineRenderPipeline {
    fn default() -> Self {
        Self::new(Arc::new(DelayLineShifterFactory::default()), DEFAULT_BLOCK_SIZE)
    }
}

impl OfflineRenderPipeline {
    pub fn new(factory: Arc<dyn PitchShiftFactory>, block_size: usize) -> Self {
        OfflineRenderPipeline {
            factory,
            block_size,
            encoder: WavEncoder::default(),
        }
    }

    pub fn with_encoder(mut self, encoder: WavEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn encoder(&self) -> &WavEncoder {
        &self.encoder
    }

    /// Render synchronously on the calling thread.
    pub fn render_blocking(&self, asset: &SampleBuffer, pitch_offset: f32) -> SampleBuffer {
        let context = OfflineRenderContext::for_buffer(asset, self.block_size);
        let param = PitchParam::shared(pitch_offset);
        let transform = self.factory.create(context.spec(), param);
        log::debug!(
            "offline render: {} ch, {} frames @ {} Hz, offset {pitch_offset}",
            asset.channel_count(),
            asset.frame_count(),
            asset.sample_rate()
        );
        context.render(asset, transform)
    }

    /// Render on the blocking thread pool and resolve once the whole buffer
    /// is ready. There is no cancellation; a started render runs to the end.
    #[cfg(feature = "assets")]
    pub async fn render(&self, asset: SampleBuffer, pitch_offset: f32) -> crate::error::Result<SampleBuffer> {
        let pipeline = self.clone();
        let rendered =
            tokio::task::spawn_blocking(move || pipeline.render_blocking(&asset, pitch_offset)).await?;
        Ok(rendered)
    }

    /// Render and encode in one step.
    pub fn render_wav_blocking(&self, asset: &SampleBuffer, pitch_offset: f32) -> EncodedAudioBlob {
        let rendered = self.render_blocking(asset, pitch_offset);
        self.encoder.encode(&rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::pitch_track::{FrequencyRange, measure_interval};
    use crate::dsp::wav::WavHeader;
    use std::f32::consts::PI;
    use std::sync::Mutex;

    fn sine(freq: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    /// Pass-through that claims a fixed latency and records block sizes.
    struct LatencyTap {
        latency: usize,
        blocks: Arc<Mutex<Vec<usize>>>,
    }

    impl PitchShiftTransform for LatencyTap {
        fn process_block(&mut self, block: &mut BlockBuffer) {
            self.blocks.lock().unwrap().push(block.frames());
        }

        fn latency_frames(&self) -> usize {
            self.latency
        }
    }

    #[test]
    fn render_preserves_shape() {
        let asset = SampleBuffer::new(vec![sine(440.0, 8000, 1000), sine(220.0, 8000, 1000)], 8000).unwrap();
        let out = OfflineRenderPipeline::default().render_blocking(&asset, 0.4);
        assert_eq!(out.channel_count(), 2);
        assert_eq!(out.frame_count(), 1000);
        assert_eq!(out.sample_rate(), 8000);
    }

    #[test]
    fn zero_offset_renders_identity() {
        let asset = SampleBuffer::mono(sine(300.0, 8000, 2000), 8000).unwrap();
        let out = OfflineRenderPipeline::default().render_blocking(&asset, 0.0);
        for (i, (a, b)) in asset.channel(0).iter().zip(out.channel(0)).enumerate() {
            assert!((a - b).abs() < 1e-5, "frame {i}: {a} vs {b}");
        }
    }

    #[test]
    fn blocks_cover_input_plus_latency() {
        let blocks = Arc::new(Mutex::new(Vec::new()));
        let tap = LatencyTap {
            latency: 50,
            blocks: blocks.clone(),
        };
        let asset = SampleBuffer::mono((0..300).map(|i| i as f32 / 300.0).collect(), 8000).unwrap();
        let ctx = OfflineRenderContext::for_buffer(&asset, 128);
        let out = ctx.render(&asset, Box::new(tap));

        assert_eq!(*blocks.lock().unwrap(), vec![128, 128, 94]);
        // The tap is a pass-through, so compensation shifts the signal back by 50 frames
        assert_eq!(out.frame_count(), 300);
        assert_eq!(out.channel(0)[0], asset.channel(0)[50]);
        assert_eq!(out.channel(0)[249], asset.channel(0)[299]);
        assert_eq!(out.channel(0)[250], 0.0);
    }

    #[test]
    fn empty_asset_renders_empty() {
        let asset = SampleBuffer::silent(1, 0, 8000).unwrap();
        let out = OfflineRenderPipeline::default().render_blocking(&asset, 0.5);
        assert_eq!(out.frame_count(), 0);
    }

    #[test]
    fn rendering_is_deterministic() {
        let asset = SampleBuffer::mono(sine(440.0, 16000, 4000), 16000).unwrap();
        let pipeline = OfflineRenderPipeline::default();
        assert_eq!(pipeline.render_blocking(&asset, 0.25), pipeline.render_blocking(&asset, 0.25));
    }

    #[test]
    fn shift_moves_pitch_up_and_down() {
        let asset = SampleBuffer::mono(sine(250.0, 16000, 16000), 16000).unwrap();
        let pipeline = OfflineRenderPipeline::default();

        for (offset, expected) in [(1.0 / 12.0, 100.0), (-2.0 / 12.0, -200.0)] {
            let out = pipeline.render_blocking(&asset, offset);
            let cents = measure_interval(asset.channel(0), out.channel(0), 16000, FrequencyRange::VOICE).unwrap();
            assert!((cents - expected).abs() < 30.0, "offset {offset}: expected ~{expected} cents, got {cents}");
        }
    }

    #[test]
    fn render_wav_uses_encoder() {
        let asset = SampleBuffer::mono(sine(440.0, 8000, 100), 8000).unwrap();
        let blob = OfflineRenderPipeline::default().render_wav_blocking(&asset, 0.1);
        let header = WavHeader::parse(blob.as_bytes()).unwrap();
        assert_eq!(header.frame_count(), 100);
        assert_eq!(header.sample_rate, 8000);
    }

    #[cfg(feature = "assets")]
    #[tokio::test]
    async fn async_render_matches_blocking() {
        let asset = SampleBuffer::mono(sine(330.0, 8000, 800), 8000).unwrap();
        let pipeline = OfflineRenderPipeline::default();
        let expected = pipeline.render_blocking(&asset, -0.3);
        let rendered = pipeline.render(asset, -0.3).await.unwrap();
        assert_eq!(rendered, expected);
    }
}
