//! Top-level facade: one config, the harmony render path and the live graph.

use std::sync::Arc;

use crate::config::ToneConfig;
use crate::dsp::buffer::SampleBuffer;
use crate::dsp::pitch_shift::{DelayLineShifterFactory, PitchShiftFactory, StreamSpec};
use crate::dsp::renderer::OfflineRenderPipeline;
use crate::dsp::pitch_track::{FrequencyRange, measure_interval};
use crate::dsp::wav::{EncodedAudioBlob, WavEncoder};
use crate::error::Result;
use crate::live::{AudioHost, LiveGraphController};

/// Result of the harmony path: the decoded asset, its shifted rendering
/// and the encoded WAV ready for playback.
#[derive(Debug, Clone)]
pub struct HarmonyClip {
    pub original: SampleBuffer,
    pub rendered: SampleBuffer,
    pub blob: EncodedAudioBlob,
}

impl HarmonyClip {
    /// Measured interval between the original and the rendering, in cents,
    /// taken on the first channel. `None` for unpitched material.
    pub fn interval_cents(&self) -> Option<f64> {
        measure_interval(
            self.original.channel(0),
            self.rendered.channel(0),
            self.original.sample_rate(),
            FrequencyRange::VOICE,
        )
    }
}

pub struct ToneEngine {
    config: ToneConfig,
    factory: Arc<dyn PitchShiftFactory>,
    pipeline: OfflineRenderPipeline,
}

impl ToneEngine {
    pub fn new(config: ToneConfig) -> Result<Self> {
        let factory = Arc::new(DelayLineShifterFactory {
            window_ms: config.effective_window_ms(),
        });
        Self::with_factory(config, factory)
    }

    /// Use a different pitch shifter for both the offline and live paths.
    pub fn with_factory(config: ToneConfig, factory: Arc<dyn PitchShiftFactory>) -> Result<Self> {
        config.validate()?;
        let pipeline = OfflineRenderPipeline::new(factory.clone(), config.block_size)
            .with_encoder(WavEncoder::new(config.wav_layout));
        Ok(ToneEngine {
            config,
            factory,
            pipeline,
        })
    }

    pub fn config(&self) -> &ToneConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &OfflineRenderPipeline {
        &self.pipeline
    }

    pub fn encoder(&self) -> &WavEncoder {
        self.pipeline.encoder()
    }

    /// Render an already decoded buffer and encode it.
    pub fn render_buffer(&self, original: SampleBuffer, pitch_offset: f32) -> HarmonyClip {
        let rendered = self.pipeline.render_blocking(&original, pitch_offset);
        let blob = self.encoder().encode(&rendered);
        HarmonyClip {
            original,
            rendered,
            blob,
        }
    }

    /// Fetch → decode → render → encode. A fetch or decode failure stops
    /// the path before any rendering happens.
    #[cfg(feature = "assets")]
    pub async fn render_harmony<S: crate::asset::AssetSource>(
        &self,
        source: &S,
        path: &str,
        pitch_offset: f32,
    ) -> Result<HarmonyClip> {
        let bytes = source.fetch(path).await?;
        let original = source.decode(&bytes)?;
        log::info!(
            "rendering harmony for {path}: {:.2}s, offset {pitch_offset}",
            original.duration_secs()
        );

        let rendered = self.pipeline.render(original.clone(), pitch_offset).await?;
        let blob = self.encoder().encode(&rendered);
        log::debug!("encoded harmony clip: {} bytes", blob.len());
        Ok(HarmonyClip {
            original,
            rendered,
            blob,
        })
    }

    /// [`ToneEngine::render_harmony`] for the configured asset and offset.
    #[cfg(feature = "assets")]
    pub async fn render_configured<S: crate::asset::AssetSource>(&self, source: &S) -> Result<HarmonyClip> {
        self.render_harmony(source, &self.config.asset_path, self.config.pitch_offset)
            .await
    }

    /// HTTP asset source rooted at `base_url`, cached on disk when the
    /// config asks for it and the platform has a cache directory.
    #[cfg(feature = "assets")]
    pub fn http_source(&self, base_url: impl Into<String>) -> crate::asset::HttpAssetSource {
        let source = crate::asset::HttpAssetSource::new(base_url);
        match self.config.cache_assets.then(crate::asset::AssetCache::in_default_dir).flatten() {
            Some(cache) => source.with_cache(cache),
            None => source,
        }
    }

    /// A stopped live controller on `host`, set up from the config.
    pub fn live_controller<H: AudioHost>(&self, host: H) -> LiveGraphController<H> {
        let spec = StreamSpec::new(self.config.live_channels, self.config.live_sample_rate);
        let controller =
            LiveGraphController::with_factory(host, spec, self.factory.clone()).with_block_size(self.config.block_size);
        controller.set_pitch_offset(self.config.pitch_offset);
        controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::wav::{ChannelLayout, WavHeader};
    use crate::error::ToneError;
    use crate::live::LoopbackHost;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, frames: usize) -> SampleBuffer {
        let samples = (0..frames)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect();
        SampleBuffer::mono(samples, sample_rate).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ToneConfig {
            block_size: 0,
            ..ToneConfig::default()
        };
        assert!(matches!(ToneEngine::new(config), Err(ToneError::Config(_))));
    }

    #[test]
    fn encoder_follows_config_layout() {
        let config = ToneConfig {
            wav_layout: ChannelLayout::Interleaved,
            ..ToneConfig::default()
        };
        let engine = ToneEngine::new(config).unwrap();
        assert_eq!(engine.encoder().layout(), ChannelLayout::Interleaved);
    }

    #[test]
    fn render_buffer_preserves_shape() {
        let engine = ToneEngine::new(ToneConfig::default()).unwrap();
        let clip = engine.render_buffer(sine(250.0, 16000, 8000), 0.0);

        assert_eq!(clip.rendered.frame_count(), 8000);
        let header = WavHeader::parse(clip.blob.as_bytes()).unwrap();
        assert_eq!(header.sample_rate, 16000);
        assert_eq!(header.frame_count(), 8000);
        assert_eq!(clip.blob.len(), 44 + 2 * 8000);
    }

    #[test]
    fn octave_down_measures_minus_1200_cents() {
        let engine = ToneEngine::new(ToneConfig::default()).unwrap();
        let clip = engine.render_buffer(sine(400.0, 16000, 16000), -1.0);
        let cents = clip.interval_cents().unwrap();
        assert!((cents + 1200.0).abs() < 40.0, "measured {cents} cents");
    }

    #[test]
    fn unshifted_clip_measures_unison() {
        let engine = ToneEngine::new(ToneConfig::default()).unwrap();
        let clip = engine.render_buffer(sine(250.0, 16000, 16000), 0.0);
        let cents = clip.interval_cents().unwrap();
        assert!(cents.abs() < 10.0, "measured {cents} cents");
    }

    #[cfg(feature = "assets")]
    #[test]
    fn http_source_skips_cache_when_disabled() {
        let config = ToneConfig {
            cache_assets: false,
            ..ToneConfig::default()
        };
        let engine = ToneEngine::new(config).unwrap();
        assert!(engine.http_source("http://localhost:3000").cache().is_none());
    }

    #[test]
    fn live_controller_uses_config() {
        let config = ToneConfig {
            pitch_offset: 0.5,
            live_channels: 2,
            live_sample_rate: 44100,
            ..ToneConfig::default()
        };
        let engine = ToneEngine::new(config).unwrap();
        let controller = engine.live_controller(LoopbackHost::new());

        assert!(!controller.is_running());
        assert_eq!(controller.pitch_offset(), 0.5);
        assert_eq!(controller.spec(), StreamSpec::new(2, 44100));
    }
}
