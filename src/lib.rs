#[cfg(feature = "decode")]
pub mod asset;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod live;

use wasm_bindgen::prelude::*;

use crate::dsp::buffer::SampleBuffer;
use crate::dsp::wav::WavHeader;

pub use crate::config::ToneConfig;
pub use crate::engine::{HarmonyClip, ToneEngine};
pub use crate::error::{Result, ToneError};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// WASM-exposed: return the tonedeaf-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: encode planar f32 samples (channel 0 first, then
/// channel 1, ...) into a 16-bit PCM WAV byte array.
#[wasm_bindgen]
pub fn encode_wav(planar: Vec<f32>, channels: u32, sample_rate: u32) -> std::result::Result<Vec<u8>, JsValue> {
    let channels = channels as usize;
    if channels == 0 || planar.len() % channels != 0 {
        return Err(js_error(format!(
            "{} samples cannot be split into {channels} channels",
            planar.len()
        )));
    }
    let frames = planar.len() / channels;
    let split = (0..channels)
        .map(|ch| planar[ch * frames..(ch + 1) * frames].to_vec())
        .collect();

    let buffer = SampleBuffer::new(split, sample_rate).map_err(js_error)?;
    Ok(dsp::wav::encode(&buffer).into_bytes())
}

/// WASM-exposed: decode an audio file, pitch-shift it by `pitch_offset`
/// octaves and return the rendered clip as WAV bytes.
#[cfg(feature = "decode")]
#[wasm_bindgen]
pub fn render_harmony_wav(asset_bytes: &[u8], pitch_offset: f32) -> std::result::Result<Vec<u8>, JsValue> {
    let asset = asset::decode_audio(asset_bytes).map_err(js_error)?;
    let pipeline = dsp::renderer::OfflineRenderPipeline::default();
    Ok(pipeline.render_wav_blocking(&asset, pitch_offset).into_bytes())
}

/// WASM-exposed: parse the 44-byte header of a WAV byte array.
#[wasm_bindgen]
pub fn wav_header_info(bytes: &[u8]) -> std::result::Result<JsValue, JsValue> {
    let header = WavHeader::parse(bytes).ok_or_else(|| js_error("not a canonical PCM WAV header"))?;
    serde_wasm_bindgen::to_value(&header).map_err(js_error)
}
