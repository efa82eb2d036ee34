//! WAV encoder: serializes a SampleBuffer into a 16-bit PCM RIFF/WAVE blob.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::buffer::SampleBuffer;

pub const WAV_MIME_TYPE: &str = "audio/wav";
pub const WAV_HEADER_LEN: usize = 44;
const BITS_PER_SAMPLE: u16 = 16;

/// Order in which channel data is written to the data chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    /// All of channel 0, then all of channel 1, ... The header still declares
    /// ordinary PCM, so players read multichannel output as interleaved.
    /// Kept as the default for byte compatibility with clips produced so far.
    #[default]
    Planar,
    /// Standard frame-major interleaving.
    Interleaved,
}

/// An encoded, immutable WAV file held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioBlob {
    mime_type: &'static str,
    bytes: Vec<u8>,
}

impl EncodedAudioBlob {
    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:` URL that an `<audio>` element can play directly.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// Pure SampleBuffer → WAV encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavEncoder {
    layout: ChannelLayout,
}

impl WavEncoder {
    pub fn new(layout: ChannelLayout) -> Self {
        WavEncoder { layout }
    }

    pub fn interleaved() -> Self {
        Self::new(ChannelLayout::Interleaved)
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Encode the buffer. Total length is always
    /// `44 + frame_count * channel_count * 2`.
    ///
    /// The header's 32-bit size fields cap the PCM data at just under
    /// 4 GiB, and channel counts at 65535. Past either limit the sample
    /// bytes are still written but the header fields saturate, so the
    /// file no longer describes itself.
    pub fn encode(&self, buffer: &SampleBuffer) -> EncodedAudioBlob {
        let flat = match self.layout {
            ChannelLayout::Planar => buffer.channels().flatten().copied().collect::<Vec<f32>>(),
            ChannelLayout::Interleaved => buffer.to_interleaved(),
        };
        let pcm: Vec<i16> = flat.iter().map(|&s| quantize(s)).collect();
        let channels = u16::try_from(buffer.channel_count()).unwrap_or_else(|_| {
            log::warn!("{} channels do not fit a WAV header", buffer.channel_count());
            u16::MAX
        });
        let bytes = encode_pcm16(&pcm, buffer.sample_rate(), channels);

        EncodedAudioBlob {
            mime_type: WAV_MIME_TYPE,
            bytes,
        }
    }
}

/// Encode with the default (planar) layout.
pub fn encode(buffer: &SampleBuffer) -> EncodedAudioBlob {
    WavEncoder::default().encode(buffer)
}

/// Clamp to [-1, 1] and scale to 16-bit. NaN maps to 0.
pub fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// RIFF chunk size and data chunk size for `data_bytes` of PCM,
/// saturated to what the 32-bit fields can hold.
fn chunk_sizes(data_bytes: usize) -> (u32, u32) {
    let data_size = u32::try_from(data_bytes).unwrap_or(u32::MAX).min(u32::MAX - 36);
    if data_size as usize != data_bytes {
        log::warn!("{data_bytes} bytes of PCM exceed the WAV size fields");
    }
    (36 + data_size, data_size)
}

/// Write 16-bit PCM samples, in the given order, behind a canonical 44-byte header.
fn encode_pcm16(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bytes_per_sample = BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate.saturating_mul(u32::from(channels) * u32::from(bytes_per_sample));
    let block_align = channels.saturating_mul(bytes_per_sample);
    let (file_size, data_size) = chunk_sizes(samples.len() * 2);

    let mut buf = Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}

/// Fields of a canonical 44-byte PCM header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WavHeader {
    pub riff_size: u32,
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Parse the header of a blob laid out like the ones this module writes.
    /// Returns `None` if the magic tags or length do not match.
    pub fn parse(bytes: &[u8]) -> Option<WavHeader> {
        if bytes.len() < WAV_HEADER_LEN
            || &bytes[0..4] != b"RIFF"
            || &bytes[8..12] != b"WAVE"
            || &bytes[12..16] != b"fmt "
            || &bytes[36..40] != b"data"
        {
            return None;
        }
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

        Some(WavHeader {
            riff_size: u32_at(4),
            format_tag: u16_at(20),
            channels: u16_at(22),
            sample_rate: u32_at(24),
            byte_rate: u32_at(28),
            block_align: u16_at(32),
            bits_per_sample: u16_at(34),
            data_size: u32_at(40),
        })
    }

    /// Frames described by the data chunk.
    pub fn frame_count(&self) -> u32 {
        if self.block_align == 0 {
            0
        } else {
            self.data_size / self.block_align as u32
        }
    }
}
