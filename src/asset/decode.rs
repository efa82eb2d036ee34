//! Audio decoding: RIFF/WAVE via hound, MPEG audio via minimp3.

use std::io::Cursor;

use hound::{SampleFormat, WavReader};
use minimp3::{Decoder, Error as Mp3Error, Frame};

use crate::dsp::buffer::SampleBuffer;
use crate::error::{Result, ToneError};

/// Decode an in-memory audio file into planar float samples.
///
/// The container is sniffed from the bytes: a `RIFF....WAVE` header is read
/// as WAV, anything else is tried as MP3.
pub fn decode_audio(bytes: &[u8]) -> Result<SampleBuffer> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        decode_wav(bytes)
    } else {
        decode_mp3(bytes)
    }
}

fn decode_wav(bytes: &[u8]) -> Result<SampleBuffer> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    log::debug!(
        "decoding wav: {} ch, {} Hz, {} bit {:?}",
        spec.channels,
        spec.sample_rate,
        spec.bits_per_sample,
        spec.sample_format
    );

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, bits @ 1..=32) => {
            let scale = (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
        (format, bits) => {
            return Err(ToneError::Decode(format!(
                "unsupported wav sample format {format:?} at {bits} bits"
            )));
        }
    };

    SampleBuffer::from_interleaved(&samples, spec.channels as usize, spec.sample_rate)
        .map_err(|e| ToneError::Decode(e.to_string()))
}

fn decode_mp3(bytes: &[u8]) -> Result<SampleBuffer> {
    let mut decoder = Decoder::new(Cursor::new(bytes));
    let mut pcm: Vec<i16> = Vec::new();
    let mut format: Option<(usize, u32)> = None;

    loop {
        match decoder.next_frame() {
            Ok(Frame {
                data,
                sample_rate,
                channels,
                ..
            }) => {
                let frame_format = (channels, sample_rate as u32);
                match format {
                    None => format = Some(frame_format),
                    // Mid-stream format changes are not supported; keep what we have
                    Some(f) if f != frame_format => {
                        log::warn!("mp3 format changed mid-stream from {f:?} to {frame_format:?}, truncating");
                        break;
                    }
                    Some(_) => {}
                }
                pcm.extend_from_slice(&data);
            }
            Err(Mp3Error::Eof) => break,
            Err(Mp3Error::SkippedData) => continue,
            Err(e) => return Err(ToneError::Decode(format!("mp3: {e:?}"))),
        }
    }

    let (channels, sample_rate) =
        format.ok_or_else(|| ToneError::Decode("no decodable audio frames found".into()))?;
    log::debug!("decoded mp3: {channels} ch, {sample_rate} Hz, {} samples", pcm.len());

    SampleBuffer::from_i16(&pcm, channels, sample_rate).map_err(|e| ToneError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::wav::WavEncoder;

    #[test]
    fn decodes_our_own_wav() {
        let original = SampleBuffer::new(vec![vec![0.0, 0.5, -0.5, 1.0], vec![0.25, -0.25, 0.75, -1.0]], 22050).unwrap();
        let wav = WavEncoder::interleaved().encode(&original);
        let decoded = decode_audio(wav.as_bytes()).unwrap();

        assert_eq!(decoded.channel_count(), 2);
        assert_eq!(decoded.frame_count(), 4);
        assert_eq!(decoded.sample_rate(), 22050);
        for ch in 0..2 {
            for (a, b) in original.channel(ch).iter().zip(decoded.channel(ch)) {
                assert!((a - b).abs() < 1e-3, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn decodes_float_wav() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0.1f32, -0.2, 0.3] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        let decoded = decode_audio(cursor.get_ref()).unwrap();
        assert_eq!(decoded.channel(0), &[0.1, -0.2, 0.3]);
        assert_eq!(decoded.sample_rate(), 16000);
    }

    #[test]
    fn garbage_is_a_decode_failure() {
        let err = decode_audio(&[0x13u8; 512]).unwrap_err();
        assert!(matches!(err, ToneError::Decode(_)), "{err:?}");
    }

    #[test]
    fn empty_input_is_a_decode_failure() {
        assert!(matches!(decode_audio(&[]), Err(ToneError::Decode(_))));
    }

    #[test]
    fn truncated_wav_is_a_decode_failure() {
        let wav = b"RIFF\x24\x00\x00\x00WAVEfmt ";
        assert!(matches!(decode_audio(wav), Err(ToneError::Decode(_))));
    }
}
