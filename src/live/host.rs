//! Host abstraction for the live graph and the two lock-free ends that
//! cross into the audio threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::{HeapCons, HeapProd};

use crate::dsp::buffer::BlockBuffer;
use crate::dsp::pitch_shift::{PitchShiftTransform, StreamSpec};
use crate::error::Result;

/// Something that can capture from a microphone and play to a speaker.
///
/// The returned handles own the devices: dropping `Input` releases the
/// capture device, dropping `Output` disconnects the graph from the
/// playback destination.
pub trait AudioHost {
    type Input;
    type Output;

    /// Start capturing into `sink`. Denied or missing devices are
    /// [`ToneError::DeviceAcquisition`](crate::error::ToneError::DeviceAcquisition).
    fn open_input(&mut self, spec: StreamSpec, sink: CaptureSink) -> Result<Self::Input>;

    /// Start pulling blocks from `graph` into the playback destination.
    fn open_output(&mut self, spec: StreamSpec, graph: LiveGraph) -> Result<Self::Output>;
}

/// Overrun/underrun counters shared with the audio threads.
#[derive(Debug, Default)]
pub struct LiveStats {
    dropped_frames: AtomicU64,
    underrun_frames: AtomicU64,
}

impl LiveStats {
    /// Captured frames discarded because the graph fell behind.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Output frames filled with silence because no input was ready.
    pub fn underrun_frames(&self) -> u64 {
        self.underrun_frames.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.dropped_frames.store(0, Ordering::Relaxed);
        self.underrun_frames.store(0, Ordering::Relaxed);
    }
}

/// Capture end of the graph: the input callback pushes frames here.
pub struct CaptureSink {
    producer: HeapProd<f32>,
    channels: usize,
    stats: Arc<LiveStats>,
}

impl CaptureSink {
    pub(crate) fn new(producer: HeapProd<f32>, channels: usize, stats: Arc<LiveStats>) -> Self {
        CaptureSink {
            producer,
            channels,
            stats,
        }
    }

    /// Push interleaved frames recorded with `source_channels` channels,
    /// mapping them onto the graph's channel count. Only whole frames are
    /// queued; the rest are counted as dropped. Returns frames accepted.
    pub fn push_frames(&mut self, data: &[f32], source_channels: usize) -> usize {
        if source_channels == 0 {
            return 0;
        }
        let frames = data.len() / source_channels;
        let room = self.producer.vacant_len() / self.channels;
        let accepted = frames.min(room);

        for frame in data.chunks_exact(source_channels).take(accepted) {
            for ch in 0..self.channels {
                // Mono sources fan out; extra source channels are ignored
                let _ = self.producer.try_push(frame[ch.min(source_channels - 1)]);
            }
        }

        if accepted < frames {
            self.stats
                .dropped_frames
                .fetch_add((frames - accepted) as u64, Ordering::Relaxed);
        }
        accepted
    }
}

/// Playback end of the graph: source queue → pitch shift → destination.
///
/// Owned by the playback callback. Processing never allocates.
pub struct LiveGraph {
    spec: StreamSpec,
    input: HeapCons<f32>,
    transform: Box<dyn PitchShiftTransform>,
    block: BlockBuffer,
    scratch: Vec<f32>,
    stats: Arc<LiveStats>,
}

impl LiveGraph {
    pub(crate) fn new(
        spec: StreamSpec,
        block_size: usize,
        input: HeapCons<f32>,
        transform: Box<dyn PitchShiftTransform>,
        stats: Arc<LiveStats>,
    ) -> Self {
        LiveGraph {
            spec,
            input,
            transform,
            block: BlockBuffer::new(spec.channels, block_size),
            scratch: vec![0.0; spec.channels * block_size],
            stats,
        }
    }

    pub fn spec(&self) -> StreamSpec {
        self.spec
    }

    /// Fill `out`, interleaved with `out_channels` channels, with shifted
    /// input. Missing input is rendered as silence.
    pub fn render_frames(&mut self, out: &mut [f32], out_channels: usize) {
        if out_channels == 0 {
            return;
        }
        let channels = self.spec.channels;
        let block_frames = self.block.capacity();

        for chunk in out.chunks_mut(block_frames * out_channels) {
            let frames = chunk.len() / out_channels;
            let wanted = frames * channels;

            let ready = (self.input.occupied_len() / channels).min(frames) * channels;
            let got = self.input.pop_slice(&mut self.scratch[..ready]);
            self.scratch[got..wanted].fill(0.0);
            if got < wanted {
                self.stats
                    .underrun_frames
                    .fetch_add(((wanted - got) / channels) as u64, Ordering::Relaxed);
            }

            self.block.set_frames(frames);
            self.block.read_interleaved(&self.scratch[..wanted]);
            self.transform.process_block(&mut self.block);

            if out_channels == channels {
                self.block.write_interleaved(chunk);
            } else {
                for (frame, slot) in chunk.chunks_exact_mut(out_channels).enumerate() {
                    for (ch, sample) in slot.iter_mut().enumerate() {
                        *sample = self.block.channel(ch.min(channels - 1))[frame];
                    }
                }
            }
            // Trailing partial frame, if any
            chunk[frames * out_channels..].fill(0.0);
        }
    }
}
