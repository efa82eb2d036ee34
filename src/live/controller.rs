//! Start/stop lifecycle of the live microphone graph.

use std::sync::Arc;

use ringbuf::HeapRb;
use ringbuf::traits::Split;
use serde::Serialize;

use super::host::{AudioHost, CaptureSink, LiveGraph, LiveStats};
use crate::dsp::pitch_shift::{DelayLineShifterFactory, PitchParam, PitchShiftFactory, StreamSpec};
use crate::dsp::renderer::DEFAULT_BLOCK_SIZE;
use crate::error::Result;

/// Blocks of capture the queue can hold before frames are dropped.
const QUEUE_BLOCKS: usize = 8;

/// A node of the live graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GraphNode {
    Source,
    PitchShift,
    Destination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub from: GraphNode,
    pub to: GraphNode,
}

/// Snapshot of the controller for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveGraphState {
    pub running: bool,
    pub pitch_offset: f32,
    pub dropped_frames: u64,
    pub underrun_frames: u64,
}

struct Session<H: AudioHost> {
    input: H::Input,
    output: H::Output,
}

/// Owns the microphone and the playback connection while running.
///
/// Either both are held or neither is. The pitch parameter outlives
/// sessions, so an offset set while stopped applies on the next start.
pub struct LiveGraphController<H: AudioHost> {
    host: H,
    spec: StreamSpec,
    block_size: usize,
    factory: Arc<dyn PitchShiftFactory>,
    param: Arc<PitchParam>,
    stats: Arc<LiveStats>,
    session: Option<Session<H>>,
}

impl<H: AudioHost> LiveGraphController<H> {
    pub fn new(host: H, spec: StreamSpec) -> Self {
        Self::with_factory(host, spec, Arc::new(DelayLineShifterFactory::default()))
    }

    pub fn with_factory(host: H, spec: StreamSpec, factory: Arc<dyn PitchShiftFactory>) -> Self {
        LiveGraphController {
            host,
            spec,
            block_size: DEFAULT_BLOCK_SIZE,
            factory,
            param: PitchParam::shared(0.0),
            stats: Arc::new(LiveStats::default()),
            session: None,
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn spec(&self) -> StreamSpec {
        self.spec
    }

    pub fn stats(&self) -> &LiveStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Acquire the microphone and wire source → pitch shift → destination.
    ///
    /// No-op when already running. On failure, including a spec with no
    /// channels or a zero sample rate, nothing stays acquired and the
    /// controller remains stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            log::debug!("live graph already running");
            return Ok(());
        }
        self.spec.validate().inspect_err(|e| {
            log::warn!("refusing to start live graph: {e}");
        })?;

        let channels = self.spec.channels;
        let ring = HeapRb::<f32>::new(self.block_size * channels * QUEUE_BLOCKS);
        let (producer, consumer) = ring.split();
        self.stats.reset();

        let sink = CaptureSink::new(producer, channels, self.stats.clone());
        let input = self.host.open_input(self.spec, sink).inspect_err(|e| {
            log::warn!("could not acquire microphone: {e}");
        })?;

        let transform = self.factory.create(self.spec, self.param.clone());
        let graph = LiveGraph::new(self.spec, self.block_size, consumer, transform, self.stats.clone());
        let output = match self.host.open_output(self.spec, graph) {
            Ok(output) => output,
            Err(e) => {
                log::warn!("could not connect playback: {e}");
                drop(input);
                return Err(e);
            }
        };

        self.session = Some(Session { input, output });
        log::info!(
            "live graph started: {} ch @ {} Hz, offset {}",
            self.spec.channels,
            self.spec.sample_rate,
            self.param.get()
        );
        Ok(())
    }

    /// Disconnect the graph and release the microphone. No-op when stopped.
    pub fn stop(&mut self) {
        if let Some(Session { input, output }) = self.session.take() {
            drop(output);
            drop(input);
            log::info!("live graph stopped");
        }
    }

    /// Set the live pitch offset. Audible from the next processed block
    /// when running, otherwise kept for the next start. Non-finite values
    /// are rejected and leave the current offset in place.
    pub fn set_pitch_offset(&self, value: f32) -> bool {
        let accepted = self.param.set(value);
        if accepted {
            log::debug!("live pitch offset set to {}", self.param.get());
        } else {
            log::warn!("ignoring invalid pitch offset {value}");
        }
        accepted
    }

    pub fn pitch_offset(&self) -> f32 {
        self.param.get()
    }

    /// Edges currently wired, source first. Empty when stopped.
    pub fn connections(&self) -> Vec<Connection> {
        if self.session.is_none() {
            return Vec::new();
        }
        vec![
            Connection {
                from: GraphNode::Source,
                to: GraphNode::PitchShift,
            },
            Connection {
                from: GraphNode::PitchShift,
                to: GraphNode::Destination,
            },
        ]
    }

    pub fn state(&self) -> LiveGraphState {
        LiveGraphState {
            running: self.is_running(),
            pitch_offset: self.param.get(),
            dropped_frames: self.stats.dropped_frames(),
            underrun_frames: self.stats.underrun_frames(),
        }
    }
}

impl<H: AudioHost> Drop for LiveGraphController<H> {
    fn drop(&mut self) {
        self.stop();
    }
}
