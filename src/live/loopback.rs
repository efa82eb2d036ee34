//! In-process host driven by the caller instead of a sound card.
//!
//! `capture` plays the role of the microphone callback and `playback` the
//! role of the speaker callback. Useful headless and in tests, including
//! simulating a denied microphone.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::host::{AudioHost, CaptureSink, LiveGraph};
use crate::dsp::pitch_shift::StreamSpec;
use crate::error::{Result, ToneError};

#[derive(Default)]
struct LoopbackState {
    sink: Mutex<Option<CaptureSink>>,
    graph: Mutex<Option<LiveGraph>>,
    open_inputs: AtomicUsize,
    open_outputs: AtomicUsize,
    acquisitions: AtomicUsize,
    deny_input: AtomicBool,
    fail_output: AtomicBool,
}

/// Cloneable handle; clones share the same "devices".
#[derive(Clone, Default)]
pub struct LoopbackHost {
    state: Arc<LoopbackState>,
}

impl LoopbackHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse microphone access, as a user denying the permission prompt would.
    pub fn deny_input(&self, deny: bool) {
        self.state.deny_input.store(deny, Ordering::SeqCst);
    }

    /// Make the playback destination unavailable.
    pub fn fail_output(&self, fail: bool) {
        self.state.fail_output.store(fail, Ordering::SeqCst);
    }

    /// Capture handles currently held.
    pub fn open_inputs(&self) -> usize {
        self.state.open_inputs.load(Ordering::SeqCst)
    }

    /// Playback connections currently held.
    pub fn open_outputs(&self) -> usize {
        self.state.open_outputs.load(Ordering::SeqCst)
    }

    /// Successful microphone acquisitions since creation.
    pub fn acquisitions(&self) -> usize {
        self.state.acquisitions.load(Ordering::SeqCst)
    }

    /// Feed interleaved frames as if the microphone recorded them.
    /// Returns frames accepted; zero when nothing is capturing.
    pub fn capture(&self, data: &[f32], channels: usize) -> usize {
        match self.state.sink.lock().as_mut() {
            Some(sink) => sink.push_frames(data, channels),
            None => 0,
        }
    }

    /// Pull interleaved frames as the speaker would. Fills silence and
    /// returns `false` when no graph is connected.
    pub fn playback(&self, out: &mut [f32], channels: usize) -> bool {
        match self.state.graph.lock().as_mut() {
            Some(graph) => {
                graph.render_frames(out, channels);
                true
            }
            None => {
                out.fill(0.0);
                false
            }
        }
    }
}

/// Held microphone. Dropping it stops capture.
pub struct LoopbackInput {
    state: Arc<LoopbackState>,
}

impl Drop for LoopbackInput {
    fn drop(&mut self) {
        self.state.sink.lock().take();
        self.state.open_inputs.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Held playback connection. Dropping it disconnects the graph.
pub struct LoopbackOutput {
    state: Arc<LoopbackState>,
}

impl Drop for LoopbackOutput {
    fn drop(&mut self) {
        self.state.graph.lock().take();
        self.state.open_outputs.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AudioHost for LoopbackHost {
    type Input = LoopbackInput;
    type Output = LoopbackOutput;

    fn open_input(&mut self, _spec: StreamSpec, sink: CaptureSink) -> Result<LoopbackInput> {
        if self.state.deny_input.load(Ordering::SeqCst) {
            return Err(ToneError::DeviceAcquisition("microphone permission denied".into()));
        }
        *self.state.sink.lock() = Some(sink);
        self.state.open_inputs.fetch_add(1, Ordering::SeqCst);
        self.state.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(LoopbackInput {
            state: self.state.clone(),
        })
    }

    fn open_output(&mut self, _spec: StreamSpec, graph: LiveGraph) -> Result<LoopbackOutput> {
        if self.state.fail_output.load(Ordering::SeqCst) {
            return Err(ToneError::DeviceAcquisition("no playback device".into()));
        }
        *self.state.graph.lock() = Some(graph);
        self.state.open_outputs.fetch_add(1, Ordering::SeqCst);
        Ok(LoopbackOutput {
            state: self.state.clone(),
        })
    }
}
