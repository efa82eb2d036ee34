//! DSP: sample buffers, the pitch-shift transform, offline rendering,
//! WAV encoding and pitch tracking.
//!
//! Everything here is pure Rust with no I/O, so the same code runs in the
//! browser (via WASM) and natively.

pub mod buffer;
pub mod pitch_shift;
pub mod pitch_track;
pub mod renderer;
pub mod wav;
