//! Live microphone graph: capture → pitch shift → playback, with the
//! devices behind the [`AudioHost`] trait.

pub mod controller;
#[cfg(feature = "device")]
pub mod cpal_host;
pub mod host;
pub mod loopback;

pub use controller::{Connection, GraphNode, LiveGraphController, LiveGraphState};
#[cfg(feature = "device")]
pub use cpal_host::{CpalHost, CpalStream};
pub use host::{AudioHost, CaptureSink, LiveGraph, LiveStats};
pub use loopback::LoopbackHost;
