//! Asset loading: fetch the source clip and decode it into a SampleBuffer.
//!
//! Decoding needs only the `decode` feature. Fetching and the disk cache
//! come with `assets`.

#[cfg(feature = "assets")]
pub mod cache;
pub mod decode;
#[cfg(feature = "assets")]
pub mod source;

#[cfg(feature = "assets")]
pub use cache::AssetCache;
pub use decode::decode_audio;
#[cfg(feature = "assets")]
pub use source::{AssetSource, FileAssetSource, HttpAssetSource};
