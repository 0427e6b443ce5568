//! Audio confounds: RMS power and left/right loudness difference per chunk.

mod analyzer;
mod decoder;
mod features;

pub use analyzer::{AudioAnalyzer, AudioRecord, AudioRun};
pub use decoder::AudioReader;
pub use features::{AudioChunk, AudioFeatureExtractor, AudioFeatures};
