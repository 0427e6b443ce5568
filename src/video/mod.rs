//! Visual confounds: quadrant luminance, content hashes and perceptual hashes.

mod analyzer;
mod decoder;
mod extractor;
mod frame;
mod luminance;
mod phash;

pub use analyzer::{VisualAnalyzer, VisualRecord, VisualRun};
pub use decoder::VideoReader;
pub use extractor::{FrameHashes, VisualFeatureExtractor, VisualFeatures};
pub use frame::{FrameView, VisualFrame};
pub use luminance::{perceived_luminance, QuadrantFeatures};
pub use phash::{build_hasher, BlockHasher, DctHasher, FrameHasher};
