use crate::config::VisualConfig;
use crate::hash::BitHash;
use crate::Result;

use super::frame::VisualFrame;
use super::luminance::QuadrantFeatures;
use super::phash::{build_hasher, FrameHasher};

/// Identifying hashes of a cropped frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHashes {
    /// MD5 digest of the raw cropped RGB bytes, as 32 hex digits. Any change in the
    /// decoded pixels changes it.
    pub md5: String,
    /// Perceptual hash of the same region.
    pub phash: BitHash,
}

/// Everything extracted from a single frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisualFeatures {
    pub quadrants: QuadrantFeatures,
    pub hashes: FrameHashes,
}

/// Computes quadrant luminance and frame hashes for individual frames.
///
/// Frames are cropped to `config.crop` first to exclude letterbox bars, so that
/// renderings with black and gray bars produce the same features. The extractor holds
/// no per-frame state and can be shared across threads.
pub struct VisualFeatureExtractor {
    config: VisualConfig,
    hasher: Box<dyn FrameHasher>,
}

impl std::fmt::Debug for VisualFeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualFeatureExtractor")
            .field("config", &self.config)
            .field("hash_bits", &self.hasher.bits())
            .finish()
    }
}

impl VisualFeatureExtractor {
    /// Constructs an extractor, validating the configuration.
    pub fn new(config: VisualConfig) -> Result<Self> {
        config.validate()?;
        let hasher = build_hasher(config.hash_algorithm, config.phash);
        Ok(Self { config, hasher })
    }

    /// Returns a new [VisualFeatureExtractor] that uses the provided hasher instead of
    /// the configured one.
    pub fn with_hasher(mut self, hasher: Box<dyn FrameHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn config(&self) -> &VisualConfig {
        &self.config
    }

    /// Number of bits in each perceptual hash.
    pub fn hash_bits(&self) -> usize {
        self.hasher.bits()
    }

    /// Extracts the quadrant luminance of a frame.
    pub fn quadrants(&self, frame: &VisualFrame) -> Result<QuadrantFeatures> {
        let view = frame.crop(self.config.crop)?;
        QuadrantFeatures::from_view(&view, self.config.split, self.config.rounding)
    }

    /// Computes the content and perceptual hash of a frame.
    pub fn hashes(&self, frame: &VisualFrame) -> Result<FrameHashes> {
        let view = frame.crop(self.config.crop)?;
        Ok(FrameHashes {
            md5: format!("{:x}", md5::compute(view.data())),
            phash: self.hasher.hash(&view)?,
        })
    }

    /// Extracts all features of a frame.
    pub fn extract(&self, frame: &VisualFrame) -> Result<VisualFeatures> {
        let view = frame.crop(self.config.crop)?;
        let quadrants = QuadrantFeatures::from_view(&view, self.config.split, self.config.rounding)?;
        let hashes = FrameHashes {
            md5: format!("{:x}", md5::compute(view.data())),
            phash: self.hasher.hash(&view)?,
        };
        Ok(VisualFeatures { quadrants, hashes })
    }
}
