//! Extraction configuration.
//!
//! Every tunable of the pipeline lives here and is passed explicitly into the analyzers
//! and extractors. The defaults reproduce the reference tables for the 1280x720 movie
//! stimulus (letterbox bars above row 90 and below row 630, 40 ms output grid).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default output label step (seconds) for visual tables and the audio chunk step.
pub const DEFAULT_STEP: f64 = 0.04;

/// Default audio sample rate used when resampling the audio track.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default amount of audio excluded from the end of the stream (seconds). The last few
/// frames after the fade-out carry no audio.
pub const DEFAULT_AUDIO_TAIL_TRIM: f64 = 0.120;

/// Default number of frames or chunks decoded before they are extracted in parallel.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Rows `[top, bottom)` kept from each frame; the full width is always kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRange {
    pub top: u32,
    pub bottom: u32,
}

impl CropRange {
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

impl Default for CropRange {
    fn default() -> Self {
        Self {
            top: 90,
            bottom: 630,
        }
    }
}

/// Quadrant boundaries, relative to the cropped frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadrantSplit {
    pub row: u32,
    pub col: u32,
}

impl Default for QuadrantSplit {
    fn default() -> Self {
        Self { row: 270, col: 640 }
    }
}

/// How quadrant means are rounded to integers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rounding {
    /// Ties go to the nearest even integer (`2.5 -> 2`, `3.5 -> 4`). This matches the
    /// reference tables.
    #[default]
    HalfEven,
    /// Ties go away from zero (`2.5 -> 3`).
    HalfAwayFromZero,
}

impl Rounding {
    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Rounding::HalfEven => value.round_ties_even(),
            Rounding::HalfAwayFromZero => value.round(),
        }
    }
}

/// Perceptual hash algorithm applied to the cropped frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    /// DCT-based perceptual hash with `hash_size * hash_size` bits.
    #[default]
    Dct,
    /// Block mean hash, always 144 bits.
    Block,
}

/// Parameters of the DCT perceptual hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhashConfig {
    /// Side of the bit matrix. The hash has `hash_size^2` bits.
    pub hash_size: u32,
    /// The frame is downscaled to `hash_size * high_freq_factor` pixels per side
    /// before the DCT.
    pub high_freq_factor: u32,
}

impl Default for PhashConfig {
    fn default() -> Self {
        Self {
            hash_size: 12,
            high_freq_factor: 4,
        }
    }
}

/// Configuration of the visual feature pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub crop: CropRange,
    pub split: QuadrantSplit,
    pub phash: PhashConfig,
    pub hash_algorithm: HashAlgorithm,
    pub rounding: Rounding,
    /// Sampling step (seconds). `None` samples every native frame (`1 / fps`).
    pub sample_step: Option<f64>,
    /// Step used for the onset column of output tables. `None` labels rows with the
    /// sampling step.
    pub label_step: Option<f64>,
    pub batch_size: usize,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            crop: CropRange::default(),
            split: QuadrantSplit::default(),
            phash: PhashConfig::default(),
            hash_algorithm: HashAlgorithm::default(),
            rounding: Rounding::default(),
            sample_step: None,
            label_step: Some(DEFAULT_STEP),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl VisualConfig {
    /// Checks the configuration for errors that do not depend on the decoded frames.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidParameter(msg));

        if self.crop.top >= self.crop.bottom {
            return invalid(format!(
                "crop top ({}) must be less than crop bottom ({})",
                self.crop.top, self.crop.bottom
            ));
        }
        if self.split.row == 0 || self.split.row >= self.crop.height() {
            return invalid(format!(
                "quadrant split row ({}) must lie inside the cropped height ({})",
                self.split.row,
                self.crop.height()
            ));
        }
        if self.split.col == 0 {
            return invalid("quadrant split column must be positive".to_owned());
        }
        if self.phash.hash_size < 2 {
            return invalid(format!(
                "hash size must be at least 2, got {}",
                self.phash.hash_size
            ));
        }
        if self.phash.high_freq_factor == 0 {
            return invalid("high frequency factor must be positive".to_owned());
        }
        for (name, step) in [("sample", self.sample_step), ("label", self.label_step)] {
            if let Some(step) = step {
                if !step.is_finite() || step <= 0.0 {
                    return invalid(format!("{} step must be positive, got {}", name, step));
                }
            }
        }
        if self.batch_size == 0 {
            return invalid("batch size must be positive".to_owned());
        }
        Ok(())
    }
}

/// Configuration of the audio feature pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate the audio track is resampled to.
    pub sample_rate: u32,
    /// Chunk duration (seconds). Also used as the onset step of the output tables.
    pub step: f64,
    /// Seconds dropped from the end of the stream before building the grid.
    pub tail_trim: f64,
    pub batch_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            step: DEFAULT_STEP,
            tail_trim: DEFAULT_AUDIO_TAIL_TRIM,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl AudioConfig {
    /// Number of samples in a single chunk.
    pub fn chunk_len(&self) -> usize {
        (self.step * f64::from(self.sample_rate)).round() as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidParameter(
                "sample rate must be positive".to_owned(),
            ));
        }
        if !self.step.is_finite() || self.step <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "chunk step must be positive, got {}",
                self.step
            )));
        }
        if self.chunk_len() == 0 {
            return Err(Error::InvalidParameter(format!(
                "chunk step {} is shorter than one sample at {} Hz",
                self.step, self.sample_rate
            )));
        }
        if !self.tail_trim.is_finite() || self.tail_trim < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "tail trim must be non-negative, got {}",
                self.tail_trim
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidParameter(
                "batch size must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration, loadable from a JSON file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub visual: VisualConfig,
    pub audio: AudioConfig,
}

impl Config {
    /// Loads a configuration file. Missing fields take their default values.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let f = std::fs::File::open(path.as_ref())?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(f))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.visual.validate()?;
        self.audio.validate()
    }
}
