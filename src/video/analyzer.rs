use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::VisualConfig;
use crate::grid::TimeGrid;
use crate::hash::BitHash;
use crate::media::FrameSource;
use crate::{diff, util, Result};

use super::extractor::{VisualFeatureExtractor, VisualFeatures};

// Sampling and label steps closer than this are considered equal.
const STEP_MISMATCH_TOLERANCE: f64 = 1e-6;

/// Features of a single sampled frame.
#[derive(Clone, Debug, PartialEq)]
pub struct VisualRecord {
    /// Zero-based index of the sample in the grid.
    pub index: usize,
    /// Time at which the frame was sampled, in seconds.
    pub time: f64,
    pub features: VisualFeatures,
}

/// The result of running a [VisualAnalyzer] over a whole stream.
///
/// A `VisualRun` only exists for runs that reached the end of the stream, so its
/// records always cover the full sampling grid, in order.
#[derive(Clone, Debug)]
pub struct VisualRun {
    pub sample_step: f64,
    pub label_step: f64,
    pub records: Vec<VisualRecord>,
}

impl VisualRun {
    /// Onset used to label the `i`-th row of the output tables.
    #[inline]
    pub fn onset(&self, i: usize) -> f64 {
        i as f64 * self.label_step
    }

    /// Perceptual hashes in timestamp order.
    pub fn phashes(&self) -> Vec<BitHash> {
        self.records
            .iter()
            .map(|r| r.features.hashes.phash.clone())
            .collect()
    }

    /// Perceptual difference of every frame to its predecessor, with `0.0` for the first
    /// frame.
    pub fn perceptual_diff(&self) -> Result<Vec<f64>> {
        diff::aligned_series(&self.phashes())
    }
}

/// Samples a video stream on a fixed grid and extracts [VisualFeatures] for every
/// sample.
///
/// Frames are decoded sequentially in batches of `config.batch_size`. Each batch is
/// then extracted in parallel when the `rayon` feature is enabled and `threading` is
/// set.
///
/// # Example
///
/// ```no_run
/// use confound::config::VisualConfig;
/// use confound::video::{VideoReader, VisualAnalyzer};
///
/// let mut reader = VideoReader::open("movie.mkv").unwrap();
/// let analyzer = VisualAnalyzer::new(VisualConfig::default()).unwrap();
/// let run = analyzer.run(&mut reader).unwrap();
/// let diff = run.perceptual_diff().unwrap();
/// ```
#[derive(Debug)]
pub struct VisualAnalyzer {
    extractor: VisualFeatureExtractor,
    threading: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl VisualAnalyzer {
    pub fn new(config: VisualConfig) -> Result<Self> {
        Ok(Self {
            extractor: VisualFeatureExtractor::new(config)?,
            threading: true,
            cancel: None,
        })
    }

    /// Returns a new [VisualAnalyzer] with `threading` set to the provided value.
    pub fn with_threading(mut self, threading: bool) -> Self {
        self.threading = threading;
        self
    }

    /// Returns a new [VisualAnalyzer] that stops with [crate::Error::Cancelled] once
    /// `cancel` is set.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Returns a new [VisualAnalyzer] that uses `extractor` for every frame.
    pub fn with_extractor(mut self, extractor: VisualFeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &VisualConfig {
        self.extractor.config()
    }

    /// Builds the sampling grid for a stream and returns it with the label step.
    pub fn grid(&self, source: &impl FrameSource) -> Result<(TimeGrid, f64)> {
        let info = source.info();
        let config = self.extractor.config();
        let sample_step = config.sample_step.unwrap_or(1.0 / info.rate);
        let grid = TimeGrid::new(info.duration, sample_step)?;
        let label_step = config.label_step.unwrap_or(sample_step);

        if (label_step - sample_step).abs() > STEP_MISMATCH_TOLERANCE {
            tracing::warn!(
                sample_step,
                label_step,
                "frames are sampled at a different step than the one used to label output rows"
            );
        }

        Ok((grid, label_step))
    }

    /// Runs this analyzer over the whole stream.
    pub fn run<S: FrameSource>(&self, mut source: S) -> Result<VisualRun> {
        let span = tracing::span!(tracing::Level::TRACE, "visual_run");
        let _enter = span.enter();

        let (grid, label_step) = self.grid(&source)?;
        let batch_size = self.extractor.config().batch_size;

        tracing::debug!(
            samples = grid.len(),
            sample_step = grid.step(),
            label_step,
            "starting frame processing"
        );

        let mut records = Vec::new();
        for start in (0..grid.len()).step_by(batch_size) {
            let batch = start..start.saturating_add(batch_size).min(grid.len());
            util::check_cancelled(self.cancel.as_deref())?;

            let mut frames = Vec::with_capacity(batch.len());
            for i in batch {
                let t = grid.at(i).unwrap_or_default();
                frames.push((i, t, source.frame_at(t)?));
            }

            let features = util::map_ordered(&frames, self.threading, |(_, _, frame)| {
                self.extractor.extract(frame)
            })?;

            records.extend(
                frames
                    .iter()
                    .zip(features)
                    .map(|((index, time, _), features)| VisualRecord {
                        index: *index,
                        time: *time,
                        features,
                    }),
            );
        }

        tracing::debug!(records = records.len(), "completed frame processing");

        Ok(VisualRun {
            sample_step: grid.step(),
            label_step,
            records,
        })
    }
}
