use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::AudioConfig;
use crate::grid::TimeGrid;
use crate::media::ChunkSource;
use crate::{util, Error, Result};

use super::features::{AudioFeatureExtractor, AudioFeatures};

/// Features of a single audio chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioRecord {
    pub index: usize,
    /// Start of the chunk, in seconds.
    pub onset: f64,
    pub features: AudioFeatures,
}

/// The result of running an [AudioAnalyzer] over a whole stream.
#[derive(Clone, Debug)]
pub struct AudioRun {
    /// Chunk duration, which is also the row duration of the output tables.
    pub step: f64,
    pub records: Vec<AudioRecord>,
}

/// Splits an audio stream into consecutive fixed-size chunks and computes
/// [AudioFeatures] for each.
///
/// The last `config.tail_trim` seconds of the stream are skipped. Every remaining grid
/// point must yield a full chunk; a truncated chunk aborts the run rather than leaving
/// a gap in the output.
#[derive(Debug)]
pub struct AudioAnalyzer {
    config: AudioConfig,
    extractor: AudioFeatureExtractor,
    threading: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl AudioAnalyzer {
    pub fn new(config: AudioConfig) -> Result<Self> {
        config.validate()?;
        let extractor = AudioFeatureExtractor::new(config.chunk_len())?;
        Ok(Self {
            config,
            extractor,
            threading: true,
            cancel: None,
        })
    }

    /// Returns a new [AudioAnalyzer] with `threading` set to the provided value.
    pub fn with_threading(mut self, threading: bool) -> Self {
        self.threading = threading;
        self
    }

    /// Returns a new [AudioAnalyzer] that stops with [Error::Cancelled] once `cancel`
    /// is set.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Builds the chunk grid for a stream.
    pub fn grid(&self, source: &impl ChunkSource) -> Result<TimeGrid> {
        let info = source.info();
        let duration = info.duration - self.config.tail_trim;
        if duration < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "stream duration ({:.3}s) is shorter than the trimmed tail ({:.3}s)",
                info.duration, self.config.tail_trim
            )));
        }
        if (info.rate - f64::from(self.config.sample_rate)).abs() > f64::EPSILON {
            return Err(Error::InvalidParameter(format!(
                "source delivers {} Hz audio, expected {} Hz",
                info.rate, self.config.sample_rate
            )));
        }
        TimeGrid::new(duration, self.config.step)
    }

    /// Runs this analyzer over the whole stream.
    pub fn run<S: ChunkSource>(&self, mut source: S) -> Result<AudioRun> {
        let span = tracing::span!(tracing::Level::TRACE, "audio_run");
        let _enter = span.enter();

        let grid = self.grid(&source)?;
        let chunk_len = self.extractor.chunk_len();

        tracing::debug!(
            chunks = grid.len(),
            chunk_len,
            step = grid.step(),
            "starting audio processing"
        );

        let batch_size = self.config.batch_size;
        let mut records = Vec::new();
        for start in (0..grid.len()).step_by(batch_size) {
            let batch = start..start.saturating_add(batch_size).min(grid.len());
            util::check_cancelled(self.cancel.as_deref())?;

            let mut chunks = Vec::with_capacity(batch.len());
            for i in batch {
                let t = grid.at(i).unwrap_or_default();
                chunks.push((i, t, source.audio_chunk(t, chunk_len)?));
            }

            let features = util::map_ordered(&chunks, self.threading, |(_, _, chunk)| {
                self.extractor.extract(chunk)
            })?;

            records.extend(
                chunks
                    .iter()
                    .zip(features)
                    .map(|((index, onset, _), features)| AudioRecord {
                        index: *index,
                        onset: *onset,
                        features,
                    }),
            );
        }

        tracing::debug!(records = records.len(), "completed audio processing");

        Ok(AudioRun {
            step: grid.step(),
            records,
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::audio::AudioChunk;
    use crate::media::StreamInfo;

    // A 100 Hz stream where the left channel is silent and the right channel holds
    // the value `n / 100` during the `n`-th second.
    struct FakeSource {
        info: StreamInfo,
        total_samples: usize,
    }

    impl FakeSource {
        fn new(duration: f64) -> Self {
            Self {
                info: StreamInfo {
                    duration,
                    rate: 100.0,
                },
                total_samples: (duration * 100.0).round() as usize,
            }
        }
    }

    impl ChunkSource for FakeSource {
        fn info(&self) -> StreamInfo {
            self.info
        }

        fn audio_chunk(&mut self, t: f64, len: usize) -> Result<AudioChunk> {
            let start = (t * 100.0).round() as usize;
            let end = (start + len).min(self.total_samples);
            let data = (start..end)
                .flat_map(|s| [0.0, (s / 100) as f32 / 100.0])
                .collect();
            AudioChunk::new(2, data)
        }
    }

    fn config() -> AudioConfig {
        AudioConfig {
            sample_rate: 100,
            step: 0.5,
            tail_trim: 0.0,
            batch_size: 2,
        }
    }

    #[test]
    fn test_run_covers_grid() {
        // 2.5s of audio holds five full 0.5s chunks, plus an empty one at t=2.5; trim
        // the tail so the last grid point still has a full chunk.
        let config = AudioConfig {
            tail_trim: 0.5,
            ..config()
        };
        let run = AudioAnalyzer::new(config)
            .unwrap()
            .run(FakeSource::new(2.5))
            .unwrap();

        assert_eq!(run.step, 0.5);
        assert_eq!(run.records.len(), 5);
        let onsets: Vec<f64> = run.records.iter().map(|r| r.onset).collect();
        assert_eq!(onsets, vec![0.0, 0.5, 1.0, 1.5, 2.0]);

        let rms: Vec<f64> = run.records.iter().map(|r| r.features.rms[1]).collect();
        let expected = [0.0, 0.0, 0.01, 0.01, 0.02];
        for (a, b) in rms.iter().zip(expected) {
            assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
        }
        assert!(run.records.iter().all(|r| r.features.rms[0] == 0.0));
        assert!((run.records[4].features.lr_diff.unwrap() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_truncated_tail_aborts_the_run() {
        let result = AudioAnalyzer::new(config()).unwrap().run(FakeSource::new(1.2));
        // The chunk at t=1.0 only has 20 of 50 samples.
        assert!(matches!(
            result,
            Err(Error::ShortChunk {
                expected: 50,
                found: 20
            })
        ));
    }

    #[test]
    fn test_tail_longer_than_stream() {
        let config = AudioConfig {
            tail_trim: 5.0,
            ..config()
        };
        let result = AudioAnalyzer::new(config).unwrap().run(FakeSource::new(1.0));
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_sample_rate_mismatch() {
        let config = AudioConfig {
            sample_rate: 48_000,
            ..config()
        };
        let result = AudioAnalyzer::new(config).unwrap().run(FakeSource::new(1.0));
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_cancelled_run() {
        let cancel = Arc::new(AtomicBool::new(true));
        let result = AudioAnalyzer::new(config())
            .unwrap()
            .with_cancel_flag(cancel.clone())
            .run(FakeSource::new(1.0));
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(cancel.load(Ordering::SeqCst));
    }
}
