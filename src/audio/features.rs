use crate::{Error, Result};

/// A block of interleaved PCM samples: `samples()` frames of `channels()` values each,
/// normalized to `[-1, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    channels: usize,
    data: Vec<f32>,
}

impl AudioChunk {
    /// Wraps interleaved samples (`c1, c2, c1, c2, ...` for stereo).
    pub fn new(channels: usize, data: Vec<f32>) -> Result<Self> {
        if channels == 0 || data.len() % channels != 0 {
            return Err(Error::InvalidParameter(format!(
                "{} interleaved values cannot be split into {} channels",
                data.len(),
                channels
            )));
        }
        Ok(Self { channels, data })
    }

    /// A chunk of `samples` zero-valued frames.
    pub fn silence(channels: usize, samples: usize) -> Result<Self> {
        Self::new(channels, vec![0.0; channels * samples])
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of sample frames (rows).
    #[inline]
    pub fn samples(&self) -> usize {
        self.data.len() / self.channels
    }

    /// Interleaved sample data.
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Iterates over the samples of channel `c`.
    pub fn channel(&self, c: usize) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().skip(c).step_by(self.channels).copied()
    }
}

/// Loudness features of a single audio chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFeatures {
    /// Root mean square of each channel.
    pub rms: Vec<f64>,
    /// Right minus left RMS. Only available for stereo chunks.
    pub lr_diff: Option<f64>,
}

impl AudioFeatures {
    /// Sum of the per-channel RMS values.
    pub fn rms_sum(&self) -> f64 {
        self.rms.iter().sum()
    }
}

/// Computes [AudioFeatures] for fixed-size chunks.
///
/// Chunks shorter than `chunk_len` are rejected with [Error::ShortChunk]; trimming the
/// end of a stream is up to the caller. Longer chunks are rejected too, since every
/// chunk must cover exactly one grid step.
#[derive(Clone, Debug)]
pub struct AudioFeatureExtractor {
    chunk_len: usize,
    require_stereo: bool,
}

impl AudioFeatureExtractor {
    pub fn new(chunk_len: usize) -> Result<Self> {
        if chunk_len == 0 {
            return Err(Error::InvalidParameter(
                "chunk length must be positive".to_owned(),
            ));
        }
        Ok(Self {
            chunk_len,
            require_stereo: true,
        })
    }

    /// Returns a new [AudioFeatureExtractor] with `require_stereo` set to the provided
    /// value. When set (the default), non-stereo chunks fail with
    /// [Error::ChannelCountError]; otherwise the channel difference is simply omitted.
    pub fn with_require_stereo(mut self, require_stereo: bool) -> Self {
        self.require_stereo = require_stereo;
        self
    }

    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    pub fn extract(&self, chunk: &AudioChunk) -> Result<AudioFeatures> {
        if chunk.samples() != self.chunk_len {
            return Err(Error::ShortChunk {
                expected: self.chunk_len,
                found: chunk.samples(),
            });
        }
        if self.require_stereo && chunk.channels() != 2 {
            return Err(Error::ChannelCountError {
                expected: 2,
                found: chunk.channels(),
            });
        }

        let n = chunk.samples() as f64;
        let rms: Vec<f64> = (0..chunk.channels())
            .map(|c| {
                let power: f64 = chunk.channel(c).map(|s| f64::from(s) * f64::from(s)).sum();
                (power / n).sqrt()
            })
            .collect();
        let lr_diff = (rms.len() == 2).then(|| rms[1] - rms[0]);

        Ok(AudioFeatures { rms, lr_diff })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn stereo(left: f32, right: f32, samples: usize) -> AudioChunk {
        let data = std::iter::repeat([left, right])
            .take(samples)
            .flatten()
            .collect();
        AudioChunk::new(2, data).unwrap()
    }

    #[test]
    fn test_silence() {
        let extractor = AudioFeatureExtractor::new(1920).unwrap();
        let features = extractor.extract(&AudioChunk::silence(2, 1920).unwrap()).unwrap();
        assert_eq!(features.rms, vec![0.0, 0.0]);
        assert_eq!(features.rms_sum(), 0.0);
        assert_eq!(features.lr_diff, Some(0.0));
    }

    #[test]
    fn test_constant_amplitude() {
        let extractor = AudioFeatureExtractor::new(4).unwrap();
        let features = extractor.extract(&stereo(0.5, -0.25, 4)).unwrap();
        assert_eq!(features.rms, vec![0.5, 0.25]);
        assert_eq!(features.rms_sum(), 0.75);
        assert_eq!(features.lr_diff, Some(-0.25));
    }

    #[test]
    fn test_square_wave() {
        // Alternating +1/-1 on the right channel has an RMS of exactly 1.
        let data: Vec<f32> = (0..8)
            .flat_map(|i| [0.0, if i % 2 == 0 { 1.0 } else { -1.0 }])
            .collect();
        let chunk = AudioChunk::new(2, data).unwrap();
        let features = AudioFeatureExtractor::new(8).unwrap().extract(&chunk).unwrap();
        assert_eq!(features.rms, vec![0.0, 1.0]);
        assert_eq!(features.lr_diff, Some(1.0));
    }

    #[test]
    fn test_short_chunk_is_rejected() {
        let extractor = AudioFeatureExtractor::new(1920).unwrap();
        assert!(matches!(
            extractor.extract(&AudioChunk::silence(2, 1000).unwrap()),
            Err(Error::ShortChunk {
                expected: 1920,
                found: 1000
            })
        ));
        assert!(matches!(
            extractor.extract(&AudioChunk::silence(2, 0).unwrap()),
            Err(Error::ShortChunk { found: 0, .. })
        ));
    }

    #[test]
    fn test_channel_count() {
        let extractor = AudioFeatureExtractor::new(4).unwrap();
        assert!(matches!(
            extractor.extract(&AudioChunk::silence(1, 4).unwrap()),
            Err(Error::ChannelCountError {
                expected: 2,
                found: 1
            })
        ));

        let mono = AudioChunk::new(1, vec![0.5; 4]).unwrap();
        let features = extractor
            .with_require_stereo(false)
            .extract(&mono)
            .unwrap();
        assert_eq!(features.rms, vec![0.5]);
        assert_eq!(features.lr_diff, None);
    }

    #[test]
    fn test_malformed_chunk() {
        assert!(AudioChunk::new(2, vec![0.0; 3]).is_err());
        assert!(AudioChunk::new(0, vec![]).is_err());
        assert!(matches!(
            AudioChunk::silence(0, 4),
            Err(Error::InvalidParameter(_))
        ));
    }
}
