//! Interfaces to the media decoding backend.
//!
//! The analyzers only ever talk to a decoder through these traits. The FFmpeg
//! implementations live in [crate::video::VideoReader] and [crate::audio::AudioReader];
//! tests use in-memory sources.

use crate::audio::AudioChunk;
use crate::video::VisualFrame;
use crate::Result;

/// Basic properties of an opened stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamInfo {
    /// Stream duration, in seconds.
    pub duration: f64,
    /// Native rate: frames per second for video, samples per second for audio.
    pub rate: f64,
}

/// A source of decoded video frames.
///
/// Implementations are not required to be reentrant; each analyzer owns its source for
/// the duration of a run.
pub trait FrameSource {
    fn info(&self) -> StreamInfo;

    /// Returns the frame displayed at `t` seconds.
    fn frame_at(&mut self, t: f64) -> Result<VisualFrame>;
}

/// A source of decoded audio samples.
pub trait ChunkSource {
    fn info(&self) -> StreamInfo;

    /// Returns up to `len` samples starting at `t` seconds. Fewer samples are returned
    /// only at the end of the stream.
    fn audio_chunk(&mut self, t: f64, len: usize) -> Result<AudioChunk>;
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn info(&self) -> StreamInfo {
        (**self).info()
    }

    fn frame_at(&mut self, t: f64) -> Result<VisualFrame> {
        (**self).frame_at(t)
    }
}

impl<S: ChunkSource + ?Sized> ChunkSource for &mut S {
    fn info(&self) -> StreamInfo {
        (**self).info()
    }

    fn audio_chunk(&mut self, t: f64, len: usize) -> Result<AudioChunk> {
        (**self).audio_chunk(t, len)
    }
}
