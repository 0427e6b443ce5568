extern crate ffmpeg_next;

use std::collections::VecDeque;
use std::path::Path;

use crate::media::{ChunkSource, StreamInfo};
use crate::{Error, Result};

use super::features::AudioChunk;

// Decoded audio is always resampled to interleaved f32 stereo.
const CHANNELS: usize = 2;
const BYTES_PER_SAMPLE: usize = 4;

fn output_format() -> ffmpeg_next::format::Sample {
    ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Packed)
}

/// Decodes and resamples the best audio stream of a media file.
///
/// Samples are decoded sequentially into an internal buffer. Requesting chunks in
/// increasing order (as the analyzers do) decodes every packet exactly once;
/// requesting an earlier chunk rewinds to the start of the stream.
pub struct AudioReader {
    ctx: ffmpeg_next::format::context::Input,
    stream_idx: usize,
    decoder: ffmpeg_next::codec::decoder::Audio,
    resampler: ffmpeg_next::software::resampling::context::Context,
    sample_rate: u32,
    info: StreamInfo,
    // Interleaved samples, starting at sample frame `buffer_start`.
    buffer: VecDeque<f32>,
    buffer_start: usize,
    flushed: bool,
    finished: bool,
}

impl AudioReader {
    /// Opens the best audio stream of `path`, resampled to `sample_rate` Hz stereo.
    pub fn open(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref();
        let ctx = ffmpeg_next::format::input(&path)?;
        let stream = ctx
            .streams()
            .best(ffmpeg_next::media::Type::Audio)
            .ok_or(Error::StreamNotFound("audio"))?;
        let stream_idx = stream.index();
        let duration = crate::util::stream_duration(&ctx, &stream);

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().audio()?;
        let resampler = decoder.resampler(
            output_format(),
            ffmpeg_next::ChannelLayout::STEREO,
            sample_rate,
        )?;

        tracing::debug!(
            path = %path.display(),
            duration,
            native_rate = decoder.rate(),
            sample_rate,
            "opened audio stream"
        );

        Ok(Self {
            ctx,
            stream_idx,
            decoder,
            resampler,
            sample_rate,
            info: StreamInfo {
                duration,
                rate: f64::from(sample_rate),
            },
            buffer: VecDeque::new(),
            buffer_start: 0,
            flushed: false,
            finished: false,
        })
    }

    // Number of sample frames currently buffered.
    fn buffered(&self) -> usize {
        self.buffer.len() / CHANNELS
    }

    // Appends the samples of a resampled frame to the buffer.
    fn push_resampled(&mut self, frame: &ffmpeg_next::frame::Audio) {
        // `data` is a fixed-size buffer; only the first `samples * channels` values are valid.
        let len = frame.samples() * frame.channels() as usize * BYTES_PER_SAMPLE;
        let raw = &frame.data(0)[..len];
        self.buffer.extend(
            raw.chunks_exact(BYTES_PER_SAMPLE)
                .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
        );
    }

    // Resamples a decoded frame, draining any samples delayed by the resampler.
    fn resample(&mut self, frame: &ffmpeg_next::frame::Audio) -> Result<()> {
        let mut resampled = ffmpeg_next::frame::Audio::empty();
        let mut delay = match self.resampler.run(frame, &mut resampled) {
            Ok(v) => v,
            // The input format changed mid-stream; swap in a resampler for the new format.
            Err(ffmpeg_next::Error::InputChanged) => {
                let mut resampler = frame.resampler(
                    output_format(),
                    ffmpeg_next::ChannelLayout::STEREO,
                    self.sample_rate,
                )?;
                let delay = resampler.run(frame, &mut resampled)?;
                self.resampler = resampler;
                delay
            }
            Err(e) => return Err(e.into()),
        };

        loop {
            self.push_resampled(&resampled);
            if delay.is_none() {
                break;
            }
            resampled = ffmpeg_next::frame::Audio::empty();
            delay = self.resampler.flush(&mut resampled)?;
            if resampled.samples() == 0 {
                break;
            }
        }
        Ok(())
    }

    // Decodes more audio into the buffer. Returns `false` once the stream is exhausted.
    fn fill(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }

        let mut decoded = ffmpeg_next::frame::Audio::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                self.resample(&decoded)?;
                return Ok(true);
            }
            if self.flushed {
                self.finished = true;
                return Ok(false);
            }

            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(&mut self.ctx) {
                Ok(()) => {
                    if packet.stream() == self.stream_idx {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(ffmpeg_next::Error::Eof) => {
                    self.decoder.send_eof()?;
                    self.flushed = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // Restarts decoding from the first sample. The resampler is rebuilt so that
    // samples it still holds from the old position are dropped.
    fn rewind(&mut self) -> Result<()> {
        tracing::debug!("rewinding audio stream");
        self.ctx.seek(0, i64::MIN..1)?;
        self.decoder.flush();
        self.resampler = self.decoder.resampler(
            output_format(),
            ffmpeg_next::ChannelLayout::STEREO,
            self.sample_rate,
        )?;
        self.buffer.clear();
        self.buffer_start = 0;
        self.flushed = false;
        self.finished = false;
        Ok(())
    }
}

impl ChunkSource for AudioReader {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn audio_chunk(&mut self, t: f64, len: usize) -> Result<AudioChunk> {
        let start = (t * f64::from(self.sample_rate)).round() as usize;
        if start < self.buffer_start {
            self.rewind()?;
        }

        while self.buffer_start + self.buffered() < start + len {
            if !self.fill()? {
                break;
            }
        }

        // Drop everything before the requested chunk.
        let skip = (start - self.buffer_start).min(self.buffered());
        self.buffer.drain(..skip * CHANNELS);
        self.buffer_start += skip;

        let available = if self.buffer_start == start {
            len.min(self.buffered())
        } else {
            0
        };
        let data: Vec<f32> = self
            .buffer
            .iter()
            .take(available * CHANNELS)
            .copied()
            .collect();
        AudioChunk::new(CHANNELS, data)
    }
}
