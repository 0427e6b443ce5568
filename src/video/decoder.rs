extern crate ffmpeg_next;

use std::path::Path;

use crate::media::{FrameSource, StreamInfo};
use crate::{Error, Result};

use super::frame::{VisualFrame, CHANNELS};

// A frame is considered displayed at `t` if its timestamp is at most this far past `t`.
const TIMESTAMP_TOLERANCE: f64 = 1e-5;

/// Decodes the best video stream of a media file into RGB24 [VisualFrame]s.
///
/// Frames are decoded sequentially. Requesting timestamps in increasing order (as the
/// analyzers do) decodes every packet exactly once; requesting an earlier timestamp
/// rewinds to the start of the stream.
pub struct VideoReader {
    ctx: ffmpeg_next::format::context::Input,
    stream_idx: usize,
    time_base: f64,
    decoder: ffmpeg_next::codec::decoder::Video,
    converter: ffmpeg_next::software::scaling::context::Context,
    info: StreamInfo,
    // Raw timestamp of the first decoded frame. All frame times are relative to it.
    origin: Option<i64>,
    next_index: u64,
    current: Option<(f64, VisualFrame)>,
    pending: Option<(f64, VisualFrame)>,
    flushed: bool,
}

impl VideoReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ctx = ffmpeg_next::format::input(&path)?;
        let stream = ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or(Error::StreamNotFound("video"))?;
        let stream_idx = stream.index();
        let time_base = f64::from(stream.time_base());

        let mut rate = f64::from(stream.avg_frame_rate());
        if !rate.is_finite() || rate <= 0.0 {
            rate = f64::from(stream.rate());
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "{} has no usable frame rate",
                path.display()
            )));
        }

        let duration = crate::util::stream_duration(&ctx, &stream);

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;
        let converter = decoder.converter(ffmpeg_next::format::Pixel::RGB24)?;

        tracing::debug!(
            path = %path.display(),
            duration,
            rate,
            width = decoder.width(),
            height = decoder.height(),
            "opened video stream"
        );

        Ok(Self {
            ctx,
            stream_idx,
            time_base,
            decoder,
            converter,
            info: StreamInfo { duration, rate },
            origin: None,
            next_index: 0,
            current: None,
            pending: None,
            flushed: false,
        })
    }

    // Copies a converted RGB24 frame into a packed buffer, dropping row padding.
    fn to_visual_frame(frame: &ffmpeg_next::frame::Video) -> Result<VisualFrame> {
        let (width, height) = (frame.width(), frame.height());
        let stride = frame.stride(0);
        let row_len = width as usize * CHANNELS;
        let data = frame.data(0);

        let mut packed = Vec::with_capacity(row_len * height as usize);
        for y in 0..height as usize {
            packed.extend_from_slice(&data[y * stride..y * stride + row_len]);
        }
        VisualFrame::new(width, height, packed)
    }

    // Returns the presentation time of a decoded frame, in seconds from the stream start.
    fn frame_time(&mut self, frame: &ffmpeg_next::frame::Video) -> f64 {
        match frame.timestamp().or_else(|| frame.pts()) {
            Some(ts) => {
                let origin = *self.origin.get_or_insert(ts);
                (ts - origin) as f64 * self.time_base
            }
            // Without timestamps, fall back to counting frames.
            None => self.next_index as f64 / self.info.rate,
        }
    }

    // Decodes the next frame of the stream, or returns `None` at the end of the stream.
    fn next_frame(&mut self) -> Result<Option<(f64, VisualFrame)>> {
        let mut decoded = ffmpeg_next::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let t = self.frame_time(&decoded);
                let mut rgb = ffmpeg_next::frame::Video::empty();
                self.converter.run(&decoded, &mut rgb)?;
                self.next_index += 1;
                return Ok(Some((t, Self::to_visual_frame(&rgb)?)));
            }
            if self.flushed {
                return Ok(None);
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

    // Restarts decoding from the first frame.
    fn rewind(&mut self) -> Result<()> {
        tracing::debug!("rewinding video stream");
        self.ctx.seek(0, i64::MIN..1)?;
        self.decoder.flush();
        self.next_index = 0;
        self.current = None;
        self.pending = None;
        self.flushed = false;
        Ok(())
    }
}

impl FrameSource for VideoReader {
    fn info(&self) -> StreamInfo {
        self.info
    }

    /// Returns the last frame whose presentation time is not after `t`. Past the end of
    /// the stream, the last decoded frame is returned.
    fn frame_at(&mut self, t: f64) -> Result<VisualFrame> {
        let rewind = matches!(&self.current, Some((current, _)) if t + TIMESTAMP_TOLERANCE < *current);
        if rewind {
            self.rewind()?;
        }

        loop {
            if self.pending.is_none() {
                self.pending = self.next_frame()?;
            }
            let advance = match &self.pending {
                Some((ts, _)) => *ts <= t + TIMESTAMP_TOLERANCE || self.current.is_none(),
                None => false,
            };
            if !advance {
                break;
            }
            self.current = self.pending.take();
        }

        self.current
            .as_ref()
            .map(|(_, frame)| frame.clone())
            .ok_or(Error::EmptyFrame)
    }
}
