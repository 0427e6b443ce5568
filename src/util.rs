#[cfg(feature = "rayon")]
extern crate rayon;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::{Error, Result};

// Format-level durations are expressed in these units.
const AV_TIME_BASE: f64 = 1_000_000.0;

/// Checks if the given path points to a valid media file.
///
/// If `full` is set to **false**, only the file header will be checked. This is a very cheap
/// operation, but it does not guarantee validity. If set to **true**, FFmpeg will be used to
/// check the file contents - note that this is more expensive, but much more accurate.
///
/// If `audio` is set to true, this function will ensure that the file contains *at least* one
/// audio stream; otherwise it requires at least one video stream. This flag is only used when
/// `full` is set to **true**.
pub fn is_valid_media_file(path: impl AsRef<Path>, full: bool, audio: bool) -> bool {
    if !full {
        let mut buf = [0u8; 8192];
        let n = match std::fs::File::open(path.as_ref()).and_then(|mut f| f.read(&mut buf)) {
            Ok(n) => n,
            Err(_) => return false,
        };
        return infer::is_video(&buf[..n]) || (audio && infer::is_audio(&buf[..n]));
    }

    if let Ok(input) = ffmpeg_next::format::input(&path.as_ref()) {
        let wanted = if audio {
            ffmpeg_next::util::media::Type::Audio
        } else {
            ffmpeg_next::util::media::Type::Video
        };
        input
            .streams()
            .any(|s| s.parameters().medium() == wanted)
    } else {
        false
    }
}

/// Validates the given input paths and returns them in sorted order.
pub fn find_media_files(paths: &[PathBuf], full: bool, audio: bool) -> Result<Vec<PathBuf>> {
    if paths.is_empty() {
        return Err(Error::AnalyzerMissingPaths);
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.is_file() {
            return Err(Error::InvalidParameter(format!(
                "{} is not a file",
                path.display()
            )));
        }
        if !is_valid_media_file(path, full, audio) {
            return Err(Error::InvalidParameter(format!(
                "{} is not a valid media file",
                path.display()
            )));
        }
        files.push(path.clone());
    }
    files.sort();
    Ok(files)
}

/// Returns the duration of a stream in seconds.
///
/// Some containers (e.g., Matroska) do not store a per-stream duration; the format-level
/// duration is used for those.
pub(crate) fn stream_duration(
    ctx: &ffmpeg_next::format::context::Input,
    stream: &ffmpeg_next::format::stream::Stream,
) -> f64 {
    if stream.duration() > 0 {
        stream.duration() as f64 * f64::from(stream.time_base())
    } else {
        (ctx.duration().max(0)) as f64 / AV_TIME_BASE
    }
}

/// Fails with [Error::Cancelled] once the flag is set.
pub(crate) fn check_cancelled(cancel: Option<&AtomicBool>) -> Result<()> {
    match cancel {
        Some(flag) if flag.load(Ordering::SeqCst) => Err(Error::Cancelled),
        _ => Ok(()),
    }
}

/// Applies `f` to every item and collects the results in input order. Items are
/// processed in parallel if the `rayon` feature is enabled and `threading` is set.
pub(crate) fn map_ordered<T, U, F>(items: &[T], threading: bool, f: F) -> Result<Vec<U>>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> Result<U> + Sync + Send,
{
    if cfg!(feature = "rayon") && threading {
        #[cfg(feature = "rayon")]
        {
            return items.par_iter().map(|item| f(item)).collect();
        }
    }
    items.iter().map(f).collect()
}

/// Returns the underlying FFmpeg version integer.
pub fn ffmpeg_version() -> u32 {
    ffmpeg_next::util::version()
}

/// Returns the underlying FFmpeg version string.
pub fn ffmpeg_version_string() -> String {
    let version_int = ffmpeg_version();

    // Reference: https://github.com/FFmpeg/FFmpeg/blob/130d19bf2044ac76372d1b97ab87ab283c8b37f8/libavutil/version.h#L64
    format!(
        "{}.{}.{}",
        version_int >> 16,              // MAJOR
        (version_int & 0x00FF00) >> 8,  // MINOR
        version_int & 0xFF              // MICRO
    )
}
