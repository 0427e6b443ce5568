pub mod audio;
pub mod config;
pub mod diff;
pub mod grid;
pub mod hash;
pub mod media;
pub mod output;
pub mod util;
pub mod video;

pub use config::Config;
pub use grid::TimeGrid;
pub use hash::BitHash;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("empty or malformed frame")]
    EmptyFrame,
    #[error("crop range {top}..{bottom} (split at row {split_row}, col {split_col}) is outside a {width}x{height} frame")]
    CropOutOfBounds {
        top: u32,
        bottom: u32,
        split_row: u32,
        split_col: u32,
        width: u32,
        height: u32,
    },
    #[error("hash at index {index} has {found} bits, expected {expected}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("cannot compare a {left}-bit hash with a {right}-bit hash")]
    HashLengthMismatch { left: usize, right: usize },
    #[error("not enough hashes to compute a difference series")]
    EmptySequence,
    #[error("expected {expected} audio channels, found {found}")]
    ChannelCountError { expected: usize, found: usize },
    #[error("audio chunk has {found} samples, expected {expected}")]
    ShortChunk { expected: usize, found: usize },
    #[error("no {0} stream found")]
    StreamNotFound(&'static str),
    #[error("invalid hash string: {0:?}")]
    InvalidHash(String),
    #[error("malformed table at line {line}: {reason}")]
    MalformedTable { line: usize, reason: String },
    #[error("run was cancelled before reaching the end of the stream")]
    Cancelled,
    #[error("no paths provided to analyzer")]
    AnalyzerMissingPaths,
    #[error("FFmpeg error: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),
    #[error("serde_json error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
