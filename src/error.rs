use std::path::PathBuf;
use thiserror::Error;

/// Failures produced by the analysis core.
///
/// Every component operation returns one of these instead of panicking so
/// callers can branch on the kind of failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("image not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid image format: {0}")]
    InvalidFormat(String),

    #[error(
        "incompatible shapes: expected {}x{}x{}, got {}x{}x{}",
        expected.0, expected.1, expected.2, actual.0, actual.1, actual.2
    )]
    Shape {
        /// (height, width, channels) of the reference input.
        expected: (u32, u32, usize),
        /// (height, width, channels) of the offending input.
        actual: (u32, u32, usize),
    },

    #[error("image is already normalized to unit range")]
    AlreadyNormalized,

    #[error("no image in the batch could be preprocessed ({failed} failed)")]
    EmptyBatch { failed: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
