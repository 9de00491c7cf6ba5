//! Error types.
//!
//! Everything below [`RunError`] is contained at the level of a single
//! icon task: the scheduler logs it, counts the task as unsuccessful and
//! moves on. Only [`RunError`] reaches the caller of a run.

use std::path::PathBuf;

use thiserror::Error;

/// A mask reached a stage that needs a non-empty square grid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaskError {
    #[error("invalid mask: {width}x{height} (masks must be square and non-empty)")]
    InvalidMask { width: u32, height: u32 },
}

/// Failure reported by a [`Rasterizer`](crate::Rasterizer).
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read `{0}`")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to parse SVG `{path}`: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("cannot allocate a {0}x{0} canvas")]
    Canvas(u32),
}

/// Per-task failure.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("source file not found: `{0}`")]
    SourceMissing(PathBuf),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    InvalidMask(#[from] MaskError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("image encoding error")]
    Image(#[from] image::ImageError),

    #[error("task did not finish within {0:?}")]
    TimedOut(std::time::Duration),

    #[error("worker panicked")]
    WorkerPanicked,

    #[error("abandoned after its batch deadline")]
    Cancelled,
}

/// Mask cache I/O failure.
///
/// Corrupted blobs and manifests are not errors: they are logged and
/// treated as a miss or as an empty manifest respectively.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("manifest serialization error")]
    Json(#[from] serde_json::Error),
}

/// Lock-screen shortcut failure. Logged by the scheduler, never fatal.
#[derive(Debug, Error)]
pub enum ShortcutError {
    #[error("shortcut source not found: `{0}`")]
    SourceMissing(PathBuf),

    #[error("shortcut template mask not found: `{0}`")]
    MaskMissing(PathBuf),

    #[error(transparent)]
    Render(#[from] TaskError),

    #[error("cannot decode template mask `{0}`")]
    Mask(PathBuf, #[source] image::ImageError),

    #[error("cannot write `{0}`")]
    Write(PathBuf, #[source] image::ImageError),

    #[error("I/O error on `{0}`")]
    Io(PathBuf, #[source] std::io::Error),
}

/// Fatal setup or finalisation failure that aborts a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("cannot create output directory `{0}`")]
    OutputDir(PathBuf, #[source] std::io::Error),

    #[error("cannot write cache manifest")]
    ManifestWrite(#[source] CacheError),

    #[error("cannot build worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("invalid configuration")]
    Config(#[from] ConfigError),
}

/// Configuration loading failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config parsing error")]
    Json(#[from] serde_json::Error),

    #[error("invalid colour `{0}`")]
    Color(String),

    #[error("mapping table error in `{0}`: {1}")]
    Mapping(PathBuf, String),
}
