//! iconpack-renderer: themed icon pack generator
//!
//! This crate turns a directory of monochrome vector icons into a themed
//! icon pack. For every `(package, drawable)` pair of a mapping table it
//! writes a flat background layer and a foreground layer in which the
//! line art sits on top of its automatically computed interior fill.
//!
//! Computing the fill is the costly part, so fill masks are kept in a
//! persistent cache that travels between runs as a single archive.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use iconpack_renderer::{BatchScheduler, MappingTable, RunConfig, SvgRasterizer};
//!
//! let mut config = RunConfig::new();
//! config.apply_env_overrides();
//!
//! let table = MappingTable::load(Path::new("icons/appfilter.xml"))?;
//! let tasks = table.tasks(&config.paths.source_dir, "svg");
//!
//! let scheduler = BatchScheduler::from_config(&config, Arc::new(SvgRasterizer::new()))?;
//! let report = scheduler.run(&tasks)?;
//! println!("{}/{} icons", report.successful, report.total);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Components
//!
//! - [`raster`]: vector sources to tinted RGBA rasters
//! - [`mask`]: ink extraction and seed flood fill
//! - [`cache`]: on-disk fill-mask store, manifest and archive
//! - [`BufferPool`]: reusable pixel planes
//! - [`Shortcut`]: the lock-screen shortcut icon
//! - [`scheduler`]: batched parallel execution with progress reporting

pub mod cache;
pub mod error;
pub mod mask;
pub mod raster;
pub mod scheduler;

mod color;
mod config;
mod icon;
mod pipeline;
mod pool;
mod shortcut;

pub use cache::{CacheKey, CacheStats, MaskCache, Manifest};
pub use color::{fill_from_background, parse_hex, to_hex};
pub use config::{
    IconStyle, PathSettings, PerformanceSettings, RenderSpec, RunConfig, ShortcutSettings,
    ThemeSettings,
};
pub use error::{
    CacheError, ConfigError, MaskError, RenderError, RunError, ShortcutError, TaskError,
};
pub use icon::{IconTask, MappingEntry, MappingTable, package_from_component};
pub use mask::{
    BinarizationStrategy, Mask, NaiveBinarizer, RegionFiller, SeparableBinarizer,
    SilhouetteExtractor, detect_strategy,
};
pub use pipeline::{IconProcessor, TaskOutcome};
pub use pool::{BufferPool, PixelBuffer, PoolStats};
pub use raster::{Rasterizer, SvgRasterizer};
pub use shortcut::{SHORTCUT_PACKAGE, Shortcut};
pub use scheduler::{BatchScheduler, Progress, ProgressEstimator, RunPhase, RunReport, TaskFailure};
