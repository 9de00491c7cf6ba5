//! Per-icon processing: from a vector source to the two output layers.
//!
//! ```text
//!            Filled                                Outlined
//!  rasterize @ supersampled size             rasterize @ final size
//!            │                                         │
//!   extract ink mask ──► cache lookup                  │
//!                           │ miss                     │
//!                     region fill ──► cache store      │
//!            │                                         │
//!  fill colour under line art                          │
//!            │                                         │
//!  Lanczos downsample to final size                    │
//!            ▼                                         ▼
//!       {out}/{package}/1.png                {out}/{package}/1.png
//! ```
//!
//! Every task also writes a flat background layer to `0.png`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::cache::MaskCache;
use crate::config::{IconStyle, RenderSpec};
use crate::error::TaskError;
use crate::icon::IconTask;
use crate::mask::{Mask, RegionFiller, SilhouetteExtractor};
use crate::pool::BufferPool;
use crate::raster::{Rasterizer, composite_over};

/// File name of the background layer.
pub const BACKGROUND_FILE: &str = "0.png";
/// File name of the foreground layer.
pub const FOREGROUND_FILE: &str = "1.png";

/// How a finished task obtained its fill mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Fill mask read from the cache.
    CacheHit,
    /// Fill mask computed and offered to the cache.
    CacheMiss,
    /// Outlined style; no fill mask involved.
    Outlined,
}

// ============================================================================
// IconProcessor
// ============================================================================

/// Runs a single [`IconTask`] end to end.
///
/// Shared by all workers of a run; every collaborator is thread-safe.
#[derive(Clone)]
pub struct IconProcessor {
    spec: RenderSpec,
    output_dir: PathBuf,
    rasterizer: Arc<dyn Rasterizer>,
    extractor: SilhouetteExtractor,
    filler: RegionFiller,
    cache: Arc<MaskCache>,
    pool: Arc<BufferPool>,
}

impl IconProcessor {
    pub fn new(
        spec: RenderSpec,
        output_dir: impl Into<PathBuf>,
        rasterizer: Arc<dyn Rasterizer>,
        extractor: SilhouetteExtractor,
        filler: RegionFiller,
        cache: Arc<MaskCache>,
        pool: Arc<BufferPool>,
    ) -> Self {
        Self {
            spec,
            output_dir: output_dir.into(),
            rasterizer,
            extractor,
            filler,
            cache,
            pool,
        }
    }

    pub fn spec(&self) -> &RenderSpec {
        &self.spec
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn extractor(&self) -> &SilhouetteExtractor {
        &self.extractor
    }

    pub fn cache(&self) -> &MaskCache {
        &self.cache
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Returns a processor sharing this one's collaborators but rendering
    /// with `spec`.
    pub fn with_spec(&self, spec: RenderSpec) -> Self {
        Self {
            spec,
            ..self.clone()
        }
    }

    /// Directory receiving the layers of `task`.
    pub fn package_dir(&self, task: &IconTask) -> PathBuf {
        self.output_dir.join(&task.package)
    }

    /// Processes one task, writing both layers into its package directory.
    pub fn process(&self, task: &IconTask) -> Result<TaskOutcome, TaskError> {
        self.process_unless(task, &AtomicBool::new(false))
    }

    /// Like [`process`](Self::process), but once `cancelled` is set the task
    /// stops before its next write and fails with [`TaskError::Cancelled`].
    ///
    /// Nothing reaches the output directory or the cache after that point.
    pub fn process_unless(
        &self,
        task: &IconTask,
        cancelled: &AtomicBool,
    ) -> Result<TaskOutcome, TaskError> {
        if !task.source.is_file() {
            return Err(TaskError::SourceMissing(task.source.clone()));
        }

        let (foreground, outcome) = self.render_unless(task, cancelled)?;
        if cancelled.load(Ordering::Acquire) {
            return Err(TaskError::Cancelled);
        }

        let dir = self.package_dir(task);
        std::fs::create_dir_all(&dir)?;

        let size = self.spec.icon_size;
        RgbaImage::from_pixel(size, size, self.spec.background).save(dir.join(BACKGROUND_FILE))?;
        foreground.save(dir.join(FOREGROUND_FILE))?;

        Ok(outcome)
    }

    /// Renders the foreground layer of `task` without writing anything to
    /// the output directory.
    pub fn render(&self, task: &IconTask) -> Result<(RgbaImage, TaskOutcome), TaskError> {
        self.render_unless(task, &AtomicBool::new(false))
    }

    fn render_unless(
        &self,
        task: &IconTask,
        cancelled: &AtomicBool,
    ) -> Result<(RgbaImage, TaskOutcome), TaskError> {
        match self.spec.style {
            IconStyle::Filled => self.render_filled(task, cancelled),
            IconStyle::Outlined => Ok((self.render_outlined(task)?, TaskOutcome::Outlined)),
        }
    }

    fn render_outlined(&self, task: &IconTask) -> Result<RgbaImage, TaskError> {
        let spec = &self.spec;
        Ok(self
            .rasterizer
            .rasterize(&task.source, spec.foreground, spec.icon_size, spec.scale)?)
    }

    fn render_filled(
        &self,
        task: &IconTask,
        cancelled: &AtomicBool,
    ) -> Result<(RgbaImage, TaskOutcome), TaskError> {
        let spec = &self.spec;
        let side = spec.supersampled_size();

        let line = self
            .rasterizer
            .rasterize(&task.source, spec.foreground, side, spec.scale)?;

        let ink = self
            .extractor
            .extract(&line, self.pool.acquire(side, side))?;

        let key = self.cache.key_for(&task.source, side);
        let (fill, outcome) = match self.cache.load(&key) {
            Some(cached) if cached.width() == side && cached.is_valid_square() => {
                log::debug!("cache hit for {} ({})", task.icon, task.package);
                (cached, TaskOutcome::CacheHit)
            }
            cached => {
                if let Some(stale) = cached {
                    log::warn!(
                        "cache: `{key}` has side {} but {side} was expected; recomputing",
                        stale.width()
                    );
                    self.pool.release(stale.into_buffer());
                }
                let scratch = self.pool.acquire(side, side);
                let fill = match self.filler.fill(&ink, scratch) {
                    Ok(fill) => fill,
                    Err(e) => {
                        self.pool.release(ink.into_buffer());
                        return Err(e.into());
                    }
                };
                if cancelled.load(Ordering::Acquire) {
                    self.pool.release(ink.into_buffer());
                    self.pool.release(fill.into_buffer());
                    return Err(TaskError::Cancelled);
                }
                if let Err(e) = self.cache.save(&fill, &key) {
                    log::warn!("cache: failed to store `{key}`: {e}");
                }
                (fill, TaskOutcome::CacheMiss)
            }
        };

        let mut canvas = paint_mask(&fill, spec.fill);
        composite_over(&mut canvas, &line, 0, 0);

        self.pool.release(ink.into_buffer());
        self.pool.release(fill.into_buffer());

        let resized = if side == spec.icon_size {
            canvas
        } else {
            imageops::resize(&canvas, spec.icon_size, spec.icon_size, FilterType::Lanczos3)
        };
        Ok((resized, outcome))
    }
}

impl std::fmt::Debug for IconProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IconProcessor")
            .field("spec", &self.spec)
            .field("output_dir", &self.output_dir)
            .field("extractor", &self.extractor)
            .field("filler", &self.filler)
            .finish_non_exhaustive()
    }
}

/// Paints set mask pixels in `color` on a transparent canvas.
pub fn paint_mask(mask: &Mask, color: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.is_on(x, y) {
            color
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::mask::NaiveBinarizer;
    use crate::raster::SvgRasterizer;
    use std::fs;
    use tempfile::TempDir;

    const RING_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24"><circle cx="12" cy="12" r="9" fill="none" stroke="#000000" stroke-width="2"/></svg>"##;

    fn processor(dir: &TempDir, style: IconStyle) -> IconProcessor {
        let spec = RunConfig::new()
            .with_icon_size(48)
            .with_icon_scale(0.8)
            .with_style(style)
            .render_spec()
            .unwrap();
        let cache = MaskCache::new(
            dir.path().join("cache/masks"),
            dir.path().join("cache/manifest.json"),
            dir.path().join("cache/masks.tar.gz"),
            spec.supersampling,
        );
        IconProcessor::new(
            spec,
            dir.path().join("out"),
            Arc::new(SvgRasterizer::new()),
            SilhouetteExtractor::new(Arc::new(NaiveBinarizer)),
            RegionFiller::sequential(),
            Arc::new(cache),
            Arc::new(BufferPool::new(4)),
        )
    }

    fn ring_task(dir: &TempDir) -> IconTask {
        let source = dir.path().join("ring.svg");
        fs::write(&source, RING_SVG).unwrap();
        IconTask::new("com.example.ring", "ring", source)
    }

    #[test]
    fn filled_task_writes_both_layers() {
        let dir = TempDir::new().unwrap();
        let proc = processor(&dir, IconStyle::Filled);
        let task = ring_task(&dir);

        assert_eq!(proc.process(&task).unwrap(), TaskOutcome::CacheMiss);

        let pkg = proc.package_dir(&task);
        let bg = image::open(pkg.join(BACKGROUND_FILE)).unwrap().to_rgba8();
        assert_eq!(bg.dimensions(), (48, 48));
        assert_eq!(*bg.get_pixel(0, 0), proc.spec().background);

        let fg = image::open(pkg.join(FOREGROUND_FILE)).unwrap().to_rgba8();
        assert_eq!(fg.dimensions(), (48, 48));
        // The ring interior is painted with the fill colour.
        let centre = fg.get_pixel(24, 24);
        let fill = proc.spec().fill;
        assert_eq!(centre[3], 255);
        for c in 0..3 {
            assert!(centre[c].abs_diff(fill[c]) <= 1);
        }
        // Outside the artwork stays transparent.
        assert_eq!(fg.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn second_pass_hits_the_cache() {
        let dir = TempDir::new().unwrap();
        let proc = processor(&dir, IconStyle::Filled);
        let task = ring_task(&dir);

        assert_eq!(proc.process(&task).unwrap(), TaskOutcome::CacheMiss);
        let first = fs::read(proc.package_dir(&task).join(FOREGROUND_FILE)).unwrap();

        assert_eq!(proc.process(&task).unwrap(), TaskOutcome::CacheHit);
        let second = fs::read(proc.package_dir(&task).join(FOREGROUND_FILE)).unwrap();

        assert_eq!(first, second);
        assert_eq!(proc.cache().stats().hits, 1);
    }

    #[test]
    fn buffers_return_to_the_pool() {
        let dir = TempDir::new().unwrap();
        let proc = processor(&dir, IconStyle::Filled);
        let task = ring_task(&dir);

        proc.process(&task).unwrap();
        proc.process(&task).unwrap();

        let stats = proc.pool().stats();
        assert_eq!(stats.allocated, 2);
        assert!(stats.reused >= 1);
    }

    #[test]
    fn outlined_task_skips_the_cache() {
        let dir = TempDir::new().unwrap();
        let proc = processor(&dir, IconStyle::Outlined);
        let task = ring_task(&dir);

        assert_eq!(proc.process(&task).unwrap(), TaskOutcome::Outlined);
        let fg = image::open(proc.package_dir(&task).join(FOREGROUND_FILE))
            .unwrap()
            .to_rgba8();
        assert_eq!(fg.dimensions(), (48, 48));
        assert_eq!(fg.get_pixel(24, 24)[3], 0);
        assert_eq!(proc.cache().stats().misses, 0);
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = TempDir::new().unwrap();
        let proc = processor(&dir, IconStyle::Filled);
        let task = IconTask::new("com.example.none", "none", dir.path().join("none.svg"));

        let err = proc.process(&task).unwrap_err();
        assert!(matches!(err, TaskError::SourceMissing(_)));
        assert!(!proc.package_dir(&task).exists());
    }

    #[test]
    fn cancelled_task_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let proc = processor(&dir, IconStyle::Filled);
        let task = ring_task(&dir);

        let err = proc.process_unless(&task, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, TaskError::Cancelled));
        assert!(!proc.package_dir(&task).exists());
        assert!(!proc.cache().dir().exists());
        assert_eq!(proc.cache().stats().writes, 0);

        // Both planes went back to the pool.
        let stats = proc.pool().stats();
        assert_eq!(stats.idle, stats.allocated);
    }

    #[test]
    fn paint_mask_colours_set_pixels() {
        let mut mask = Mask::new(2, 2);
        mask.set(1, 0, true);
        let img = paint_mask(&mask, Rgba([9, 8, 7, 255]));
        assert_eq!(img.get_pixel(1, 0).0, [9, 8, 7, 255]);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }
}
