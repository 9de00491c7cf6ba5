//! Lock-screen shortcut icon.
//!
//! The shortcut is a single flattened PNG rather than a layer pair:
//!
//! ```text
//!  theme background ─► alpha from template mask ─┐
//!                                                ├─► composite ─► output.png
//!  drawable rendered in the run's style ─────────┘
//! ```
//!
//! Any other PNG sitting next to the template mask is copied beside the
//! output, so a template directory can ship its remaining static icons.

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::config::{RenderSpec, ShortcutSettings};
use crate::error::ShortcutError;
use crate::icon::IconTask;
use crate::pipeline::IconProcessor;
use crate::raster::composite_over;

/// Package name the shortcut is logged under.
pub const SHORTCUT_PACKAGE: &str = "lock-shortcut";

/// A lock-screen shortcut to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Shortcut {
    source: PathBuf,
    mask: PathBuf,
    output: PathBuf,
    icon_size: u32,
    icon_scale: f32,
}

impl Shortcut {
    pub fn new(
        source: impl Into<PathBuf>,
        mask: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        let defaults = ShortcutSettings::default();
        Self {
            source: source.into(),
            mask: mask.into(),
            output: output.into(),
            icon_size: defaults.icon_size,
            icon_scale: defaults.icon_scale,
        }
    }

    /// Resolves `settings`, looking the drawable up in `source_dir`.
    pub fn from_settings(settings: &ShortcutSettings, source_dir: &Path) -> Self {
        Self::new(
            source_dir.join(format!("{}.svg", settings.drawable)),
            &settings.mask,
            &settings.output,
        )
        .with_icon_size(settings.icon_size)
        .with_icon_scale(settings.icon_scale)
    }

    pub fn with_icon_size(mut self, size: u32) -> Self {
        self.icon_size = size;
        self
    }

    pub fn with_icon_scale(mut self, scale: f32) -> Self {
        self.icon_scale = scale;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Renders the shortcut with the theme and style of `processor`.
    ///
    /// Filled shortcuts go through the same fill-mask cache as every other
    /// icon.
    pub fn render(&self, processor: &IconProcessor) -> Result<RgbaImage, ShortcutError> {
        if !self.source.is_file() {
            return Err(ShortcutError::SourceMissing(self.source.clone()));
        }
        if !self.mask.is_file() {
            return Err(ShortcutError::MaskMissing(self.mask.clone()));
        }

        let spec = RenderSpec {
            icon_size: self.icon_size,
            scale: self.icon_scale,
            ..*processor.spec()
        };
        let icon_name = self
            .source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let task = IconTask::new(SHORTCUT_PACKAGE, icon_name, &self.source);
        let (icon, _) = processor.with_spec(spec).render(&task)?;

        let template = image::open(&self.mask)
            .map_err(|e| ShortcutError::Mask(self.mask.clone(), e))?
            .to_luma8();
        let size = spec.icon_size;
        let template = imageops::resize(&template, size, size, FilterType::CatmullRom);

        let [r, g, b, _] = spec.background.0;
        let mut canvas =
            RgbaImage::from_fn(size, size, |x, y| Rgba([r, g, b, template.get_pixel(x, y)[0]]));
        composite_over(&mut canvas, &icon, 0, 0);
        Ok(canvas)
    }

    /// Renders the shortcut, writes it and copies the template's sibling
    /// PNGs next to it. Returns the output path.
    pub fn write(&self, processor: &IconProcessor) -> Result<PathBuf, ShortcutError> {
        let image = self.render(processor)?;

        let out_dir = dir_of(&self.output);
        fs::create_dir_all(out_dir).map_err(|e| ShortcutError::Io(out_dir.to_path_buf(), e))?;
        image
            .save(&self.output)
            .map_err(|e| ShortcutError::Write(self.output.clone(), e))?;

        let copied = self.copy_template_siblings()?;
        log::info!(
            "shortcut written to `{}` ({copied} template icons copied)",
            self.output.display()
        );
        Ok(self.output.clone())
    }

    fn copy_template_siblings(&self) -> Result<usize, ShortcutError> {
        let from = dir_of(&self.mask);
        let to = dir_of(&self.output);
        if from == to {
            return Ok(0);
        }

        let entries = fs::read_dir(from).map_err(|e| ShortcutError::Io(from.to_path_buf(), e))?;
        let mut copied = 0;
        for entry in entries {
            let path = entry
                .map_err(|e| ShortcutError::Io(from.to_path_buf(), e))?
                .path();
            let Some(name) = path.file_name() else {
                continue;
            };
            let is_png = path.extension().is_some_and(|ext| ext == "png");
            if !is_png || path == self.mask || Some(name) == self.output.file_name() {
                continue;
            }
            let target = to.join(name);
            fs::copy(&path, &target).map_err(|e| ShortcutError::Io(target.clone(), e))?;
            copied += 1;
        }
        Ok(copied)
    }
}

fn dir_of(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStats, MaskCache};
    use crate::config::{IconStyle, RunConfig};
    use crate::mask::{NaiveBinarizer, RegionFiller, SilhouetteExtractor};
    use crate::pool::BufferPool;
    use crate::raster::SvgRasterizer;
    use image::{GrayImage, Luma};
    use std::sync::Arc;
    use tempfile::TempDir;

    const LOCK_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24"><rect x="5" y="10" width="14" height="10" fill="none" stroke="#000000" stroke-width="2"/><path d="M8 10V7a4 4 0 0 1 8 0v3" fill="none" stroke="#000000" stroke-width="2"/></svg>"##;

    fn processor(dir: &TempDir, style: IconStyle) -> IconProcessor {
        let spec = RunConfig::new().with_style(style).render_spec().unwrap();
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

    /// Lock source plus a template whose left half is opaque.
    fn shortcut_in(dir: &TempDir) -> Shortcut {
        let source = dir.path().join("svg/volumelockr.svg");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, LOCK_SVG).unwrap();

        let templates = dir.path().join("templates");
        fs::create_dir_all(&templates).unwrap();
        let mask = templates.join("icon_folder.png");
        GrayImage::from_fn(16, 16, |x, _| Luma([if x < 8 { 255 } else { 0 }]))
            .save(&mask)
            .unwrap();

        Shortcut::new(source, mask, dir.path().join("res/status_bar_toggle_lock.png"))
            .with_icon_size(32)
    }

    #[test]
    fn background_takes_the_template_alpha() {
        let dir = TempDir::new().unwrap();
        let proc = processor(&dir, IconStyle::Filled);
        let image = shortcut_in(&dir).render(&proc).unwrap();

        assert_eq!(image.dimensions(), (32, 32));
        let background = proc.spec().background;
        assert_eq!(*image.get_pixel(1, 1), background);
        assert_eq!(image.get_pixel(30, 1)[3], 0);
        // The lock body is filled, so its centre is opaque on either side.
        assert_eq!(image.get_pixel(16, 18)[3], 255);
    }

    #[test]
    fn filled_shortcut_uses_the_mask_cache() {
        let dir = TempDir::new().unwrap();
        let proc = processor(&dir, IconStyle::Filled);
        let shortcut = shortcut_in(&dir);

        shortcut.render(&proc).unwrap();
        shortcut.render(&proc).unwrap();
        assert_eq!(proc.cache().stats().writes, 1);
        assert_eq!(proc.cache().stats().hits, 1);
    }

    #[test]
    fn outlined_shortcut_skips_the_cache() {
        let dir = TempDir::new().unwrap();
        let proc = processor(&dir, IconStyle::Outlined);
        shortcut_in(&dir).render(&proc).unwrap();
        assert_eq!(proc.cache().stats(), CacheStats::default());
    }

    #[test]
    fn missing_inputs_are_reported() {
        let dir = TempDir::new().unwrap();
        let proc = processor(&dir, IconStyle::Filled);
        let shortcut = shortcut_in(&dir);

        let no_source = Shortcut::new(dir.path().join("nope.svg"), &shortcut.mask, &shortcut.output);
        assert!(matches!(
            no_source.render(&proc),
            Err(ShortcutError::SourceMissing(_))
        ));

        let no_mask = Shortcut::new(&shortcut.source, dir.path().join("nope.png"), &shortcut.output);
        assert!(matches!(no_mask.render(&proc), Err(ShortcutError::MaskMissing(_))));
    }

    #[test]
    fn write_copies_template_siblings() {
        let dir = TempDir::new().unwrap();
        let proc = processor(&dir, IconStyle::Filled);
        let shortcut = shortcut_in(&dir);

        let templates = dir.path().join("templates");
        let sibling = GrayImage::from_pixel(4, 4, Luma([7]));
        sibling.save(templates.join("toggle_wifi.png")).unwrap();
        sibling.save(templates.join("status_bar_toggle_lock.png")).unwrap();
        fs::write(templates.join("README.txt"), "not an icon").unwrap();

        let output = shortcut.write(&proc).unwrap();
        let res = dir.path().join("res");
        assert_eq!(output, res.join("status_bar_toggle_lock.png"));
        assert_eq!(image::open(&output).unwrap().to_rgba8().dimensions(), (32, 32));
        assert!(res.join("toggle_wifi.png").exists());
        assert!(!res.join("icon_folder.png").exists());
        assert!(!res.join("README.txt").exists());
    }

    #[test]
    fn settings_resolve_against_source_dir() {
        let settings = ShortcutSettings::default();
        let shortcut = Shortcut::from_settings(&settings, Path::new("icons/svg"));
        assert_eq!(shortcut.source, PathBuf::from("icons/svg/volumelockr.svg"));
        assert_eq!(shortcut.icon_size, 235);
        assert_eq!(shortcut.output(), settings.output);
    }
}
