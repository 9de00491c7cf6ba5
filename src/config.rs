//! Serializable run configuration.
//!
//! A [`RunConfig`] captures everything a generator run needs: the theme,
//! the render geometry, where inputs and outputs live, and how much
//! parallelism to use. Every field has a default, so `{}` is a valid
//! configuration.
//!
//! # Example
//!
//! ```
//! use iconpack_renderer::{IconStyle, RunConfig};
//!
//! let config = RunConfig::new()
//!     .with_icon_size(256)
//!     .with_style(IconStyle::Outlined);
//!
//! let json = config.to_json().unwrap();
//! let restored = RunConfig::from_json(&json).unwrap();
//! assert_eq!(restored.icon_size, 256);
//!
//! let spec = restored.render_spec().unwrap();
//! assert_eq!(spec.supersampled_size(), 512);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::color::{fill_from_background, parse_hex};
use crate::error::ConfigError;
use crate::mask::BinarizationStrategy;

/// Environment variable overriding the foreground colour.
pub const FG_COLOR_VAR: &str = "FG_COLOR";
/// Environment variable overriding the background colour.
pub const BG_COLOR_VAR: &str = "BG_COLOR";

/// Upper bound on the default worker count.
pub const MAX_DEFAULT_WORKERS: usize = 128;

// ============================================================================
// Render Spec
// ============================================================================

/// How the foreground artwork is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IconStyle {
    /// Line art over a computed interior fill.
    #[default]
    Filled,
    /// Line art only, rendered directly at the final size.
    Outlined,
}

/// Resolved per-run render parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSpec {
    /// Final icon side length in pixels.
    pub icon_size: u32,
    pub foreground: Rgba<u8>,
    pub background: Rgba<u8>,
    /// Colour of the computed interior.
    pub fill: Rgba<u8>,
    /// Fraction of the canvas occupied by the artwork.
    pub scale: f32,
    pub supersampling: f32,
    pub style: IconStyle,
}

impl RenderSpec {
    /// Side length of the working canvas: `round(icon_size * supersampling)`.
    pub fn supersampled_size(&self) -> u32 {
        (self.icon_size as f32 * self.supersampling).round() as u32
    }
}

// ============================================================================
// Settings Groups
// ============================================================================

/// Theme colours as `#rrggbb` strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThemeSettings {
    pub foreground: String,
    pub background: String,
    /// Interior colour; derived from the background when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            foreground: "#d1e2fc".into(),
            background: "#1c232b".into(),
            fill: None,
        }
    }
}

/// Input and output locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathSettings {
    /// Mapping XML pairing packages with drawables.
    pub mapping: PathBuf,
    /// Optional mapping XML applied on top of `mapping`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_mapping: Option<PathBuf>,
    /// Directory holding `{drawable}.svg` sources.
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub manifest: PathBuf,
    pub archive: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            mapping: "icons/appfilter.xml".into(),
            override_mapping: None,
            source_dir: "icons/svg".into(),
            output_dir: "output".into(),
            cache_dir: ".cache/masks".into(),
            manifest: ".cache/manifest.json".into(),
            archive: ".cache/masks.tar.gz".into(),
        }
    }
}

/// Parallelism and memory settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceSettings {
    /// Concurrent tasks per batch. `None` means `min(128, cpus * 4)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    /// Batch size when the accelerated binarizer is in use.
    pub batch_size_accelerated: usize,
    /// Batch size for the naive binarizer.
    pub batch_size_naive: usize,
    /// Idle buffers kept by the pool. `None` means two per worker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_capacity: Option<usize>,
    /// Threads for concurrent flood-fill seeds; 0 or 1 fills sequentially.
    pub fill_workers: usize,
    /// Per-task deadline in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_timeout_secs: Option<u64>,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            max_workers: None,
            batch_size_accelerated: 1000,
            batch_size_naive: 200,
            pool_capacity: None,
            fill_workers: 0,
            task_timeout_secs: None,
        }
    }
}

impl PerformanceSettings {
    /// Resolves the worker count, falling back to `min(128, cpus * 4)`.
    pub fn effective_max_workers(&self) -> usize {
        match self.max_workers {
            Some(n) => n.max(1),
            None => {
                let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
                (cpus * 4).min(MAX_DEFAULT_WORKERS)
            }
        }
    }

    /// Resolves the pool capacity: one ink plane and one fill scratch
    /// plane for every worker unless set explicitly.
    pub fn effective_pool_capacity(&self) -> usize {
        self.pool_capacity
            .unwrap_or_else(|| self.effective_max_workers() * 2)
    }

    /// Picks the batch size matching the binarization strategy.
    pub fn batch_size_for(&self, strategy: &dyn BinarizationStrategy) -> usize {
        let size = if strategy.is_accelerated() {
            self.batch_size_accelerated
        } else {
            self.batch_size_naive
        };
        size.max(1)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}

/// Lock-screen shortcut rendered once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShortcutSettings {
    /// Drawable drawn on the shortcut, resolved in `sourceDir`.
    pub drawable: String,
    /// Greyscale template clipping the background.
    pub mask: PathBuf,
    pub output: PathBuf,
    pub icon_size: u32,
    pub icon_scale: f32,
}

impl Default for ShortcutSettings {
    fn default() -> Self {
        Self {
            drawable: "volumelockr".into(),
            mask: "templates/miui_mod_icons/icon_folder.png".into(),
            output: "icons/res/drawable-xxhdpi/status_bar_toggle_lock.png".into(),
            icon_size: 235,
            icon_scale: 0.6,
        }
    }
}

// ============================================================================
// RunConfig
// ============================================================================

/// Complete configuration for one generator run.
///
/// # JSON Format
///
/// ```json
/// {
///   "theme": { "foreground": "#d1e2fc", "background": "#1c232b" },
///   "iconSize": 432,
///   "iconScale": 0.4,
///   "supersampling": 2.0,
///   "style": "filled",
///   "paths": { "sourceDir": "icons/svg", "outputDir": "output" },
///   "performance": { "batchSizeAccelerated": 1000, "poolCapacity": 64 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfig {
    pub theme: ThemeSettings,
    pub icon_size: u32,
    pub icon_scale: f32,
    pub supersampling: f32,
    pub style: IconStyle,
    pub paths: PathSettings,
    pub performance: PerformanceSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<ShortcutSettings>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            theme: ThemeSettings::default(),
            icon_size: 432,
            icon_scale: 0.4,
            supersampling: 2.0,
            style: IconStyle::default(),
            paths: PathSettings::default(),
            performance: PerformanceSettings::default(),
            shortcut: None,
        }
    }
}

impl RunConfig {
    /// Creates a configuration with every field at its default.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_theme(mut self, theme: ThemeSettings) -> Self {
        self.theme = theme;
        self
    }

    pub fn with_icon_size(mut self, size: u32) -> Self {
        self.icon_size = size;
        self
    }

    pub fn with_icon_scale(mut self, scale: f32) -> Self {
        self.icon_scale = scale;
        self
    }

    pub fn with_supersampling(mut self, factor: f32) -> Self {
        self.supersampling = factor;
        self
    }

    pub fn with_style(mut self, style: IconStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_paths(mut self, paths: PathSettings) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_performance(mut self, performance: PerformanceSettings) -> Self {
        self.performance = performance;
        self
    }

    pub fn with_shortcut(mut self, shortcut: ShortcutSettings) -> Self {
        self.shortcut = Some(shortcut);
        self
    }

    /// Replaces theme colours with `FG_COLOR` / `BG_COLOR` when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with a
    /// custom variable lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(fg) = lookup(FG_COLOR_VAR).filter(|v| !v.trim().is_empty()) {
            self.theme.foreground = fg;
        }
        if let Some(bg) = lookup(BG_COLOR_VAR).filter(|v| !v.trim().is_empty()) {
            self.theme.background = bg;
        }
    }

    /// Resolves colours and geometry into a [`RenderSpec`].
    pub fn render_spec(&self) -> Result<RenderSpec, ConfigError> {
        let foreground = parse_hex(&self.theme.foreground)?;
        let background = parse_hex(&self.theme.background)?;
        let fill = match &self.theme.fill {
            Some(hex) => parse_hex(hex)?,
            None => fill_from_background(background),
        };

        Ok(RenderSpec {
            icon_size: self.icon_size,
            foreground,
            background,
            fill,
            scale: self.icon_scale,
            supersampling: self.supersampling,
            style: self.style,
        })
    }

    /// Serializes the configuration to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the configuration to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(Self::from_json(&json)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{NaiveBinarizer, SeparableBinarizer};

    #[test]
    fn empty_config_deserializes_to_defaults() {
        let config = RunConfig::from_json("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.icon_size, 432);
        assert_eq!(config.icon_scale, 0.4);
        assert_eq!(config.supersampling, 2.0);
        assert_eq!(config.style, IconStyle::Filled);
    }

    #[test]
    fn config_json_format() {
        let config = RunConfig::new().with_style(IconStyle::Outlined);
        let json = config.to_json_pretty().unwrap();

        assert!(json.contains("\"iconSize\""));
        assert!(json.contains("\"batchSizeAccelerated\""));
        assert!(json.contains("\"sourceDir\""));
        assert!(json.contains("\"outlined\""));
        assert!(!json.contains("\"maxWorkers\""));
    }

    #[test]
    fn partial_groups_keep_remaining_defaults() {
        let config =
            RunConfig::from_json(r#"{"performance": {"poolCapacity": 8}, "paths": {"outputDir": "out"}}"#)
                .unwrap();
        assert_eq!(config.performance.effective_pool_capacity(), 8);
        assert_eq!(config.performance.batch_size_naive, 200);
        assert_eq!(config.paths.output_dir, PathBuf::from("out"));
        assert_eq!(config.paths.cache_dir, PathBuf::from(".cache/masks"));
    }

    #[test]
    fn shortcut_is_opt_in() {
        assert_eq!(RunConfig::new().shortcut, None);
        assert!(!RunConfig::new().to_json().unwrap().contains("shortcut"));

        let config = RunConfig::from_json(r#"{"shortcut": {"iconSize": 100}}"#).unwrap();
        let shortcut = config.shortcut.unwrap();
        assert_eq!(shortcut.icon_size, 100);
        assert_eq!(shortcut.icon_scale, 0.6);
        assert_eq!(shortcut.drawable, "volumelockr");
    }

    #[test]
    fn render_spec_resolves_colours() {
        let spec = RunConfig::new().render_spec().unwrap();
        assert_eq!(spec.foreground, Rgba([0xd1, 0xe2, 0xfc, 255]));
        assert_eq!(spec.background, Rgba([0x1c, 0x23, 0x2b, 255]));
        assert_eq!(spec.fill, fill_from_background(spec.background));
        assert_eq!(spec.supersampled_size(), 864);
    }

    #[test]
    fn explicit_fill_wins() {
        let theme = ThemeSettings {
            fill: Some("#ff0000".into()),
            ..ThemeSettings::default()
        };
        let spec = RunConfig::new().with_theme(theme).render_spec().unwrap();
        assert_eq!(spec.fill, Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn bad_colour_is_rejected() {
        let theme = ThemeSettings {
            foreground: "not-a-colour".into(),
            ..ThemeSettings::default()
        };
        let err = RunConfig::new().with_theme(theme).render_spec().unwrap_err();
        assert!(matches!(err, ConfigError::Color(_)));
    }

    #[test]
    fn overrides_replace_theme_colours() {
        let mut config = RunConfig::new();
        config.apply_overrides_from(|name| match name {
            FG_COLOR_VAR => Some("#000000".into()),
            BG_COLOR_VAR => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.theme.foreground, "#000000");
        assert_eq!(config.theme.background, "#1c232b");
    }

    #[test]
    fn supersampled_size_rounds() {
        let spec = RunConfig::new()
            .with_icon_size(101)
            .with_supersampling(1.5)
            .render_spec()
            .unwrap();
        assert_eq!(spec.supersampled_size(), 152);
    }

    #[test]
    fn batch_size_follows_strategy() {
        let perf = PerformanceSettings::default();
        assert_eq!(perf.batch_size_for(&SeparableBinarizer), 1000);
        assert_eq!(perf.batch_size_for(&NaiveBinarizer), 200);
    }

    #[test]
    fn default_workers_are_capped() {
        let perf = PerformanceSettings::default();
        let workers = perf.effective_max_workers();
        assert!((1..=MAX_DEFAULT_WORKERS).contains(&workers));

        let explicit = PerformanceSettings {
            max_workers: Some(0),
            ..PerformanceSettings::default()
        };
        assert_eq!(explicit.effective_max_workers(), 1);
        assert_eq!(explicit.effective_pool_capacity(), 2);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"iconSize": 128}"#).unwrap();
        assert_eq!(RunConfig::load(&path).unwrap().icon_size, 128);

        let err = RunConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }
}
