//! Command-line driver for the icon pack generator.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use iconpack_renderer::{
    BatchScheduler, IconStyle, MappingTable, RunConfig, SvgRasterizer, to_hex,
};

/// Generate a themed icon pack from monochrome SVG icons
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON run configuration (every field optional)
    #[arg(short = 'C', long, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Mapping XML pairing packages with drawables
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    mapping: Option<PathBuf>,

    /// Mapping XML applied on top of the main mapping
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    overrides: Option<PathBuf>,

    /// Directory holding `{drawable}.svg` sources
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    source: Option<PathBuf>,

    /// Output directory (one subdirectory per package)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    output: Option<PathBuf>,

    /// Final icon size in pixels
    #[arg(long)]
    size: Option<u32>,

    /// Draw line art only, without the computed fill
    #[arg(long)]
    outlined: bool,

    /// Per-task timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl Cli {
    fn resolve_config(&self) -> Result<RunConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };

        if let Some(mapping) = &self.mapping {
            config.paths.mapping = mapping.clone();
        }
        if let Some(overrides) = &self.overrides {
            config.paths.override_mapping = Some(overrides.clone());
        }
        if let Some(source) = &self.source {
            config.paths.source_dir = source.clone();
        }
        if let Some(output) = &self.output {
            config.paths.output_dir = output.clone();
        }
        if let Some(size) = self.size {
            config.icon_size = size;
        }
        if self.outlined {
            config.style = IconStyle::Outlined;
        }
        if self.timeout.is_some() {
            config.performance.task_timeout_secs = self.timeout;
        }

        config.apply_env_overrides();
        Ok(config)
    }
}

fn run(cli: &Cli) -> Result<bool, Box<dyn Error>> {
    let config = cli.resolve_config()?;

    let mut table = MappingTable::load(&config.paths.mapping)?;
    if let Some(path) = &config.paths.override_mapping {
        let overrides = MappingTable::load(path)?;
        log::info!("applying {} mapping overrides", overrides.len());
        table.merge(&overrides);
    }
    let tasks = table.tasks(&config.paths.source_dir, "svg");
    log::info!("{} icons to render", tasks.len());

    let scheduler = BatchScheduler::from_config(&config, Arc::new(SvgRasterizer::new()))?;
    let spec = scheduler.processor().spec();
    log::info!(
        "theme: foreground {}, background {}, fill {}",
        to_hex(spec.foreground),
        to_hex(spec.background),
        to_hex(spec.fill)
    );
    log::debug!("{scheduler:?}");
    let report = scheduler.run(&tasks)?;

    let pool = scheduler.processor().pool().stats();
    log::debug!(
        "buffer pool: {} allocated, {} reused, {} idle",
        pool.allocated,
        pool.reused,
        pool.idle
    );

    println!(
        "{}/{} icons generated ({} failed) in {:.1}s",
        report.successful,
        report.total,
        report.failed(),
        report.elapsed.as_secs_f64()
    );
    Ok(report.is_success())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            let mut message = e.to_string();
            let mut source = e.source();
            while let Some(cause) = source {
                message.push_str(": ");
                message.push_str(&cause.to_string());
                source = cause.source();
            }
            log::error!("{message}");
            ExitCode::FAILURE
        }
    }
}
