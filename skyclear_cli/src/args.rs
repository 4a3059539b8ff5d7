use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use skyclear::{Config, ReferenceHistograms};

#[derive(Parser, Debug)]
#[command(
    name = "skyclear",
    version,
    about = "Removes airplane streaks from a directory of 16-bit TIFF timelapse frames"
)]
pub struct Args {
    /// Directory holding the image sequence, frames sorted by file name.
    pub image_sequence_dir: Option<PathBuf>,

    /// Also write a color-coded sequence showing why each group was or was not painted.
    #[arg(long)]
    pub test_paint: bool,

    /// Print the test paint colors and exit.
    #[arg(long)]
    pub show_test_paint_colors: bool,

    /// JSON configuration file. Command line options override it.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON reference histograms replacing the built-in tables.
    #[arg(long, value_name = "FILE")]
    pub histograms: Option<PathBuf>,

    /// Brightness distance past which a pixel is an outlier (16-bit scale).
    #[arg(long)]
    pub max_pixel_distance: Option<u16>,

    /// Pixels added around each painted group.
    #[arg(long, allow_negative_numbers = true)]
    pub padding: Option<i32>,

    /// Frames processed at once. Defaults to the number of CPUs.
    #[arg(short = 'n', long)]
    pub num_concurrent_renders: Option<usize>,

    /// Console log level, overridden by RUST_LOG.
    #[arg(long, default_value = "info")]
    pub console_log_level: String,

    /// Also write logs to this file.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    /// The config file (or defaults) with command line overrides applied, validated.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
                Config::from_json(&json).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Config { max_concurrent_frames: num_cpus::get(), ..Config::default() },
        };
        if let Some(distance) = self.max_pixel_distance {
            config.max_pixel_distance = distance;
        }
        if let Some(padding) = self.padding {
            config.padding = padding;
        }
        if let Some(renders) = self.num_concurrent_renders {
            config.max_concurrent_frames = renders;
        }
        config.test_paint |= self.test_paint;
        config.validate()?;
        Ok(config)
    }

    pub fn load_histograms(&self) -> Result<Arc<ReferenceHistograms>> {
        let histograms = match &self.histograms {
            Some(path) => {
                let json =
                    fs::read_to_string(path).with_context(|| format!("reading histograms {}", path.display()))?;
                ReferenceHistograms::from_json_str(&json)
                    .with_context(|| format!("parsing histograms {}", path.display()))?
            }
            None => ReferenceHistograms::default(),
        };
        Ok(Arc::new(histograms))
    }
}

/// `<dir>-no-planes-<distance>-pad-<padding>`, next to the input directory.
pub fn output_dir_for(input: &Path, config: &Config) -> PathBuf {
    let name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frames".to_string());
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!(
        "{name}-no-planes-{}-pad-{}",
        config.max_pixel_distance, config.padding
    ))
}

pub fn test_paint_dir_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push("-test-paint");
    PathBuf::from(name)
}
