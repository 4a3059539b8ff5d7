//! TIFF sequence input and output.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use image::{ImageError, ImageFormat};
use skyclear::{FrameLoader, FrameSink, PixelBuffer, SkyclearError};
use tracing::debug;

const EXTENSIONS: [&str; 2] = ["tif", "tiff"];

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|tiff| ext.eq_ignore_ascii_case(tiff)))
}

/// The TIFF files of one directory, in file name order.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
}

impl ImageSequence {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
            let path = entry?.path();
            if path.is_file() && is_tiff(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            bail!("no tiff files in {}", dir.display());
        }
        paths.sort();
        Ok(Self { paths })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn file_names(&self) -> Vec<OsString> {
        self.paths
            .iter()
            .map(|path| path.file_name().map(|name| name.to_owned()).unwrap_or_default())
            .collect()
    }
}

/// Decoder failures, limits included, are input errors. Out of memory is the one
/// case the frame cache may retry.
fn decode_error(frame_index: usize, path: &Path, err: ImageError) -> SkyclearError {
    match err {
        ImageError::IoError(io) if io.kind() == io::ErrorKind::OutOfMemory => SkyclearError::ResourceExhausted {
            frame: frame_index,
            reason: format!("{}: {io}", path.display()),
        },
        other => SkyclearError::input(frame_index, format!("{}: {other}", path.display())),
    }
}

impl FrameLoader for ImageSequence {
    fn frame_count(&self) -> usize {
        self.paths.len()
    }

    fn load(&self, frame_index: usize) -> skyclear::Result<PixelBuffer> {
        let path = self
            .paths
            .get(frame_index)
            .ok_or_else(|| SkyclearError::input(frame_index, "frame index past end of sequence"))?;
        let image = image::open(path).map_err(|err| decode_error(frame_index, path, err))?;
        debug!(frame = frame_index, path = %path.display(), "decoded");
        Ok(PixelBuffer::from_rgb16(image.to_rgb16()))
    }
}

/// Writes finished frames under their input file names. Each file is written to a
/// temporary name and renamed into place, so a failed write leaves nothing behind.
pub struct TiffSink {
    output_dir: PathBuf,
    test_paint_dir: Option<PathBuf>,
    names: Vec<OsString>,
}

impl TiffSink {
    pub fn new(output_dir: PathBuf, test_paint_dir: Option<PathBuf>, names: Vec<OsString>) -> Result<Self> {
        fs::create_dir_all(&output_dir).with_context(|| format!("creating {}", output_dir.display()))?;
        if let Some(dir) = &test_paint_dir {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(Self { output_dir, test_paint_dir, names })
    }

    fn save(&self, dir: &Path, frame_index: usize, frame: PixelBuffer) -> skyclear::Result<()> {
        let output_error = |reason: String| SkyclearError::Output { frame: frame_index, reason };
        let name = self
            .names
            .get(frame_index)
            .ok_or_else(|| output_error("no file name for frame".into()))?;
        let target = dir.join(name);
        let mut partial = target.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        frame
            .into_rgb16()
            .save_with_format(&partial, ImageFormat::Tiff)
            .map_err(|err| output_error(format!("{}: {err}", partial.display())))?;
        fs::rename(&partial, &target).map_err(|err| {
            let _ = fs::remove_file(&partial);
            output_error(format!("{}: {err}", target.display()))
        })?;
        debug!(frame = frame_index, path = %target.display(), "wrote");
        Ok(())
    }
}

impl FrameSink for TiffSink {
    fn write(&self, frame_index: usize, frame: PixelBuffer) -> skyclear::Result<()> {
        self.save(&self.output_dir, frame_index, frame)
    }

    fn write_test_paint(&self, frame_index: usize, frame: PixelBuffer) -> skyclear::Result<()> {
        match &self.test_paint_dir {
            Some(dir) => self.save(dir, frame_index, frame),
            None => Ok(()),
        }
    }
}
