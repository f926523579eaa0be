//! Image-sequence directories as replayable frame sources.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use steadyframe::{FrameSource, SourceError};

const EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Frames stored as individual image files, ordered by file name and
/// decoded on demand.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
}

impl ImageSequence {
    /// List the image files in `dir` (non-recursive).
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_frame_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Decode frame `index` as 8-bit RGB.
    pub fn load(&self, index: usize) -> Result<RgbImage, SourceError> {
        let path = self
            .paths
            .get(index)
            .ok_or_else(|| format!("frame index {} out of range", index))?;
        let img = image::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
        Ok(img.to_rgb8())
    }
}

impl FrameSource<Rgb<u8>> for ImageSequence {
    fn len(&self) -> usize {
        self.paths.len()
    }

    fn frame(&self, index: usize) -> Result<Cow<'_, RgbImage>, SourceError> {
        self.load(index).map(Cow::Owned)
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
