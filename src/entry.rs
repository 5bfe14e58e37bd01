//! Image entries: a filesystem path (or the "nothing loaded" sentinel) plus
//! lazy payload decoding with a placeholder fallback.
//!
//! Loading never surfaces an error to navigation code: a directory, a missing
//! file, or a corrupt image all produce a `Payload::Placeholder` carrying an
//! explanatory label. Only the internal decode step is fallible.

use std::path::{Path, PathBuf};

use image::GenericImageView;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no file loaded")]
    NoFile,
    #[error("is a directory: {0}")]
    IsDirectory(PathBuf),
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Decoded image: raw RGBA pixels ready for display.
pub struct DecodedImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl DecodedImage {
    fn from_file(path: &Path) -> Result<Self, LoadError> {
        let img = image::open(path).map_err(|source| LoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let (w, h) = img.dimensions();
        Ok(DecodedImage {
            rgba: img.into_rgba8().into_raw(),
            width: w,
            height: h,
        })
    }
}

/// What the display layer gets for an entry.
///
/// `Placeholder` is the deterministic rendered-text substitute used for
/// directories, missing files and decode failures.
pub enum Payload {
    Image(DecodedImage),
    Placeholder(String),
}

impl Payload {
    #[allow(dead_code)]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Payload::Placeholder(_))
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Payload::Placeholder(s) => Some(s),
            Payload::Image(_) => None,
        }
    }
}

/// One navigable item in the current folder listing: an image file or a
/// directory. `path == None` is the empty-collection sentinel; sentinel
/// entries never enter the ordered set.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ImageEntry {
    path: Option<PathBuf>,
}

impl ImageEntry {
    pub fn new(path: PathBuf) -> Self {
        ImageEntry { path: Some(path) }
    }

    /// The "no file loaded" sentinel.
    #[allow(dead_code)]
    pub fn none() -> Self {
        ImageEntry { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[allow(dead_code)]
    pub fn is_none(&self) -> bool {
        self.path.is_none()
    }

    #[allow(dead_code)]
    pub fn is_directory(&self) -> bool {
        self.path.as_deref().map(Path::is_dir).unwrap_or(false)
    }

    /// Sort key: the path itself, platform path ordering.
    pub fn sort_key(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn display(&self) -> String {
        match &self.path {
            Some(p) => p.display().to_string(),
            None => "(no file)".into(),
        }
    }

    fn decode(&self) -> Result<DecodedImage, LoadError> {
        let path = self.path.as_deref().ok_or(LoadError::NoFile)?;
        if path.is_dir() {
            return Err(LoadError::IsDirectory(path.to_path_buf()));
        }
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        DecodedImage::from_file(path)
    }

    /// Decode this entry's backing file, falling back to a placeholder for
    /// every error arm. Infallible by policy: callers rely on always getting
    /// a displayable payload.
    pub fn load_payload(&self) -> Payload {
        match self.decode() {
            Ok(img) => Payload::Image(img),
            Err(e) => {
                if let LoadError::Decode { .. } = &e {
                    eprintln!("entry: {}", e);
                }
                Payload::Placeholder(e.to_string())
            }
        }
    }
}
