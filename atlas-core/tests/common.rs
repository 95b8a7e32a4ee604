//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use atlas_core::secret::MemorySecretKeeper;
use atlas_core::{RasterCodec, RecordingNotifier, Repository, StoreConfig};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

/// Everything a test needs to reopen the same store.
pub struct Harness {
    /// Application-support root, removed on drop.
    pub root: tempfile::TempDir,
    /// Key storage shared by every reopen.
    pub keeper: Arc<MemorySecretKeeper>,
    /// Records notification requests.
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    /// Fresh root, keeper and notifier.
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("tempdir"),
            keeper: Arc::new(MemorySecretKeeper::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    /// Default settings for this root.
    pub fn config(&self) -> StoreConfig {
        StoreConfig::new(self.root.path())
    }

    /// Opens the repository, panicking on failure.
    pub fn open(&self) -> Repository {
        Repository::open(
            self.config(),
            self.keeper.clone(),
            Arc::new(RasterCodec),
            self.notifier.clone(),
        )
        .expect("open repository")
    }

    /// Directory holding the encrypted blobs.
    pub fn store_dir(&self) -> std::path::PathBuf {
        self.config().paths().store_dir().to_path_buf()
    }
}

/// A solid-colour PNG of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([180, 140, 120])))
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// A baseline JPEG, as a camera would deliver it.
pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode_image(&RgbImage::from_pixel(width, height, Rgb([200, 150, 130])))
        .expect("encode jpeg");
    out
}

/// Returns `true` if `needle` occurs anywhere in a file below `dir`.
pub fn any_file_contains(dir: &Path, needle: &[u8]) -> bool {
    std::fs::read_dir(dir).expect("read_dir").any(|entry| {
        let path = entry.expect("entry").path();
        if path.is_dir() {
            any_file_contains(&path, needle)
        } else {
            let bytes = std::fs::read(&path).expect("read");
            bytes.windows(needle.len()).any(|w| w == needle)
        }
    })
}
