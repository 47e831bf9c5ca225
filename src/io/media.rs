// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Medical image loading.
//!
//! This module loads the image file an annotation store is bound to and
//! converts it to RGBA pixel data suitable for display by an external
//! renderer. Decoding internals are delegated to the `image` crate.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// The bound image could not be read or decoded.
///
/// Fatal to store construction; there is nothing to annotate without
/// the image.
#[derive(Debug, Error)]
#[error("failed to load image {}: {source}", path.display())]
pub struct ImageLoadError {
    pub path: PathBuf,
    #[source]
    pub source: image::ImageError,
}

/// Decoded image data.
#[derive(Debug)]
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixel data, row-major.
    pub pixels: Vec<u8>,
}

impl LoadedImage {
    /// Image dimensions as (width, height).
    pub fn shape(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Load an image file into RGBA pixel data.
pub fn load_image(path: &Path) -> Result<LoadedImage, ImageLoadError> {
    let img = image::open(path).map_err(|source| ImageLoadError {
        path: path.to_path_buf(),
        source,
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    Ok(LoadedImage {
        width,
        height,
        pixels: rgba.into_raw(),
    })
}
