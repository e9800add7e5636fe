//! Fetch primitives. Everything above this layer sees assets only through [`AssetSource`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

use crate::url::resolve_relative;

use super::atlas::{AtlasDocument, SpriteSheet};
use super::handle::{ImageData, SoundData};

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read asset file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("asset not found: {url}")]
    NotFound { url: String },
    #[error("asset {url} is not valid UTF-8: {source}")]
    Utf8 {
        url: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("failed to parse JSON asset {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode image {url}: {source}")]
    DecodeImage {
        url: String,
        #[source]
        source: image::ImageError,
    },
    #[error("sprite atlas {url} is malformed: {reason}")]
    AtlasFormat { url: String, reason: String },
}

pub trait AssetSource {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, AssetError>;

    fn fetch_text(&self, url: &str) -> Result<String, AssetError> {
        let bytes = self.fetch_bytes(url)?;
        String::from_utf8(bytes).map_err(|source| AssetError::Utf8 {
            url: url.to_string(),
            source,
        })
    }

    fn fetch_json(&self, url: &str) -> Result<Value, AssetError> {
        let bytes = self.fetch_bytes(url)?;
        serde_json::from_slice(&bytes).map_err(|source| AssetError::Json {
            url: url.to_string(),
            source,
        })
    }

    fn fetch_image(&self, url: &str) -> Result<ImageData, AssetError> {
        let bytes = self.fetch_bytes(url)?;
        decode_image(url, &bytes)
    }

    /// Loads the atlas JSON, then the image it names relative to the JSON file.
    fn fetch_atlas(&self, url: &str) -> Result<SpriteSheet, AssetError> {
        let document = AtlasDocument::from_value(url, self.fetch_json(url)?)?;
        let image_url = resolve_relative(url, &document.meta.image);
        let image = self.fetch_image(&image_url)?;
        Ok(SpriteSheet::new(Rc::new(image), &document))
    }

    fn fetch_sound(&self, url: &str) -> Result<SoundData, AssetError> {
        Ok(SoundData {
            url: url.to_string(),
            bytes: self.fetch_bytes(url)?,
        })
    }
}

pub fn decode_image(url: &str, bytes: &[u8]) -> Result<ImageData, AssetError> {
    let decoded = image::load_from_memory(bytes).map_err(|source| AssetError::DecodeImage {
        url: url.to_string(),
        source,
    })?;
    let rgba = decoded.to_rgba8();
    Ok(ImageData::new(rgba.width(), rgba.height(), rgba.into_raw()))
}

/// Reads asset URLs as paths relative to a project root.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    root: PathBuf,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let relative = url.trim_start_matches('/');
        relative
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

impl AssetSource for FsAssetSource {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.resolve(url);
        fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                AssetError::NotFound {
                    url: url.to_string(),
                }
            } else {
                AssetError::ReadFile { path, source }
            }
        })
    }
}

/// In-memory assets keyed by URL. Pre-decoded images skip the codec.
#[derive(Debug, Default)]
pub struct MemoryAssetSource {
    files: HashMap<String, Vec<u8>>,
    images: HashMap<String, ImageData>,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.files.insert(url.into(), bytes.into());
        self
    }

    pub fn insert_json(&mut self, url: impl Into<String>, value: &Value) -> &mut Self {
        self.insert(url, value.to_string())
    }

    pub fn insert_image(&mut self, url: impl Into<String>, image: ImageData) -> &mut Self {
        self.images.insert(url.into(), image);
        self
    }
}

impl AssetSource for MemoryAssetSource {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| AssetError::NotFound {
                url: url.to_string(),
            })
    }

    fn fetch_image(&self, url: &str) -> Result<ImageData, AssetError> {
        if let Some(image) = self.images.get(url) {
            return Ok(image.clone());
        }
        let bytes = self.fetch_bytes(url)?;
        decode_image(url, &bytes)
    }
}
