//! Sprite atlases in the TexturePacker JSON-hash layout.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::geometry::Rect;

use super::handle::{ImageHandle, Texture};
use super::source::AssetError;

#[derive(Debug, Clone, Deserialize)]
pub struct AtlasDocument {
    pub frames: HashMap<String, AtlasFrame>,
    pub meta: AtlasMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AtlasFrame {
    pub frame: AtlasRect,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AtlasRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AtlasMeta {
    pub image: String,
}

impl AtlasDocument {
    pub fn from_value(url: &str, value: Value) -> Result<Self, AssetError> {
        serde_json::from_value(value).map_err(|error| AssetError::AtlasFormat {
            url: url.to_string(),
            reason: error.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SpriteSheet {
    image: ImageHandle,
    frames: HashMap<String, Rect>,
}

impl SpriteSheet {
    pub fn new(image: ImageHandle, document: &AtlasDocument) -> Self {
        let frames = document
            .frames
            .iter()
            .map(|(name, frame)| {
                let rect = frame.frame;
                (name.clone(), Rect::new(rect.x, rect.y, rect.w, rect.h))
            })
            .collect();
        Self { image, frames }
    }

    pub fn image(&self) -> &ImageHandle {
        &self.image
    }

    pub fn get(&self, name: &str) -> Option<Texture> {
        self.frames.get(name).map(|frame| Texture {
            image: self.image.clone(),
            frame: *frame,
        })
    }

    pub fn frame_names(&self) -> impl Iterator<Item = &str> {
        self.frames.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
