use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::geometry::Rect;

use super::atlas::SpriteSheet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LoadKind {
    /// Raw text.
    #[default]
    Misc,
    Json,
    Image,
    SpriteSheet,
    Audio,
}

impl LoadKind {
    pub const fn label_prefix(self) -> &'static str {
        match self {
            LoadKind::Misc => "text",
            LoadKind::Json => "data",
            LoadKind::Image => "image",
            LoadKind::SpriteSheet => "spritesheet",
            LoadKind::Audio => "audio",
        }
    }
}

/// Decoded RGBA8 pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rgba,
        }
    }

    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            rgba.extend_from_slice(&color);
        }
        Self::new(width, height, rgba)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes = self.rgba.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

pub type ImageHandle = Rc<ImageData>;

/// A sub-rectangle of a shared image.
#[derive(Debug, Clone)]
pub struct Texture {
    pub image: ImageHandle,
    pub frame: Rect,
}

impl Texture {
    pub fn whole(image: ImageHandle) -> Self {
        let frame = Rect::new(0.0, 0.0, image.width as f32, image.height as f32);
        Self { image, frame }
    }
}

/// Encoded audio bytes as fetched; decoding belongs to the playback backend.
#[derive(Clone, PartialEq, Eq)]
pub struct SoundData {
    pub url: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for SoundData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundData")
            .field("url", &self.url)
            .field("len", &self.bytes.len())
            .finish()
    }
}

pub type SoundHandle = Rc<SoundData>;

#[derive(Debug, Clone)]
pub enum AssetHandle {
    Text(Rc<str>),
    Json(Rc<Value>),
    Image(ImageHandle),
    SpriteSheet(Rc<SpriteSheet>),
    Sound(SoundHandle),
}

impl Default for AssetHandle {
    fn default() -> Self {
        AssetHandle::Text(Rc::from(""))
    }
}

impl AssetHandle {
    pub fn kind(&self) -> LoadKind {
        match self {
            AssetHandle::Text(_) => LoadKind::Misc,
            AssetHandle::Json(_) => LoadKind::Json,
            AssetHandle::Image(_) => LoadKind::Image,
            AssetHandle::SpriteSheet(_) => LoadKind::SpriteSheet,
            AssetHandle::Sound(_) => LoadKind::Audio,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AssetHandle::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Rc<Value>> {
        match self {
            AssetHandle::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageHandle> {
        match self {
            AssetHandle::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_sprite_sheet(&self) -> Option<&Rc<SpriteSheet>> {
        match self {
            AssetHandle::SpriteSheet(sheet) => Some(sheet),
            _ => None,
        }
    }

    pub fn as_sound(&self) -> Option<&SoundHandle> {
        match self {
            AssetHandle::Sound(sound) => Some(sound),
            _ => None,
        }
    }
}
