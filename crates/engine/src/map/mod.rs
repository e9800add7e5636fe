//! Tiled JSON maps: documents, tilesets, layers and the map that owns them.

mod document;
mod layer;
mod tilemap;
mod tileset;

use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

use crate::assets::{DataManager, ImageManager};
use crate::signal::ListenerError;

pub use document::{
    LayerDocument, MapDocument, MapObjectDocument, ObjectGroupDocument, PropertyMap,
    TileDocument, TileLayerDocument, TilesetDocument, TilesetRef,
};
pub use layer::{object_properties, Layer, ObjectLayer, Tile, TileLayer};
pub use tilemap::TileMap;
pub use tileset::{find_tileset_by_gid, strip_flip_flags, TileSet};

#[derive(Debug, Error)]
pub enum MapError {
    #[error("map document {url} is invalid: {source}")]
    Document {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("map asset {url} did not load as JSON")]
    NotJson { url: String },
    #[error("no object type registered under `{name}`")]
    UnknownObjectType { name: String },
    #[error("object_type must be a string, got {value}")]
    ObjectTypeNotString { value: Value },
    #[error("object `{type_name}` rejected its parameters: {reason}")]
    ObjectParams { type_name: String, reason: String },
}

impl From<MapError> for ListenerError {
    fn from(error: MapError) -> Self {
        ListenerError::new(error)
    }
}

/// Managers a map loads through.
#[derive(Debug, Clone)]
pub struct MapLoaders {
    pub data: Rc<DataManager>,
    pub images: Rc<ImageManager>,
}

/// Directories tileset definitions and their images are looked up in, by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapPaths {
    pub tileset_dir: String,
    pub image_dir: String,
}

impl Default for MapPaths {
    fn default() -> Self {
        Self {
            tileset_dir: "assets/tilesets/".to_string(),
            image_dir: "assets/gfx/tilesets/".to_string(),
        }
    }
}

/// Cell dimensions of a map, in tiles and pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapGrid {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl MapGrid {
    pub fn from_document(document: &MapDocument) -> Self {
        Self {
            width: document.width,
            height: document.height,
            tile_width: document.tilewidth,
            tile_height: document.tileheight,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Column and row of a row-major cell index.
    pub fn position(&self, index: usize) -> (u32, u32) {
        let width = self.width.max(1) as usize;
        ((index % width) as u32, (index / width) as u32)
    }

    pub fn index(&self, x: u32, y: u32) -> usize {
        x as usize + y as usize * self.width as usize
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width * self.tile_width,
            self.height * self.tile_height,
        )
    }
}
