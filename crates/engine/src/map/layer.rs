use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::app::Surface;
use crate::assets::Texture;
use crate::geometry::{Rect, Vec2};
use crate::objects::{
    GameObject, ObjectProperties, ObjectRegistry, ObjectSpawn, DEFAULT_OBJECT_TYPE,
};

use super::document::{MapObjectDocument, ObjectGroupDocument, PropertyMap, TileLayerDocument};
use super::tileset::{find_tileset_by_gid, strip_flip_flags, TileSet};
use super::{MapError, MapGrid};

const OBJECT_TYPE_PROPERTY: &str = "object_type";

#[derive(Debug, Clone)]
pub struct Tile {
    pub gid: u32,
    pub frame: Rect,
    pub texture: Option<Texture>,
    pub position: Vec2,
    pub properties: PropertyMap,
}

impl Tile {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: Value) {
        self.properties.insert(name, value);
    }
}

/// Dense `width * height` grid; `None` cells are holes.
#[derive(Debug, Clone, Default)]
pub struct TileLayer {
    pub name: String,
    pub visible: bool,
    tiles: Vec<Option<Tile>>,
}

impl TileLayer {
    pub fn parse(document: &TileLayerDocument, grid: &MapGrid, tilesets: &[Rc<TileSet>]) -> Self {
        let mut layer = Self {
            name: document.name.clone(),
            visible: document.visible,
            tiles: Vec::new(),
        };
        layer.clear(grid);

        for (index, &raw) in document.data.iter().enumerate() {
            let gid = strip_flip_flags(raw);
            if gid == 0 {
                continue;
            }
            let Some(tileset) = find_tileset_by_gid(tilesets, gid) else {
                continue;
            };
            let local = gid - tileset.firstgid();
            let Some(frame) = tileset.tile_rect(local) else {
                continue;
            };
            let mut tile = Tile {
                gid,
                frame,
                texture: tileset.tile_texture(local),
                position: Vec2::ZERO,
                properties: PropertyMap::new(),
            };
            if let Some(properties) = tileset.tile_properties(local) {
                for (name, value) in properties.iter() {
                    tile.set_property(name, value.clone());
                }
            }
            if !layer.set_tile(grid, index, tile) {
                debug!(layer = %layer.name, index, "tile_outside_grid_skipped");
            }
        }

        layer
    }

    /// Empties every cell and resizes the layer to the map grid.
    pub fn clear(&mut self, grid: &MapGrid) {
        self.tiles.clear();
        self.tiles.resize(grid.cell_count(), None);
    }

    /// Places `tile` at cell `index`, positioning it in pixels. Returns `false` off the grid.
    pub fn set_tile(&mut self, grid: &MapGrid, index: usize, mut tile: Tile) -> bool {
        let Some(cell) = self.tiles.get_mut(index) else {
            return false;
        };
        let (col, row) = grid.position(index);
        tile.position = Vec2::new(
            (col * grid.tile_width) as f32,
            (row * grid.tile_height) as f32,
        );
        *cell = Some(tile);
        true
    }

    pub fn tile(&self, index: usize) -> Option<&Tile> {
        self.tiles.get(index).and_then(Option::as_ref)
    }

    pub fn tile_mut(&mut self, index: usize) -> Option<&mut Tile> {
        self.tiles.get_mut(index).and_then(Option::as_mut)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter().flatten()
    }

    pub fn draw(&self, surface: &mut Surface, origin: Vec2) {
        if !self.visible {
            return;
        }
        for tile in self.tiles() {
            if let Some(texture) = &tile.texture {
                let x = (origin.x + tile.position.x).round() as i32;
                let y = (origin.y + tile.position.y).round() as i32;
                surface.blit_texture(texture, x, y);
            }
        }
    }
}

#[derive(Default)]
pub struct ObjectLayer {
    pub name: String,
    pub visible: bool,
    objects: Vec<Box<dyn GameObject>>,
}

impl fmt::Debug for ObjectLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectLayer")
            .field("name", &self.name)
            .field("visible", &self.visible)
            .field("objects", &self.objects.len())
            .finish()
    }
}

impl ObjectLayer {
    pub fn parse(
        document: &ObjectGroupDocument,
        tilesets: &[Rc<TileSet>],
        registry: &ObjectRegistry,
    ) -> Result<Self, MapError> {
        let mut layer = Self {
            name: document.name.clone(),
            visible: document.visible,
            objects: Vec::with_capacity(document.objects.len()),
        };
        for source in &document.objects {
            let object = create_object(source, tilesets, registry)?;
            layer.objects.push(object);
        }
        Ok(layer)
    }

    pub fn objects(&self) -> &[Box<dyn GameObject>] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut [Box<dyn GameObject>] {
        &mut self.objects
    }

    pub fn update(&mut self, dt: f32) {
        for object in &mut self.objects {
            object.update(dt);
        }
    }

    pub fn draw(&self, surface: &mut Surface, origin: Vec2) {
        if !self.visible {
            return;
        }
        for object in &self.objects {
            object.draw(surface, origin);
        }
    }
}

pub fn object_properties(source: &MapObjectDocument, tilesets: &[Rc<TileSet>]) -> ObjectProperties {
    let gid = strip_flip_flags(source.gid);
    let object = if gid > 0 {
        find_tileset_by_gid(tilesets, gid)
            .and_then(|tileset| tileset.tile_properties(gid - tileset.firstgid()))
    } else {
        None
    };
    ObjectProperties {
        instance: source.properties.clone(),
        object,
    }
}

/// Instance bag first, then tile bag; the last `object_type` seen wins.
fn object_type_name(properties: &ObjectProperties) -> Result<String, MapError> {
    let mut selected = None;
    for bag in [&properties.instance, &properties.object].into_iter().flatten() {
        if let Some(value) = bag.get(OBJECT_TYPE_PROPERTY) {
            selected = Some(value);
        }
    }
    match selected {
        None => Ok(DEFAULT_OBJECT_TYPE.to_string()),
        Some(Value::String(name)) => Ok(name.clone()),
        Some(other) => Err(MapError::ObjectTypeNotString {
            value: other.clone(),
        }),
    }
}

/// `paramN` values from the tile bag, ordered by `N`.
fn constructor_params(properties: &ObjectProperties) -> Vec<Value> {
    let Some(bag) = properties.object.as_ref() else {
        return Vec::new();
    };
    let mut params: Vec<(u64, Value)> = bag
        .iter()
        .filter_map(|(name, value)| param_index(name).map(|index| (index, value.clone())))
        .collect();
    params.sort_by_key(|(index, _)| *index);
    params.into_iter().map(|(_, value)| value).collect()
}

/// Finds the first `param` directly followed by digits anywhere in `name`.
fn param_index(name: &str) -> Option<u64> {
    name.match_indices("param").find_map(|(start, marker)| {
        let rest = &name[start + marker.len()..];
        let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits_len == 0 {
            None
        } else {
            rest[..digits_len].parse().ok()
        }
    })
}

fn create_object(
    source: &MapObjectDocument,
    tilesets: &[Rc<TileSet>],
    registry: &ObjectRegistry,
) -> Result<Box<dyn GameObject>, MapError> {
    let properties = object_properties(source, tilesets);
    // Tile objects are anchored at their bottom-left corner.
    let placement = Rect::new(
        source.x,
        source.y - source.height,
        source.width,
        source.height,
    );
    let type_name = object_type_name(&properties)?;
    let spawn = ObjectSpawn {
        type_name: &type_name,
        params: constructor_params(&properties),
        properties: &properties,
        placement,
    };

    let mut object = registry.create(&spawn)?;
    let state = object.core_mut().state_mut();
    state.position = Vec2::new(
        placement.x + placement.width * 0.5,
        placement.y + placement.height,
    );
    state.properties = properties.clone();
    debug!(
        object_type = %type_name,
        x = state.position.x,
        y = state.position.y,
        "map_object_created"
    );
    Ok(object)
}

#[derive(Debug)]
pub enum Layer {
    Tile(TileLayer),
    Object(ObjectLayer),
}

impl Layer {
    pub fn name(&self) -> &str {
        match self {
            Layer::Tile(layer) => &layer.name,
            Layer::Object(layer) => &layer.name,
        }
    }

    pub fn as_tile_layer(&self) -> Option<&TileLayer> {
        match self {
            Layer::Tile(layer) => Some(layer),
            Layer::Object(_) => None,
        }
    }

    pub fn as_object_layer(&self) -> Option<&ObjectLayer> {
        match self {
            Layer::Object(layer) => Some(layer),
            Layer::Tile(_) => None,
        }
    }

    pub fn update(&mut self, dt: f32) {
        if let Layer::Object(layer) = self {
            layer.update(dt);
        }
    }

    pub fn draw(&self, surface: &mut Surface, origin: Vec2) {
        match self {
            Layer::Tile(layer) => layer.draw(surface, origin),
            Layer::Object(layer) => layer.draw(surface, origin),
        }
    }
}
