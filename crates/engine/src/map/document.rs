//! Serde shapes of Tiled JSON maps and tilesets.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::geometry::Rect;

/// Name to value property table.
///
/// Accepts both the flat object form (`{"solid": true}`) and the typed array form
/// (`[{"name": "solid", "type": "bool", "value": true}]`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap(BTreeMap<String, Value>);

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for PropertyMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Deserialize)]
struct TypedProperty {
    name: String,
    value: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PropertyForm {
    Flat(BTreeMap<String, Value>),
    Typed(Vec<TypedProperty>),
}

impl<'de> Deserialize<'de> for PropertyMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match PropertyForm::deserialize(deserializer)? {
            PropertyForm::Flat(map) => PropertyMap(map),
            PropertyForm::Typed(list) => list
                .into_iter()
                .map(|property| (property.name, property.value))
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TilesetRef {
    pub firstgid: u32,
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapDocument {
    pub width: u32,
    pub height: u32,
    pub tilewidth: u32,
    pub tileheight: u32,
    #[serde(default)]
    pub tilesets: Vec<TilesetRef>,
    #[serde(default)]
    pub layers: Vec<LayerDocument>,
    #[serde(default)]
    pub properties: Option<PropertyMap>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum LayerDocument {
    #[serde(rename = "tilelayer")]
    Tile(TileLayerDocument),
    #[serde(rename = "objectgroup")]
    Object(ObjectGroupDocument),
    /// Image layers, groups and anything newer are not materialized.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TileLayerDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: Vec<u32>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectGroupDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub objects: Vec<MapObjectDocument>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapObjectDocument {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub gid: u32,
    #[serde(default)]
    pub properties: Option<PropertyMap>,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct TileDocument {
    pub id: u32,
    #[serde(default)]
    pub properties: Option<PropertyMap>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TilesetDocument {
    #[serde(default)]
    pub name: String,
    pub columns: u32,
    pub tilewidth: u32,
    pub tileheight: u32,
    #[serde(default)]
    pub margin: u32,
    #[serde(default)]
    pub spacing: u32,
    #[serde(default)]
    pub tilecount: Option<u32>,
    #[serde(default)]
    pub image: Option<String>,
    /// Older per-tile table keyed by local index as a string.
    #[serde(default)]
    pub tileproperties: HashMap<String, PropertyMap>,
    /// Newer per-tile list; merged over `tileproperties`.
    #[serde(default)]
    pub tiles: Vec<TileDocument>,
}

impl TilesetDocument {
    /// Source rectangle of a local tile index. Zero columns is read as one column.
    ///
    /// `None` when the index is past `tilecount` or its offset does not fit in `u32`.
    pub fn tile_rect(&self, local: u32) -> Option<Rect> {
        if self.tilecount.is_some_and(|count| local >= count) {
            return None;
        }
        let columns = self.columns.max(1);
        let col = local % columns;
        let row = local / columns;
        let x = self
            .tilewidth
            .checked_add(self.spacing)?
            .checked_mul(col)?
            .checked_add(self.margin)?;
        let y = self
            .tileheight
            .checked_add(self.spacing)?
            .checked_mul(row)?
            .checked_add(self.margin)?;
        Some(Rect::new(
            x as f32,
            y as f32,
            self.tilewidth as f32,
            self.tileheight as f32,
        ))
    }

    pub fn tile_properties(&self, local: u32) -> Option<PropertyMap> {
        let legacy = self.tileproperties.get(&local.to_string());
        let listed = self
            .tiles
            .iter()
            .find(|tile| tile.id == local)
            .and_then(|tile| tile.properties.as_ref());
        match (legacy, listed) {
            (None, None) => None,
            (Some(only), None) | (None, Some(only)) => Some(only.clone()),
            (Some(legacy), Some(listed)) => {
                let mut merged = legacy.clone();
                for (name, value) in listed.iter() {
                    merged.insert(name, value.clone());
                }
                Some(merged)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tileset(columns: u32, margin: u32, spacing: u32) -> TilesetDocument {
        serde_json::from_value(json!({
            "columns": columns,
            "tilewidth": 16,
            "tileheight": 16,
            "margin": margin,
            "spacing": spacing
        }))
        .expect("tileset document")
    }

    #[test]
    fn tile_rect_slices_by_column_and_row() {
        let document = tileset(8, 0, 0);

        assert_eq!(document.tile_rect(10), Some(Rect::new(32.0, 16.0, 16.0, 16.0)));
        assert_eq!(document.tile_rect(0), Some(Rect::new(0.0, 0.0, 16.0, 16.0)));
    }

    #[test]
    fn tile_rect_applies_margin_and_spacing() {
        let document = tileset(4, 1, 2);

        assert_eq!(document.tile_rect(5), Some(Rect::new(19.0, 19.0, 16.0, 16.0)));
    }

    #[test]
    fn out_of_range_indices_have_no_rect() {
        let document = tileset(8, 0, 0);
        assert_eq!(document.tile_rect(u32::MAX), None);

        let mut counted = tileset(8, 0, 0);
        counted.tilecount = Some(16);
        assert!(counted.tile_rect(15).is_some());
        assert_eq!(counted.tile_rect(16), None);
    }

    #[test]
    fn zero_columns_reads_as_single_column() {
        let document = tileset(0, 0, 0);

        assert_eq!(document.tile_rect(3), Some(Rect::new(0.0, 48.0, 16.0, 16.0)));
    }

    #[test]
    fn property_map_accepts_flat_and_typed_forms() {
        let flat: PropertyMap =
            serde_json::from_value(json!({ "solid": true })).expect("flat form");
        let typed: PropertyMap = serde_json::from_value(json!([
            { "name": "solid", "type": "bool", "value": true }
        ]))
        .expect("typed form");

        assert_eq!(flat, typed);
        assert_eq!(flat.get("solid"), Some(&json!(true)));
    }

    #[test]
    fn tile_properties_merge_legacy_table_and_tile_list() {
        let document: TilesetDocument = serde_json::from_value(json!({
            "columns": 2, "tilewidth": 8, "tileheight": 8,
            "tileproperties": { "3": { "object_type": "Game_Player", "param1": "a" } },
            "tiles": [{ "id": 3, "properties": [{ "name": "param1", "type": "string", "value": "b" }] }]
        }))
        .expect("tileset");

        let properties = document.tile_properties(3).expect("properties");
        assert_eq!(properties.get("object_type"), Some(&json!("Game_Player")));
        assert_eq!(properties.get("param1"), Some(&json!("b")));
        assert!(document.tile_properties(2).is_none());
    }

    #[test]
    fn unknown_layer_types_are_kept_as_other() {
        let document: MapDocument = serde_json::from_value(json!({
            "width": 1, "height": 1, "tilewidth": 8, "tileheight": 8,
            "layers": [
                { "type": "imagelayer", "image": "sky.png" },
                { "type": "tilelayer", "data": [0] }
            ]
        }))
        .expect("map");

        assert!(matches!(document.layers[0], LayerDocument::Other));
        assert!(matches!(document.layers[1], LayerDocument::Tile(_)));
    }
}
