use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{info, warn};

use crate::app::{Drawable, Surface};
use crate::assets::{
    check_completion, check_failure, AssetHandle, AssetLoader, BarrierOutcome, LoadFailure,
    LoadKind, PendingSet, SETTLE_PRIORITY,
};
use crate::geometry::Vec2;
use crate::objects::ObjectRegistry;
use crate::signal::{ListenerResult, ReceiverKey, Signal};

use super::document::{LayerDocument, MapDocument, PropertyMap};
use super::layer::{Layer, ObjectLayer, TileLayer};
use super::tileset::{find_tileset_by_gid, TileSet};
use super::{MapError, MapGrid, MapLoaders, MapPaths};

/// A Tiled map loaded in three stages: the map document, every tileset it references, then the
/// layers built from both. `on_create` fires once the layers exist.
pub struct TileMap {
    loaders: MapLoaders,
    registry: Rc<ObjectRegistry>,
    paths: MapPaths,
    url: RefCell<String>,
    document: RefCell<Option<MapDocument>>,
    grid: Cell<MapGrid>,
    loading: RefCell<Vec<Rc<TileSet>>>,
    /// Completed tilesets; sorted by `firstgid` once the map is built.
    tilesets: RefCell<Vec<Rc<TileSet>>>,
    pending: RefCell<PendingSet>,
    layers: RefCell<Vec<Layer>>,
    created: Cell<bool>,
    pub on_create: Signal<()>,
    pub on_fail: Signal<LoadFailure>,
}

impl fmt::Debug for TileMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileMap")
            .field("url", &self.url.borrow())
            .field("grid", &self.grid.get())
            .field("tilesets", &self.tilesets.borrow().len())
            .field("layers", &self.layers.borrow().len())
            .field("created", &self.created.get())
            .finish()
    }
}

impl TileMap {
    pub fn new(loaders: MapLoaders, registry: Rc<ObjectRegistry>, paths: MapPaths) -> Rc<Self> {
        Rc::new(Self {
            loaders,
            registry,
            paths,
            url: RefCell::new(String::new()),
            document: RefCell::new(None),
            grid: Cell::new(MapGrid::default()),
            loading: RefCell::new(Vec::new()),
            tilesets: RefCell::new(Vec::new()),
            pending: RefCell::new(PendingSet::default()),
            layers: RefCell::new(Vec::new()),
            created: Cell::new(false),
            on_create: Signal::new(),
            on_fail: Signal::new(),
        })
    }

    /// Starts loading the map document at `url`.
    pub fn load(self: &Rc<Self>, url: &str) -> Rc<AssetLoader> {
        *self.url.borrow_mut() = url.to_string();
        let loader = self.loaders.data.load_json("", url);

        let weak = Rc::downgrade(self);
        loader.on_complete.add_once_with(
            Rc::new(move |handle: &AssetHandle| match weak.upgrade() {
                Some(map) => map.apply_document(handle),
                None => Ok(()),
            }),
            ReceiverKey::of(self),
            None,
            SETTLE_PRIORITY,
        );
        let weak = Rc::downgrade(self);
        loader.on_fail.add_once_with(
            Rc::new(move |failure: &LoadFailure| match weak.upgrade() {
                Some(map) => map.fail(failure.clone()),
                None => Ok(()),
            }),
            ReceiverKey::of(self),
            None,
            SETTLE_PRIORITY,
        );
        loader
    }

    fn apply_document(self: &Rc<Self>, handle: &AssetHandle) -> ListenerResult {
        let url = self.url();
        let parsed = match handle.as_json() {
            Some(value) => serde_json::from_value::<MapDocument>(value.as_ref().clone())
                .map_err(|source| MapError::Document {
                    url: url.clone(),
                    source,
                }),
            None => Err(MapError::NotJson { url: url.clone() }),
        };
        match parsed {
            Ok(document) => self.load_assets(document),
            Err(error) => self.fail(LoadFailure {
                url,
                kind: LoadKind::Json,
                reason: error.to_string(),
            }),
        }
    }

    /// Kicks off every tileset, keyed `tileset{i}` in declaration order.
    fn load_assets(self: &Rc<Self>, document: MapDocument) -> ListenerResult {
        self.grid.set(MapGrid::from_document(&document));
        let references = document.tilesets.clone();
        *self.document.borrow_mut() = Some(document);

        let keys: Vec<String> = (0..references.len())
            .map(|index| format!("tileset{index}"))
            .collect();
        *self.pending.borrow_mut() = PendingSet::new(keys.iter().cloned());

        for (reference, key) in references.iter().zip(keys) {
            let tileset =
                TileSet::load(reference.firstgid, &reference.source, &self.loaders, &self.paths);
            self.watch_tileset(&tileset, key);
            self.loading.borrow_mut().push(tileset);
        }

        let outcome = self.pending.borrow_mut().take_if_empty();
        match outcome {
            Some(outcome) => self.assets_settled(outcome),
            None => Ok(()),
        }
    }

    fn watch_tileset(self: &Rc<Self>, tileset: &Rc<TileSet>, key: String) {
        let weak_map: Weak<TileMap> = Rc::downgrade(self);
        let weak_tileset = Rc::downgrade(tileset);
        let completed_key = key.clone();
        tileset.on_complete.add_once_with(
            Rc::new(move |_: &()| {
                let (Some(map), Some(tileset)) = (weak_map.upgrade(), weak_tileset.upgrade())
                else {
                    return Ok(());
                };
                map.tilesets.borrow_mut().push(tileset);
                check_completion(&completed_key, &map.pending, |outcome| {
                    map.assets_settled(outcome)
                })
            }),
            ReceiverKey::of(self),
            None,
            SETTLE_PRIORITY,
        );

        let weak_map: Weak<TileMap> = Rc::downgrade(self);
        tileset.on_fail.add_once_with(
            Rc::new(move |failure: &LoadFailure| {
                let Some(map) = weak_map.upgrade() else {
                    return Ok(());
                };
                warn!(key = %key, url = %failure.url, reason = %failure.reason, "map_tileset_failed");
                check_failure(&key, &map.pending, |outcome| map.assets_settled(outcome))
            }),
            ReceiverKey::of(self),
            None,
            SETTLE_PRIORITY,
        );
    }

    fn assets_settled(&self, outcome: BarrierOutcome) -> ListenerResult {
        if !outcome.is_success() {
            return self.fail(LoadFailure {
                url: self.url(),
                kind: LoadKind::Json,
                reason: format!("tilesets failed to load: {}", outcome.failed.join(", ")),
            });
        }
        match self.build_layers() {
            Ok(layers) => {
                let layer_count = layers.len();
                *self.layers.borrow_mut() = layers;
                self.created.set(true);
                info!(
                    url = %self.url(),
                    tilesets = self.tilesets.borrow().len(),
                    layers = layer_count,
                    "map_created"
                );
                self.on_create.dispatch()
            }
            Err(error) => self.fail(LoadFailure {
                url: self.url(),
                kind: LoadKind::Json,
                reason: error.to_string(),
            }),
        }
    }

    fn build_layers(&self) -> Result<Vec<Layer>, MapError> {
        self.tilesets
            .borrow_mut()
            .sort_by_key(|tileset| tileset.firstgid());
        let tilesets = self.tilesets.borrow();
        let document = self.document.borrow();
        let Some(document) = document.as_ref() else {
            return Ok(Vec::new());
        };
        let grid = self.grid.get();

        let mut layers = Vec::with_capacity(document.layers.len());
        for layer in &document.layers {
            match layer {
                LayerDocument::Tile(source) => {
                    layers.push(Layer::Tile(TileLayer::parse(source, &grid, &tilesets)));
                }
                LayerDocument::Object(source) => {
                    layers.push(Layer::Object(ObjectLayer::parse(
                        source,
                        &tilesets,
                        &self.registry,
                    )?));
                }
                LayerDocument::Other => {}
            }
        }
        Ok(layers)
    }

    fn fail(&self, failure: LoadFailure) -> ListenerResult {
        warn!(url = %failure.url, reason = %failure.reason, "map_load_failed");
        self.on_fail.dispatch_with(failure)
    }

    pub fn url(&self) -> String {
        self.url.borrow().clone()
    }

    pub fn is_created(&self) -> bool {
        self.created.get()
    }

    pub fn grid(&self) -> MapGrid {
        self.grid.get()
    }

    pub fn properties(&self) -> Option<PropertyMap> {
        self.document
            .borrow()
            .as_ref()
            .and_then(|document| document.properties.clone())
    }

    pub fn tilesets(&self) -> Ref<'_, Vec<Rc<TileSet>>> {
        self.tilesets.borrow()
    }

    pub fn tileset_by_gid(&self, gid: u32) -> Option<Rc<TileSet>> {
        find_tileset_by_gid(&self.tilesets.borrow(), gid).cloned()
    }

    pub fn layers(&self) -> Ref<'_, Vec<Layer>> {
        self.layers.borrow()
    }

    pub fn layers_mut(&self) -> RefMut<'_, Vec<Layer>> {
        self.layers.borrow_mut()
    }

    pub fn position(&self, index: usize) -> (u32, u32) {
        self.grid.get().position(index)
    }

    pub fn index(&self, x: u32, y: u32) -> usize {
        self.grid.get().index(x, y)
    }

    pub fn update(&self, dt: f32) {
        for layer in self.layers.borrow_mut().iter_mut() {
            layer.update(dt);
        }
    }
}

impl Drawable for TileMap {
    fn draw(&self, surface: &mut Surface, origin: Vec2) {
        for layer in self.layers.borrow().iter() {
            layer.draw(surface, origin);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::assets::{DataManager, ImageData, ImageManager, LoadQueue, MemoryAssetSource};
    use crate::objects::{BasicObject, GameObject};

    use super::*;

    struct Fixture {
        queue: LoadQueue,
        map: Rc<TileMap>,
        source: MemoryAssetSource,
        created: Rc<Cell<u32>>,
        failed: Rc<RefCell<Vec<LoadFailure>>>,
    }

    fn fixture(registry: ObjectRegistry, map: Value) -> Fixture {
        let queue = LoadQueue::new();
        let loaders = MapLoaders {
            data: Rc::new(DataManager::new(queue.clone())),
            images: Rc::new(ImageManager::new(queue.clone())),
        };
        let tilemap = TileMap::new(loaders, Rc::new(registry), MapPaths::default());
        let created = Rc::new(Cell::new(0));
        let counter = Rc::clone(&created);
        tilemap.on_create.connect(SETTLE_PRIORITY, move |_| {
            counter.set(counter.get() + 1);
            Ok(())
        });
        let failed = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&failed);
        tilemap.on_fail.connect(SETTLE_PRIORITY, move |failure| {
            sink.borrow_mut().push(failure.clone());
            Ok(())
        });

        let mut source = MemoryAssetSource::new();
        source
            .insert_json("assets/maps/test.json", &map)
            .insert_json(
                "assets/tilesets/terrain.json",
                &json!({ "columns": 2, "tilewidth": 16, "tileheight": 16, "image": "terrain.png" }),
            )
            .insert_image(
                "assets/gfx/tilesets/terrain.png",
                ImageData::filled(32, 32, [90, 60, 30, 255]),
            )
            .insert_json(
                "assets/tilesets/actors.json",
                &json!({
                    "columns": 1, "tilewidth": 16, "tileheight": 32,
                    "tileproperties": { "0": { "object_type": "Game_Player", "param1": 3 } }
                }),
            );

        Fixture {
            queue,
            map: tilemap,
            source,
            created,
            failed,
        }
    }

    fn sample_map() -> Value {
        json!({
            "width": 2, "height": 2, "tilewidth": 16, "tileheight": 16,
            "tilesets": [
                { "firstgid": 5, "source": "../tilesets/actors.json" },
                { "firstgid": 1, "source": "../tilesets/terrain.json" }
            ],
            "layers": [
                { "type": "tilelayer", "name": "ground", "data": [1, 2, 0, 4] },
                { "type": "objectgroup", "name": "actors", "objects": [
                    { "x": 16, "y": 32, "width": 16, "height": 32, "gid": 5 }
                ] },
                { "type": "imagelayer", "name": "sky" }
            ]
        })
    }

    fn registry_with_player() -> ObjectRegistry {
        let mut registry = ObjectRegistry::new();
        registry.register("Game_Player", |_| Ok(Box::new(BasicObject::new())));
        registry
    }

    #[test]
    fn loads_document_tilesets_and_layers_then_fires_create_once() {
        let fixture = fixture(registry_with_player(), sample_map());
        fixture.map.load("assets/maps/test.json");

        fixture
            .queue
            .run_until_idle(&fixture.source, 8)
            .expect("drain queue");

        assert_eq!(fixture.created.get(), 1);
        assert!(fixture.failed.borrow().is_empty());
        assert!(fixture.map.is_created());

        let firstgids: Vec<u32> = fixture.map.tilesets().iter().map(|t| t.firstgid()).collect();
        assert_eq!(firstgids, vec![1, 5]);
        assert_eq!(
            fixture.map.tileset_by_gid(6).map(|t| t.firstgid()),
            Some(5)
        );

        let layers = fixture.map.layers();
        assert_eq!(layers.len(), 2);
        let ground = layers[0].as_tile_layer().expect("tile layer");
        assert!(ground.tile(2).is_none());
        assert_eq!(ground.tile(3).expect("tile").position, Vec2::new(16.0, 16.0));
        let actors = layers[1].as_object_layer().expect("object layer");
        assert_eq!(actors.objects()[0].core().position(), Vec2::new(24.0, 32.0));
    }

    #[test]
    fn map_without_tilesets_builds_in_the_same_turn() {
        let fixture = fixture(
            ObjectRegistry::new(),
            json!({
                "width": 1, "height": 1, "tilewidth": 8, "tileheight": 8,
                "layers": [{ "type": "tilelayer", "data": [0] }]
            }),
        );
        fixture.map.load("assets/maps/test.json");

        fixture.queue.pump(&fixture.source).expect("pump");

        assert_eq!(fixture.created.get(), 1);
        assert_eq!(fixture.map.layers().len(), 1);
    }

    #[test]
    fn failed_tileset_fails_the_map_without_building_layers() {
        let mut map = sample_map();
        map["tilesets"][1]["source"] = json!("missing.json");
        let fixture = fixture(registry_with_player(), map);
        fixture.map.load("assets/maps/test.json");

        fixture
            .queue
            .run_until_idle(&fixture.source, 8)
            .expect("drain queue");

        assert_eq!(fixture.created.get(), 0);
        assert_eq!(fixture.failed.borrow().len(), 1);
        assert!(fixture.failed.borrow()[0].reason.contains("tileset1"));
        assert!(fixture.map.layers().is_empty());
    }

    #[test]
    fn unknown_object_type_fails_the_map() {
        let fixture = fixture(ObjectRegistry::new(), sample_map());
        fixture.map.load("assets/maps/test.json");

        fixture
            .queue
            .run_until_idle(&fixture.source, 8)
            .expect("drain queue");

        assert_eq!(fixture.created.get(), 0);
        assert!(fixture.failed.borrow()[0].reason.contains("Game_Player"));
    }

    #[test]
    fn missing_map_document_reports_failure() {
        let fixture = fixture(ObjectRegistry::new(), json!({}));
        fixture.map.load("assets/maps/elsewhere.json");

        fixture.queue.pump(&fixture.source).expect("pump");

        assert_eq!(fixture.failed.borrow().len(), 1);
        assert_eq!(fixture.failed.borrow()[0].url, "assets/maps/elsewhere.json");
    }

    #[test]
    fn update_reaches_objects_in_object_layers() {
        let fixture = fixture(registry_with_player(), sample_map());
        fixture.map.load("assets/maps/test.json");
        fixture
            .queue
            .run_until_idle(&fixture.source, 8)
            .expect("drain queue");

        fixture.map.update(0.016);

        let layers = fixture.map.layers();
        let actors = layers[1].as_object_layer().expect("object layer");
        assert_eq!(actors.objects()[0].type_name(), "GameObject");
    }
}
