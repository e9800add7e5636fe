use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::assets::{AssetHandle, ImageHandle, LoadFailure, LoadKind, Texture, SETTLE_PRIORITY};
use crate::geometry::Rect;
use crate::signal::{ListenerResult, ReceiverKey, Signal};
use crate::url::{file_name, join};

use super::document::{PropertyMap, TilesetDocument};
use super::{MapLoaders, MapPaths};

/// One tileset of a map: its definition, its image, and the gid range starting at `firstgid`.
pub struct TileSet {
    firstgid: u32,
    source: String,
    document: RefCell<Option<TilesetDocument>>,
    image: RefCell<Option<ImageHandle>>,
    loaded: Cell<bool>,
    /// Fires once the definition and its image (when declared) are both in.
    pub on_complete: Signal<()>,
    pub on_fail: Signal<LoadFailure>,
}

impl fmt::Debug for TileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileSet")
            .field("firstgid", &self.firstgid)
            .field("source", &self.source)
            .field("loaded", &self.loaded.get())
            .finish()
    }
}

impl TileSet {
    fn empty(firstgid: u32, source: &str) -> Self {
        Self {
            firstgid,
            source: source.to_string(),
            document: RefCell::new(None),
            image: RefCell::new(None),
            loaded: Cell::new(false),
            on_complete: Signal::new(),
            on_fail: Signal::new(),
        }
    }

    /// Builds an already-loaded tileset.
    pub fn from_parts(
        firstgid: u32,
        document: TilesetDocument,
        image: Option<ImageHandle>,
    ) -> Rc<Self> {
        let tileset = Self::empty(firstgid, "");
        *tileset.document.borrow_mut() = Some(document);
        *tileset.image.borrow_mut() = image;
        tileset.loaded.set(true);
        Rc::new(tileset)
    }

    /// Creates the tileset and starts loading its definition right away.
    ///
    /// `source` is resolved by file name into the tileset directory, and a declared image by
    /// file name into the tileset image directory.
    pub fn load(firstgid: u32, source: &str, loaders: &MapLoaders, paths: &MapPaths) -> Rc<Self> {
        let tileset = Rc::new(Self::empty(firstgid, source));
        let url = join(&paths.tileset_dir, file_name(source));
        let loader = loaders.data.load_json("", &url);

        let weak = Rc::downgrade(&tileset);
        let images = Rc::clone(&loaders.images);
        let image_dir = paths.image_dir.clone();
        let definition_url = url.clone();
        loader.on_complete.add_once_with(
            Rc::new(move |handle: &AssetHandle| {
                let Some(tileset) = weak.upgrade() else {
                    return Ok(());
                };
                tileset.apply_definition(&definition_url, handle, &images, &image_dir)
            }),
            ReceiverKey::of(&tileset),
            None,
            SETTLE_PRIORITY,
        );

        let weak = Rc::downgrade(&tileset);
        loader.on_fail.add_once_with(
            Rc::new(move |failure: &LoadFailure| match weak.upgrade() {
                Some(tileset) => tileset.on_fail.dispatch_with(failure.clone()),
                None => Ok(()),
            }),
            ReceiverKey::of(&tileset),
            None,
            SETTLE_PRIORITY,
        );

        tileset
    }

    fn apply_definition(
        self: &Rc<Self>,
        url: &str,
        handle: &AssetHandle,
        images: &Rc<crate::assets::ImageManager>,
        image_dir: &str,
    ) -> ListenerResult {
        let parsed = handle
            .as_json()
            .ok_or_else(|| "definition is not JSON".to_string())
            .and_then(|value| {
                serde_json::from_value::<TilesetDocument>(value.as_ref().clone())
                    .map_err(|error| error.to_string())
            });
        let document = match parsed {
            Ok(document) => document,
            Err(reason) => {
                warn!(url, reason = %reason, "tileset_definition_invalid");
                return self.on_fail.dispatch_with(LoadFailure {
                    url: url.to_string(),
                    kind: LoadKind::Json,
                    reason,
                });
            }
        };

        let image = document.image.clone();
        *self.document.borrow_mut() = Some(document);

        let Some(image) = image else {
            return self.finish();
        };

        let loader = images.load_image("", &join(image_dir, file_name(&image)));
        let weak: Weak<TileSet> = Rc::downgrade(self);
        loader.on_complete.add_once_with(
            Rc::new(move |handle: &AssetHandle| {
                let Some(tileset) = weak.upgrade() else {
                    return Ok(());
                };
                *tileset.image.borrow_mut() = handle.as_image().cloned();
                tileset.finish()
            }),
            ReceiverKey::of(self),
            None,
            SETTLE_PRIORITY,
        );
        let weak: Weak<TileSet> = Rc::downgrade(self);
        loader.on_fail.add_once_with(
            Rc::new(move |failure: &LoadFailure| match weak.upgrade() {
                Some(tileset) => tileset.on_fail.dispatch_with(failure.clone()),
                None => Ok(()),
            }),
            ReceiverKey::of(self),
            None,
            SETTLE_PRIORITY,
        );
        Ok(())
    }

    fn finish(&self) -> ListenerResult {
        self.loaded.set(true);
        debug!(firstgid = self.firstgid, source = %self.source, "tileset_loaded");
        self.on_complete.dispatch()
    }

    pub fn firstgid(&self) -> u32 {
        self.firstgid
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get()
    }

    pub fn document(&self) -> Ref<'_, Option<TilesetDocument>> {
        self.document.borrow()
    }

    pub fn image(&self) -> Option<ImageHandle> {
        self.image.borrow().clone()
    }

    pub fn tile_rect(&self, local: u32) -> Option<Rect> {
        self.document
            .borrow()
            .as_ref()
            .and_then(|document| document.tile_rect(local))
    }

    pub fn tile_properties(&self, local: u32) -> Option<PropertyMap> {
        self.document
            .borrow()
            .as_ref()
            .and_then(|document| document.tile_properties(local))
    }

    /// The image cut down to one tile. `None` when no image was declared.
    pub fn tile_texture(&self, local: u32) -> Option<Texture> {
        let image = self.image()?;
        let frame = self.tile_rect(local)?;
        Some(Texture { image, frame })
    }
}

/// Tiled keeps its flip flags in the top three bits of a gid.
const FLIP_FLAGS: u32 = 0xE000_0000;

/// The gid with its flip flags cleared.
pub fn strip_flip_flags(gid: u32) -> u32 {
    gid & !FLIP_FLAGS
}

/// Scans from the highest `firstgid` down. `tilesets` must be sorted ascending.
pub fn find_tileset_by_gid(tilesets: &[Rc<TileSet>], gid: u32) -> Option<&Rc<TileSet>> {
    tilesets
        .iter()
        .rev()
        .find(|tileset| gid >= tileset.firstgid())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::assets::{DataManager, ImageData, ImageManager, LoadQueue, MemoryAssetSource};

    use super::*;

    fn document(columns: u32) -> TilesetDocument {
        serde_json::from_value(json!({
            "columns": columns, "tilewidth": 16, "tileheight": 16
        }))
        .expect("tileset document")
    }

    fn loaders(queue: &LoadQueue) -> MapLoaders {
        MapLoaders {
            data: Rc::new(DataManager::new(queue.clone())),
            images: Rc::new(ImageManager::new(queue.clone())),
        }
    }

    #[test]
    fn gid_resolves_to_highest_firstgid_not_above_it() {
        let tilesets: Vec<_> = [1, 21, 41]
            .into_iter()
            .map(|firstgid| TileSet::from_parts(firstgid, document(4), None))
            .collect();

        let firstgid = |gid| find_tileset_by_gid(&tilesets, gid).map(|ts| ts.firstgid());
        assert_eq!(firstgid(20), Some(1));
        assert_eq!(firstgid(21), Some(21));
        assert_eq!(firstgid(40), Some(21));
        assert_eq!(firstgid(1000), Some(41));
        assert_eq!(firstgid(0), None);
    }

    #[test]
    fn loads_definition_then_image_before_completing() {
        let queue = LoadQueue::new();
        let loaders = loaders(&queue);
        let mut source = MemoryAssetSource::new();
        source
            .insert_json(
                "assets/tilesets/grass.json",
                &json!({ "columns": 2, "tilewidth": 8, "tileheight": 8, "image": "../gfx/grass.png" }),
            )
            .insert_image(
                "assets/gfx/tilesets/grass.png",
                ImageData::filled(16, 16, [0, 255, 0, 255]),
            );
        let tileset = TileSet::load(1, "../tilesets/grass.json", &loaders, &MapPaths::default());
        let completions = Rc::new(Cell::new(0));
        let counter = Rc::clone(&completions);
        tileset.on_complete.connect(SETTLE_PRIORITY, move |_| {
            counter.set(counter.get() + 1);
            Ok(())
        });

        queue.pump(&source).expect("definition turn");
        assert!(tileset.document().is_some());
        assert_eq!(completions.get(), 0);

        queue.pump(&source).expect("image turn");
        assert_eq!(completions.get(), 1);
        let texture = tileset.tile_texture(3).expect("texture");
        assert_eq!(texture.frame, Rect::new(8.0, 8.0, 8.0, 8.0));
    }

    #[test]
    fn definition_without_image_completes_after_one_turn() {
        let queue = LoadQueue::new();
        let loaders = loaders(&queue);
        let mut source = MemoryAssetSource::new();
        source.insert_json(
            "assets/tilesets/logic.json",
            &json!({ "columns": 1, "tilewidth": 8, "tileheight": 8 }),
        );
        let tileset = TileSet::load(1, "logic.json", &loaders, &MapPaths::default());

        queue.pump(&source).expect("pump");

        assert!(tileset.is_loaded());
        assert!(tileset.image().is_none());
        assert!(tileset.tile_texture(0).is_none());
        assert_eq!(tileset.tile_rect(0), Some(Rect::new(0.0, 0.0, 8.0, 8.0)));
    }

    #[test]
    fn missing_image_fails_the_tileset() {
        let queue = LoadQueue::new();
        let loaders = loaders(&queue);
        let mut source = MemoryAssetSource::new();
        source.insert_json(
            "assets/tilesets/grass.json",
            &json!({ "columns": 2, "tilewidth": 8, "tileheight": 8, "image": "grass.png" }),
        );
        let tileset = TileSet::load(1, "grass.json", &loaders, &MapPaths::default());
        let failed = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&failed);
        tileset.on_fail.connect(SETTLE_PRIORITY, move |failure| {
            *sink.borrow_mut() = Some(failure.url.clone());
            Ok(())
        });

        queue.run_until_idle(&source, 4).expect("drain");

        assert_eq!(
            failed.borrow().as_deref(),
            Some("assets/gfx/tilesets/grass.png")
        );
        assert!(!tileset.is_loaded());
    }
}
