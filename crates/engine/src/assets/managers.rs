use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use serde_json::Value;

use crate::signal::{ReceiverKey, DEFAULT_PRIORITY};

use super::atlas::SpriteSheet;
use super::cache::Cache;
use super::handle::{AssetHandle, ImageHandle, LoadKind};
use super::loader::{AssetLoader, LoadQueue};

pub type SharedCache = Rc<RefCell<Cache>>;

/// Monotonic load counter behind the implicit labels of anonymous loads.
#[derive(Debug, Default)]
pub(crate) struct ManagedLoads {
    loads: Cell<u64>,
}

impl ManagedLoads {
    pub(crate) fn count(&self) -> u64 {
        self.loads.get()
    }

    /// Creates a loader, wires the caching listener for keyed loads, then starts the fetch.
    pub(crate) fn start(
        &self,
        queue: &LoadQueue,
        cache: &SharedCache,
        key: &str,
        url: &str,
        kind: LoadKind,
    ) -> Rc<AssetLoader> {
        let ordinal = self.loads.get() + 1;
        self.loads.set(ordinal);

        let label = if key.is_empty() {
            format!("{}{}", kind.label_prefix(), ordinal)
        } else {
            key.to_string()
        };
        let loader = AssetLoader::new(label);

        if !key.is_empty() {
            let target = Rc::clone(cache);
            let key = key.to_string();
            loader.on_complete.add_once_with(
                Rc::new(move |handle: &AssetHandle| {
                    target.borrow_mut().set_item(key.clone(), handle.clone());
                    Ok(())
                }),
                ReceiverKey::of(cache),
                None,
                DEFAULT_PRIORITY,
            );
        }

        loader.load(queue, url, kind);
        loader
    }
}

#[derive(Debug)]
pub struct DataManager {
    queue: LoadQueue,
    cache: SharedCache,
    loads: ManagedLoads,
}

impl DataManager {
    pub fn new(queue: LoadQueue) -> Self {
        Self {
            queue,
            cache: SharedCache::default(),
            loads: ManagedLoads::default(),
        }
    }

    pub fn load_json(&self, key: &str, url: &str) -> Rc<AssetLoader> {
        self.loads
            .start(&self.queue, &self.cache, key, url, LoadKind::Json)
    }

    pub fn load_text(&self, key: &str, url: &str) -> Rc<AssetLoader> {
        self.loads
            .start(&self.queue, &self.cache, key, url, LoadKind::Misc)
    }

    pub fn cache(&self) -> Ref<'_, Cache> {
        self.cache.borrow()
    }

    pub fn json(&self, key: &str) -> Option<Rc<Value>> {
        self.cache
            .borrow()
            .get_item(key)
            .and_then(AssetHandle::as_json)
            .cloned()
    }

    pub fn load_count(&self) -> u64 {
        self.loads.count()
    }
}

#[derive(Debug)]
pub struct ImageManager {
    queue: LoadQueue,
    image_cache: SharedCache,
    sprite_sheet_cache: SharedCache,
    loads: ManagedLoads,
}

impl ImageManager {
    pub fn new(queue: LoadQueue) -> Self {
        Self {
            queue,
            image_cache: SharedCache::default(),
            sprite_sheet_cache: SharedCache::default(),
            loads: ManagedLoads::default(),
        }
    }

    pub fn load_image(&self, key: &str, url: &str) -> Rc<AssetLoader> {
        self.loads
            .start(&self.queue, &self.image_cache, key, url, LoadKind::Image)
    }

    pub fn load_sprite_sheet(&self, key: &str, url: &str) -> Rc<AssetLoader> {
        self.loads.start(
            &self.queue,
            &self.sprite_sheet_cache,
            key,
            url,
            LoadKind::SpriteSheet,
        )
    }

    pub fn image_cache(&self) -> Ref<'_, Cache> {
        self.image_cache.borrow()
    }

    pub fn sprite_sheet_cache(&self) -> Ref<'_, Cache> {
        self.sprite_sheet_cache.borrow()
    }

    pub fn image(&self, key: &str) -> Option<ImageHandle> {
        self.image_cache
            .borrow()
            .get_item(key)
            .and_then(AssetHandle::as_image)
            .cloned()
    }

    pub fn sprite_sheet(&self, key: &str) -> Option<Rc<SpriteSheet>> {
        self.sprite_sheet_cache
            .borrow()
            .get_item(key)
            .and_then(AssetHandle::as_sprite_sheet)
            .cloned()
    }

    pub fn load_count(&self) -> u64 {
        self.loads.count()
    }
}
