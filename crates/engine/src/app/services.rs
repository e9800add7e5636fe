use std::rc::Rc;

use crate::assets::{DataManager, ImageManager, LoadQueue, ManifestTargets};
use crate::audio::{AudioBackend, AudioManager};
use crate::map::{MapLoaders, MapPaths, TileMap};
use crate::objects::ObjectRegistry;

use super::input::InputManager;
use super::tween::TweenManager;

/// Engine-wide services, built once by the app and handed to every scene.
#[derive(Debug, Clone)]
pub struct Services {
    pub queue: LoadQueue,
    pub data: Rc<DataManager>,
    pub images: Rc<ImageManager>,
    pub audio: Rc<AudioManager>,
    pub input: Rc<InputManager>,
    pub tweens: Rc<TweenManager>,
    pub objects: Rc<ObjectRegistry>,
    pub map_paths: MapPaths,
}

impl Services {
    pub fn new(audio_backend: Box<dyn AudioBackend>, objects: ObjectRegistry) -> Self {
        let queue = LoadQueue::new();
        Self {
            data: Rc::new(DataManager::new(queue.clone())),
            images: Rc::new(ImageManager::new(queue.clone())),
            audio: Rc::new(AudioManager::new(queue.clone(), audio_backend)),
            input: Rc::new(InputManager::new()),
            tweens: Rc::new(TweenManager::new()),
            objects: Rc::new(objects),
            map_paths: MapPaths::default(),
            queue,
        }
    }

    /// Swaps in a registry whose factories may capture these services' managers.
    pub fn with_objects(mut self, objects: ObjectRegistry) -> Self {
        self.objects = Rc::new(objects);
        self
    }

    pub fn with_map_paths(mut self, map_paths: MapPaths) -> Self {
        self.map_paths = map_paths;
        self
    }

    pub fn map_loaders(&self) -> MapLoaders {
        MapLoaders {
            data: Rc::clone(&self.data),
            images: Rc::clone(&self.images),
        }
    }

    pub fn manifest_targets(&self) -> ManifestTargets<'_> {
        ManifestTargets {
            data: &self.data,
            images: &self.images,
            audio: &self.audio,
        }
    }

    /// An unloaded map wired to these services.
    pub fn new_tile_map(&self) -> Rc<TileMap> {
        TileMap::new(
            self.map_loaders(),
            Rc::clone(&self.objects),
            self.map_paths.clone(),
        )
    }
}
