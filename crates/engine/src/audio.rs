use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};

use crate::assets::{AssetHandle, AssetLoader, Cache, LoadKind, LoadQueue, SoundHandle};
use crate::assets::{ManagedLoads, SharedCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaybackId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    pub looped: bool,
    pub volume: f32,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            looped: false,
            volume: 1.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no sound cached under key {key}")]
    UnknownSound { key: String },
}

/// Playback capability. Implementations decode and mix; the manager only tracks ids.
pub trait AudioBackend {
    fn play(&mut self, sound: &SoundHandle, options: PlaybackOptions) -> PlaybackId;
    fn stop(&mut self, id: PlaybackId);
    fn set_volume(&mut self, id: PlaybackId, volume: f32);
}

/// Accepts every request and plays nothing. Keeps a record of live playbacks.
#[derive(Debug, Default)]
pub struct SilentAudioBackend {
    next_id: u64,
    active: BTreeSet<PlaybackId>,
}

impl SilentAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self, id: PlaybackId) -> bool {
        self.active.contains(&id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl AudioBackend for SilentAudioBackend {
    fn play(&mut self, sound: &SoundHandle, options: PlaybackOptions) -> PlaybackId {
        self.next_id += 1;
        let id = PlaybackId(self.next_id);
        self.active.insert(id);
        debug!(url = %sound.url, looped = options.looped, id = id.0, "silent_playback_started");
        id
    }

    fn stop(&mut self, id: PlaybackId) {
        self.active.remove(&id);
    }

    fn set_volume(&mut self, _id: PlaybackId, _volume: f32) {}
}

pub struct AudioManager {
    queue: LoadQueue,
    cache: SharedCache,
    loads: ManagedLoads,
    backend: RefCell<Box<dyn AudioBackend>>,
    music: Cell<Option<PlaybackId>>,
}

impl std::fmt::Debug for AudioManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioManager")
            .field("cached", &self.cache.borrow().len())
            .field("music", &self.music.get())
            .finish()
    }
}

impl AudioManager {
    pub fn new(queue: LoadQueue, backend: Box<dyn AudioBackend>) -> Self {
        Self {
            queue,
            cache: SharedCache::default(),
            loads: ManagedLoads::default(),
            backend: RefCell::new(backend),
            music: Cell::new(None),
        }
    }

    pub fn load_audio(&self, key: &str, url: &str) -> Rc<AssetLoader> {
        self.loads
            .start(&self.queue, &self.cache, key, url, LoadKind::Audio)
    }

    pub fn cache(&self) -> Ref<'_, Cache> {
        self.cache.borrow()
    }

    pub fn load_count(&self) -> u64 {
        self.loads.count()
    }

    pub fn current_music(&self) -> Option<PlaybackId> {
        self.music.get()
    }

    /// Starts looping music, stopping whatever music was playing.
    pub fn play_music(&self, key: &str, volume: f32) -> Result<PlaybackId, AudioError> {
        let sound = self.sound(key)?;
        let mut backend = self.backend.borrow_mut();
        if let Some(previous) = self.music.take() {
            backend.stop(previous);
        }
        let id = backend.play(
            &sound,
            PlaybackOptions {
                looped: true,
                volume,
            },
        );
        self.music.set(Some(id));
        info!(key, id = id.0, "music_started");
        Ok(id)
    }

    pub fn stop_music(&self) {
        if let Some(id) = self.music.take() {
            self.backend.borrow_mut().stop(id);
            info!(id = id.0, "music_stopped");
        }
    }

    /// Plays a one-shot sound. The music slot is left alone.
    pub fn play_sound(&self, key: &str, volume: f32) -> Result<PlaybackId, AudioError> {
        let sound = self.sound(key)?;
        let id = self.backend.borrow_mut().play(
            &sound,
            PlaybackOptions {
                looped: false,
                volume,
            },
        );
        Ok(id)
    }

    pub fn stop(&self, id: PlaybackId) {
        if self.music.get() == Some(id) {
            self.music.set(None);
        }
        self.backend.borrow_mut().stop(id);
    }

    pub fn set_volume(&self, id: PlaybackId, volume: f32) {
        self.backend.borrow_mut().set_volume(id, volume);
    }

    fn sound(&self, key: &str) -> Result<SoundHandle, AudioError> {
        self.cache
            .borrow()
            .get_item(key)
            .and_then(AssetHandle::as_sound)
            .cloned()
            .ok_or_else(|| AudioError::UnknownSound {
                key: key.to_string(),
            })
    }
}
