use std::cell::RefCell;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::audio::AudioManager;
use crate::signal::{ListenerResult, ReceiverKey};

use super::barrier::{check_completion, check_failure, BarrierOutcome, PendingSet};
use super::handle::AssetHandle;
use super::loader::{AssetLoader, LoadFailure, SETTLE_PRIORITY};
use super::managers::{DataManager, ImageManager};
use super::source::AssetError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    pub key: String,
    pub url: String,
}

/// The boot asset list: four groups of `{key, url}` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssetManifest {
    #[serde(default)]
    pub data: Vec<ManifestEntry>,
    #[serde(default)]
    pub images: Vec<ManifestEntry>,
    #[serde(default)]
    pub spritesheets: Vec<ManifestEntry>,
    #[serde(default)]
    pub audio: Vec<ManifestEntry>,
}

impl AssetManifest {
    pub fn from_value(url: &str, value: &Value) -> Result<Self, AssetError> {
        Self::deserialize(value).map_err(|source| AssetError::Json {
            url: url.to_string(),
            source,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len() + self.images.len() + self.spritesheets.len() + self.audio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every key in load order: data, images, sprite sheets, audio.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data
            .iter()
            .chain(&self.images)
            .chain(&self.spritesheets)
            .chain(&self.audio)
            .map(|entry| entry.key.as_str())
    }
}

/// The managers a manifest fans out over.
#[derive(Clone, Copy)]
pub struct ManifestTargets<'a> {
    pub data: &'a DataManager,
    pub images: &'a ImageManager,
    pub audio: &'a AudioManager,
}

type Continuation = Rc<RefCell<Option<Box<dyn FnOnce(BarrierOutcome) -> ListenerResult>>>>;

/// Starts every manifest load behind one shared pending set.
///
/// `on_settled` runs once, after the last entry completes or fails. An empty manifest runs it
/// immediately.
pub fn load_manifest(
    manifest: &AssetManifest,
    targets: ManifestTargets<'_>,
    on_settled: impl FnOnce(BarrierOutcome) -> ListenerResult + 'static,
) -> Result<Rc<RefCell<PendingSet>>, crate::signal::ListenerError> {
    let pending = Rc::new(RefCell::new(PendingSet::new(manifest.keys())));
    let boxed: Box<dyn FnOnce(BarrierOutcome) -> ListenerResult> = Box::new(on_settled);
    let continuation: Continuation = Rc::new(RefCell::new(Some(boxed)));
    info!(entries = manifest.len(), "manifest_load_started");

    for entry in &manifest.data {
        let loader = targets.data.load_json(&entry.key, &entry.url);
        settle_into(&loader, &entry.key, &pending, &continuation);
    }
    for entry in &manifest.images {
        let loader = targets.images.load_image(&entry.key, &entry.url);
        settle_into(&loader, &entry.key, &pending, &continuation);
    }
    for entry in &manifest.spritesheets {
        let loader = targets.images.load_sprite_sheet(&entry.key, &entry.url);
        settle_into(&loader, &entry.key, &pending, &continuation);
    }
    for entry in &manifest.audio {
        let loader = targets.audio.load_audio(&entry.key, &entry.url);
        settle_into(&loader, &entry.key, &pending, &continuation);
    }

    let drained = pending.borrow_mut().take_if_empty();
    if let Some(outcome) = drained {
        run_continuation(&continuation, outcome)?;
    }
    Ok(pending)
}

fn settle_into(
    loader: &Rc<AssetLoader>,
    key: &str,
    pending: &Rc<RefCell<PendingSet>>,
    continuation: &Continuation,
) {
    let receiver = ReceiverKey::of(pending);

    let on_complete_key = key.to_string();
    let on_complete_pending = Rc::clone(pending);
    let on_complete_continuation = Rc::clone(continuation);
    loader.on_complete.add_once_with(
        Rc::new(move |_: &AssetHandle| {
            check_completion(&on_complete_key, &on_complete_pending, |outcome| {
                run_continuation(&on_complete_continuation, outcome)
            })
        }),
        receiver,
        None,
        SETTLE_PRIORITY,
    );

    let on_fail_key = key.to_string();
    let on_fail_pending = Rc::clone(pending);
    let on_fail_continuation = Rc::clone(continuation);
    loader.on_fail.add_once_with(
        Rc::new(move |_: &LoadFailure| {
            check_failure(&on_fail_key, &on_fail_pending, |outcome| {
                run_continuation(&on_fail_continuation, outcome)
            })
        }),
        receiver,
        None,
        SETTLE_PRIORITY,
    );
}

fn run_continuation(continuation: &Continuation, outcome: BarrierOutcome) -> ListenerResult {
    let next = continuation.borrow_mut().take();
    match next {
        Some(next) => next(outcome),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::super::handle::ImageData;
    use super::super::loader::LoadQueue;
    use super::super::source::MemoryAssetSource;
    use super::*;
    use crate::audio::SilentAudioBackend;

    struct Managers {
        queue: LoadQueue,
        data: DataManager,
        images: ImageManager,
        audio: AudioManager,
    }

    impl Managers {
        fn new() -> Self {
            let queue = LoadQueue::new();
            Self {
                data: DataManager::new(queue.clone()),
                images: ImageManager::new(queue.clone()),
                audio: AudioManager::new(queue.clone(), Box::new(SilentAudioBackend::new())),
                queue,
            }
        }

        fn targets(&self) -> ManifestTargets<'_> {
            ManifestTargets {
                data: &self.data,
                images: &self.images,
                audio: &self.audio,
            }
        }
    }

    fn manifest() -> AssetManifest {
        AssetManifest::from_value(
            "assets/assetlist.json",
            &json!({
                "data": [{ "key": "items", "url": "assets/data/items.json" }],
                "images": [{ "key": "bg", "url": "assets/gfx/bg.png" }],
                "spritesheets": [],
                "audio": [{ "key": "theme", "url": "assets/audio/theme.ogg" }]
            }),
        )
        .expect("manifest")
    }

    #[test]
    fn continuation_waits_for_every_entry_and_sees_cached_assets() {
        let managers = Rc::new(Managers::new());
        let mut source = MemoryAssetSource::new();
        source
            .insert_json("assets/data/items.json", &json!({}))
            .insert_image("assets/gfx/bg.png", ImageData::filled(1, 1, [0; 4]))
            .insert("assets/audio/theme.ogg", vec![0]);
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        let observer = Rc::clone(&managers);

        load_manifest(&manifest(), managers.targets(), move |outcome| {
            assert!(outcome.is_success());
            assert!(observer.data.json("items").is_some());
            assert!(observer.images.image("bg").is_some());
            assert_eq!(observer.audio.cache().len(), 1);
            counter.set(counter.get() + 1);
            Ok(())
        })
        .expect("start");

        assert_eq!(fired.get(), 0);
        managers.queue.run_until_idle(&source, 4).expect("drain");
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn failed_entry_still_releases_the_barrier() {
        let managers = Managers::new();
        let mut source = MemoryAssetSource::new();
        source
            .insert_json("assets/data/items.json", &json!({}))
            .insert("assets/audio/theme.ogg", vec![0]);
        let outcome = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&outcome);

        load_manifest(&manifest(), managers.targets(), move |result| {
            *sink.borrow_mut() = Some(result);
            Ok(())
        })
        .expect("start");
        managers.queue.run_until_idle(&source, 4).expect("drain");

        let outcome = outcome.borrow().clone().expect("released");
        assert_eq!(outcome.failed, vec!["bg"]);
        assert_eq!(outcome.succeeded.len(), 2);
    }

    #[test]
    fn empty_manifest_continues_immediately() {
        let managers = Managers::new();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);

        load_manifest(&AssetManifest::default(), managers.targets(), move |_| {
            flag.set(true);
            Ok(())
        })
        .expect("start");

        assert!(fired.get());
    }

    #[test]
    fn missing_groups_default_to_empty() {
        let manifest = AssetManifest::from_value(
            "assets/assetlist.json",
            &json!({ "images": [{ "key": "bg", "url": "bg.png" }] }),
        )
        .expect("manifest");

        assert_eq!(manifest.keys().collect::<Vec<_>>(), vec!["bg"]);
    }
}
