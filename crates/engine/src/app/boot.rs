use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{info, warn};

use crate::assets::{
    load_manifest, AssetHandle, AssetManifest, BarrierOutcome, LoadFailure, SETTLE_PRIORITY,
};
use crate::signal::ReceiverKey;

use super::scene::{Scene, SceneCommand};
use super::services::Services;

pub type SceneFactory = Box<dyn FnOnce(&Services) -> Box<dyn Scene>>;

/// Loads the asset manifest, waits for every entry to settle, then pushes the next scene.
pub struct BootScene {
    manifest_url: String,
    next: Option<SceneFactory>,
    settled: Rc<RefCell<Option<BarrierOutcome>>>,
}

impl fmt::Debug for BootScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootScene")
            .field("manifest_url", &self.manifest_url)
            .field("settled", &self.settled.borrow().is_some())
            .finish()
    }
}

impl BootScene {
    pub fn new(
        manifest_url: impl Into<String>,
        next: impl FnOnce(&Services) -> Box<dyn Scene> + 'static,
    ) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            next: Some(Box::new(next)),
            settled: Rc::new(RefCell::new(None)),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled.borrow().is_some()
    }
}

impl Scene for BootScene {
    fn name(&self) -> &str {
        "boot"
    }

    fn start(&mut self, services: &Services) {
        let loader = services.data.load_json("", &self.manifest_url);

        let url = self.manifest_url.clone();
        let targets = services.clone();
        let settled = Rc::clone(&self.settled);
        loader.on_complete.add_once_with(
            Rc::new(move |handle: &AssetHandle| {
                let parsed = match handle.as_json() {
                    Some(value) => AssetManifest::from_value(&url, value),
                    None => Ok(AssetManifest::default()),
                };
                let manifest = match parsed {
                    Ok(manifest) => manifest,
                    Err(error) => {
                        // A manifest that cannot be read settles as failed so boot still advances.
                        warn!(url = %url, error = %error, "boot_manifest_invalid");
                        *settled.borrow_mut() = Some(failed_outcome(&url));
                        return Ok(());
                    }
                };
                info!(url = %url, entries = manifest.len(), "boot_manifest_loaded");
                let settled = Rc::clone(&settled);
                load_manifest(&manifest, targets.manifest_targets(), move |outcome| {
                    *settled.borrow_mut() = Some(outcome);
                    Ok(())
                })?;
                Ok(())
            }),
            ReceiverKey::of(&self.settled),
            None,
            SETTLE_PRIORITY,
        );

        let settled = Rc::clone(&self.settled);
        loader.on_fail.add_once_with(
            Rc::new(move |failure: &LoadFailure| {
                warn!(url = %failure.url, reason = %failure.reason, "boot_manifest_failed");
                *settled.borrow_mut() = Some(failed_outcome(&failure.url));
                Ok(())
            }),
            ReceiverKey::of(&self.settled),
            None,
            SETTLE_PRIORITY,
        );
    }

    fn update(&mut self, services: &Services, _dt: f32) -> SceneCommand {
        let Some(outcome) = self.settled.borrow_mut().take() else {
            return SceneCommand::None;
        };
        if outcome.is_success() {
            info!(loaded = outcome.succeeded.len(), "boot_assets_ready");
        } else {
            warn!(
                loaded = outcome.succeeded.len(),
                failed = ?outcome.failed,
                "boot_assets_incomplete"
            );
        }
        match self.next.take() {
            Some(next) => SceneCommand::Push(next(services)),
            None => SceneCommand::None,
        }
    }
}

fn failed_outcome(url: &str) -> BarrierOutcome {
    BarrierOutcome {
        succeeded: Vec::new(),
        failed: vec![url.to_string()],
    }
}
