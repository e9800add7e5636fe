mod atlas;
mod barrier;
mod cache;
mod handle;
mod loader;
mod managers;
mod manifest;
mod source;

pub use atlas::{AtlasDocument, SpriteSheet};
pub use barrier::{
    check_completion, check_failure, settle_key, BarrierOutcome, PendingSet, Settlement,
};
pub use cache::Cache;
pub use handle::{
    AssetHandle, ImageData, ImageHandle, LoadKind, SoundData, SoundHandle, Texture,
};
pub use loader::{AssetLoader, LoadFailure, LoadQueue, PumpReport, SETTLE_PRIORITY};
pub(crate) use managers::ManagedLoads;
pub use managers::{DataManager, ImageManager, SharedCache};
pub use manifest::{load_manifest, AssetManifest, ManifestEntry, ManifestTargets};
pub use source::{decode_image, AssetError, AssetSource, FsAssetSource, MemoryAssetSource};
