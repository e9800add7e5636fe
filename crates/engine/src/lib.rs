use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod assets;
pub mod audio;
pub mod geometry;
pub mod map;
pub mod objects;
pub mod signal;
pub mod url;

pub use app::{
    run_app, run_app_with_metrics, AppError, AssetLoadMetrics, BootScene, Camera, Drawable, InputManager,
    LoopConfig, LoopMetricsSnapshot, MetricsHandle, RenderBackend, Renderer, Scene,
    SceneCameras, SceneCommand, SceneStack, Services, SoftwareBackend, Surface, TweenManager,
    Viewport, SLOW_FRAME_ENV_VAR,
};
pub use assets::{
    AssetLoader, AssetSource, DataManager, FsAssetSource, ImageManager, LoadFailure, LoadQueue,
    MemoryAssetSource, SETTLE_PRIORITY,
};
pub use geometry::{Rect, Vec2};
pub use map::{Layer, MapError, TileMap, TileSet};
pub use objects::{BasicObject, GameObject, ObjectRegistry, ObjectSpawn};
pub use signal::{ListenerError, ListenerResult, Signal, DEFAULT_PRIORITY};

pub const ROOT_ENV_VAR: &str = "TESSERA_ROOT";

/// Where asset URLs such as `assets/maps/test.json` are resolved from.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("TESSERA_ROOT points at {path}, which has no assets/ directory")]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "no project root found above {searched}\n\
A root holds assets/ plus either Cargo.toml or assets/assetlist.json.\n\
Set {env_var} to point at it, e.g. export {env_var}=\"/path/to/tessera\""
    )]
    RootNotFound {
        searched: String,
        env_var: &'static str,
    },
}

/// Resolves the project root from `TESSERA_ROOT`, else by walking up from the working
/// directory and then from the executable.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    let assets_dir = root.join("assets");
    Ok(AppPaths { root, assets_dir })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let root = normalize_path(Path::new(&value));
            if root.join("assets").is_dir() {
                Ok(root)
            } else {
                Err(StartupError::InvalidEnvRoot { path: root })
            }
        }
        Err(env::VarError::NotPresent) => {
            let mut starts = Vec::new();
            if let Ok(cwd) = env::current_dir() {
                starts.push(cwd);
            }
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            if let Some(exe_dir) = exe.parent() {
                starts.push(exe_dir.to_path_buf());
            }
            find_root(&starts).ok_or_else(|| StartupError::RootNotFound {
                searched: starts
                    .iter()
                    .map(|start| start.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn find_root(starts: &[PathBuf]) -> Option<PathBuf> {
    starts
        .iter()
        .flat_map(|start| start.ancestors())
        .find(|candidate| is_project_root(candidate))
        .map(normalize_path)
}

/// A checkout (Cargo.toml next to assets/) or a shipped build (assets/assetlist.json).
fn is_project_root(path: &Path) -> bool {
    let assets = path.join("assets");
    if !assets.is_dir() {
        return false;
    }
    path.join("Cargo.toml").is_file() || assets.join("assetlist.json").is_file()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
