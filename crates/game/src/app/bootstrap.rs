use std::env;
use std::fs;

use serde::Deserialize;
use tessera::audio::SilentAudioBackend;
use tessera::{resolve_app_paths, BootScene, LoopConfig, ObjectRegistry, Scene, Services};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::gameplay::{self, GameScene};

const MANIFEST_ENV_VAR: &str = "TESSERA_MANIFEST";
const MAP_ENV_VAR: &str = "TESSERA_MAP";
const SETTINGS_FILE: &str = "game.json";

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) services: Services,
    pub(crate) first_scene: Box<dyn Scene>,
}

/// Optional `assets/game.json`; every field falls back to [`LoopConfig::default`].
#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct GameSettings {
    window_title: Option<String>,
    window_width: Option<u32>,
    window_height: Option<u32>,
    target_tps: Option<u32>,
    max_render_fps: Option<u32>,
    manifest_url: Option<String>,
    map_url: Option<String>,
}

impl GameSettings {
    fn apply(self, config: &mut LoopConfig) {
        if let Some(title) = self.window_title {
            config.window_title = title;
        }
        if let Some(width) = self.window_width {
            config.window_width = width;
        }
        if let Some(height) = self.window_height {
            config.window_height = height;
        }
        if let Some(tps) = self.target_tps {
            config.target_tps = tps;
        }
        if self.max_render_fps.is_some() {
            config.max_render_fps = self.max_render_fps;
        }
        if let Some(url) = self.manifest_url {
            config.manifest_url = url;
        }
        if let Some(url) = self.map_url {
            config.map_url = url;
        }
    }
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== Tessera Startup ===");

    let mut config = LoopConfig::default();
    if let Some(settings) = load_settings() {
        settings.apply(&mut config);
    }
    apply_env_overrides(
        &mut config,
        read_env_override(MANIFEST_ENV_VAR),
        read_env_override(MAP_ENV_VAR),
    );
    info!(
        manifest = %config.manifest_url,
        map = %config.map_url,
        "game_config"
    );

    let services = Services::new(Box::new(SilentAudioBackend::new()), ObjectRegistry::new());
    let registry = gameplay::object_registry(&services);
    let services = services.with_objects(registry);

    let map_url = config.map_url.clone();
    let first_scene: Box<dyn Scene> = Box::new(BootScene::new(
        config.manifest_url.clone(),
        move |_: &Services| -> Box<dyn Scene> { Box::new(GameScene::new(map_url)) },
    ));

    AppWiring {
        config,
        services,
        first_scene,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn read_env_override(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn apply_env_overrides(config: &mut LoopConfig, manifest: Option<String>, map: Option<String>) {
    if let Some(url) = manifest {
        config.manifest_url = url;
    }
    if let Some(url) = map {
        config.map_url = url;
    }
}

fn load_settings() -> Option<GameSettings> {
    // Root problems are reported by the loop itself.
    let paths = resolve_app_paths().ok()?;
    let path = paths.assets_dir.join(SETTINGS_FILE);
    if !path.is_file() {
        return None;
    }
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) => {
            warn!(path = %path.display(), error = %error, "game_settings_unreadable");
            return None;
        }
    };
    match parse_settings(&raw) {
        Ok(settings) => Some(settings),
        Err(error) => {
            warn!(path = %path.display(), error = %error, "game_settings_invalid");
            None
        }
    }
}

fn parse_settings(raw: &str) -> Result<GameSettings, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, GameSettings>(&mut deserializer) {
        Ok(settings) => Ok(settings),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse settings json: {source}"))
            } else {
                Err(format!("parse settings json at {path}: {source}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_override_only_the_fields_they_name() {
        let settings = parse_settings(r#"{ "window_title": "Keen", "map_url": "assets/maps/two.json" }"#)
            .expect("settings");
        let mut config = LoopConfig::default();

        settings.apply(&mut config);

        assert_eq!(config.window_title, "Keen");
        assert_eq!(config.map_url, "assets/maps/two.json");
        assert_eq!(config.manifest_url, LoopConfig::default().manifest_url);
        assert_eq!(config.window_width, LoopConfig::default().window_width);
    }

    #[test]
    fn settings_errors_name_the_offending_field() {
        let error = parse_settings(r#"{ "window_width": "wide" }"#).expect_err("bad width");
        assert!(error.contains("window_width"), "{error}");

        let error = parse_settings(r#"{ "fullscreen": true }"#).expect_err("unknown field");
        assert!(error.contains("fullscreen"), "{error}");
    }

    #[test]
    fn env_overrides_win_over_settings() {
        let mut config = LoopConfig::default();
        GameSettings {
            map_url: Some("assets/maps/from_file.json".to_string()),
            ..GameSettings::default()
        }
        .apply(&mut config);

        apply_env_overrides(&mut config, None, Some("assets/maps/from_env.json".to_string()));

        assert_eq!(config.map_url, "assets/maps/from_env.json");
        assert_eq!(config.manifest_url, "assets/assetlist.json");
    }
}
