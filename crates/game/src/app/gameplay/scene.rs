use std::rc::Rc;
use std::time::Duration;

use tessera::{
    Camera, Drawable, Rect, Scene, SceneCameras, SceneCommand, Services, TileMap, TweenManager,
    Vec2, DEFAULT_PRIORITY,
};
use tracing::{info, warn};

const WORLD_VIEW: Rect = Rect::new(0.0, 0.0, 400.0, 300.0);
const PORT: Rect = Rect::new(0.0, 0.0, 800.0, 600.0);
const PAN_TARGET: Vec2 = Vec2::new(200.0, 150.0);
const PORT_TARGET: Vec2 = Vec2::new(400.0, 300.0);
const INTRO_DURATION: Duration = Duration::from_millis(2500);

/// Shows one map through one camera. Once the map is built, the camera pans across it while its
/// port shrinks to half the screen.
pub(crate) struct GameScene {
    map_url: String,
    map: Option<Rc<TileMap>>,
    camera: Option<Rc<Camera>>,
    cameras: SceneCameras,
}

impl GameScene {
    pub(crate) fn new(map_url: impl Into<String>) -> Self {
        Self {
            map_url: map_url.into(),
            map: None,
            camera: None,
            cameras: SceneCameras::new(),
        }
    }

    #[cfg(test)]
    fn map(&self) -> Option<&Rc<TileMap>> {
        self.map.as_ref()
    }

    #[cfg(test)]
    fn camera(&self) -> Option<&Rc<Camera>> {
        self.camera.as_ref()
    }
}

impl Scene for GameScene {
    fn name(&self) -> &str {
        "game"
    }

    fn start(&mut self, services: &Services) {
        let map = services.new_tile_map();
        let target: Rc<dyn Drawable> = map.clone();
        let camera = self
            .cameras
            .add_camera(Camera::new(WORLD_VIEW, PORT, Some(target)));

        let tweens = Rc::clone(&services.tweens);
        let intro_camera = Rc::downgrade(&camera);
        map.on_create.connect(DEFAULT_PRIORITY, move |_| {
            if let Some(camera) = intro_camera.upgrade() {
                start_intro(&tweens, &camera);
            }
            Ok(())
        });
        map.on_fail.connect(DEFAULT_PRIORITY, |failure| {
            warn!(url = %failure.url, reason = %failure.reason, "game_map_failed");
            Ok(())
        });
        map.load(&self.map_url);
        info!(map = %self.map_url, "game_scene_started");

        self.map = Some(map);
        self.camera = Some(camera);
    }

    fn stop(&mut self, _services: &Services) {
        info!(map = %self.map_url, "game_scene_stopped");
    }

    fn update(&mut self, _services: &Services, dt: f32) -> SceneCommand {
        if let Some(map) = &self.map {
            map.update(dt);
        }
        SceneCommand::None
    }

    fn cameras(&self) -> &[Rc<Camera>] {
        self.cameras.as_slice()
    }
}

fn start_intro(tweens: &TweenManager, camera: &Rc<Camera>) {
    let pan = tweens.create(camera.world().position(), PAN_TARGET, INTRO_DURATION);
    let panned = Rc::downgrade(camera);
    pan.on_update.connect(DEFAULT_PRIORITY, move |position| {
        if let Some(camera) = panned.upgrade() {
            camera.set_world_position(*position);
        }
        Ok(())
    });

    let shrink = tweens.create(camera.port().size(), PORT_TARGET, INTRO_DURATION);
    let resized = Rc::downgrade(camera);
    shrink.on_update.connect(DEFAULT_PRIORITY, move |size| {
        if let Some(camera) = resized.upgrade() {
            camera.set_port_size(*size);
        }
        Ok(())
    });
    info!(
        duration_ms = INTRO_DURATION.as_millis() as u64,
        "game_intro_started"
    );
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tessera::assets::{ImageData, MemoryAssetSource};
    use tessera::audio::SilentAudioBackend;
    use tessera::{ObjectRegistry, SoftwareBackend, Viewport};

    use super::super::{object_registry, PLAYER_SHEET, PLAYER_TYPE};
    use super::*;

    fn services() -> Services {
        let services = Services::new(Box::new(SilentAudioBackend::new()), ObjectRegistry::new());
        let registry = object_registry(&services);
        services.with_objects(registry)
    }

    fn source() -> MemoryAssetSource {
        let mut source = MemoryAssetSource::new();
        source
            .insert_json(
                "assets/maps/test.json",
                &json!({
                    "width": 4, "height": 3, "tilewidth": 16, "tileheight": 16,
                    "tilesets": [
                        { "firstgid": 1, "source": "../tilesets/ground.json" },
                        { "firstgid": 3, "source": "../tilesets/actors.json" }
                    ],
                    "layers": [
                        { "type": "tilelayer", "name": "ground",
                          "data": [1, 1, 1, 1, 0, 0, 0, 0, 2, 2, 2, 2] },
                        { "type": "objectgroup", "name": "actors", "objects": [
                            { "x": 16, "y": 32, "width": 16, "height": 16, "gid": 3 }
                        ] }
                    ]
                }),
            )
            .insert_json(
                "assets/tilesets/ground.json",
                &json!({ "columns": 2, "tilewidth": 16, "tileheight": 16, "image": "ground.png" }),
            )
            .insert_image(
                "assets/gfx/tilesets/ground.png",
                ImageData::filled(32, 16, [40, 120, 40, 255]),
            )
            .insert_json(
                "assets/tilesets/actors.json",
                &json!({
                    "columns": 1, "tilewidth": 16, "tileheight": 16,
                    "tileproperties": { "0": { "object_type": PLAYER_TYPE } }
                }),
            )
            .insert_json(
                "assets/gfx/keen.json",
                &json!({
                    "frames": {
                        "keen_idle_001.png": { "frame": { "x": 0, "y": 0, "w": 8, "h": 16 } },
                        "keen_move_001.png": { "frame": { "x": 8, "y": 0, "w": 8, "h": 16 } },
                        "keen_move_002.png": { "frame": { "x": 16, "y": 0, "w": 8, "h": 16 } },
                        "keen_move_003.png": { "frame": { "x": 24, "y": 0, "w": 8, "h": 16 } },
                        "keen_move_004.png": { "frame": { "x": 32, "y": 0, "w": 8, "h": 16 } }
                    },
                    "meta": { "image": "keen.png" }
                }),
            )
            .insert_image(
                "assets/gfx/keen.png",
                ImageData::filled(40, 16, [250, 200, 0, 255]),
            );
        source
    }

    fn started_scene(services: &Services, source: &MemoryAssetSource) -> GameScene {
        services
            .images
            .load_sprite_sheet(PLAYER_SHEET, "assets/gfx/keen.json");
        services
            .queue
            .run_until_idle(source, 8)
            .expect("sprite sheet");

        let mut scene = GameScene::new("assets/maps/test.json");
        scene.start(services);
        services.queue.run_until_idle(source, 8).expect("map");
        scene
    }

    #[test]
    fn builds_the_map_with_its_player_and_starts_the_intro() {
        let services = services();
        let source = source();

        let scene = started_scene(&services, &source);

        let map = scene.map().expect("map");
        assert!(map.is_created());
        let layers = map.layers();
        let actors = layers[1].as_object_layer().expect("object layer");
        assert_eq!(actors.objects()[0].type_name(), PLAYER_TYPE);
        assert_eq!(services.tweens.active_count(), 2);
    }

    #[test]
    fn intro_pans_the_world_and_shrinks_the_port() {
        let services = services();
        let source = source();
        let scene = started_scene(&services, &source);
        let camera = Rc::clone(scene.camera().expect("camera"));

        services
            .tweens
            .update(INTRO_DURATION / 2)
            .expect("halfway");
        assert_eq!(camera.world().position(), Vec2::new(100.0, 75.0));

        services.tweens.update(INTRO_DURATION).expect("finish");

        assert_eq!(camera.world().position(), PAN_TARGET);
        assert_eq!(camera.world().size(), WORLD_VIEW.size());
        assert_eq!(camera.port().size(), PORT_TARGET);
        assert_eq!(services.tweens.active_count(), 0);
    }

    #[test]
    fn failed_map_leaves_the_camera_still() {
        let services = services();
        let mut scene = GameScene::new("assets/maps/missing.json");
        scene.start(&services);

        services
            .queue
            .run_until_idle(&MemoryAssetSource::new(), 4)
            .expect("drain");

        assert!(!scene.map().expect("map").is_created());
        assert_eq!(services.tweens.active_count(), 0);
        assert!(matches!(scene.update(&services, 0.016), SceneCommand::None));
    }

    #[test]
    fn renders_through_its_camera() {
        let services = services();
        let source = source();
        let mut scene = started_scene(&services, &source);
        let mut backend = SoftwareBackend::new(Viewport {
            width: 800,
            height: 600,
        });

        backend.begin_frame();
        scene.render(&mut backend);

        // The top-left ground tile is scaled 2x into the port.
        assert_eq!(backend.frame().pixel(5, 5), Some([40, 120, 40, 255]));
    }
}
