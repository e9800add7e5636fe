use tessera::assets::{ImageManager, SpriteSheet, Texture};
use tessera::objects::{AnimationController, BasicObject, GameObject, ObjectSpawn};
use tessera::MapError;
use tracing::debug;

pub(crate) const PLAYER_TYPE: &str = "Game_Player";
pub(crate) const PLAYER_SHEET: &str = "sprKeen";

const IDLE_FRAMES: &[&str] = &["keen_idle_001.png"];
const MOVE_FRAMES: &[&str] = &[
    "keen_move_001.png",
    "keen_move_002.png",
    "keen_move_003.png",
    "keen_move_004.png",
];

/// The map's player marker. Movement is not wired yet; it loops its walk cycle in place.
pub(crate) struct Player {
    core: BasicObject,
}

impl Player {
    pub(crate) fn spawn(
        images: &ImageManager,
        spawn: &ObjectSpawn<'_>,
    ) -> Result<Box<dyn GameObject>, MapError> {
        let rejected = |reason: String| MapError::ObjectParams {
            type_name: spawn.type_name.to_string(),
            reason,
        };
        let sheet = images
            .sprite_sheet(PLAYER_SHEET)
            .ok_or_else(|| rejected(format!("sprite sheet `{PLAYER_SHEET}` is not loaded")))?;

        let mut animations = AnimationController::new();
        animations.add("idle", frames(&sheet, IDLE_FRAMES).map_err(rejected)?);
        animations.add("move", frames(&sheet, MOVE_FRAMES).map_err(rejected)?);
        animations.play("move");

        let mut core = BasicObject::new();
        core.state_mut().sprite = animations.current_frame().cloned();
        core.attach(Box::new(animations));
        debug!(
            x = spawn.placement.x,
            y = spawn.placement.y,
            "player_spawned"
        );
        Ok(Box::new(Player { core }))
    }
}

fn frames(sheet: &SpriteSheet, names: &[&str]) -> Result<Vec<Texture>, String> {
    names
        .iter()
        .map(|name| {
            sheet
                .get(name)
                .ok_or_else(|| format!("sprite sheet `{PLAYER_SHEET}` has no frame `{name}`"))
        })
        .collect()
}

impl GameObject for Player {
    fn core(&self) -> &BasicObject {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BasicObject {
        &mut self.core
    }

    fn type_name(&self) -> &str {
        PLAYER_TYPE
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tessera::assets::{ImageData, LoadQueue, MemoryAssetSource};
    use tessera::objects::ObjectProperties;
    use tessera::Rect;

    use super::*;

    fn sheet_source(frames: &[&str]) -> MemoryAssetSource {
        let mut atlas = serde_json::Map::new();
        for (index, name) in frames.iter().enumerate() {
            atlas.insert(
                (*name).to_string(),
                json!({ "frame": { "x": index * 8, "y": 0, "w": 8, "h": 16 } }),
            );
        }
        let mut source = MemoryAssetSource::new();
        source
            .insert_json(
                "assets/gfx/keen.json",
                &json!({ "frames": atlas, "meta": { "image": "keen.png" } }),
            )
            .insert_image(
                "assets/gfx/keen.png",
                ImageData::filled(40, 16, [255, 255, 255, 255]),
            );
        source
    }

    fn loaded_images(source: &MemoryAssetSource) -> ImageManager {
        let queue = LoadQueue::new();
        let images = ImageManager::new(queue.clone());
        images.load_sprite_sheet(PLAYER_SHEET, "assets/gfx/keen.json");
        queue.run_until_idle(source, 8).expect("drain queue");
        images
    }

    fn spawn_request(properties: &ObjectProperties) -> ObjectSpawn<'_> {
        ObjectSpawn {
            type_name: PLAYER_TYPE,
            params: Vec::new(),
            properties,
            placement: Rect::new(16.0, 0.0, 16.0, 32.0),
        }
    }

    #[test]
    fn spawns_playing_the_walk_cycle() {
        let mut all_frames = IDLE_FRAMES.to_vec();
        all_frames.extend_from_slice(MOVE_FRAMES);
        let images = loaded_images(&sheet_source(&all_frames));
        let properties = ObjectProperties::default();

        let mut player = Player::spawn(&images, &spawn_request(&properties)).expect("player");

        assert_eq!(player.type_name(), PLAYER_TYPE);
        assert!(player.core().state().sprite.is_some());
        player.update(0.1);
        let animation = player
            .core()
            .components::<AnimationController>()
            .next()
            .expect("animation");
        assert_eq!(animation.current(), "move");
        assert_eq!(animation.frame_index(), 1);
    }

    #[test]
    fn missing_sheet_or_frame_rejects_the_spawn() {
        let properties = ObjectProperties::default();
        let queue = LoadQueue::new();
        let empty = ImageManager::new(queue);
        let error = Player::spawn(&empty, &spawn_request(&properties))
            .err()
            .expect("no sheet");
        assert!(error.to_string().contains(PLAYER_SHEET));

        let images = loaded_images(&sheet_source(IDLE_FRAMES));
        let error = Player::spawn(&images, &spawn_request(&properties))
            .err()
            .expect("no walk frames");
        assert!(error.to_string().contains("keen_move_001.png"));
    }
}
