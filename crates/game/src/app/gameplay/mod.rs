mod player;
mod scene;

use std::rc::Rc;

use tessera::{ObjectRegistry, Services};

pub(crate) use player::{Player, PLAYER_SHEET, PLAYER_TYPE};
pub(crate) use scene::GameScene;

/// Object types the sample maps place, wired to the services' managers.
pub(crate) fn object_registry(services: &Services) -> ObjectRegistry {
    let mut registry = ObjectRegistry::new();
    let images = Rc::clone(&services.images);
    registry.register(PLAYER_TYPE, move |spawn| Player::spawn(&images, spawn));
    registry
}
