//! Entities placed by object layers.
//!
//! Map data names an object type by string; [`ObjectRegistry`] turns that name into a
//! constructor. The registry is filled at startup, so an unknown name is a configuration error
//! rather than a lookup in some global namespace.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::app::Surface;
use crate::assets::Texture;
use crate::geometry::{Rect, Vec2};
use crate::map::{MapError, PropertyMap};

pub const DEFAULT_OBJECT_TYPE: &str = "GameObject";

/// Property bags attached to a placed object.
///
/// `instance` comes from the object in the map, `object` from the tile its gid points at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectProperties {
    pub instance: Option<PropertyMap>,
    pub object: Option<PropertyMap>,
}

impl ObjectProperties {
    /// Looks in the tile bag first, then the instance bag.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.object
            .as_ref()
            .and_then(|bag| bag.get(name))
            .or_else(|| self.instance.as_ref().and_then(|bag| bag.get(name)))
    }
}

/// Everything a component may touch on its owner.
#[derive(Debug, Clone, Default)]
pub struct ObjectState {
    pub position: Vec2,
    pub properties: ObjectProperties,
    pub sprite: Option<Texture>,
    pub visible: bool,
}

pub trait Component: Any {
    fn update(&mut self, state: &mut ObjectState, dt: f32);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

pub trait GameObject {
    fn core(&self) -> &BasicObject;
    fn core_mut(&mut self) -> &mut BasicObject;

    fn type_name(&self) -> &str {
        DEFAULT_OBJECT_TYPE
    }

    fn update(&mut self, dt: f32) {
        self.core_mut().update_components(dt);
    }

    /// Draws the current sprite with its bottom edge centered on the object position.
    fn draw(&self, surface: &mut Surface, origin: Vec2) {
        let state = self.core().state();
        if !state.visible {
            return;
        }
        if let Some(sprite) = &state.sprite {
            let x = origin.x + state.position.x - sprite.frame.width * 0.5;
            let y = origin.y + state.position.y - sprite.frame.height;
            surface.blit_texture(sprite, x.round() as i32, y.round() as i32);
        }
    }
}

/// Plain object with a component list. Also the default type for untyped map objects.
pub struct BasicObject {
    state: ObjectState,
    components: Vec<(ComponentId, Box<dyn Component>)>,
    next_component: u64,
}

impl Default for BasicObject {
    fn default() -> Self {
        Self {
            state: ObjectState {
                visible: true,
                ..ObjectState::default()
            },
            components: Vec::new(),
            next_component: 0,
        }
    }
}

impl fmt::Debug for BasicObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicObject")
            .field("state", &self.state)
            .field("components", &self.components.len())
            .finish()
    }
}

impl BasicObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ObjectState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ObjectState {
        &mut self.state
    }

    pub fn position(&self) -> Vec2 {
        self.state.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.state.position = position;
    }

    pub fn attach(&mut self, component: Box<dyn Component>) -> ComponentId {
        self.next_component += 1;
        let id = ComponentId(self.next_component);
        self.components.push((id, component));
        id
    }

    pub fn remove(&mut self, id: ComponentId) -> Option<Box<dyn Component>> {
        let index = self
            .components
            .iter()
            .position(|(candidate, _)| *candidate == id)?;
        Some(self.components.remove(index).1)
    }

    pub fn has<T: Component>(&self) -> bool {
        self.components
            .iter()
            .any(|(_, component)| component.as_any().is::<T>())
    }

    pub fn components<T: Component>(&self) -> impl Iterator<Item = &T> {
        self.components
            .iter()
            .filter_map(|(_, component)| component.as_any().downcast_ref::<T>())
    }

    pub fn component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|(_, component)| component.as_any_mut().downcast_mut::<T>())
    }

    pub fn update_components(&mut self, dt: f32) {
        for (_, component) in &mut self.components {
            component.update(&mut self.state, dt);
        }
    }
}

impl GameObject for BasicObject {
    fn core(&self) -> &BasicObject {
        self
    }

    fn core_mut(&mut self) -> &mut BasicObject {
        self
    }
}

pub const DEFAULT_ANIMATION_FPS: f32 = 15.0;

#[derive(Debug, Clone)]
pub struct Animation {
    pub frames: Vec<Texture>,
    pub fps: f32,
}

/// Named frame sequences; the playing one drives the owner's sprite.
#[derive(Debug, Clone, Default)]
pub struct AnimationController {
    animations: BTreeMap<String, Animation>,
    current: String,
    frame: usize,
    elapsed: f32,
}

impl AnimationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, frames: Vec<Texture>) -> &mut Animation {
        let animation = self
            .animations
            .entry(key.into())
            .or_insert_with(|| Animation {
                frames: Vec::new(),
                fps: DEFAULT_ANIMATION_FPS,
            });
        animation.frames = frames;
        animation.fps = DEFAULT_ANIMATION_FPS;
        animation
    }

    /// Switches animation. Replaying the current one keeps its frame position.
    pub fn play(&mut self, key: &str) {
        if self.current != key {
            self.current = key.to_string();
            self.frame = 0;
            self.elapsed = 0.0;
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn frame_index(&self) -> usize {
        self.frame
    }

    pub fn current_frame(&self) -> Option<&Texture> {
        let animation = self.animations.get(&self.current)?;
        animation.frames.get(self.frame)
    }
}

impl Component for AnimationController {
    fn update(&mut self, state: &mut ObjectState, dt: f32) {
        let Some(animation) = self.animations.get(&self.current) else {
            return;
        };
        if animation.frames.is_empty() {
            return;
        }
        if animation.fps > 0.0 {
            let frame_time = 1.0 / animation.fps;
            self.elapsed += dt.max(0.0);
            while self.elapsed >= frame_time {
                self.elapsed -= frame_time;
                self.frame = (self.frame + 1) % animation.frames.len();
            }
        }
        self.frame %= animation.frames.len();
        state.sprite = animation.frames.get(self.frame).cloned();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Construction request handed to an object factory.
#[derive(Debug, Clone)]
pub struct ObjectSpawn<'a> {
    pub type_name: &'a str,
    /// `paramN` values from the tile bag, ordered by `N`.
    pub params: Vec<Value>,
    pub properties: &'a ObjectProperties,
    pub placement: Rect,
}

pub type ObjectFactory = Rc<dyn Fn(&ObjectSpawn<'_>) -> Result<Box<dyn GameObject>, MapError>>;

#[derive(Clone)]
pub struct ObjectRegistry {
    factories: HashMap<String, ObjectFactory>,
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ObjectRegistry")
            .field("types", &names)
            .finish()
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(DEFAULT_OBJECT_TYPE, |_| Ok(Box::new(BasicObject::new())));
        registry
    }
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&ObjectSpawn<'_>) -> Result<Box<dyn GameObject>, MapError> + 'static,
    ) {
        let name = name.into();
        debug!(object_type = %name, "object_type_registered");
        self.factories.insert(name, Rc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, spawn: &ObjectSpawn<'_>) -> Result<Box<dyn GameObject>, MapError> {
        let factory =
            self.factories
                .get(spawn.type_name)
                .ok_or_else(|| MapError::UnknownObjectType {
                    name: spawn.type_name.to_string(),
                })?;
        factory(spawn)
    }
}
