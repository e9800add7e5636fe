use std::fmt;
use std::rc::Rc;

use tracing::{info, warn};

use super::camera::Camera;
use super::rendering::RenderBackend;
use super::services::Services;

/// What a scene asks the stack to do after its update.
pub enum SceneCommand {
    None,
    Push(Box<dyn Scene>),
    Pop,
}

impl fmt::Debug for SceneCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneCommand::None => f.write_str("None"),
            SceneCommand::Push(scene) => f.debug_tuple("Push").field(&scene.name()).finish(),
            SceneCommand::Pop => f.write_str("Pop"),
        }
    }
}

/// A full-screen state on the [`SceneStack`].
///
/// `start`/`stop` bracket the scene's time on the stack; `pause`/`resume` bracket the time another
/// scene sits on top of it.
pub trait Scene {
    fn name(&self) -> &str;

    fn start(&mut self, services: &Services);

    fn stop(&mut self, _services: &Services) {}

    fn pause(&mut self, _services: &Services) {}

    fn resume(&mut self, _services: &Services) {}

    fn update(&mut self, services: &Services, dt: f32) -> SceneCommand;

    fn cameras(&self) -> &[Rc<Camera>] {
        &[]
    }

    /// Renders every camera in order.
    fn render(&mut self, backend: &mut dyn RenderBackend) {
        for camera in self.cameras() {
            camera.render(backend);
        }
    }
}

/// Ordered camera list a scene renders through.
#[derive(Debug, Default)]
pub struct SceneCameras {
    cameras: Vec<Rc<Camera>>,
}

impl SceneCameras {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_camera(&mut self, camera: Rc<Camera>) -> Rc<Camera> {
        self.cameras.push(Rc::clone(&camera));
        camera
    }

    pub fn as_slice(&self) -> &[Rc<Camera>] {
        &self.cameras
    }
}

/// Scenes stacked bottom to top; only the top one updates and renders.
#[derive(Default)]
pub struct SceneStack {
    scenes: Vec<Box<dyn Scene>>,
}

impl fmt::Debug for SceneStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.scenes.iter().map(|scene| scene.name()).collect();
        f.debug_struct("SceneStack").field("scenes", &names).finish()
    }
}

impl SceneStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn current(&self) -> Option<&dyn Scene> {
        self.scenes.last().map(Box::as_ref)
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current().map(|scene| scene.name())
    }

    /// Pauses the current scene, then starts `scene` on top of it.
    pub fn push(&mut self, mut scene: Box<dyn Scene>, services: &Services) {
        if let Some(current) = self.scenes.last_mut() {
            current.pause(services);
        }
        scene.start(services);
        info!(scene = scene.name(), depth = self.scenes.len() + 1, "scene_pushed");
        self.scenes.push(scene);
    }

    /// Stops and removes the current scene, then resumes the one below.
    pub fn pop(&mut self, services: &Services) -> Option<Box<dyn Scene>> {
        let Some(mut scene) = self.scenes.pop() else {
            warn!("scene_pop_on_empty_stack");
            return None;
        };
        scene.stop(services);
        if let Some(current) = self.scenes.last_mut() {
            current.resume(services);
        }
        info!(scene = scene.name(), depth = self.scenes.len(), "scene_popped");
        Some(scene)
    }

    pub fn update(&mut self, services: &Services, dt: f32) {
        let command = match self.scenes.last_mut() {
            Some(scene) => scene.update(services, dt),
            None => return,
        };
        self.apply(command, services);
    }

    pub fn apply(&mut self, command: SceneCommand, services: &Services) {
        match command {
            SceneCommand::None => {}
            SceneCommand::Push(scene) => self.push(scene, services),
            SceneCommand::Pop => {
                self.pop(services);
            }
        }
    }

    pub fn render(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(scene) = self.scenes.last_mut() {
            scene.render(backend);
        }
    }

    /// Pops every scene, top first.
    pub fn shutdown_all(&mut self, services: &Services) {
        while self.pop(services).is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use crate::audio::SilentAudioBackend;
    use crate::objects::ObjectRegistry;

    use super::*;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
        next: Option<SceneCommandKind>,
    }

    #[derive(Clone, Copy)]
    enum SceneCommandKind {
        Push(&'static str),
        Pop,
    }

    impl Recorder {
        fn boxed(name: &'static str, log: &Log) -> Box<dyn Scene> {
            Box::new(Self {
                name,
                log: Rc::clone(log),
                next: None,
            })
        }

        fn record(&self, event: &str) {
            self.log.borrow_mut().push(format!("{}:{event}", self.name));
        }
    }

    impl Scene for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn start(&mut self, _services: &Services) {
            self.record("start");
        }

        fn stop(&mut self, _services: &Services) {
            self.record("stop");
        }

        fn pause(&mut self, _services: &Services) {
            self.record("pause");
        }

        fn resume(&mut self, _services: &Services) {
            self.record("resume");
        }

        fn update(&mut self, _services: &Services, _dt: f32) -> SceneCommand {
            self.record("update");
            match self.next.take() {
                Some(SceneCommandKind::Push(name)) => {
                    SceneCommand::Push(Recorder::boxed(name, &self.log))
                }
                Some(SceneCommandKind::Pop) => SceneCommand::Pop,
                None => SceneCommand::None,
            }
        }
    }

    fn services() -> Services {
        Services::new(Box::new(SilentAudioBackend::new()), ObjectRegistry::new())
    }

    #[test]
    fn push_pauses_below_and_pop_resumes_it() {
        let services = services();
        let log: Log = Rc::default();
        let mut stack = SceneStack::new();

        stack.push(Recorder::boxed("boot", &log), &services);
        stack.push(Recorder::boxed("game", &log), &services);
        assert_eq!(stack.current_name(), Some("game"));
        let popped = stack.pop(&services).expect("popped");

        assert_eq!(popped.name(), "game");
        assert_eq!(stack.current_name(), Some("boot"));
        assert_eq!(
            *log.borrow(),
            vec!["boot:start", "boot:pause", "game:start", "game:stop", "boot:resume"]
        );
    }

    #[test]
    fn only_the_top_scene_updates_and_its_command_is_applied() {
        let services = services();
        let log: Log = Rc::default();
        let mut stack = SceneStack::new();
        stack.push(
            Box::new(Recorder {
                name: "boot",
                log: Rc::clone(&log),
                next: Some(SceneCommandKind::Push("game")),
            }),
            &services,
        );

        stack.update(&services, 0.016);
        stack.update(&services, 0.016);

        assert_eq!(stack.len(), 2);
        assert_eq!(
            *log.borrow(),
            vec!["boot:start", "boot:update", "boot:pause", "game:start", "game:update"]
        );
    }

    #[test]
    fn pop_command_and_empty_pop_are_handled() {
        let services = services();
        let log: Log = Rc::default();
        let mut stack = SceneStack::new();
        stack.push(
            Box::new(Recorder {
                name: "menu",
                log: Rc::clone(&log),
                next: Some(SceneCommandKind::Pop),
            }),
            &services,
        );

        stack.update(&services, 0.016);

        assert!(stack.is_empty());
        assert!(stack.pop(&services).is_none());
        stack.update(&services, 0.016);
    }

    #[test]
    fn shutdown_stops_every_scene_top_first() {
        let services = services();
        let log: Log = Rc::default();
        let mut stack = SceneStack::new();
        stack.push(Recorder::boxed("a", &log), &services);
        stack.push(Recorder::boxed("b", &log), &services);
        log.borrow_mut().clear();

        stack.shutdown_all(&services);

        assert_eq!(*log.borrow(), vec!["b:stop", "a:resume", "a:stop"]);
    }
}
