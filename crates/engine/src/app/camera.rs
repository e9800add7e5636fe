use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::geometry::{Rect, Vec2};

use super::rendering::{Drawable, RenderBackend, Surface};

/// Shows the `world` window of its target, stretched onto the `port` rectangle of the screen.
///
/// Both rectangles may change at any time; the offscreen texture and the presented size follow on
/// the next [`Camera::render`].
pub struct Camera {
    world: Cell<Rect>,
    port: Cell<Rect>,
    target: RefCell<Option<Rc<dyn Drawable>>>,
    texture: RefCell<Surface>,
    view_size: Cell<Vec2>,
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("world", &self.world.get())
            .field("port", &self.port.get())
            .field("has_target", &self.target.borrow().is_some())
            .field("texture", &self.texture.borrow().size())
            .finish()
    }
}

impl Camera {
    pub fn new(world: Rect, port: Rect, target: Option<Rc<dyn Drawable>>) -> Rc<Self> {
        let camera = Self {
            world: Cell::new(world),
            port: Cell::new(port),
            target: RefCell::new(target),
            texture: RefCell::new(Surface::new(
                texture_extent(world.width),
                texture_extent(world.height),
            )),
            view_size: Cell::new(port.size()),
        };
        camera.refresh();
        Rc::new(camera)
    }

    pub fn world(&self) -> Rect {
        self.world.get()
    }

    pub fn set_world(&self, world: Rect) {
        self.world.set(world);
    }

    pub fn set_world_position(&self, position: Vec2) {
        let mut world = self.world.get();
        world.set_position(position);
        self.world.set(world);
    }

    pub fn port(&self) -> Rect {
        self.port.get()
    }

    pub fn set_port(&self, port: Rect) {
        self.port.set(port);
    }

    pub fn set_port_size(&self, size: Vec2) {
        let mut port = self.port.get();
        port.set_size(size);
        self.port.set(port);
    }

    pub fn set_target(&self, target: Rc<dyn Drawable>) {
        *self.target.borrow_mut() = Some(target);
    }

    pub fn has_target(&self) -> bool {
        self.target.borrow().is_some()
    }

    pub fn texture_size(&self) -> (u32, u32) {
        self.texture.borrow().size()
    }

    pub fn view_size(&self) -> Vec2 {
        self.view_size.get()
    }

    /// Brings the texture to the world size and the presented view to the port size.
    pub fn refresh(&self) {
        let world = self.world.get();
        let wanted = (texture_extent(world.width), texture_extent(world.height));
        let mut texture = self.texture.borrow_mut();
        if texture.size() != wanted {
            debug!(width = wanted.0, height = wanted.1, "camera_texture_resized");
            texture.resize(wanted.0, wanted.1);
        }
        let port_size = self.port.get().size();
        if self.view_size.get() != port_size {
            self.view_size.set(port_size);
        }
    }

    pub fn render(&self, backend: &mut dyn RenderBackend) {
        self.refresh();
        let Some(target) = self.target.borrow().clone() else {
            return;
        };
        let world = self.world.get();
        let mut texture = self.texture.borrow_mut();
        backend.render(target.as_ref(), Vec2::new(-world.x, -world.y), &mut texture);
        let port = self.port.get();
        let view_size = self.view_size.get();
        backend.present(
            &texture,
            Rect::new(port.x, port.y, view_size.x, view_size.y),
        );
    }
}

fn texture_extent(length: f32) -> u32 {
    if length.is_finite() && length > 0.0 {
        length.round() as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingBackend {
        rendered: Vec<(Vec2, (u32, u32))>,
        presented: Vec<Rect>,
    }

    impl RenderBackend for RecordingBackend {
        fn render(&mut self, _root: &dyn Drawable, origin: Vec2, target: &mut Surface) {
            self.rendered.push((origin, target.size()));
        }

        fn present(&mut self, _surface: &Surface, dest: Rect) {
            self.presented.push(dest);
        }
    }

    struct Nothing;

    impl Drawable for Nothing {
        fn draw(&self, _surface: &mut Surface, _origin: Vec2) {}
    }

    #[test]
    fn render_offsets_by_world_and_presents_into_port() {
        let camera = Camera::new(
            Rect::new(10.0, 20.0, 400.0, 300.0),
            Rect::new(0.0, 0.0, 800.0, 600.0),
            Some(Rc::new(Nothing)),
        );
        let mut backend = RecordingBackend::default();

        camera.render(&mut backend);

        assert_eq!(backend.rendered, vec![(Vec2::new(-10.0, -20.0), (400, 300))]);
        assert_eq!(backend.presented, vec![Rect::new(0.0, 0.0, 800.0, 600.0)]);
    }

    #[test]
    fn changed_rects_resize_lazily_on_next_render() {
        let camera = Camera::new(
            Rect::new(0.0, 0.0, 400.0, 300.0),
            Rect::new(0.0, 0.0, 800.0, 600.0),
            Some(Rc::new(Nothing)),
        );
        let mut backend = RecordingBackend::default();

        camera.set_world(Rect::new(5.0, 5.0, 200.0, 100.0));
        camera.set_port_size(Vec2::new(400.0, 300.0));
        assert_eq!(camera.texture_size(), (400, 300));
        assert_eq!(camera.view_size(), Vec2::new(800.0, 600.0));

        camera.render(&mut backend);

        assert_eq!(camera.texture_size(), (200, 100));
        assert_eq!(camera.view_size(), Vec2::new(400.0, 300.0));
        assert_eq!(backend.presented, vec![Rect::new(0.0, 0.0, 400.0, 300.0)]);
    }

    #[test]
    fn camera_without_target_draws_nothing() {
        let camera = Camera::new(Rect::new(0.0, 0.0, 4.0, 4.0), Rect::new(0.0, 0.0, 4.0, 4.0), None);
        let mut backend = RecordingBackend::default();

        camera.render(&mut backend);

        assert!(backend.rendered.is_empty());
        assert!(!camera.has_target());
    }
}
