use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use winit::window::Window;

use crate::geometry::{Rect, Vec2};

use super::surface::{stretch_rgba, Drawable, Surface};
use super::transform::{fit_letterbox, Viewport};

pub const CLEAR_COLOR: [u8; 4] = [0, 0, 0, 255];
const LETTERBOX_COLOR: [u8; 4] = [0, 0, 0, 255];

/// Rasterizes drawables into offscreen surfaces and composes them onto the frame.
pub trait RenderBackend {
    fn render(&mut self, root: &dyn Drawable, origin: Vec2, target: &mut Surface);
    fn present(&mut self, surface: &Surface, dest: Rect);
}

/// CPU backend composing into a frame at the virtual resolution.
#[derive(Debug, Clone)]
pub struct SoftwareBackend {
    frame: Surface,
}

impl SoftwareBackend {
    pub fn new(virtual_size: Viewport) -> Self {
        Self {
            frame: Surface::new(virtual_size.width, virtual_size.height),
        }
    }

    pub fn begin_frame(&mut self) {
        self.frame.clear(CLEAR_COLOR);
    }

    pub fn frame(&self) -> &Surface {
        &self.frame
    }
}

impl RenderBackend for SoftwareBackend {
    fn render(&mut self, root: &dyn Drawable, origin: Vec2, target: &mut Surface) {
        target.clear([0, 0, 0, 0]);
        root.draw(target, origin);
    }

    fn present(&mut self, surface: &Surface, dest: Rect) {
        self.frame.blit_stretched(surface, dest);
    }
}

/// Window presenter. The composed frame is letterboxed into the window.
pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    viewport: Viewport,
}

impl Renderer {
    pub fn new(window: Arc<Window>) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            viewport: Viewport {
                width: size.width,
                height: size.height,
            },
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.viewport = Viewport { width, height };
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }

    pub fn present_frame(&mut self, frame: &Surface) -> Result<(), Error> {
        let (virtual_width, virtual_height) = frame.size();
        let content = fit_letterbox(
            self.viewport,
            Viewport {
                width: virtual_width,
                height: virtual_height,
            },
        );
        let target = self.pixels.frame_mut();
        for pixel in target.chunks_exact_mut(4) {
            pixel.copy_from_slice(&LETTERBOX_COLOR);
        }
        stretch_rgba(
            frame.rgba(),
            virtual_width,
            virtual_height,
            target,
            self.viewport.width,
            self.viewport.height,
            content,
        );
        self.pixels.render()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct Dot {
        at: Vec2,
        last_origin: Cell<Vec2>,
    }

    impl Drawable for Dot {
        fn draw(&self, surface: &mut Surface, origin: Vec2) {
            self.last_origin.set(origin);
            let position = self.at + origin;
            surface.put_pixel(position.x as i32, position.y as i32, [9, 9, 9, 255]);
        }
    }

    #[test]
    fn software_backend_renders_with_origin_and_presents_into_frame() {
        let mut backend = SoftwareBackend::new(Viewport {
            width: 8,
            height: 8,
        });
        backend.begin_frame();
        let dot = Dot {
            at: Vec2::new(3.0, 2.0),
            last_origin: Cell::new(Vec2::ZERO),
        };
        let mut target = Surface::new(4, 4);

        backend.render(&dot, Vec2::new(-2.0, -1.0), &mut target);
        backend.present(&target, Rect::new(0.0, 0.0, 8.0, 8.0));

        assert_eq!(dot.last_origin.get(), Vec2::new(-2.0, -1.0));
        assert_eq!(target.pixel(1, 1), Some([9, 9, 9, 255]));
        assert_eq!(backend.frame().pixel(2, 2), Some([9, 9, 9, 255]));
        assert_eq!(backend.frame().pixel(0, 0), Some([0, 0, 0, 0]));
    }
}
