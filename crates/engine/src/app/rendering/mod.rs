mod renderer;
mod surface;
mod transform;

pub use renderer::{RenderBackend, Renderer, SoftwareBackend, CLEAR_COLOR};
pub use surface::{Drawable, Surface};
pub use transform::{fit_letterbox, window_to_virtual, Viewport};
