use crate::geometry::{Rect, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Largest rectangle of the virtual aspect ratio that fits the window, centered.
pub fn fit_letterbox(window: Viewport, virtual_size: Viewport) -> Rect {
    if window.width == 0 || window.height == 0 || virtual_size.width == 0 || virtual_size.height == 0
    {
        return Rect::default();
    }
    let scale = (window.width as f32 / virtual_size.width as f32)
        .min(window.height as f32 / virtual_size.height as f32);
    let width = virtual_size.width as f32 * scale;
    let height = virtual_size.height as f32 * scale;
    Rect::new(
        ((window.width as f32 - width) * 0.5).floor(),
        ((window.height as f32 - height) * 0.5).floor(),
        width,
        height,
    )
}

/// Maps a window pixel position into virtual-resolution coordinates, rounded.
pub fn window_to_virtual(position: Vec2, window: Viewport, virtual_size: Viewport) -> Vec2 {
    let content = fit_letterbox(window, virtual_size);
    if content.width <= 0.0 || content.height <= 0.0 {
        return Vec2::ZERO;
    }
    Vec2::new(
        ((position.x - content.x) * (virtual_size.width as f32 / content.width)).round(),
        ((position.y - content.y) * (virtual_size.height as f32 / content.height)).round(),
    )
}
