use crate::assets::{ImageData, Texture};
use crate::geometry::{Rect, Vec2};

/// Anything that can rasterize itself into a [`Surface`], offset by `origin`.
pub trait Drawable {
    fn draw(&self, surface: &mut Surface, origin: Vec2);
}

/// Owned RGBA8 pixel buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Surface {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Reallocates to the new size; contents are cleared.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.rgba.clear();
        self.rgba.resize(width as usize * height as usize * 4, 0);
    }

    pub fn clear(&mut self, color: [u8; 4]) {
        for pixel in self.rgba.chunks_exact_mut(4) {
            pixel.copy_from_slice(&color);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let mut pixel = [0; 4];
        pixel.copy_from_slice(&self.rgba[offset..offset + 4]);
        Some(pixel)
    }

    pub fn put_pixel(&mut self, x: i32, y: i32, color: [u8; 4]) {
        write_pixel_rgba_clipped(&mut self.rgba, self.width, self.height, x, y, color);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: [u8; 4]) {
        let left = rect.x.round() as i32;
        let top = rect.y.round() as i32;
        let right = (rect.x + rect.width).round() as i32;
        let bottom = (rect.y + rect.height).round() as i32;
        for y in top.max(0)..bottom.min(self.height as i32) {
            for x in left.max(0)..right.min(self.width as i32) {
                self.put_pixel(x, y, color);
            }
        }
    }

    /// Copies the texture frame with its top-left corner at `(x, y)`. Fully transparent source
    /// pixels are skipped.
    pub fn blit_texture(&mut self, texture: &Texture, x: i32, y: i32) {
        let image: &ImageData = &texture.image;
        let frame = texture.frame;
        let src_left = frame.x.max(0.0) as u32;
        let src_top = frame.y.max(0.0) as u32;
        let src_right = ((frame.x + frame.width).max(0.0) as u32).min(image.width);
        let src_bottom = ((frame.y + frame.height).max(0.0) as u32).min(image.height);

        for src_y in src_top..src_bottom {
            let dst_y = y + (src_y - src_top) as i32;
            if dst_y < 0 || dst_y >= self.height as i32 {
                continue;
            }
            for src_x in src_left..src_right {
                let dst_x = x + (src_x - src_left) as i32;
                let Some(color) = image.pixel(src_x, src_y) else {
                    continue;
                };
                if color[3] == 0 {
                    continue;
                }
                self.put_pixel(dst_x, dst_y, color);
            }
        }
    }

    /// Nearest-neighbour copy of `source` stretched over `dest`.
    pub fn blit_stretched(&mut self, source: &Surface, dest: Rect) {
        stretch_rgba(
            &source.rgba,
            source.width,
            source.height,
            &mut self.rgba,
            self.width,
            self.height,
            dest,
        );
    }
}

fn write_pixel_rgba_clipped(frame: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
        return;
    }
    let Some(pixel_offset) = (y as usize)
        .checked_mul(width as usize)
        .and_then(|row| row.checked_add(x as usize))
    else {
        return;
    };
    let byte_offset = pixel_offset * 4;
    let Some(end) = byte_offset.checked_add(4) else {
        return;
    };
    if end > frame.len() {
        return;
    }
    frame[byte_offset..end].copy_from_slice(&color);
}

/// Scales an RGBA buffer into `dest` of another buffer, clipping to the target bounds.
pub(crate) fn stretch_rgba(
    src: &[u8],
    src_width: u32,
    src_height: u32,
    dst: &mut [u8],
    dst_width: u32,
    dst_height: u32,
    dest: Rect,
) {
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return;
    }
    if src.len() < src_width as usize * src_height as usize * 4 {
        return;
    }
    let scaled_w = dest.width.round() as i32;
    let scaled_h = dest.height.round() as i32;
    if scaled_w <= 0 || scaled_h <= 0 {
        return;
    }
    let left = dest.x.round() as i32;
    let top = dest.y.round() as i32;
    let draw_left = left.max(0);
    let draw_top = top.max(0);
    let draw_right = (left + scaled_w).min(dst_width as i32);
    let draw_bottom = (top + scaled_h).min(dst_height as i32);
    if draw_left >= draw_right || draw_top >= draw_bottom {
        return;
    }

    let inv_scale_x = src_width as f32 / scaled_w as f32;
    let inv_scale_y = src_height as f32 / scaled_h as f32;
    let src_row_bytes = src_width as usize * 4;
    let dst_row_bytes = dst_width as usize * 4;

    for out_y in draw_top..draw_bottom {
        let src_y = (((out_y - top) as f32) * inv_scale_y).floor() as u32;
        let src_row_offset = src_y.min(src_height - 1) as usize * src_row_bytes;
        let dst_row_offset = out_y as usize * dst_row_bytes;

        for out_x in draw_left..draw_right {
            let src_x = (((out_x - left) as f32) * inv_scale_x).floor() as u32;
            let src_offset = src_row_offset + src_x.min(src_width - 1) as usize * 4;
            let dst_offset = dst_row_offset + out_x as usize * 4;
            dst[dst_offset..dst_offset + 4].copy_from_slice(&src[src_offset..src_offset + 4]);
        }
    }
}
