use std::ops::{Add, Mul, Sub};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    /// Angle of the vector from `self` to `other`, in radians.
    pub fn angle_to(self, other: Vec2) -> f32 {
        let delta = other - self;
        delta.y.atan2(delta.x)
    }

    pub fn rotate(self, radians: f32) -> Vec2 {
        let (sin, cos) = radians.sin_cos();
        Vec2 {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    pub fn rotate_around(self, pivot: Vec2, radians: f32) -> Vec2 {
        (self - pivot).rotate(radians) + pivot
    }

    pub fn lerp(self, to: Vec2, t: f32) -> Vec2 {
        self + (to - self) * t
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned rectangle with its origin at the top-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.x = position.x;
        self.y = position.y;
    }

    pub fn set_size(&mut self, size: Vec2) {
        self.width = size.x;
        self.height = size.y;
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.left()
            && point.x < self.right()
            && point.y >= self.top()
            && point.y < self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.0001
    }

    #[test]
    fn distance_and_angle_follow_screen_axes() {
        let a = Vec2::new(1.0, 1.0);
        let b = Vec2::new(4.0, 5.0);

        assert!(approx(a.distance(b), 5.0));
        assert!(approx(
            Vec2::ZERO.angle_to(Vec2::new(0.0, 2.0)),
            FRAC_PI_2
        ));
    }

    #[test]
    fn rotate_around_pivot_keeps_distance() {
        let pivot = Vec2::new(10.0, 10.0);
        let rotated = Vec2::new(12.0, 10.0).rotate_around(pivot, FRAC_PI_2);

        assert!(approx(rotated.x, 10.0));
        assert!(approx(rotated.y, 12.0));
    }

    #[test]
    fn rect_edges_and_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(9.0, 9.0, 5.0, 5.0);
        let touching = Rect::new(10.0, 0.0, 5.0, 5.0);

        assert_eq!(a.right(), 10.0);
        assert_eq!(a.bottom(), 10.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&touching));
        assert!(a.contains(Vec2::new(0.0, 9.5)));
        assert!(!a.contains(Vec2::new(10.0, 5.0)));
    }
}
