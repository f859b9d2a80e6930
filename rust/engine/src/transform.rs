// Transform module - per-image placement and rotated-rect hit-testing

use peniko::kurbo::{Affine, Point, Rect, Vec2};

/// Slack for points that land on an edge after the inverse rotation.
const EDGE_EPSILON: f64 = 1e-9;

/// Placement of one image in canvas space.
///
/// `x`/`y` is the top-left corner before rotation. Rotation is clockwise in
/// degrees about the centre of the rect and is stored exactly as given;
/// it is only normalized into `[0, 360)` when used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub original_width: f64,
    pub original_height: f64,
    pub rotation_degrees: f64,
}

impl Transform {
    /// Unrotated placement at the origin with the intrinsic size.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            original_width: width,
            original_height: height,
            rotation_degrees: 0.0,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn normalized_rotation(&self) -> f64 {
        self.rotation_degrees.rem_euclid(360.0)
    }

    /// Canvas -> unrotated local frame, origin at the rect's top-left corner.
    pub fn to_local(&self, point: Point) -> Point {
        let half = Vec2::new(self.width / 2.0, self.height / 2.0);
        let inverse = Affine::translate(half)
            * Affine::rotate(-self.normalized_rotation().to_radians())
            * Affine::translate(-self.center().to_vec2());
        inverse * point
    }

    /// Exact point-in-rotated-rect test.
    pub fn contains(&self, point: Point) -> bool {
        let local = self.to_local(point);
        local.x >= -EDGE_EPSILON
            && local.x <= self.width + EDGE_EPSILON
            && local.y >= -EDGE_EPSILON
            && local.y <= self.height + EDGE_EPSILON
    }

    /// Local frame centred on the image: translate to centre, then rotate.
    /// The bitmap is drawn into [`Transform::local_rect`] under this affine.
    pub fn placement(&self) -> Affine {
        Affine::translate(self.center().to_vec2())
            * Affine::rotate(self.normalized_rotation().to_radians())
    }

    pub fn local_rect(&self) -> Rect {
        Rect::new(
            -self.width / 2.0,
            -self.height / 2.0,
            self.width / 2.0,
            self.height / 2.0,
        )
    }
}
