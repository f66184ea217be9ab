//! Axis-aligned boxes in the room frame (z up, floor at z = 0, room centred
//! on the origin). Shared by placement and validation.

use crate::{
    config::RoomSection,
    model::{Extents, SceneEntity, Vec3},
};

const EPS: f64 = 1e-9;
const MAX_PARENT_DEPTH: usize = 8;

/// Round to the millimetre so repeated runs compare equal.
pub fn snap(v: f64) -> f64 {
    let s = (v * 1000.0).round() / 1000.0;
    if s == 0.0 { 0.0 } else { s }
}

pub fn yaw_of(entity: &SceneEntity) -> f64 {
    entity.rotation.map_or(0.0, |r| r.z)
}

pub fn is_quarter_turn(yaw_deg: f64) -> bool {
    let y = yaw_deg.rem_euclid(180.0);
    (y - 90.0).abs() < 1e-6
}

/// Horizontal footprint (along x, along y) after a yaw rotation. Only quarter
/// turns change the footprint; other angles keep the unrotated box.
pub fn footprint(extents: Extents, yaw_deg: f64) -> (f64, f64) {
    if is_quarter_turn(yaw_deg) {
        (extents.depth, extents.width)
    } else {
        (extents.width, extents.depth)
    }
}

/// Rotate a local offset about z by `yaw_deg`.
pub fn rotate_offset(offset: Vec3, yaw_deg: f64) -> Vec3 {
    let (sin, cos) = yaw_deg.to_radians().sin_cos();
    Vec3::new(
        snap(offset.x * cos - offset.y * sin),
        snap(offset.x * sin + offset.y * cos),
        offset.z,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn around(cx: f64, cy: f64, width: f64, depth: f64) -> Self {
        Self::new(cx - width / 2.0, cy - depth / 2.0, cx + width / 2.0, cy + depth / 2.0)
    }

    pub fn expand(self, margin: f64) -> Self {
        Self::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Per-axis overlap; negative means a gap on that axis.
    pub fn overlap(&self, other: &Rect) -> (f64, f64) {
        (
            self.max_x.min(other.max_x) - self.min_x.max(other.min_x),
            self.max_y.min(other.max_y) - self.min_y.max(other.min_y),
        )
    }

    /// Smallest per-axis overlap: how far one rect must move to clear the other.
    pub fn penetration(&self, other: &Rect) -> f64 {
        let (x, y) = self.overlap(other);
        x.min(y)
    }

    pub fn contains(&self, inner: &Rect) -> bool {
        inner.min_x >= self.min_x - EPS
            && inner.min_y >= self.min_y - EPS
            && inner.max_x <= self.max_x + EPS
            && inner.max_y <= self.max_y + EPS
    }
}

/// Room centred on the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Room {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl Room {
    pub fn bounds(&self) -> Rect {
        Rect::around(0.0, 0.0, self.width, self.depth)
    }

    /// Clamp a centre so a footprint of the given size stays inside the room.
    /// Footprints larger than the room are centred on that axis.
    pub fn clamp_center(&self, cx: f64, cy: f64, width: f64, depth: f64) -> (f64, f64) {
        let clamp = |v: f64, half_room: f64, half: f64| {
            let limit = half_room - half;
            if limit <= 0.0 { 0.0 } else { v.clamp(-limit, limit) }
        };
        (
            clamp(cx, self.width / 2.0, width / 2.0),
            clamp(cy, self.depth / 2.0, depth / 2.0),
        )
    }
}

impl From<&RoomSection> for Room {
    fn from(room: &RoomSection) -> Self {
        Self {
            width: room.width,
            depth: room.depth,
            height: room.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Box standing on `base` (bottom centre).
    pub fn standing(base: Vec3, width: f64, depth: f64, height: f64) -> Self {
        Self {
            min: Vec3::new(base.x - width / 2.0, base.y - depth / 2.0, base.z),
            max: Vec3::new(base.x + width / 2.0, base.y + depth / 2.0, base.z + height),
        }
    }

    pub fn footprint(&self) -> Rect {
        Rect::new(self.min.x, self.min.y, self.max.x, self.max.y)
    }

    pub fn overlap(&self, other: &Aabb) -> [f64; 3] {
        [
            self.max.x.min(other.max.x) - self.min.x.max(other.min.x),
            self.max.y.min(other.max.y) - self.min.y.max(other.min.y),
            self.max.z.min(other.max.z) - self.min.z.max(other.min.z),
        ]
    }

    /// Minimum per-axis overlap; positive only when the boxes intersect.
    pub fn penetration(&self, other: &Aabb) -> f64 {
        let [x, y, z] = self.overlap(other);
        x.min(y).min(z)
    }
}

/// World-space base position, following parent links (children store an
/// offset in their parent's frame).
pub fn world_position(entity: &SceneEntity, entities: &[SceneEntity]) -> Option<Vec3> {
    resolve_position(entity, entities, 0)
}

fn resolve_position(entity: &SceneEntity, entities: &[SceneEntity], depth: usize) -> Option<Vec3> {
    let local = entity.position?;
    let Some(parent_id) = entity.parent_id.as_deref() else {
        return Some(local);
    };
    if depth >= MAX_PARENT_DEPTH {
        return None;
    }
    let parent = entities.iter().find(|p| p.id == parent_id)?;
    let base = resolve_position(parent, entities, depth + 1)?;
    Some(base.add(rotate_offset(local, yaw_of(parent))))
}

pub fn world_box(entity: &SceneEntity, entities: &[SceneEntity]) -> Option<Aabb> {
    let base = world_position(entity, entities)?;
    let extents = entity.extents?;
    let (w, d) = footprint(extents, yaw_of(entity));
    Some(Aabb::standing(base, w, d, extents.height))
}
