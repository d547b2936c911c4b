//! Hand point → destination pixel.
//!
//! ```text
//! calibrated offset (hand-local 2D)
//!   │  rotate by hand orientation
//!   ▼
//! world point + offset
//!   │  surface world_to_local
//!   ▼
//! local quad (-0.5..0.5, -0.5..0.5) → UV (v flipped, clamped)
//!   │
//!   ▼
//! pixel in window rect (or desktop rect in test mode)
//! ```

use capturelink_core::{PixelPoint, ScreenRect};
use glam::{Affine3A, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Placement of the display quad in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceProjection {
    world_to_local: Affine3A,
}

impl Default for SurfaceProjection {
    /// A unit quad centred on the world origin, facing -Z.
    fn default() -> Self {
        Self { world_to_local: Affine3A::IDENTITY }
    }
}

impl SurfaceProjection {
    pub fn from_world_to_local(world_to_local: Affine3A) -> Self {
        Self { world_to_local }
    }

    /// Quad of `size` world units centred at `center` with orientation `rotation`.
    pub fn from_placement(center: Vec3, rotation: Quat, size: Vec2) -> Self {
        let local_to_world = Affine3A::from_scale_rotation_translation(
            size.max(Vec2::splat(f32::EPSILON)).extend(1.0),
            rotation,
            center,
        );
        Self { world_to_local: local_to_world.inverse() }
    }

    /// UV in 0..=1 with v growing downwards, as screen pixels do.
    pub fn uv(&self, world: Vec3) -> Vec2 {
        let local = self.world_to_local.transform_point3(world);
        Vec2::new(local.x + 0.5, 0.5 - local.y).clamp(Vec2::ZERO, Vec2::ONE)
    }
}

/// Pose of a hand for one physics tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandSample {
    /// Contact or closest point on the collider, world space.
    pub point: Vec3,
    pub rotation: Quat,
}

impl HandSample {
    pub fn new(point: Vec3, rotation: Quat) -> Self {
        Self { point, rotation }
    }
}

pub fn uv_to_pixel(uv: Vec2, dest: ScreenRect) -> PixelPoint {
    let x = dest.left + (uv.x * dest.width as f32).round() as i32;
    let y = dest.top + (uv.y * dest.height as f32).round() as i32;
    PixelPoint::new(x.min(dest.right() - 1).max(dest.left), y.min(dest.bottom() - 1).max(dest.top))
}

pub fn target_pixel(
    sample: &HandSample,
    offset: Vec2,
    surface: &SurfaceProjection,
    dest: ScreenRect,
) -> PixelPoint {
    let world_offset = sample.rotation * offset.extend(0.0);
    uv_to_pixel(surface.uv(sample.point + world_offset), dest)
}
