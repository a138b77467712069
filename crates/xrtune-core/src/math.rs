#![forbid(unsafe_code)]

//! Spatial primitives shared by the interaction engines.
//!
//! All types are thin wrappers over `glam` values in a right-handed,
//! Y-up world space with `-Z` as forward, matching WebXR conventions.
//!
//! # Invariants
//!
//! 1. [`Pose`] rotations are kept normalized by every constructor and
//!    composition helper.
//! 2. [`Ray::direction`] is unit length (or zero for a degenerate ray, which
//!    never intersects anything).
//! 3. [`Transform3::from_mat4`] inverts [`Transform3::to_mat4`] for
//!    non-degenerate, non-sheared scales.

use std::ops::Mul;

use glam::{Mat4, Quat, Vec3};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tolerance below which ray directions are treated as parallel to a slab.
const PARALLEL_EPSILON: f32 = 1.0e-6;

// ---------------------------------------------------------------------------
// Pose
// ---------------------------------------------------------------------------

/// A rigid transform: position plus orientation, no scale.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// World-space (or parent-space) position in meters.
    pub position: Vec3,
    /// Orientation as a unit quaternion.
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    /// The pose at the origin with no rotation.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Create a pose, normalizing the rotation.
    #[inline]
    #[must_use]
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation: rotation.normalize(),
        }
    }

    /// A pose at `position` with identity rotation.
    #[inline]
    #[must_use]
    pub const fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// The inverse rigid transform, such that `p.inverse() * p == IDENTITY`.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv = self.rotation.inverse();
        Self {
            position: inv * -self.position,
            rotation: inv,
        }
    }

    /// Map a point from this pose's local frame into the parent frame.
    #[inline]
    #[must_use]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * point
    }

    /// Rotate a direction from this pose's local frame into the parent frame.
    #[inline]
    #[must_use]
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }

    /// Local `-Z` expressed in the parent frame.
    #[inline]
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Local `+Y` expressed in the parent frame.
    #[inline]
    #[must_use]
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Straight-line distance between the two positions.
    #[inline]
    #[must_use]
    pub fn distance(&self, other: &Self) -> f32 {
        self.position.distance(other.position)
    }

    /// Blend toward `target`: linear for position, spherical for rotation.
    ///
    /// `t` is clamped to `[0, 1]`.
    #[must_use]
    pub fn interpolate(&self, target: &Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            position: self.position.lerp(target.position, t),
            rotation: self.rotation.slerp(target.rotation, t).normalize(),
        }
    }

    /// Component-wise comparison with tolerance. Rotations compare equal
    /// when they describe the same orientation (`q` and `-q`).
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.position.abs_diff_eq(other.position, epsilon)
            && (1.0 - self.rotation.dot(other.rotation).abs()) <= epsilon
    }
}

impl Mul for Pose {
    type Output = Self;

    /// Compose: `self * rhs` applies `rhs` in the local frame of `self`.
    fn mul(self, rhs: Self) -> Self {
        Self {
            position: self.transform_point(rhs.position),
            rotation: (self.rotation * rhs.rotation).normalize(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transform3
// ---------------------------------------------------------------------------

/// Full node transform as exchanged with the host scene graph.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transform3 {
    /// Translation.
    pub position: Vec3,
    /// Orientation.
    pub rotation: Quat,
    /// Per-axis scale.
    pub scale: Vec3,
}

impl Default for Transform3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform3 {
    /// Identity transform with unit scale.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Create a transform from its parts.
    #[must_use]
    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation: rotation.normalize(),
            scale,
        }
    }

    /// A unit-scale transform at `pose`.
    #[must_use]
    pub const fn from_pose(pose: Pose) -> Self {
        Self {
            position: pose.position,
            rotation: pose.rotation,
            scale: Vec3::ONE,
        }
    }

    /// Drop the scale component.
    #[inline]
    #[must_use]
    pub const fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            rotation: self.rotation,
        }
    }

    /// Overwrite position and rotation, keeping scale.
    #[inline]
    pub fn set_pose(&mut self, pose: Pose) {
        self.position = pose.position;
        self.rotation = pose.rotation;
    }

    /// Scale, then rotate, then translate.
    #[must_use]
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Decompose an affine matrix into scale, rotation, and translation.
    #[must_use]
    pub fn from_mat4(matrix: Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self::new(position, rotation, scale)
    }

    /// `self * child`, with `child` expressed in the local frame of `self`.
    #[must_use]
    pub fn multiply(&self, child: &Self) -> Self {
        Self::from_mat4(self.to_mat4() * child.to_mat4())
    }

    /// World-to-local inverse.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self::from_mat4(self.to_mat4().inverse())
    }
}

// ---------------------------------------------------------------------------
// Ray and hit geometry
// ---------------------------------------------------------------------------

/// A half-line used for pointing and hover detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start point.
    pub origin: Vec3,
    /// Unit direction (zero for a degenerate ray).
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray, normalizing `direction`.
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// A ray leaving `pose` along its forward axis.
    #[must_use]
    pub fn from_pose(pose: &Pose) -> Self {
        Self::new(pose.position, pose.forward())
    }

    /// Point at parameter `t` along the ray.
    #[inline]
    #[must_use]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Whether the ray is usable for intersection tests.
    #[inline]
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.direction == Vec3::ZERO
    }

    /// Distance to the nearest intersection with a sphere, or `0.0` when the
    /// origin is inside it.
    #[must_use]
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        if self.is_degenerate() || radius <= 0.0 {
            return None;
        }
        let oc = self.origin - center;
        let c = oc.length_squared() - radius * radius;
        if c <= 0.0 {
            return Some(0.0);
        }
        let b = oc.dot(self.direction);
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let t = -b - discriminant.sqrt();
        (t >= 0.0).then_some(t)
    }

    /// Distance to the nearest intersection with an oriented box centred on
    /// `pose`, using the slab method in the box's local frame.
    #[must_use]
    pub fn intersect_box(&self, pose: &Pose, half_extents: Vec3) -> Option<f32> {
        if self.is_degenerate() {
            return None;
        }
        let inv = pose.rotation.inverse();
        let origin = inv * (self.origin - pose.position);
        let direction = inv * self.direction;

        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            let h = half_extents[axis];
            if d.abs() < PARALLEL_EPSILON {
                if o.abs() > h {
                    return None;
                }
                continue;
            }
            let t1 = (-h - o) / d;
            let t2 = (h - o) / d;
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
        }
        if t_max < t_min.max(0.0) {
            return None;
        }
        Some(t_min.max(0.0))
    }
}

/// Pickable geometry of an interaction target, in the target's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum HitBounds {
    /// Sphere centred on the target origin.
    Sphere {
        /// Radius before scaling.
        radius: f32,
    },
    /// Box centred on the target origin, aligned to its local axes.
    Box {
        /// Half size along each local axis before scaling.
        half_extents: Vec3,
    },
}

impl Default for HitBounds {
    fn default() -> Self {
        Self::Box {
            half_extents: Vec3::new(0.2, 0.15, 0.01),
        }
    }
}

impl HitBounds {
    /// Intersect `ray` with these bounds placed at `transform`.
    ///
    /// Scale applies: a sphere grows by the largest scale component, a box
    /// per axis.
    #[must_use]
    pub fn intersect(&self, transform: &Transform3, ray: &Ray) -> Option<f32> {
        let scale = transform.scale.abs();
        match *self {
            Self::Sphere { radius } => {
                ray.intersect_sphere(transform.position, radius * scale.max_element())
            }
            Self::Box { half_extents } => {
                ray.intersect_box(&transform.pose(), half_extents * scale)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
