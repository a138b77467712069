#![forbid(unsafe_code)]

//! Spatial anchoring: keep an object attached to a surface, an input, or
//! another node.
//!
//! Each tick the configured [`AnchorPolicy`] yields a target pose: the
//! source pose composed with the configured offset. The object then either
//! snaps to it or, with `follow_target`, moves a fraction `smoothing` of the
//! way there (position lerp, rotation slerp).
//!
//! # Invariants
//!
//! 1. Smoothing advances at most once per [`XrFrame::frame`]. Calling
//!    [`SpatialAnchor::update`] twice in one frame does not move the object
//!    twice.
//! 2. Only position and rotation are written. Scale is never touched.
//! 3. With `lock_rotation`, rotation is never written.
//!
//! # Failure Modes
//!
//! - **Source unavailable** (no plane detected, controller or node gone):
//!   the object keeps its pose and the result reports `is_anchored = false`.

use tracing::debug;
use xrtune_core::glam::{Quat, Vec3};
use xrtune_core::{
    DetectedPlane, HandJoint, Handedness, NodeId, Pose, SceneGraph, SurfaceKind, SurfaceQuery,
    Transform3, XrFrame,
};

#[cfg(feature = "policy-config")]
use serde::{Deserialize, Serialize};

/// Where the target pose comes from.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "policy-config",
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum AnchorPolicy {
    /// Stay where the object is.
    #[default]
    Fixed,
    /// Sit on a detected plane.
    Surface {
        /// Plane category.
        surface: SurfaceKind,
    },
    /// Follow a controller's grip.
    Controller {
        /// Which controller.
        hand: Handedness,
    },
    /// Follow a hand joint.
    Hand {
        /// Which hand.
        hand: Handedness,
        /// Reference joint.
        joint: HandJoint,
    },
    /// Follow another scene node.
    Object {
        /// Node to follow.
        node: NodeId,
    },
}

/// Anchor tunables.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct AnchorConfig {
    /// Pose source (default: fixed).
    pub policy: AnchorPolicy,
    /// Translation in the source's frame (default: zero).
    pub offset: Vec3,
    /// Rotation applied after the source rotation (default: identity).
    pub offset_rotation: Quat,
    /// Blend toward the target instead of snapping (default: true).
    pub follow_target: bool,
    /// Fraction of the remaining distance covered per frame (default: 0.1).
    pub smoothing: f32,
    /// Never write rotation (default: false).
    pub lock_rotation: bool,
    /// Align the object's up axis with a surface normal (default: true).
    pub auto_align: bool,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            policy: AnchorPolicy::Fixed,
            offset: Vec3::ZERO,
            offset_rotation: Quat::IDENTITY,
            follow_target: true,
            smoothing: 0.1,
            lock_rotation: false,
            auto_align: true,
        }
    }
}

impl AnchorConfig {
    /// Config with `policy` and defaults elsewhere.
    #[must_use]
    pub fn with_policy(policy: AnchorPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    fn offset_pose(&self) -> Pose {
        Pose::new(self.offset, self.offset_rotation)
    }
}

/// Host-facing summary.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnchorResult {
    /// Whether the source was available this tick.
    pub is_anchored: bool,
    /// Object position after the tick.
    pub anchor_position: Vec3,
    /// Object rotation after the tick.
    pub anchor_rotation: Quat,
    /// Pose the object is heading for, if anchored.
    pub target_pose: Option<Pose>,
}

/// Anchor engine for one object.
#[derive(Debug, Clone, Default)]
pub struct SpatialAnchor {
    config: AnchorConfig,
    last_frame: Option<u64>,
    result: AnchorResult,
}

impl SpatialAnchor {
    /// Create an anchor.
    #[must_use]
    pub fn new(config: AnchorConfig) -> Self {
        Self {
            config,
            last_frame: None,
            result: AnchorResult::default(),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    /// Replace the configuration.
    pub fn set_config(&mut self, config: AnchorConfig) {
        self.config = config;
    }

    /// Last result.
    #[must_use]
    pub fn result(&self) -> AnchorResult {
        self.result
    }

    /// Forget the frame counter so the next update always advances.
    pub fn reset(&mut self) {
        self.last_frame = None;
    }

    /// Advance one frame using the planes reported in `frame`.
    pub fn update<G>(&mut self, frame: &XrFrame, scene: &G, transform: &mut Transform3) -> AnchorResult
    where
        G: SceneGraph + ?Sized,
    {
        self.update_with(frame, frame.planes.as_slice(), scene, transform)
    }

    /// Advance one frame with an explicit surface query.
    pub fn update_with<S, G>(
        &mut self,
        frame: &XrFrame,
        surfaces: &S,
        scene: &G,
        transform: &mut Transform3,
    ) -> AnchorResult
    where
        S: SurfaceQuery + ?Sized,
        G: SceneGraph + ?Sized,
    {
        let target = self.target_pose(frame, surfaces, scene, transform);
        if target.is_none() && self.result.is_anchored {
            debug!(message = "anchor.lost", policy = ?self.config.policy);
        }

        if let Some(target) = target {
            let repeated = self.last_frame == Some(frame.frame);
            if !(repeated && self.config.follow_target) {
                self.apply(&target, transform);
            }
        }
        self.last_frame = Some(frame.frame);

        self.result = AnchorResult {
            is_anchored: target.is_some(),
            anchor_position: transform.position,
            anchor_rotation: transform.rotation,
            target_pose: target,
        };
        self.result
    }

    /// Target pose for this frame, or `None` if the source is unavailable.
    pub fn target_pose<S, G>(
        &self,
        frame: &XrFrame,
        surfaces: &S,
        scene: &G,
        current: &Transform3,
    ) -> Option<Pose>
    where
        S: SurfaceQuery + ?Sized,
        G: SceneGraph + ?Sized,
    {
        let offset = self.config.offset_pose();
        match self.config.policy {
            AnchorPolicy::Fixed => Some(current.pose()),
            AnchorPolicy::Controller { hand } => frame.controller(hand).map(|c| c.grip * offset),
            AnchorPolicy::Hand { hand, joint } => frame
                .hand(hand)
                .and_then(|h| h.joints.pose(joint))
                .map(|pose| pose * offset),
            AnchorPolicy::Object { node } => {
                scene.world_transform(node).map(|t| t.pose() * offset)
            }
            AnchorPolicy::Surface { surface } => surfaces
                .find_surface(surface, current.position)
                .map(|plane| self.surface_pose(&plane) * offset),
        }
    }

    fn surface_pose(&self, plane: &DetectedPlane) -> Pose {
        if self.config.auto_align && plane.normal != Vec3::ZERO {
            Pose::new(plane.pose.position, Quat::from_rotation_arc(Vec3::Y, plane.normal))
        } else {
            plane.pose
        }
    }

    fn apply(&self, target: &Pose, transform: &mut Transform3) {
        let next = if self.config.follow_target {
            transform.pose().interpolate(target, self.config.smoothing)
        } else {
            *target
        };
        transform.position = next.position;
        if !self.config.lock_rotation {
            transform.rotation = next.rotation;
        }
    }
}
