#![forbid(unsafe_code)]

//! Per-frame XR input snapshot.
//!
//! The XR runtime hands the engines one [`XrFrame`] per rendered frame. It is
//! a plain value: engines never hold on to device handles, so a controller
//! or hand that disappears simply stops being listed, and every engine
//! treats absence as input loss.
//!
//! # Design
//!
//! - Controllers report a grip pose (where the hand holds the device), a
//!   target-ray pose (where it points), and a [`ButtonMask`].
//! - Hands report a sparse set of joint poses. Joints the runtime could not
//!   track are `None`; gesture code must degrade rather than guess.
//! - Planes are whatever the runtime's plane detection found this frame and
//!   may be empty on devices without the capability.

use bitflags::bitflags;
use glam::Vec3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::math::{Pose, Ray};

/// Stable identity of a controller or tracked hand for the lifetime of the
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InputSourceId(pub u32);

impl std::fmt::Display for InputSourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "input#{}", self.0)
    }
}

/// Which hand an input source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Handedness {
    /// Left hand or left controller.
    Left,
    /// Right hand or right controller.
    Right,
    /// Unhanded input (gaze, transient pointer).
    #[default]
    None,
}

bitflags! {
    /// Controller buttons the engines care about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct ButtonMask: u8 {
        /// Trigger / primary select action.
        const SELECT     = 0b0_0001;
        /// Grip / squeeze action.
        const SQUEEZE    = 0b0_0010;
        /// Face button A / X.
        const PRIMARY    = 0b0_0100;
        /// Face button B / Y.
        const SECONDARY  = 0b0_1000;
        /// Thumbstick click.
        const THUMBSTICK = 0b1_0000;
    }
}

/// Snapshot of one tracked controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    /// Session-stable identity.
    pub id: InputSourceId,
    /// Hand the controller is held in.
    pub handedness: Handedness,
    /// Pose of the gripping hand.
    pub grip: Pose,
    /// Pose of the pointing ray (forward is `-Z`).
    pub target_ray: Pose,
    /// Buttons held this frame.
    pub buttons: ButtonMask,
}

impl ControllerState {
    /// A controller with no buttons held and both poses at `pose`.
    #[must_use]
    pub fn new(id: InputSourceId, handedness: Handedness, pose: Pose) -> Self {
        Self {
            id,
            handedness,
            grip: pose,
            target_ray: pose,
            buttons: ButtonMask::empty(),
        }
    }

    /// Builder-style button override.
    #[must_use]
    pub fn with_buttons(mut self, buttons: ButtonMask) -> Self {
        self.buttons = buttons;
        self
    }

    /// Whether any of the buttons in `mask` is held.
    #[inline]
    #[must_use]
    pub fn is_pressed(&self, mask: ButtonMask) -> bool {
        self.buttons.intersects(mask)
    }

    /// Pointing ray from the target-ray pose.
    #[must_use]
    pub fn ray(&self) -> Ray {
        Ray::from_pose(&self.target_ray)
    }
}

/// Hand joints tracked by the engines, a subset of the WebXR joint set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum HandJoint {
    /// Wrist.
    Wrist,
    /// Thumb tip.
    ThumbTip,
    /// Index knuckle.
    IndexProximal,
    /// Index tip.
    IndexTip,
    /// Middle knuckle.
    MiddleProximal,
    /// Middle tip.
    MiddleTip,
    /// Ring tip.
    RingTip,
    /// Pinky tip.
    PinkyTip,
}

impl HandJoint {
    /// Number of tracked joints.
    pub const COUNT: usize = 8;

    /// Every joint, in storage order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Wrist,
        Self::ThumbTip,
        Self::IndexProximal,
        Self::IndexTip,
        Self::MiddleProximal,
        Self::MiddleTip,
        Self::RingTip,
        Self::PinkyTip,
    ];

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

/// Sparse joint poses for one hand.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HandJoints {
    joints: [Option<Pose>; HandJoint::COUNT],
}

impl HandJoints {
    /// No joints tracked.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            joints: [None; HandJoint::COUNT],
        }
    }

    /// Builder-style joint assignment.
    #[must_use]
    pub fn with(mut self, joint: HandJoint, pose: Pose) -> Self {
        self.set(joint, Some(pose));
        self
    }

    /// Set or clear one joint.
    pub fn set(&mut self, joint: HandJoint, pose: Option<Pose>) {
        self.joints[joint.index()] = pose;
    }

    /// Pose of `joint`, if tracked.
    #[inline]
    #[must_use]
    pub fn pose(&self, joint: HandJoint) -> Option<Pose> {
        self.joints[joint.index()]
    }

    /// Position of `joint`, if tracked.
    #[inline]
    #[must_use]
    pub fn position(&self, joint: HandJoint) -> Option<Vec3> {
        self.pose(joint).map(|p| p.position)
    }

    /// Number of tracked joints.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.joints.iter().filter(|j| j.is_some()).count()
    }
}

/// Snapshot of one tracked hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandState {
    /// Session-stable identity.
    pub id: InputSourceId,
    /// Left or right.
    pub handedness: Handedness,
    /// Joint poses.
    pub joints: HandJoints,
}

impl HandState {
    /// Create a hand snapshot.
    #[must_use]
    pub fn new(id: InputSourceId, handedness: Handedness, joints: HandJoints) -> Self {
        Self {
            id,
            handedness,
            joints,
        }
    }
}

/// Coarse plane classification from the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PlaneOrientation {
    /// Floors, tables, ceilings.
    Horizontal,
    /// Walls.
    Vertical,
}

/// A plane reported by plane detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedPlane {
    /// Pose of the plane's centre.
    pub pose: Pose,
    /// Unit normal pointing away from the surface, into the room.
    pub normal: Vec3,
    /// Runtime classification.
    pub orientation: PlaneOrientation,
}

impl DetectedPlane {
    /// Create a plane, normalizing `normal`.
    #[must_use]
    pub fn new(pose: Pose, normal: Vec3, orientation: PlaneOrientation) -> Self {
        Self {
            pose,
            normal: normal.normalize_or_zero(),
            orientation,
        }
    }
}

/// Everything the XR runtime reports for one rendered frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XrFrame {
    /// Monotonic frame counter. Engines use it to make repeated ticks within
    /// one frame idempotent.
    pub frame: u64,
    /// Viewer (head) pose.
    pub viewer: Pose,
    /// Connected controllers.
    pub controllers: Vec<ControllerState>,
    /// Tracked hands.
    pub hands: Vec<HandState>,
    /// Detected planes, empty when plane detection is unavailable.
    pub planes: Vec<DetectedPlane>,
}

impl XrFrame {
    /// An empty frame with the given counter and viewer pose.
    #[must_use]
    pub fn new(frame: u64, viewer: Pose) -> Self {
        Self {
            frame,
            viewer,
            ..Self::default()
        }
    }

    /// First controller held in `handedness`.
    #[must_use]
    pub fn controller(&self, handedness: Handedness) -> Option<&ControllerState> {
        self.controllers
            .iter()
            .find(|c| c.handedness == handedness)
    }

    /// First hand with the given handedness.
    #[must_use]
    pub fn hand(&self, handedness: Handedness) -> Option<&HandState> {
        self.hands.iter().find(|h| h.handedness == handedness)
    }

    /// Whether any controller or hand with `id` is present this frame.
    #[must_use]
    pub fn has_source(&self, id: InputSourceId) -> bool {
        self.controllers.iter().any(|c| c.id == id) || self.hands.iter().any(|h| h.id == id)
    }
}
