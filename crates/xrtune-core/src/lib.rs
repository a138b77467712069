#![forbid(unsafe_code)]

//! Core: spatial math, XR input snapshots, and host capability traits.
//!
//! # Role in xrtune
//! `xrtune-core` is the input layer. It owns the math types every engine
//! speaks ([`Pose`](math::Pose), [`Transform3`](math::Transform3),
//! [`Ray`](math::Ray)), the per-frame input snapshot handed over by the XR
//! runtime ([`XrFrame`](input::XrFrame)), and the optional capabilities the
//! host may or may not provide (haptics, scene graph lookup, plane
//! detection).
//!
//! # How it fits in the system
//! The interaction engines (`xrtune-interact`) consume `XrFrame` values once
//! per rendered frame and write transforms back to host nodes. The control
//! registry (`xrtune-controls`) does not depend on anything spatial, only on
//! the logging helpers re-exported here.

pub mod capability;
pub mod input;
pub mod logging;
pub mod math;

pub use capability::{
    HapticPulse, Haptics, NoHaptics, NodeId, SceneGraph, SurfaceKind, SurfaceQuery,
};
#[cfg(any(test, feature = "test-helpers"))]
pub use capability::RecordingHaptics;
pub use input::{
    ButtonMask, ControllerState, DetectedPlane, HandJoint, HandJoints, HandState, Handedness,
    InputSourceId, PlaneOrientation, XrFrame,
};
pub use math::{HitBounds, Pose, Ray, Transform3};

/// Re-exported so downstream crates agree on one math library version.
pub use glam;
