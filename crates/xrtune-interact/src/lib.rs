#![forbid(unsafe_code)]

//! Interaction engines for floating XR panels.
//!
//! # Role in xrtune
//! Three per-object engines, each advanced once per rendered frame from an
//! [`XrFrame`](xrtune_core::XrFrame):
//!
//! - [`GrabInteraction`]: hover, grab, carry, and release with controller
//!   buttons or pinches.
//! - [`HandTracking`]: pinch and point recognition with edge events, driving
//!   its own grab engine from hand poses.
//! - [`SpatialAnchor`]: keeps an object on a surface, an input, or another
//!   node, with optional smoothing.
//!
//! Engines never own the target transform. Hosts pass a
//! [`Transform3`](xrtune_core::Transform3) in and read it back, and may
//! supply optional capabilities ([`Haptics`](xrtune_core::Haptics),
//! [`SceneGraph`](xrtune_core::SceneGraph)) that degrade to no-ops when
//! absent.
//!
//! # Feature flags
//! - `policy-config`: load [`InteractionPolicy`] from TOML or JSON.
//! - `test-helpers`: re-enable `RecordingHaptics` from `xrtune-core` for
//!   downstream tests.

pub mod anchor;
pub mod grab;
pub mod hand;
pub mod policy_config;

pub use anchor::{AnchorConfig, AnchorPolicy, AnchorResult, SpatialAnchor};
pub use grab::{
    GrabConfig, GrabEvent, GrabInput, GrabInteraction, GrabPhase, GrabResult,
    InteractionTransformState, RejectReason, ReleaseReason, clamp_radial, snap_to_grid,
};
pub use hand::{
    GestureEdge, GestureEvent, HandGesture, HandGestureConfig, HandTracking, HandTrackingResult,
    HandTrackingUpdate, PinchReading, classify, pointing_ray,
};
pub use policy_config::{InteractionPolicy, PolicyConfigError};
