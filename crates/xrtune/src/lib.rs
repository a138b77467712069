#![forbid(unsafe_code)]

//! xrtune public facade crate.
//!
//! Live-tunable parameters for XR scenes: declare controls near their point
//! of use, edit them from a floating panel you can grab, carry, and anchor.
//! This crate re-exports the stable surface of the member crates and offers
//! a prelude plus [`FloatingPanel`], the integration unit most apps want.
//!
//! # Example
//!
//! ```
//! use xrtune::prelude::*;
//!
//! let registry = ControlRegistry::new();
//! registry.register(
//!     "scene",
//!     &Schema::new()
//!         .control("speed", ControlSpec::new(1.0).min(0.0).max(5.0))
//!         .folder("light", Schema::new().value("color", "#ffcc00")),
//! );
//!
//! let mut panel = FloatingPanel::new(registry.clone(), PanelOptions::scoped("scene"));
//! panel.tick(&XrFrame::default(), &(), &mut NoHaptics);
//! assert_eq!(panel.view().folders.len(), 1);
//! ```

pub mod error;
pub mod panel;

pub use error::{Error, Result};
pub use panel::{FloatingPanel, PanelTick};

// --- Core re-exports -------------------------------------------------------

pub use xrtune_core::{
    ButtonMask, ControllerState, DetectedPlane, HandJoint, HandJoints, HandState, Handedness,
    HapticPulse, Haptics, HitBounds, InputSourceId, NoHaptics, NodeId, PlaneOrientation, Pose,
    Ray, SceneGraph, SurfaceKind, SurfaceQuery, Transform3, XrFrame, glam, logging,
};

// --- Controls re-exports ---------------------------------------------------

pub use xrtune_controls::{
    Color, ControlPath, ControlRegistry, ControlSpec, ControlType, ControlValue, ControlView,
    FolderSettings, FolderView, PanelOptions, PanelState, PanelView, RegisterOutcome, Schema,
    SchemaDiagnostic, SchemaRejected, SetOutcome, Subscription, global,
};

// --- Interaction re-exports ------------------------------------------------

pub use xrtune_interact::{
    AnchorConfig, AnchorPolicy, AnchorResult, GestureEdge, GestureEvent, GrabConfig, GrabEvent,
    GrabInteraction, GrabPhase, GrabResult, HandGestureConfig, HandTracking, HandTrackingResult,
    InteractionPolicy, PolicyConfigError, SpatialAnchor,
};

/// Register `schema` under `id` on `registry`, failing on any schema defect.
pub fn register_strict(
    registry: &ControlRegistry,
    id: &str,
    schema: &Schema,
) -> Result<RegisterOutcome> {
    Ok(registry.register_strict(id, schema)?)
}

/// Load and validate an interaction policy file (`.json`, otherwise TOML).
#[cfg(feature = "policy-config")]
pub fn load_policy(path: impl AsRef<std::path::Path>) -> Result<InteractionPolicy> {
    Ok(InteractionPolicy::load_validated(path)?)
}

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        ControlRegistry, ControlSpec, ControlValue, Error, FloatingPanel, GrabEvent, Handedness,
        Haptics, InteractionPolicy, NoHaptics, PanelOptions, Pose, Result, Schema, SetOutcome,
        Transform3, XrFrame,
    };

    pub use crate::{controls, core, interact};
}

pub use xrtune_controls as controls;
pub use xrtune_core as core;
pub use xrtune_interact as interact;
