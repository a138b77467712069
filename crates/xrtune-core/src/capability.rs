#![forbid(unsafe_code)]

//! Optional host capabilities: haptics, scene graph lookup, plane detection.
//!
//! Every capability here may be missing on the current device or session.
//! The traits are shaped so absence is an ordinary return value (`false`,
//! `None`) and never an error: engines log at `debug` level and carry on.

use std::collections::HashMap;

use glam::Vec3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::input::{DetectedPlane, InputSourceId, PlaneOrientation};
use crate::math::Transform3;

/// Minimum |normal.y| for a horizontal plane to count as floor or ceiling.
const HORIZONTAL_NORMAL_MIN: f32 = 0.5;

// ---------------------------------------------------------------------------
// Haptics
// ---------------------------------------------------------------------------

/// One vibration request.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HapticPulse {
    /// Strength in `[0, 1]`.
    pub intensity: f32,
    /// Duration in milliseconds.
    pub duration_ms: u32,
}

impl HapticPulse {
    /// Create a pulse, clamping intensity into `[0, 1]`.
    #[must_use]
    pub fn new(intensity: f32, duration_ms: u32) -> Self {
        Self {
            intensity: if intensity.is_nan() {
                0.0
            } else {
                intensity.clamp(0.0, 1.0)
            },
            duration_ms,
        }
    }

    /// A pulse that would not be felt.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.intensity <= 0.0 || self.duration_ms == 0
    }
}

/// Haptic actuation provided by the XR runtime.
pub trait Haptics {
    /// Fire `pulse` on `source`. Returns `false` if the device has no
    /// actuator or the source is gone; callers treat that as a no-op.
    fn pulse(&mut self, source: InputSourceId, pulse: HapticPulse) -> bool;
}

/// Haptics sink for sessions without actuators.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn pulse(&mut self, _source: InputSourceId, _pulse: HapticPulse) -> bool {
        false
    }
}

/// Records every pulse for assertions in tests.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Clone, Default)]
pub struct RecordingHaptics {
    /// Pulses in firing order.
    pub pulses: Vec<(InputSourceId, HapticPulse)>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl RecordingHaptics {
    /// Number of recorded pulses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Haptics for RecordingHaptics {
    fn pulse(&mut self, source: InputSourceId, pulse: HapticPulse) -> bool {
        self.pulses.push((source, pulse));
        true
    }
}

// ---------------------------------------------------------------------------
// Scene graph
// ---------------------------------------------------------------------------

/// Opaque handle to a host scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub u64);

/// Read access to world transforms of host nodes.
pub trait SceneGraph {
    /// World transform of `node`, or `None` if it no longer exists.
    fn world_transform(&self, node: NodeId) -> Option<Transform3>;
}

impl SceneGraph for HashMap<NodeId, Transform3> {
    fn world_transform(&self, node: NodeId) -> Option<Transform3> {
        self.get(&node).copied()
    }
}

/// A scene with no nodes.
impl SceneGraph for () {
    fn world_transform(&self, _node: NodeId) -> Option<Transform3> {
        None
    }
}

// ---------------------------------------------------------------------------
// Surface query
// ---------------------------------------------------------------------------

/// Surface categories an object can be anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SurfaceKind {
    /// Upward-facing horizontal plane, lowest wins.
    Floor,
    /// Vertical plane, nearest wins.
    Wall,
    /// Downward-facing horizontal plane, highest wins.
    Ceiling,
}

/// Plane-detection query.
pub trait SurfaceQuery {
    /// Best plane of `kind` for an object near `near`, if any was detected.
    fn find_surface(&self, kind: SurfaceKind, near: Vec3) -> Option<DetectedPlane>;
}

impl SurfaceQuery for [DetectedPlane] {
    fn find_surface(&self, kind: SurfaceKind, near: Vec3) -> Option<DetectedPlane> {
        let candidates = self.iter().filter(|plane| match kind {
            SurfaceKind::Floor => {
                plane.orientation == PlaneOrientation::Horizontal
                    && plane.normal.y >= HORIZONTAL_NORMAL_MIN
            }
            SurfaceKind::Ceiling => {
                plane.orientation == PlaneOrientation::Horizontal
                    && plane.normal.y <= -HORIZONTAL_NORMAL_MIN
            }
            SurfaceKind::Wall => plane.orientation == PlaneOrientation::Vertical,
        });
        match kind {
            SurfaceKind::Floor => {
                candidates.min_by(|a, b| a.pose.position.y.total_cmp(&b.pose.position.y))
            }
            SurfaceKind::Ceiling => {
                candidates.max_by(|a, b| a.pose.position.y.total_cmp(&b.pose.position.y))
            }
            SurfaceKind::Wall => candidates.min_by(|a, b| {
                a.pose
                    .position
                    .distance_squared(near)
                    .total_cmp(&b.pose.position.distance_squared(near))
            }),
        }
        .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Pose;

    fn plane(y: f32, normal: Vec3, orientation: PlaneOrientation) -> DetectedPlane {
        DetectedPlane::new(
            Pose::from_position(Vec3::new(0.0, y, 0.0)),
            normal,
            orientation,
        )
    }

    #[test]
    fn pulse_intensity_is_clamped() {
        assert_eq!(HapticPulse::new(3.0, 10).intensity, 1.0);
        assert_eq!(HapticPulse::new(-1.0, 10).intensity, 0.0);
        assert_eq!(HapticPulse::new(f32::NAN, 10).intensity, 0.0);
        assert!(HapticPulse::new(0.5, 0).is_silent());
    }

    #[test]
    fn no_haptics_reports_absence() {
        assert!(!NoHaptics.pulse(InputSourceId(1), HapticPulse::new(1.0, 10)));
    }

    #[test]
    fn floor_picks_lowest_upward_plane() {
        let planes = [
            plane(0.8, Vec3::Y, PlaneOrientation::Horizontal),
            plane(0.0, Vec3::Y, PlaneOrientation::Horizontal),
            plane(2.5, Vec3::NEG_Y, PlaneOrientation::Horizontal),
        ];
        let floor = planes.find_surface(SurfaceKind::Floor, Vec3::ZERO);
        assert_eq!(floor.map(|p| p.pose.position.y), Some(0.0));
        let ceiling = planes.find_surface(SurfaceKind::Ceiling, Vec3::ZERO);
        assert_eq!(ceiling.map(|p| p.pose.position.y), Some(2.5));
    }

    #[test]
    fn wall_picks_nearest_vertical_plane() {
        let near = DetectedPlane::new(
            Pose::from_position(Vec3::new(0.0, 1.0, -1.0)),
            Vec3::Z,
            PlaneOrientation::Vertical,
        );
        let far = DetectedPlane::new(
            Pose::from_position(Vec3::new(0.0, 1.0, -6.0)),
            Vec3::Z,
            PlaneOrientation::Vertical,
        );
        let planes = [far, near];
        let wall = planes.find_surface(SurfaceKind::Wall, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(wall, Some(near));
    }

    #[test]
    fn missing_planes_degrade_to_none() {
        let planes: [DetectedPlane; 0] = [];
        assert!(planes.find_surface(SurfaceKind::Floor, Vec3::ZERO).is_none());
    }

    #[test]
    fn hashmap_scene_graph_lookup() {
        let mut scene = HashMap::new();
        scene.insert(NodeId(1), Transform3::IDENTITY);
        assert!(scene.world_transform(NodeId(1)).is_some());
        assert!(scene.world_transform(NodeId(2)).is_none());
        assert!(().world_transform(NodeId(1)).is_none());
    }
}
