#![forbid(unsafe_code)]

//! A floating control panel: projected controls on a grabbable, anchored
//! surface.
//!
//! [`FloatingPanel`] ties the pieces together for the common case. Each
//! frame it:
//!
//! 1. recognizes hand gestures,
//! 2. feeds controller and hand inputs into one grab engine,
//! 3. anchors the panel unless it is being held,
//! 4. optionally mirrors the panel position into a `vector3` control,
//! 5. re-projects the registry into a [`PanelView`] if anything changed.
//!
//! Grabbing suspends anchoring. On release, anchoring resumes from wherever
//! the panel was dropped.

use tracing::{debug, trace};
use xrtune_controls::{
    ControlPath, ControlRegistry, PanelOptions, PanelState, PanelView, SetOutcome, global,
};
use xrtune_core::glam::Vec3;
use xrtune_core::{Haptics, HitBounds, InputSourceId, SceneGraph, Transform3, XrFrame};
use xrtune_interact::{
    AnchorResult, GestureEvent, GrabEvent, GrabInteraction, GrabResult, HandGestureConfig,
    HandTracking, HandTrackingResult, InteractionPolicy, SpatialAnchor,
};

/// Everything that happened in one [`FloatingPanel::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelTick {
    /// The view was re-projected.
    pub view_changed: bool,
    /// Hand gesture transitions.
    pub gestures: Vec<GestureEvent>,
    /// Grab transitions.
    pub grab: Vec<GrabEvent>,
    /// Anchor outcome. Not anchored while held.
    pub anchor: AnchorResult,
}

/// A control panel that can be grabbed, carried, and anchored.
#[derive(Debug)]
pub struct FloatingPanel {
    registry: ControlRegistry,
    state: PanelState,
    grab: GrabInteraction,
    hands: HandTracking,
    anchor: SpatialAnchor,
    transform: Transform3,
    position_control: Option<ControlPath>,
    mirrored: Option<Vec3>,
}

impl FloatingPanel {
    /// Panel over `registry` with default interaction tunables.
    #[must_use]
    pub fn new(registry: ControlRegistry, options: PanelOptions) -> Self {
        Self {
            registry,
            state: PanelState::new(options),
            grab: GrabInteraction::default(),
            hands: HandTracking::gestures_only(HandGestureConfig::default()),
            anchor: SpatialAnchor::default(),
            transform: Transform3::default(),
            position_control: None,
            mirrored: None,
        }
    }

    /// Panel over the ambient registry.
    #[must_use]
    pub fn from_global(options: PanelOptions) -> Self {
        Self::new(global::global(), options)
    }

    /// Apply grab, gesture, and anchor tunables.
    #[must_use]
    pub fn with_policy(mut self, policy: &InteractionPolicy) -> Self {
        self.grab.set_config(policy.grab.clone());
        self.hands.set_config(policy.hand.clone());
        self.anchor.set_config(policy.anchor.clone());
        self
    }

    /// Pickable geometry of the panel.
    #[must_use]
    pub fn with_bounds(mut self, bounds: HitBounds) -> Self {
        self.grab.set_bounds(bounds);
        self
    }

    /// Initial placement.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform3) -> Self {
        self.transform = transform;
        self
    }

    /// Write the panel position into the `vector3` control at `path` whenever
    /// it moves.
    #[must_use]
    pub fn mirror_position(mut self, path: impl Into<ControlPath>) -> Self {
        self.position_control = Some(path.into());
        self.mirrored = None;
        self
    }

    /// Run `callback` with the holder on every grab.
    #[must_use]
    pub fn on_grab(mut self, callback: impl FnMut(InputSourceId) + 'static) -> Self {
        self.grab = self.grab.on_grab(callback);
        self
    }

    /// Run `callback` with the former holder on every release.
    #[must_use]
    pub fn on_release(mut self, callback: impl FnMut(InputSourceId) + 'static) -> Self {
        self.grab = self.grab.on_release(callback);
        self
    }

    /// Registry the panel projects.
    #[must_use]
    pub fn registry(&self) -> &ControlRegistry {
        &self.registry
    }

    /// Latest projection.
    #[must_use]
    pub fn view(&self) -> &PanelView {
        self.state.view()
    }

    /// Tab and collapse state.
    #[must_use]
    pub fn state(&self) -> &PanelState {
        &self.state
    }

    /// Mutable tab and collapse state, for renderer input.
    pub fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }

    /// Current panel transform.
    #[must_use]
    pub fn transform(&self) -> &Transform3 {
        &self.transform
    }

    /// Move the panel. Ignored by the next tick if it is being held.
    pub fn set_transform(&mut self, transform: Transform3) {
        self.transform = transform;
    }

    /// Grab summary.
    #[must_use]
    pub fn grab_result(&self) -> GrabResult {
        self.grab.result()
    }

    /// Hand summary against the panel's grab engine.
    #[must_use]
    pub fn hand_result(&self) -> HandTrackingResult {
        self.hands.result_for(&self.grab)
    }

    /// Last anchor outcome.
    #[must_use]
    pub fn anchor_result(&self) -> AnchorResult {
        self.anchor.result()
    }

    /// Advance one frame.
    pub fn tick<G>(&mut self, frame: &XrFrame, scene: &G, haptics: &mut dyn Haptics) -> PanelTick
    where
        G: SceneGraph + ?Sized,
    {
        let gestures = self.hands.recognize(frame);
        let mut inputs = self.grab.controller_inputs(&frame.controllers);
        inputs.extend(self.hands.grab_inputs(frame));

        let was_grabbed = self.grab.result().is_grabbed;
        let grab = self
            .grab
            .update(&inputs, &frame.viewer, &mut self.transform, haptics);
        let held = self.grab.result().is_grabbed;

        let anchor = if held {
            if !was_grabbed {
                debug!(message = "panel.anchor_suspended", frame = frame.frame);
            }
            AnchorResult {
                is_anchored: false,
                anchor_position: self.transform.position,
                anchor_rotation: self.transform.rotation,
                target_pose: None,
            }
        } else {
            if was_grabbed {
                debug!(message = "panel.anchor_resumed", frame = frame.frame);
                self.anchor.reset();
            }
            self.anchor.update(frame, scene, &mut self.transform)
        };

        self.mirror();
        let view_changed = self.state.refresh(&self.registry);
        PanelTick {
            view_changed,
            gestures,
            grab,
            anchor,
        }
    }

    /// Tear down interaction state, running release side effects.
    ///
    /// Dropping a held panel also runs `on_release`, without a haptic pulse.
    pub fn cancel(&mut self, haptics: &mut dyn Haptics) -> PanelTick {
        let gestures = self.hands.end_gestures();
        let grab = self.grab.cancel(haptics);
        PanelTick {
            view_changed: false,
            gestures,
            grab,
            anchor: self.anchor.result(),
        }
    }

    fn mirror(&mut self) {
        let Some(path) = &self.position_control else {
            return;
        };
        let position = self.transform.position;
        if self.mirrored == Some(position) {
            return;
        }
        match self.registry.set_value(path.as_str(), position) {
            SetOutcome::Applied(_) => self.mirrored = Some(position),
            outcome => trace!(message = "panel.mirror_skipped", path = %path, outcome = ?outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrtune_controls::{ControlSpec, ControlValue, Schema};
    use xrtune_core::glam::Quat;
    use xrtune_core::{ButtonMask, ControllerState, Handedness, Pose, RecordingHaptics};
    use xrtune_interact::{AnchorConfig, AnchorPolicy};

    const HAND: InputSourceId = InputSourceId(1);

    fn registry() -> ControlRegistry {
        let registry = ControlRegistry::new();
        registry.register(
            "panel",
            &Schema::new()
                .control("speed", ControlSpec::new(1.0).min(0.0).max(5.0))
                .value("position", Vec3::ZERO)
                .folder("light", Schema::new().value("on", true)),
        );
        registry
    }

    fn controller_frame(index: u64, position: Vec3, pressed: bool) -> XrFrame {
        let buttons = if pressed { ButtonMask::SELECT } else { ButtonMask::empty() };
        XrFrame {
            controllers: vec![
                ControllerState::new(HAND, Handedness::Right, Pose::from_position(position))
                    .with_buttons(buttons),
            ],
            ..XrFrame::new(index, Pose::IDENTITY)
        }
    }

    fn panel_at(z: f32) -> FloatingPanel {
        FloatingPanel::new(registry(), PanelOptions::scoped("panel").tabs(true))
            .with_transform(Transform3::new(Vec3::new(0.0, 0.0, z), Quat::IDENTITY, Vec3::ONE))
    }

    #[test]
    fn first_tick_projects_view() {
        let mut panel = panel_at(-1.0);
        let tick = panel.tick(&XrFrame::default(), &(), &mut RecordingHaptics::default());
        assert!(tick.view_changed);
        assert_eq!(panel.view().controls.len(), 2);
        assert_eq!(panel.view().folders.len(), 1);
        assert_eq!(
            panel.view().active_folder.as_ref().map(ControlPath::as_str),
            Some("panel.light")
        );
    }

    #[test]
    fn grab_carries_and_mirrors_position() {
        let mut panel = panel_at(-1.0).mirror_position("panel.position");
        let mut haptics = RecordingHaptics::default();
        panel.tick(&controller_frame(0, Vec3::ZERO, false), &(), &mut haptics);
        assert!(panel.grab_result().is_hovered);
        panel.tick(&controller_frame(1, Vec3::ZERO, true), &(), &mut haptics);
        assert!(panel.grab_result().is_grabbed);

        let tick = panel.tick(&controller_frame(2, Vec3::new(0.5, 0.0, 0.0), true), &(), &mut haptics);
        assert!(!tick.anchor.is_anchored);
        assert!(tick.view_changed);
        assert!(panel.transform().position.abs_diff_eq(Vec3::new(0.5, 0.0, -1.0), 1e-5));
        let mirrored = panel
            .registry()
            .get_value("panel.position")
            .and_then(|v| v.as_vector3())
            .expect("mirrored vector");
        assert!(mirrored.abs_diff_eq(Vec3::new(0.5, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn release_resumes_anchoring() {
        let policy = InteractionPolicy {
            anchor: AnchorConfig {
                follow_target: false,
                ..AnchorConfig::with_policy(AnchorPolicy::Fixed)
            },
            ..InteractionPolicy::default()
        };
        let mut panel = panel_at(-1.0).with_policy(&policy);
        let mut haptics = RecordingHaptics::default();
        panel.tick(&controller_frame(0, Vec3::ZERO, true), &(), &mut haptics);
        let tick = panel.tick(&controller_frame(1, Vec3::ZERO, false), &(), &mut haptics);
        assert!(tick.grab.iter().any(|e| matches!(e, GrabEvent::Release { .. })));
        assert!(tick.anchor.is_anchored);
    }

    #[test]
    fn repeated_tick_changes_nothing() {
        let mut panel = panel_at(-1.0).mirror_position("panel.position");
        let mut haptics = RecordingHaptics::default();
        let frame = controller_frame(3, Vec3::ZERO, true);
        panel.tick(&frame, &(), &mut haptics);
        let version = panel.registry().version();
        let transform = *panel.transform();
        let again = panel.tick(&frame, &(), &mut haptics);
        assert!(again.grab.is_empty());
        assert!(!again.view_changed);
        assert_eq!(panel.registry().version(), version);
        assert_eq!(*panel.transform(), transform);
    }

    #[test]
    fn cancel_releases_holder() {
        let released = std::rc::Rc::new(std::cell::Cell::new(0));
        let sink = std::rc::Rc::clone(&released);
        let mut panel = panel_at(-1.0).on_release(move |_| sink.set(sink.get() + 1));
        let mut haptics = RecordingHaptics::default();
        panel.tick(&controller_frame(0, Vec3::ZERO, true), &(), &mut haptics);
        let tick = panel.cancel(&mut haptics);
        assert!(tick.grab.iter().any(|e| matches!(e, GrabEvent::Release { .. })));
        assert_eq!(released.get(), 1);
        assert_eq!(panel.grab_result(), GrabResult::default());
    }

    #[test]
    fn dropping_held_panel_runs_on_release() {
        let released = std::rc::Rc::new(std::cell::Cell::new(0));
        let sink = std::rc::Rc::clone(&released);
        let mut panel = panel_at(-1.0).on_release(move |_| sink.set(sink.get() + 1));
        let mut haptics = RecordingHaptics::default();
        panel.tick(&controller_frame(0, Vec3::ZERO, true), &(), &mut haptics);
        assert!(panel.grab_result().is_grabbed);
        let pulses = haptics.len();
        drop(panel);
        assert_eq!(released.get(), 1);
        assert_eq!(haptics.len(), pulses);
    }

    #[test]
    fn policy_reaches_the_engine_hands_feed() {
        let policy = InteractionPolicy {
            grab: xrtune_interact::GrabConfig {
                max_distance: 0.5,
                ..xrtune_interact::GrabConfig::default()
            },
            ..InteractionPolicy::default()
        };
        let mut panel = panel_at(-1.0).with_policy(&policy);
        let mut haptics = RecordingHaptics::default();
        panel.tick(&controller_frame(0, Vec3::ZERO, false), &(), &mut haptics);
        let tick = panel.tick(&controller_frame(1, Vec3::ZERO, true), &(), &mut haptics);
        assert!(tick.grab.iter().any(|e| matches!(e, GrabEvent::GrabRejected { .. })));
        assert!(!panel.grab_result().is_grabbed);
        assert_eq!(panel.hand_result().grabbed_by_hand, None);
    }

    #[test]
    fn cancel_ends_gestures_once() {
        let hand = InputSourceId(7);
        let joints = xrtune_core::HandJoints::empty()
            .with(xrtune_core::HandJoint::Wrist, Pose::IDENTITY)
            .with(xrtune_core::HandJoint::ThumbTip, Pose::from_position(Vec3::new(0.0, 0.0, -0.3)))
            .with(xrtune_core::HandJoint::IndexTip, Pose::from_position(Vec3::new(0.0, 0.0, -0.3)));
        let frame = XrFrame {
            hands: vec![xrtune_core::HandState::new(hand, Handedness::Left, joints)],
            ..XrFrame::new(0, Pose::IDENTITY)
        };
        let mut panel = panel_at(-3.0);
        let mut haptics = RecordingHaptics::default();
        assert_eq!(panel.tick(&frame, &(), &mut haptics).gestures.len(), 1);
        let tick = panel.cancel(&mut haptics);
        assert_eq!(tick.gestures.len(), 1);
        assert!(tick.grab.is_empty());
        assert!(panel.cancel(&mut haptics).gestures.is_empty());
    }

    #[test]
    fn edits_show_up_after_tick() {
        let mut panel = panel_at(-1.0);
        let mut haptics = RecordingHaptics::default();
        panel.tick(&XrFrame::default(), &(), &mut haptics);
        panel.registry().set_value("panel.speed", 10.0);
        assert!(panel.tick(&XrFrame::new(1, Pose::IDENTITY), &(), &mut haptics).view_changed);
        let speed = panel
            .view()
            .controls
            .iter()
            .find(|c| c.path.as_str() == "panel.speed")
            .and_then(|c| c.value.clone());
        assert_eq!(speed, Some(ControlValue::Number(5.0)));
    }
}
