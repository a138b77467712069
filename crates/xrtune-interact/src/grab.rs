#![forbid(unsafe_code)]

//! Grab interaction: hover, pick up, carry, release.
//!
//! # State Machine
//!
//! ```text
//!          ray hit / near            rising grab signal,
//!   Idle ───────────────▶ Hovered ───distance in range──▶ Grabbed
//!    ▲     ◀───────────────  │                              │
//!    │      hit lost          │                              │
//!    └────────────────────────┴──── signal released / ──────┘
//!                                   input lost / cancel
//! ```
//!
//! While grabbed, the target follows `holder * grab_offset`, optionally
//! clamped radially around the viewer, snapped to a grid, and held at the
//! rotation it had when grabbed. Scale is always restored to the value
//! captured at grab time.
//!
//! # Invariants
//!
//! 1. At most one holder. `is_grabbed == false` implies no holder and no
//!    offset.
//! 2. A grab needs a rising edge of the grab signal. Holding the button
//!    while sweeping onto the target does not pick it up.
//! 3. Grab attempts by another input while grabbed are rejected; the holder
//!    does not change.
//! 4. Hover haptics fire on hover entry only.
//! 5. Calling [`update`](GrabInteraction::update) again with the same inputs
//!    changes nothing: edges were consumed and the follow pose is a pure
//!    function of the holder pose.
//!
//! # Failure Modes
//!
//! - **Holder disappears**: the next update releases with
//!   [`ReleaseReason::InputLost`] and fires the release side effects.
//! - **Engine dropped while held**: releases with
//!   [`ReleaseReason::Cancelled`] and runs `on_release`. No haptic pulse,
//!   since no actuator is reachable from `drop`.
//! - **No haptic actuator**: pulses return `false`; logged at `trace`.

use std::fmt;

use tracing::{debug, trace};
use xrtune_core::glam::{Quat, Vec3};
use xrtune_core::{
    ButtonMask, ControllerState, HapticPulse, Haptics, Handedness, HitBounds, InputSourceId,
    NoHaptics, Pose, Ray, Transform3,
};

#[cfg(feature = "policy-config")]
use serde::{Deserialize, Serialize};

/// Distance below which a radial clamp has no usable direction.
const RADIAL_EPSILON: f32 = 1.0e-6;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for one grabbable target.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct GrabConfig {
    /// Longest ray hit that counts as hover, in meters (default: 5.0).
    pub max_hover_distance: f32,
    /// Hover radius for inputs without a ray, e.g. a pinching hand
    /// (default: 0.25).
    pub near_radius: f32,
    /// Closest allowed holder-to-target distance (default: 0.0).
    pub min_distance: f32,
    /// Farthest allowed holder-to-target distance (default: 10.0).
    pub max_distance: f32,
    /// Clamp the carried target's distance from the viewer into
    /// `[min_distance, max_distance]` (default: false).
    pub constrain_distance: bool,
    /// Snap the carried position to this grid (default: none).
    pub grid_size: Option<f32>,
    /// Keep the rotation the target had when grabbed (default: false).
    pub lock_rotation: bool,
    /// Controller buttons that act as the grab signal (default: select or
    /// squeeze).
    pub grab_buttons: ButtonMask,
    /// Pulse on grab (default: 0.6 for 50 ms).
    pub grab_haptic: HapticPulse,
    /// Pulse on release (default: 0.3 for 30 ms).
    pub release_haptic: HapticPulse,
    /// Pulse on hover entry (default: 0.1 for 10 ms).
    pub hover_haptic: HapticPulse,
}

impl Default for GrabConfig {
    fn default() -> Self {
        Self {
            max_hover_distance: 5.0,
            near_radius: 0.25,
            min_distance: 0.0,
            max_distance: 10.0,
            constrain_distance: false,
            grid_size: None,
            lock_rotation: false,
            grab_buttons: ButtonMask::SELECT | ButtonMask::SQUEEZE,
            grab_haptic: HapticPulse::new(0.6, 50),
            release_haptic: HapticPulse::new(0.3, 30),
            hover_haptic: HapticPulse::new(0.1, 10),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs, states, events
// ---------------------------------------------------------------------------

/// One candidate holder for this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrabInput {
    /// Input identity.
    pub source: InputSourceId,
    /// Hand the input belongs to.
    pub handedness: Handedness,
    /// Holder pose the target attaches to.
    pub pose: Pose,
    /// Pointing ray; without one, hover is by proximity.
    pub ray: Option<Ray>,
    /// Grab signal held this tick.
    pub signal: bool,
}

impl GrabInput {
    /// Grip pose, target ray, and `buttons` as the grab signal.
    #[must_use]
    pub fn from_controller(controller: &ControllerState, buttons: ButtonMask) -> Self {
        Self {
            source: controller.id,
            handedness: controller.handedness,
            pose: controller.grip,
            ray: Some(controller.ray()),
            signal: controller.is_pressed(buttons),
        }
    }
}

/// Where the state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrabPhase {
    /// Nothing points at the target.
    #[default]
    Idle,
    /// An input points at (or is near) the target.
    Hovered {
        /// Hovering input.
        by: InputSourceId,
    },
    /// An input holds the target.
    Grabbed {
        /// Holder.
        by: InputSourceId,
    },
}

/// Per-target transform bookkeeping while grabbed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionTransformState {
    /// Whether a holder exists.
    pub is_grabbed: bool,
    /// Current holder.
    pub grabbing_input: Option<InputSourceId>,
    /// Holder-to-target transform captured at grab time.
    pub grab_offset: Option<Pose>,
    /// Scale captured at grab time.
    pub initial_scale: Vec3,
}

impl Default for InteractionTransformState {
    fn default() -> Self {
        Self {
            is_grabbed: false,
            grabbing_input: None,
            grab_offset: None,
            initial_scale: Vec3::ONE,
        }
    }
}

/// Why a grab ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// The holder let go of the grab signal.
    SignalReleased,
    /// The holder vanished from the input set.
    InputLost,
    /// [`GrabInteraction::cancel`] was called.
    Cancelled,
}

/// Why a grab attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    /// Holder closer than `min_distance`.
    TooClose {
        /// Holder-to-target distance.
        distance: f32,
    },
    /// Holder farther than `max_distance`.
    TooFar {
        /// Holder-to-target distance.
        distance: f32,
    },
    /// Another input already holds the target.
    AlreadyHeld {
        /// Current holder.
        holder: InputSourceId,
    },
}

/// One state-machine transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrabEvent {
    /// An input started hovering.
    HoverStart(InputSourceId),
    /// The hovering input stopped hovering.
    HoverEnd(InputSourceId),
    /// The target was picked up.
    Grab {
        /// New holder.
        source: InputSourceId,
        /// Captured holder-to-target transform.
        offset: Pose,
    },
    /// The target was let go.
    Release {
        /// Former holder.
        source: InputSourceId,
        /// Cause.
        reason: ReleaseReason,
    },
    /// A grab attempt was refused.
    GrabRejected {
        /// Input that tried.
        source: InputSourceId,
        /// Cause.
        reason: RejectReason,
    },
}

/// Summary exposed to hosts each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GrabResult {
    /// Whether the target is held.
    pub is_grabbed: bool,
    /// Current holder.
    pub grabbed_by: Option<InputSourceId>,
    /// Whether any input hovers the target.
    pub is_hovered: bool,
}

type GrabCallback = Box<dyn FnMut(InputSourceId)>;

// ---------------------------------------------------------------------------
// GrabInteraction
// ---------------------------------------------------------------------------

/// Grab state machine for one target.
pub struct GrabInteraction {
    config: GrabConfig,
    bounds: HitBounds,
    phase: GrabPhase,
    hovered_by: Option<InputSourceId>,
    transform: InteractionTransformState,
    locked_rotation: Quat,
    previous_signals: Vec<(InputSourceId, bool)>,
    on_grab: Option<GrabCallback>,
    on_release: Option<GrabCallback>,
}

impl fmt::Debug for GrabInteraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrabInteraction")
            .field("phase", &self.phase)
            .field("hovered_by", &self.hovered_by)
            .field("transform", &self.transform)
            .finish_non_exhaustive()
    }
}

impl Drop for GrabInteraction {
    fn drop(&mut self) {
        if self.transform.is_grabbed {
            let mut events = Vec::new();
            self.release(ReleaseReason::Cancelled, &mut NoHaptics, &mut events);
        }
    }
}

impl Default for GrabInteraction {
    fn default() -> Self {
        Self::new(GrabConfig::default(), HitBounds::default())
    }
}

impl GrabInteraction {
    /// A new idle engine for a target with `bounds`.
    #[must_use]
    pub fn new(config: GrabConfig, bounds: HitBounds) -> Self {
        Self {
            config,
            bounds,
            phase: GrabPhase::Idle,
            hovered_by: None,
            transform: InteractionTransformState::default(),
            locked_rotation: Quat::IDENTITY,
            previous_signals: Vec::new(),
            on_grab: None,
            on_release: None,
        }
    }

    /// Callback run after each grab.
    #[must_use]
    pub fn on_grab(mut self, callback: impl FnMut(InputSourceId) + 'static) -> Self {
        self.on_grab = Some(Box::new(callback));
        self
    }

    /// Callback run after each release.
    #[must_use]
    pub fn on_release(mut self, callback: impl FnMut(InputSourceId) + 'static) -> Self {
        self.on_release = Some(Box::new(callback));
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GrabConfig {
        &self.config
    }

    /// Replace the configuration. Takes effect on the next update.
    pub fn set_config(&mut self, config: GrabConfig) {
        self.config = config;
    }

    /// Target hit geometry.
    #[must_use]
    pub fn bounds(&self) -> HitBounds {
        self.bounds
    }

    /// Replace the hit geometry.
    pub fn set_bounds(&mut self, bounds: HitBounds) {
        self.bounds = bounds;
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> GrabPhase {
        self.phase
    }

    /// Transform bookkeeping.
    #[must_use]
    pub fn transform_state(&self) -> &InteractionTransformState {
        &self.transform
    }

    /// Host-facing summary.
    #[must_use]
    pub fn result(&self) -> GrabResult {
        GrabResult {
            is_grabbed: self.transform.is_grabbed,
            grabbed_by: self.transform.grabbing_input,
            is_hovered: self.hovered_by.is_some(),
        }
    }

    /// Controller inputs from `controllers` using the configured buttons.
    #[must_use]
    pub fn controller_inputs(&self, controllers: &[ControllerState]) -> Vec<GrabInput> {
        controllers
            .iter()
            .map(|c| GrabInput::from_controller(c, self.config.grab_buttons))
            .collect()
    }

    /// Advance one tick.
    ///
    /// `viewer` is the reference point for the distance constraint. `target`
    /// is read for hit testing and written while grabbed.
    pub fn update(
        &mut self,
        inputs: &[GrabInput],
        viewer: &Pose,
        target: &mut Transform3,
        haptics: &mut dyn Haptics,
    ) -> Vec<GrabEvent> {
        let mut events = Vec::new();
        let rising: Vec<InputSourceId> = inputs
            .iter()
            .filter(|input| input.signal && !self.previous_signal(input.source))
            .map(|input| input.source)
            .collect();
        self.previous_signals = inputs.iter().map(|i| (i.source, i.signal)).collect();

        if let Some(holder) = self.transform.grabbing_input {
            match inputs.iter().find(|i| i.source == holder) {
                None => self.release(ReleaseReason::InputLost, haptics, &mut events),
                Some(input) if !input.signal => {
                    self.release(ReleaseReason::SignalReleased, haptics, &mut events);
                }
                Some(input) => {
                    let pose = input.pose;
                    self.follow(&pose, viewer, target);
                    for source in rising.iter().filter(|s| **s != holder) {
                        debug!(message = "grab.rejected", source = %source, holder = %holder);
                        events.push(GrabEvent::GrabRejected {
                            source: *source,
                            reason: RejectReason::AlreadyHeld { holder },
                        });
                    }
                }
            }
        }

        let hits: Vec<(usize, f32)> = inputs
            .iter()
            .enumerate()
            .filter_map(|(index, input)| self.hit(input, target).map(|d| (index, d)))
            .collect();
        self.update_hover(inputs, &hits, haptics, &mut events);

        if !self.transform.is_grabbed {
            for source in rising {
                let Some(input) = inputs.iter().find(|i| i.source == source) else {
                    continue;
                };
                if !hits.iter().any(|(index, _)| inputs[*index].source == source) {
                    continue;
                }
                if self.try_grab(input, target, haptics, &mut events) {
                    break;
                }
            }
        }

        self.phase = match (self.transform.grabbing_input, self.hovered_by) {
            (Some(by), _) => GrabPhase::Grabbed { by },
            (None, Some(by)) => GrabPhase::Hovered { by },
            (None, None) => GrabPhase::Idle,
        };
        events
    }

    /// Force everything back to idle, running release side effects.
    pub fn cancel(&mut self, haptics: &mut dyn Haptics) -> Vec<GrabEvent> {
        let mut events = Vec::new();
        if self.transform.is_grabbed {
            self.release(ReleaseReason::Cancelled, haptics, &mut events);
        }
        if let Some(source) = self.hovered_by.take() {
            events.push(GrabEvent::HoverEnd(source));
        }
        self.previous_signals.clear();
        self.phase = GrabPhase::Idle;
        events
    }

    /// Drop all state tied to `source` (disconnect, hand lost).
    pub fn release_source(
        &mut self,
        source: InputSourceId,
        haptics: &mut dyn Haptics,
    ) -> Vec<GrabEvent> {
        let mut events = Vec::new();
        if self.transform.grabbing_input == Some(source) {
            self.release(ReleaseReason::InputLost, haptics, &mut events);
        }
        if self.hovered_by == Some(source) {
            self.hovered_by = None;
            events.push(GrabEvent::HoverEnd(source));
        }
        self.previous_signals.retain(|(s, _)| *s != source);
        self.phase = match self.transform.grabbing_input {
            Some(by) => GrabPhase::Grabbed { by },
            None => GrabPhase::Idle,
        };
        events
    }

    fn previous_signal(&self, source: InputSourceId) -> bool {
        self.previous_signals
            .iter()
            .find(|(s, _)| *s == source)
            .is_some_and(|(_, held)| *held)
    }

    /// Hover distance for `input`, if it hovers the target.
    fn hit(&self, input: &GrabInput, target: &Transform3) -> Option<f32> {
        match input.ray {
            Some(ray) => self
                .bounds
                .intersect(target, &ray)
                .filter(|d| *d <= self.config.max_hover_distance),
            None => {
                let distance = input.pose.position.distance(target.position);
                (distance <= self.config.near_radius).then_some(distance)
            }
        }
    }

    fn update_hover(
        &mut self,
        inputs: &[GrabInput],
        hits: &[(usize, f32)],
        haptics: &mut dyn Haptics,
        events: &mut Vec<GrabEvent>,
    ) {
        let still_hovering = self
            .hovered_by
            .filter(|s| hits.iter().any(|(i, _)| inputs[*i].source == *s));
        let next = still_hovering.or_else(|| {
            hits.iter()
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| inputs[*i].source)
        });
        if next == self.hovered_by {
            return;
        }
        if let Some(previous) = self.hovered_by {
            trace!(message = "grab.hover_end", source = %previous);
            events.push(GrabEvent::HoverEnd(previous));
        }
        if let Some(source) = next {
            trace!(message = "grab.hover_start", source = %source);
            pulse(haptics, source, self.config.hover_haptic);
            events.push(GrabEvent::HoverStart(source));
        }
        self.hovered_by = next;
    }

    fn try_grab(
        &mut self,
        input: &GrabInput,
        target: &mut Transform3,
        haptics: &mut dyn Haptics,
        events: &mut Vec<GrabEvent>,
    ) -> bool {
        let distance = input.pose.position.distance(target.position);
        let reject = if distance < self.config.min_distance {
            Some(RejectReason::TooClose { distance })
        } else if distance > self.config.max_distance {
            Some(RejectReason::TooFar { distance })
        } else {
            None
        };
        if let Some(reason) = reject {
            debug!(message = "grab.rejected", source = %input.source, distance);
            events.push(GrabEvent::GrabRejected {
                source: input.source,
                reason,
            });
            return false;
        }

        let offset = input.pose.inverse() * target.pose();
        self.transform = InteractionTransformState {
            is_grabbed: true,
            grabbing_input: Some(input.source),
            grab_offset: Some(offset),
            initial_scale: target.scale,
        };
        self.locked_rotation = target.rotation;
        debug!(message = "grab.start", source = %input.source, distance);
        pulse(haptics, input.source, self.config.grab_haptic);
        events.push(GrabEvent::Grab {
            source: input.source,
            offset,
        });
        if let Some(callback) = self.on_grab.as_mut() {
            callback(input.source);
        }
        true
    }

    fn follow(&self, holder: &Pose, viewer: &Pose, target: &mut Transform3) {
        let Some(offset) = self.transform.grab_offset else {
            return;
        };
        let mut next = *holder * offset;
        if self.config.constrain_distance {
            next.position = clamp_radial(
                next.position,
                viewer.position,
                self.config.min_distance,
                self.config.max_distance,
            );
        }
        if let Some(grid) = self.config.grid_size {
            next.position = snap_to_grid(next.position, grid);
        }
        if self.config.lock_rotation {
            next.rotation = self.locked_rotation;
        }
        target.position = next.position;
        target.rotation = next.rotation;
        target.scale = self.transform.initial_scale;
    }

    fn release(
        &mut self,
        reason: ReleaseReason,
        haptics: &mut dyn Haptics,
        events: &mut Vec<GrabEvent>,
    ) {
        let Some(source) = self.transform.grabbing_input else {
            return;
        };
        let initial_scale = self.transform.initial_scale;
        self.transform = InteractionTransformState {
            initial_scale,
            ..InteractionTransformState::default()
        };
        debug!(message = "grab.release", source = %source, reason = ?reason);
        if reason != ReleaseReason::InputLost {
            pulse(haptics, source, self.config.release_haptic);
        }
        events.push(GrabEvent::Release { source, reason });
        if let Some(callback) = self.on_release.as_mut() {
            callback(source);
        }
    }
}

fn pulse(haptics: &mut dyn Haptics, source: InputSourceId, pulse: HapticPulse) {
    if pulse.is_silent() {
        return;
    }
    if !haptics.pulse(source, pulse) {
        trace!(message = "grab.haptics_unavailable", source = %source);
    }
}

/// Project `point` onto the shell `[min, max]` around `center`.
#[must_use]
pub fn clamp_radial(point: Vec3, center: Vec3, min: f32, max: f32) -> Vec3 {
    let offset = point - center;
    let distance = offset.length();
    if distance < RADIAL_EPSILON {
        return point;
    }
    let clamped = distance.clamp(min.max(0.0), max.max(min));
    center + offset * (clamped / distance)
}

/// `round(v / grid) * grid` per axis. Non-positive grids leave `point` as is.
#[must_use]
pub fn snap_to_grid(point: Vec3, grid: f32) -> Vec3 {
    if grid <= 0.0 || !grid.is_finite() {
        return point;
    }
    (point / grid).round() * grid
}
