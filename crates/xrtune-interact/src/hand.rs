#![forbid(unsafe_code)]

//! Hand tracking: pinch and point recognition, and hand-driven grabbing.
//!
//! [`HandTracking`] classifies every tracked hand once per frame and turns
//! gesture changes into edge events. It also derives [`GrabInput`]s from the
//! hands and feeds them to its own [`GrabInteraction`], so a pinch that
//! starts near the target picks it up exactly like a controller button.
//! A host that merges hand and controller inputs into one engine builds the
//! tracker with [`HandTracking::gestures_only`] instead.
//!
//! # Classification
//!
//! - **Pinch**: thumb tip to index tip closer than `pinch_threshold`.
//!   Confidence is `1 - distance / threshold`.
//! - **Point**: not pinching, and the index finger (knuckle to tip) is longer
//!   than the middle finger times `point_extension_ratio`.
//!
//! # Invariants
//!
//! 1. Each transition fires exactly one edge event. A steady gesture fires
//!    nothing, however many ticks it lasts.
//! 2. Pinch to point emits `PinchEnd` before `PointStart`.
//! 3. A hand that stops being tracked ends its gesture on the next
//!    [`recognize`](HandTracking::recognize).
//!
//! # Failure Modes
//!
//! - **Joints missing**: a hand without thumb and index tips cannot pinch and
//!   contributes no grab input. Without knuckles it cannot point.

use tracing::debug;
use xrtune_core::glam::{Quat, Vec3};
use xrtune_core::{
    HandJoint, HandJoints, HandState, Haptics, Handedness, HitBounds, InputSourceId, Pose, Ray,
    Transform3, XrFrame,
};

#[cfg(feature = "policy-config")]
use serde::{Deserialize, Serialize};

use crate::grab::{GrabConfig, GrabEvent, GrabInput, GrabInteraction, GrabPhase};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Gesture thresholds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct HandGestureConfig {
    /// Thumb-to-index distance below which the hand pinches, in meters
    /// (default: 0.02).
    pub pinch_threshold: f32,
    /// How much longer the index finger must be than the middle finger to
    /// count as pointing (default: 1.3).
    pub point_extension_ratio: f32,
}

impl Default for HandGestureConfig {
    fn default() -> Self {
        Self {
            pinch_threshold: 0.02,
            point_extension_ratio: 1.3,
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Gesture held by one hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandGesture {
    /// Nothing recognized.
    #[default]
    None,
    /// Thumb and index tips together.
    Pinch,
    /// Index finger extended.
    Point,
}

/// Thumb/index measurement for one hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinchReading {
    /// Thumb tip to index tip, in meters.
    pub distance: f32,
    /// `1 - distance / threshold`, clamped to `[0, 1]`.
    pub confidence: f32,
    /// Halfway between the two tips.
    pub midpoint: Vec3,
}

impl PinchReading {
    /// Measure `joints` against `threshold`. `None` without both tips.
    #[must_use]
    pub fn measure(joints: &HandJoints, threshold: f32) -> Option<Self> {
        let thumb = joints.position(HandJoint::ThumbTip)?;
        let index = joints.position(HandJoint::IndexTip)?;
        let distance = thumb.distance(index);
        let confidence = if threshold > 0.0 {
            (1.0 - distance / threshold).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some(Self {
            distance,
            confidence,
            midpoint: thumb.lerp(index, 0.5),
        })
    }

    /// Whether the tips are closer than `threshold`.
    #[must_use]
    pub fn is_pinching(&self, threshold: f32) -> bool {
        self.distance < threshold
    }
}

fn finger_length(joints: &HandJoints, knuckle: HandJoint, tip: HandJoint) -> Option<f32> {
    Some(joints.position(knuckle)?.distance(joints.position(tip)?))
}

/// Classify one hand. Pinch wins over point.
#[must_use]
pub fn classify(joints: &HandJoints, config: &HandGestureConfig) -> HandGesture {
    if PinchReading::measure(joints, config.pinch_threshold)
        .is_some_and(|r| r.is_pinching(config.pinch_threshold))
    {
        return HandGesture::Pinch;
    }
    let index = finger_length(joints, HandJoint::IndexProximal, HandJoint::IndexTip);
    let middle = finger_length(joints, HandJoint::MiddleProximal, HandJoint::MiddleTip);
    match (index, middle) {
        (Some(index), Some(middle)) if index > middle * config.point_extension_ratio => {
            HandGesture::Point
        }
        _ => HandGesture::None,
    }
}

/// Pointing ray from the index tip along the finger, if the knuckle is
/// tracked.
#[must_use]
pub fn pointing_ray(joints: &HandJoints) -> Option<Ray> {
    let tip = joints.position(HandJoint::IndexTip)?;
    let knuckle = joints.position(HandJoint::IndexProximal)?;
    let ray = Ray::new(tip, tip - knuckle);
    (!ray.is_degenerate()).then_some(ray)
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A gesture transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEdge {
    /// `none -> pinch`.
    PinchStart,
    /// `pinch -> none`.
    PinchEnd,
    /// `none -> point`.
    PointStart,
    /// `point -> none`.
    PointEnd,
}

/// A gesture transition on one hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureEvent {
    /// Hand identity.
    pub source: InputSourceId,
    /// Which hand.
    pub handedness: Handedness,
    /// Transition.
    pub edge: GestureEdge,
}

fn edges(from: HandGesture, to: HandGesture) -> impl Iterator<Item = GestureEdge> {
    let end = match (from, to) {
        (a, b) if a == b => None,
        (HandGesture::Pinch, _) => Some(GestureEdge::PinchEnd),
        (HandGesture::Point, _) => Some(GestureEdge::PointEnd),
        (HandGesture::None, _) => None,
    };
    let start = match (from, to) {
        (a, b) if a == b => None,
        (_, HandGesture::Pinch) => Some(GestureEdge::PinchStart),
        (_, HandGesture::Point) => Some(GestureEdge::PointStart),
        (_, HandGesture::None) => None,
    };
    end.into_iter().chain(start)
}

/// Summary exposed to hosts each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandTrackingResult {
    /// Left hand pinching.
    pub left_pinching: bool,
    /// Right hand pinching.
    pub right_pinching: bool,
    /// Hand hovering the target.
    pub hovered_hand: Option<Handedness>,
    /// Hand holding the target.
    pub grabbed_by_hand: Option<Handedness>,
}

/// Events from one [`HandTracking::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandTrackingUpdate {
    /// Gesture transitions.
    pub gestures: Vec<GestureEvent>,
    /// Grab state-machine transitions.
    pub grab: Vec<GrabEvent>,
}

// ---------------------------------------------------------------------------
// HandTracking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct TrackedHand {
    source: InputSourceId,
    handedness: Handedness,
    gesture: HandGesture,
}

/// Per-hand gesture state plus an optional hand-driven grab engine.
#[derive(Debug)]
pub struct HandTracking {
    config: HandGestureConfig,
    hands: Vec<TrackedHand>,
    grab: Option<GrabInteraction>,
}

impl Default for HandTracking {
    fn default() -> Self {
        Self::new(
            HandGestureConfig::default(),
            GrabInteraction::new(GrabConfig::default(), HitBounds::default()),
        )
    }
}

impl HandTracking {
    /// Create a tracker driving `grab`.
    #[must_use]
    pub fn new(config: HandGestureConfig, grab: GrabInteraction) -> Self {
        Self {
            config,
            hands: Vec::new(),
            grab: Some(grab),
        }
    }

    /// Create a tracker that only recognizes gestures. Its grab inputs are
    /// meant for an engine the caller owns.
    #[must_use]
    pub fn gestures_only(config: HandGestureConfig) -> Self {
        Self {
            config,
            hands: Vec::new(),
            grab: None,
        }
    }

    /// Gesture thresholds.
    #[must_use]
    pub fn config(&self) -> &HandGestureConfig {
        &self.config
    }

    /// Replace the thresholds.
    pub fn set_config(&mut self, config: HandGestureConfig) {
        self.config = config;
    }

    /// The hand-driven grab engine, if this tracker owns one.
    #[must_use]
    pub fn grab(&self) -> Option<&GrabInteraction> {
        self.grab.as_ref()
    }

    /// Mutable access to the owned grab engine.
    pub fn grab_mut(&mut self) -> Option<&mut GrabInteraction> {
        self.grab.as_mut()
    }

    /// Last recognized gesture of the hand with `handedness`.
    #[must_use]
    pub fn gesture(&self, handedness: Handedness) -> HandGesture {
        self.hands
            .iter()
            .find(|h| h.handedness == handedness)
            .map_or(HandGesture::None, |h| h.gesture)
    }

    /// Classify every hand in `frame` and return the transitions.
    pub fn recognize(&mut self, frame: &XrFrame) -> Vec<GestureEvent> {
        let mut events = Vec::new();
        let mut next = Vec::with_capacity(frame.hands.len());
        for hand in &frame.hands {
            let previous = self
                .hands
                .iter()
                .find(|h| h.source == hand.id)
                .map_or(HandGesture::None, |h| h.gesture);
            let gesture = classify(&hand.joints, &self.config);
            push_edges(&mut events, hand.id, hand.handedness, previous, gesture);
            next.push(TrackedHand {
                source: hand.id,
                handedness: hand.handedness,
                gesture,
            });
        }
        for lost in self.hands.iter().filter(|h| !frame.has_source(h.source)) {
            push_edges(&mut events, lost.source, lost.handedness, lost.gesture, HandGesture::None);
        }
        self.hands = next;
        events
    }

    /// Grab inputs for the hands in `frame`.
    ///
    /// Pose is the pinch midpoint with the wrist's rotation; the signal is
    /// the pinch; a pointing hand also carries its index ray.
    #[must_use]
    pub fn grab_inputs(&self, frame: &XrFrame) -> Vec<GrabInput> {
        frame
            .hands
            .iter()
            .filter_map(|hand| self.grab_input(hand))
            .collect()
    }

    fn grab_input(&self, hand: &HandState) -> Option<GrabInput> {
        let reading = PinchReading::measure(&hand.joints, self.config.pinch_threshold)?;
        let rotation = hand
            .joints
            .pose(HandJoint::Wrist)
            .map_or(Quat::IDENTITY, |wrist| wrist.rotation);
        let ray = match classify(&hand.joints, &self.config) {
            HandGesture::Point => pointing_ray(&hand.joints),
            _ => None,
        };
        Some(GrabInput {
            source: hand.id,
            handedness: hand.handedness,
            pose: Pose::new(reading.midpoint, rotation),
            ray,
            signal: reading.is_pinching(self.config.pinch_threshold),
        })
    }

    /// Recognize gestures, then advance the owned hand grab (if any)
    /// against `target`.
    pub fn update(
        &mut self,
        frame: &XrFrame,
        target: &mut Transform3,
        haptics: &mut dyn Haptics,
    ) -> HandTrackingUpdate {
        let gestures = self.recognize(frame);
        let inputs = self.grab_inputs(frame);
        let grab = match self.grab.as_mut() {
            Some(grab) => grab.update(&inputs, &frame.viewer, target, haptics),
            None => Vec::new(),
        };
        HandTrackingUpdate { gestures, grab }
    }

    /// Handedness of a hand seen in the last [`recognize`](Self::recognize).
    #[must_use]
    pub fn handedness_of(&self, source: InputSourceId) -> Option<Handedness> {
        self.hands
            .iter()
            .find(|h| h.source == source)
            .map(|h| h.handedness)
    }

    /// Host-facing summary. Without an owned engine no hand hovers or
    /// holds anything.
    #[must_use]
    pub fn result(&self) -> HandTrackingResult {
        match &self.grab {
            Some(grab) => self.result_for(grab),
            None => HandTrackingResult {
                left_pinching: self.gesture(Handedness::Left) == HandGesture::Pinch,
                right_pinching: self.gesture(Handedness::Right) == HandGesture::Pinch,
                hovered_hand: None,
                grabbed_by_hand: None,
            },
        }
    }

    /// Summary against an external grab engine fed with
    /// [`grab_inputs`](Self::grab_inputs). Controller holders map to no hand.
    #[must_use]
    pub fn result_for(&self, grab: &GrabInteraction) -> HandTrackingResult {
        let (hovered, grabbed) = match grab.phase() {
            GrabPhase::Idle => (None, None),
            GrabPhase::Hovered { by } => (Some(by), None),
            GrabPhase::Grabbed { by } => (Some(by), Some(by)),
        };
        HandTrackingResult {
            left_pinching: self.gesture(Handedness::Left) == HandGesture::Pinch,
            right_pinching: self.gesture(Handedness::Right) == HandGesture::Pinch,
            hovered_hand: hovered.and_then(|s| self.handedness_of(s)),
            grabbed_by_hand: grabbed.and_then(|s| self.handedness_of(s)),
        }
    }

    /// End every gesture, emitting the closing edges.
    pub fn end_gestures(&mut self) -> Vec<GestureEvent> {
        let mut gestures = Vec::new();
        for hand in std::mem::take(&mut self.hands) {
            push_edges(&mut gestures, hand.source, hand.handedness, hand.gesture, HandGesture::None);
        }
        gestures
    }

    /// End every gesture and release any hand grab.
    pub fn cancel(&mut self, haptics: &mut dyn Haptics) -> HandTrackingUpdate {
        let gestures = self.end_gestures();
        let grab = self
            .grab
            .as_mut()
            .map(|grab| grab.cancel(haptics))
            .unwrap_or_default();
        HandTrackingUpdate { gestures, grab }
    }
}

fn push_edges(
    out: &mut Vec<GestureEvent>,
    source: InputSourceId,
    handedness: Handedness,
    from: HandGesture,
    to: HandGesture,
) {
    for edge in edges(from, to) {
        debug!(message = "hand.gesture", source = %source, edge = ?edge);
        out.push(GestureEvent {
            source,
            handedness,
            edge,
        });
    }
}
