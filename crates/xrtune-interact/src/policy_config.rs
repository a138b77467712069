#![forbid(unsafe_code)]

//! Interaction policy as data.
//!
//! Groups the grab, hand-gesture, and anchor tunables into one
//! [`InteractionPolicy`] that can be loaded from TOML or JSON at startup.
//!
//! # Loading
//!
//! ```toml
//! # xrtune-policy.toml
//! [grab]
//! min_distance = 0.3
//! grid_size = 0.05
//!
//! [hand]
//! pinch_threshold = 0.025
//!
//! [anchor]
//! smoothing = 0.2
//! policy = { kind = "controller", hand = "left" }
//! ```
//!
//! ```rust,ignore
//! let policy = InteractionPolicy::load_validated("xrtune-policy.toml")?;
//! ```
//!
//! # Defaults
//!
//! Every field defaults to the engine's own `Default`, so an empty file
//! yields `InteractionPolicy::default()`.

#[cfg(feature = "policy-config")]
use std::path::Path;

#[cfg(feature = "policy-config")]
use serde::{Deserialize, Serialize};

use crate::anchor::AnchorConfig;
use crate::grab::GrabConfig;
use crate::hand::HandGestureConfig;

/// Tunables for every interaction engine.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "policy-config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct InteractionPolicy {
    /// Grab engine.
    pub grab: GrabConfig,
    /// Gesture thresholds.
    pub hand: HandGestureConfig,
    /// Anchor engine.
    pub anchor: AnchorConfig,
}

impl InteractionPolicy {
    /// Load from a TOML string.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(s: &str) -> Result<Self, PolicyConfigError> {
        toml::from_str(s).map_err(PolicyConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, PolicyConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    #[cfg(feature = "policy-config")]
    pub fn from_json_str(s: &str) -> Result<Self, PolicyConfigError> {
        serde_json::from_str(s).map_err(PolicyConfigError::Json)
    }

    /// Load from a JSON file on disk.
    #[cfg(feature = "policy-config")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PolicyConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Load a file by extension (`.json`, otherwise TOML) and reject it if
    /// [`validate`](Self::validate) finds problems.
    #[cfg(feature = "policy-config")]
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self, PolicyConfigError> {
        let path = path.as_ref();
        let policy = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path)?,
            _ => Self::from_toml_file(path)?,
        };
        policy.validated()
    }

    /// `self` if valid, otherwise every problem as one error.
    pub fn validated(self) -> Result<Self, PolicyConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(PolicyConfigError::Validation(errors))
        }
    }

    /// Serialize to a single-line JSON object.
    #[cfg(feature = "policy-config")]
    pub fn to_json_string(&self) -> Result<String, PolicyConfigError> {
        serde_json::to_string(self).map_err(PolicyConfigError::Json)
    }

    /// Check every parameter range.
    ///
    /// Returns a list of validation errors. An empty list means the policy
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let grab = &self.grab;

        if !(grab.max_hover_distance.is_finite() && grab.max_hover_distance > 0.0) {
            errors.push(format!(
                "grab.max_hover_distance must be > 0, got {}",
                grab.max_hover_distance
            ));
        }
        if !(grab.near_radius.is_finite() && grab.near_radius >= 0.0) {
            errors.push(format!("grab.near_radius must be >= 0, got {}", grab.near_radius));
        }
        if !(grab.min_distance.is_finite() && grab.min_distance >= 0.0) {
            errors.push(format!("grab.min_distance must be >= 0, got {}", grab.min_distance));
        }
        if !(grab.max_distance > grab.min_distance) {
            errors.push(format!(
                "grab.max_distance must be > grab.min_distance, got {} <= {}",
                grab.max_distance, grab.min_distance
            ));
        }
        if let Some(grid) = grab.grid_size
            && !(grid.is_finite() && grid > 0.0)
        {
            errors.push(format!("grab.grid_size must be > 0, got {grid}"));
        }
        if grab.grab_buttons.is_empty() {
            errors.push("grab.grab_buttons must name at least one button".into());
        }

        if !(self.hand.pinch_threshold.is_finite() && self.hand.pinch_threshold > 0.0) {
            errors.push(format!(
                "hand.pinch_threshold must be > 0, got {}",
                self.hand.pinch_threshold
            ));
        }
        if !(self.hand.point_extension_ratio >= 1.0) {
            errors.push(format!(
                "hand.point_extension_ratio must be >= 1, got {}",
                self.hand.point_extension_ratio
            ));
        }

        let smoothing = self.anchor.smoothing;
        if !(smoothing > 0.0 && smoothing <= 1.0) {
            errors.push(format!("anchor.smoothing must be in (0, 1], got {smoothing}"));
        }
        if !self.anchor.offset.is_finite() {
            errors.push("anchor.offset must be finite".into());
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors that can occur when loading an interaction policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyConfigError {
    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[cfg(feature = "policy-config")]
    #[error("TOML parse error: {0}")]
    Toml(#[source] toml::de::Error),
    /// JSON parse or encode error.
    #[cfg(feature = "policy-config")]
    #[error("JSON error: {0}")]
    Json(#[source] serde_json::Error),
    /// Validation errors.
    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::AnchorPolicy;

    #[test]
    fn default_matches_engine_defaults() {
        let policy = InteractionPolicy::default();
        assert_eq!(policy.grab, GrabConfig::default());
        assert_eq!(policy.hand, HandGestureConfig::default());
        assert_eq!(policy.anchor, AnchorConfig::default());
    }

    #[test]
    fn default_validates_clean() {
        let errors = InteractionPolicy::default().validate();
        assert!(errors.is_empty(), "default should validate: {errors:?}");
    }

    #[test]
    fn validate_catches_inverted_distances() {
        let mut policy = InteractionPolicy::default();
        policy.grab.min_distance = 2.0;
        policy.grab.max_distance = 1.0;
        let errors = policy.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("grab.max_distance"));
    }

    #[test]
    fn validate_catches_bad_grid_and_nan() {
        let mut policy = InteractionPolicy::default();
        policy.grab.grid_size = Some(0.0);
        policy.grab.max_hover_distance = f32::NAN;
        let errors = policy.validate();
        assert_eq!(errors.len(), 2, "{errors:?}");
    }

    #[test]
    fn validate_catches_bad_hand_thresholds() {
        let mut policy = InteractionPolicy::default();
        policy.hand.pinch_threshold = 0.0;
        policy.hand.point_extension_ratio = 0.5;
        assert_eq!(policy.validate().len(), 2);
    }

    #[test]
    fn validate_catches_bad_smoothing() {
        let mut policy = InteractionPolicy::default();
        policy.anchor.smoothing = 0.0;
        assert!(policy.validate()[0].contains("anchor.smoothing"));
        policy.anchor.smoothing = 1.0;
        assert!(policy.validate().is_empty());
    }

    #[test]
    fn validated_wraps_errors() {
        let mut policy = InteractionPolicy::default();
        policy.grab.grab_buttons = xrtune_core::ButtonMask::empty();
        let err = policy.validated().expect_err("empty button mask");
        assert!(matches!(err, PolicyConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().starts_with("validation errors: grab.grab_buttons"));
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn toml_partial_override() {
        let policy = InteractionPolicy::from_toml_str(
            r#"
            [grab]
            min_distance = 0.3
            grid_size = 0.05

            [anchor]
            smoothing = 0.2
            policy = { kind = "controller", hand = "left" }
            "#,
        )
        .expect("valid toml");
        assert_eq!(policy.grab.min_distance, 0.3);
        assert_eq!(policy.grab.grid_size, Some(0.05));
        assert_eq!(policy.grab.max_distance, GrabConfig::default().max_distance);
        assert_eq!(
            policy.anchor.policy,
            AnchorPolicy::Controller {
                hand: xrtune_core::Handedness::Left
            }
        );
        assert_eq!(policy.hand, HandGestureConfig::default());
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn json_round_trip_and_errors() {
        let mut policy = InteractionPolicy::default();
        policy.anchor.policy = AnchorPolicy::Surface {
            surface: xrtune_core::SurfaceKind::Wall,
        };
        let json = policy.to_json_string().expect("serializable");
        assert_eq!(InteractionPolicy::from_json_str(&json).expect("parses"), policy);

        assert!(matches!(
            InteractionPolicy::from_json_str("{ not json"),
            Err(PolicyConfigError::Json(_))
        ));
        assert!(matches!(
            InteractionPolicy::from_toml_str("grab = 3"),
            Err(PolicyConfigError::Toml(_))
        ));
        assert!(matches!(
            InteractionPolicy::load_validated("/definitely/missing/policy.toml"),
            Err(PolicyConfigError::Io(_))
        ));
    }

    #[test]
    fn anchor_policy_variants_are_constructible() {
        let mut policy = InteractionPolicy::default();
        policy.anchor.policy = AnchorPolicy::Object {
            node: xrtune_core::NodeId(1),
        };
        assert!(policy.validate().is_empty());
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn file_loaders_read_and_report_io() {
        use std::io::Write;

        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("temp file");
        write!(file, r#"{{ "hand": {{ "pinch_threshold": 0.03 }} }}"#).expect("write");
        let policy = InteractionPolicy::load_validated(file.path()).expect("valid json");
        assert_eq!(policy.hand.pinch_threshold, 0.03);

        let missing = file.path().with_extension("toml");
        assert!(matches!(
            InteractionPolicy::from_toml_file(&missing),
            Err(PolicyConfigError::Io(_))
        ));
    }
}
