#![forbid(unsafe_code)]

//! Control records: the flat, addressable form of a parsed schema.
//!
//! Each record pairs a [`ControlPath`] with a [`ControlKind`], a closed
//! tagged variant carrying the per-kind constraints. Rendering and update
//! code match on it exhaustively.

use std::fmt;
use std::rc::Rc;

use xrtune_core::glam::Vec3;

use crate::path::ControlPath;
use crate::value::ControlValue;

/// Callback run after a control's value changes.
pub type ChangeCallback = Rc<dyn Fn(&ControlValue)>;

// ---------------------------------------------------------------------------
// Kind payloads
// ---------------------------------------------------------------------------

/// Numeric constraints shared by numbers and per-axis by vectors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NumberRange {
    /// Inclusive lower bound.
    pub min: Option<f64>,
    /// Inclusive upper bound.
    pub max: Option<f64>,
    /// Quantization step, measured from `min` (or 0).
    pub step: Option<f64>,
}

impl NumberRange {
    /// No constraints.
    pub const UNBOUNDED: Self = Self {
        min: None,
        max: None,
        step: None,
    };

    /// Clamp into `[min, max]`, round to the nearest step, clamp again.
    ///
    /// Returns `None` for NaN. A range whose `min` exceeds `max` clamps to
    /// `min`.
    #[must_use]
    pub fn sanitize(&self, value: f64) -> Option<f64> {
        if value.is_nan() {
            return None;
        }
        let mut v = self.clamp(value);
        if let Some(step) = self.step.filter(|s| *s > 0.0 && s.is_finite()) {
            let base = self.min.unwrap_or(0.0);
            v = base + ((v - base) / step).round() * step;
            v = self.clamp(v);
        }
        Some(v)
    }

    /// Per-axis [`sanitize`](Self::sanitize) for vectors.
    #[must_use]
    pub fn sanitize_vec3(&self, value: Vec3) -> Option<Vec3> {
        Some(Vec3::new(
            self.sanitize(f64::from(value.x))? as f32,
            self.sanitize(f64::from(value.y))? as f32,
            self.sanitize(f64::from(value.z))? as f32,
        ))
    }

    fn clamp(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(max) = self.max {
            v = v.min(max);
        }
        if let Some(min) = self.min {
            v = v.max(min);
        }
        v
    }
}

/// One entry of a select control.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    /// Text shown to the user.
    pub label: String,
    /// Value stored when chosen.
    pub value: ControlValue,
}

impl SelectOption {
    /// Create an option.
    #[must_use]
    pub fn new(label: impl Into<String>, value: impl Into<ControlValue>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    /// An option labelled with its own value.
    #[must_use]
    pub fn from_value(value: impl Into<ControlValue>) -> Self {
        let value = value.into();
        Self {
            label: value.to_string(),
            value,
        }
    }
}

/// Invocation target of a button control.
#[derive(Clone)]
pub struct ButtonAction(Rc<dyn Fn()>);

impl ButtonAction {
    /// Wrap a closure.
    pub fn new(action: impl Fn() + 'static) -> Self {
        Self(Rc::new(action))
    }

    /// Run the action.
    pub fn invoke(&self) {
        (self.0)();
    }

    /// Whether two actions share the same closure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ButtonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ButtonAction").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ControlKind
// ---------------------------------------------------------------------------

/// Kind of a control with its constraints.
#[derive(Debug, Clone)]
pub enum ControlKind {
    /// Number with optional range and step.
    Number(NumberRange),
    /// Toggle.
    Boolean,
    /// Free text.
    String,
    /// Color swatch.
    Color,
    /// 3D vector, constraints applied per axis.
    Vector3(NumberRange),
    /// One of a fixed set of values.
    Select(Vec<SelectOption>),
    /// Action button. Holds no value.
    Button(ButtonAction),
    /// Grouping node. Holds no value.
    Folder,
}

impl ControlKind {
    /// The payload-free tag.
    #[must_use]
    pub const fn control_type(&self) -> ControlType {
        match self {
            Self::Number(_) => ControlType::Number,
            Self::Boolean => ControlType::Boolean,
            Self::String => ControlType::String,
            Self::Color => ControlType::Color,
            Self::Vector3(_) => ControlType::Vector3,
            Self::Select(_) => ControlType::Select,
            Self::Button(_) => ControlType::Button,
            Self::Folder => ControlType::Folder,
        }
    }

    /// Whether records of this kind keep a value in the value map.
    #[must_use]
    pub const fn holds_value(&self) -> bool {
        !matches!(self, Self::Button(_) | Self::Folder)
    }

    /// Coerce `value` into something this kind can store, applying the
    /// clamp-and-round policy. `None` means the value is rejected.
    #[must_use]
    pub fn accept(&self, value: ControlValue) -> Option<ControlValue> {
        match (self, value) {
            (Self::Number(range), ControlValue::Number(n)) => {
                range.sanitize(n).map(ControlValue::Number)
            }
            (Self::Boolean, v @ ControlValue::Bool(_)) => Some(v),
            (Self::String, v @ ControlValue::String(_)) => Some(v),
            (Self::Color, v @ ControlValue::Color(_)) => Some(v),
            (Self::Color, ControlValue::String(s)) => {
                crate::value::Color::parse_hex(&s).map(ControlValue::Color)
            }
            (Self::Vector3(range), ControlValue::Vector3(v)) => {
                range.sanitize_vec3(v).map(ControlValue::Vector3)
            }
            (Self::Select(options), v) => options.iter().any(|o| o.value == v).then_some(v),
            _ => None,
        }
    }

    /// Value used when a declaration gives none.
    #[must_use]
    pub fn default_value(&self) -> Option<ControlValue> {
        match self {
            Self::Number(range) => Some(ControlValue::Number(
                range.min.or(range.max).unwrap_or(0.0),
            )),
            Self::Boolean => Some(ControlValue::Bool(false)),
            Self::String => Some(ControlValue::String(String::new())),
            Self::Color => Some(ControlValue::Color(crate::value::Color::BLACK)),
            Self::Vector3(range) => {
                let v = range.min.or(range.max).unwrap_or(0.0) as f32;
                Some(ControlValue::Vector3(Vec3::splat(v)))
            }
            Self::Select(options) => options.first().map(|o| o.value.clone()),
            Self::Button(_) | Self::Folder => None,
        }
    }
}

/// Payload-free control tag for dispatch and explicit kind overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlType {
    /// See [`ControlKind::Number`].
    Number,
    /// See [`ControlKind::Boolean`].
    Boolean,
    /// See [`ControlKind::String`].
    String,
    /// See [`ControlKind::Color`].
    Color,
    /// See [`ControlKind::Vector3`].
    Vector3,
    /// See [`ControlKind::Select`].
    Select,
    /// See [`ControlKind::Button`].
    Button,
    /// See [`ControlKind::Folder`].
    Folder,
}

impl ControlType {
    /// Lowercase name, as used in JSON declarations.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Color => "color",
            Self::Vector3 => "vector3",
            Self::Select => "select",
            Self::Button => "button",
            Self::Folder => "folder",
        }
    }

    /// Inverse of [`name`](Self::name).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "number" => Self::Number,
            "boolean" | "bool" => Self::Boolean,
            "string" => Self::String,
            "color" => Self::Color,
            "vector3" => Self::Vector3,
            "select" => Self::Select,
            "button" => Self::Button,
            "folder" => Self::Folder,
            _ => return None,
        })
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Presentation and behavior options shared by all kinds.
#[derive(Clone, Default)]
pub struct ControlConfig {
    /// Display label; the path key is used when absent.
    pub label: Option<String>,
    /// Tooltip text.
    pub hint: Option<String>,
    /// Rendered read-only.
    pub disabled: bool,
    /// Called after each accepted value change.
    pub on_change: Option<ChangeCallback>,
}

impl fmt::Debug for ControlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlConfig")
            .field("label", &self.label)
            .field("hint", &self.hint)
            .field("disabled", &self.disabled)
            .field("on_change", &self.on_change.is_some())
            .finish()
    }
}

/// One addressable leaf control or folder.
#[derive(Debug, Clone)]
pub struct ControlRecord {
    /// Unique address.
    pub path: ControlPath,
    /// Kind and constraints.
    pub kind: ControlKind,
    /// Presentation options.
    pub config: ControlConfig,
    /// Declared (or substituted) initial value.
    pub initial: Option<ControlValue>,
}

impl ControlRecord {
    /// Label to display: explicit label or the last path segment.
    #[must_use]
    pub fn label(&self) -> &str {
        self.config.label.as_deref().unwrap_or_else(|| self.path.key())
    }

    /// Shortcut for `self.kind.control_type()`.
    #[must_use]
    pub const fn control_type(&self) -> ControlType {
        self.kind.control_type()
    }
}

/// Folder-level options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FolderSettings {
    /// Display label; the folder key is used when absent.
    pub label: Option<String>,
    /// Start collapsed.
    pub collapsed: bool,
    /// Sort hint for renderers, lower first.
    pub order: i32,
}

impl FolderSettings {
    /// Builder-style label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Builder-style collapsed flag.
    #[must_use]
    pub fn collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = collapsed;
        self
    }

    /// Builder-style order.
    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

/// Direct children of one folder (or of a registration root).
#[derive(Debug, Clone, PartialEq)]
pub struct FolderMembership {
    /// Folder path.
    pub path: ControlPath,
    /// Direct children in declaration order.
    pub children: Vec<ControlPath>,
    /// Folder options.
    pub settings: FolderSettings,
}
