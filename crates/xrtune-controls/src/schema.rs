#![forbid(unsafe_code)]

//! Schema declarations and the parser that flattens them.
//!
//! A [`Schema`] is an ordered list of `(key, Entry)` pairs. Each entry is a
//! raw value, a config object ([`ControlSpec`]), a nested folder, or a
//! button. [`parse`] turns a schema registered under an id into flat
//! [`ControlRecord`]s with fully qualified paths, folder memberships, and
//! diagnostics.
//!
//! Schemas can be built with the typed builder or loaded from JSON with
//! [`Schema::from_json`]; both go through the same inference rules.
//!
//! # Inference
//!
//! When no explicit kind is given:
//!
//! 1. a closure is a button,
//! 2. an option list makes a select,
//! 3. a string matching the hex color pattern makes a color,
//! 4. a vector-like value makes a vector3,
//! 5. otherwise the primitive type decides (number, boolean, string).
//!
//! # Failure Modes
//!
//! Parsing never fails as a whole. A leaf with no resolvable initial value
//! (a config object with neither `value`, `options`, nor `min`) becomes an
//! empty string control; a value that does not fit its kind is replaced by
//! the kind's default. Each substitution yields one [`SchemaDiagnostic`] and
//! one `warn` event, and siblings are unaffected.

use std::fmt;

use serde_json::{Map, Value};
use tracing::warn;
use xrtune_core::glam::Vec3;

use crate::path::ControlPath;
use crate::record::{
    ButtonAction, ControlConfig, ControlKind, ControlRecord, ControlType, FolderMembership,
    FolderSettings, NumberRange, SelectOption,
};
use crate::value::{Color, ControlValue};

/// JSON key carrying folder-level settings inside a folder object.
pub const FOLDER_SETTINGS_KEY: &str = "$folder";

/// Keys that may appear in a JSON config object.
const CONFIG_KEYS: [&str; 9] = [
    "value", "type", "min", "max", "step", "options", "label", "hint", "disabled",
];

/// Keys that mark an object without `value` as a config object rather than
/// a folder.
const CONFIG_MARKER_KEYS: [&str; 5] = ["type", "min", "max", "step", "options"];

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// A config object: an optional initial value plus constraints.
#[derive(Debug, Clone, Default)]
pub struct ControlSpec {
    /// Initial value.
    pub value: Option<ControlValue>,
    /// Explicit kind, bypassing inference.
    pub kind: Option<ControlType>,
    /// Numeric constraints (numbers and vectors).
    pub range: NumberRange,
    /// Choices; their presence makes a select.
    pub options: Option<Vec<SelectOption>>,
    /// Presentation and change callback.
    pub config: ControlConfig,
}

impl ControlSpec {
    /// A spec with an initial value.
    #[must_use]
    pub fn new(value: impl Into<ControlValue>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// A spec with no initial value.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Force the control kind.
    #[must_use]
    pub fn kind(mut self, kind: ControlType) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Inclusive lower bound.
    #[must_use]
    pub fn min(mut self, min: f64) -> Self {
        self.range.min = Some(min);
        self
    }

    /// Inclusive upper bound.
    #[must_use]
    pub fn max(mut self, max: f64) -> Self {
        self.range.max = Some(max);
        self
    }

    /// Quantization step.
    #[must_use]
    pub fn step(mut self, step: f64) -> Self {
        self.range.step = Some(step);
        self
    }

    /// Select choices.
    #[must_use]
    pub fn options(mut self, options: impl IntoIterator<Item = SelectOption>) -> Self {
        self.options = Some(options.into_iter().collect());
        self
    }

    /// Display label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = Some(label.into());
        self
    }

    /// Tooltip.
    #[must_use]
    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.config.hint = Some(hint.into());
        self
    }

    /// Render read-only.
    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.config.disabled = disabled;
        self
    }

    /// Callback run after each accepted change.
    #[must_use]
    pub fn on_change(mut self, callback: impl Fn(&ControlValue) + 'static) -> Self {
        self.config.on_change = Some(std::rc::Rc::new(callback));
        self
    }
}

/// One declared entry.
#[derive(Debug, Clone)]
pub enum Entry {
    /// A raw value; kind is inferred.
    Value(ControlValue),
    /// A config object.
    Control(ControlSpec),
    /// A nested declaration.
    Folder(Schema, FolderSettings),
    /// An action button.
    Button(ButtonAction, ControlConfig),
}

/// An ordered declaration of controls and folders.
///
/// Keys are unique within one level; adding a key twice replaces the
/// earlier entry in place.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entries: Vec<(String, Entry)>,
}

impl Schema {
    /// An empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    #[must_use]
    pub fn entry(mut self, key: impl Into<String>, entry: Entry) -> Self {
        self.insert(key, entry);
        self
    }

    /// Add or replace an entry in place.
    pub fn insert(&mut self, key: impl Into<String>, entry: Entry) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = entry;
        } else {
            self.entries.push((key, entry));
        }
    }

    /// A raw value with inferred kind.
    #[must_use]
    pub fn value(self, key: impl Into<String>, value: impl Into<ControlValue>) -> Self {
        self.entry(key, Entry::Value(value.into()))
    }

    /// A config object.
    #[must_use]
    pub fn control(self, key: impl Into<String>, spec: ControlSpec) -> Self {
        self.entry(key, Entry::Control(spec))
    }

    /// A folder with default settings.
    #[must_use]
    pub fn folder(self, key: impl Into<String>, nested: Self) -> Self {
        self.entry(key, Entry::Folder(nested, FolderSettings::default()))
    }

    /// A folder with explicit settings.
    #[must_use]
    pub fn folder_with(self, key: impl Into<String>, nested: Self, settings: FolderSettings) -> Self {
        self.entry(key, Entry::Folder(nested, settings))
    }

    /// An action button.
    #[must_use]
    pub fn button(self, key: impl Into<String>, action: impl Fn() + 'static) -> Self {
        self.entry(
            key,
            Entry::Button(ButtonAction::new(action), ControlConfig::default()),
        )
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    /// Entry for `key` at this level.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    /// Number of entries at this level.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this level is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a schema from a JSON object.
    ///
    /// Objects carrying `value` (or only config keys such as `min` or
    /// `options`) are config objects; `{x, y, z}` objects and 3-element
    /// numeric arrays are vectors; any other object is a folder whose
    /// optional `"$folder"` key holds `label`, `collapsed`, and `order`.
    /// A non-object root yields an empty schema.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => json_folder(map).0,
            other => {
                warn!(
                    message = "schema.json_root_not_object",
                    found = json_type_name(other)
                );
                Self::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// What went wrong with one declared entry.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticKind {
    /// No value, options, or minimum to derive an initial value from.
    MissingValue,
    /// The declared value does not fit the control kind.
    KindMismatch {
        /// Kind the control was given.
        expected: ControlType,
        /// Type name of the declared value.
        found: &'static str,
    },
    /// The declared value is not one of the select options.
    NotInOptions,
    /// A select declared an empty option list.
    EmptyOptions,
    /// The explicit kind cannot be used on a config object.
    UnsupportedKind(ControlType),
    /// The key is empty or contains the path separator; the entry is skipped.
    InvalidKey,
}

/// One recovered schema defect.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDiagnostic {
    /// Path of the defective entry.
    pub path: ControlPath,
    /// Defect category.
    pub kind: DiagnosticKind,
    /// Value used instead, if any.
    pub substituted: Option<ControlValue>,
}

impl fmt::Display for SchemaDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::MissingValue => {
                write!(f, "{}: no resolvable initial value", self.path)?;
            }
            DiagnosticKind::KindMismatch { expected, found } => {
                write!(f, "{}: {found} value does not fit a {expected} control", self.path)?;
            }
            DiagnosticKind::NotInOptions => {
                write!(f, "{}: value is not one of the options", self.path)?;
            }
            DiagnosticKind::EmptyOptions => write!(f, "{}: select has no options", self.path)?,
            DiagnosticKind::UnsupportedKind(kind) => {
                write!(f, "{}: kind {kind} cannot be declared as a config object", self.path)?;
            }
            DiagnosticKind::InvalidKey => {
                return write!(f, "{}: invalid key, entry skipped", self.path);
            }
        }
        match &self.substituted {
            Some(value) => write!(f, ", using {value:?}"),
            None => Ok(()),
        }
    }
}

impl std::error::Error for SchemaDiagnostic {}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Output of [`parse`].
#[derive(Debug, Clone, Default)]
pub struct ParsedSchema {
    /// Records in depth-first declaration order, folders before children.
    pub records: Vec<ControlRecord>,
    /// Folder memberships; the first entry is the registration root.
    pub folders: Vec<FolderMembership>,
    /// Recovered defects.
    pub diagnostics: Vec<SchemaDiagnostic>,
}

/// Flatten `schema` registered under `id`.
#[must_use]
pub fn parse(id: &str, schema: &Schema) -> ParsedSchema {
    let root = ControlPath::new(id);
    let mut out = ParsedSchema::default();
    if !ControlPath::is_valid_segment(id) {
        warn!(message = "schema.invalid_id", id);
        out.diagnostics.push(SchemaDiagnostic {
            path: root,
            kind: DiagnosticKind::InvalidKey,
            substituted: None,
        });
        return out;
    }
    let children = parse_level(&root, schema, &mut out);
    out.folders.insert(
        0,
        FolderMembership {
            path: root,
            children,
            settings: FolderSettings::default(),
        },
    );
    for diagnostic in &out.diagnostics {
        warn!(
            message = "schema.diagnostic",
            path = diagnostic.path.as_str(),
            detail = %diagnostic
        );
    }
    out
}

fn parse_level(parent: &ControlPath, schema: &Schema, out: &mut ParsedSchema) -> Vec<ControlPath> {
    let mut children = Vec::with_capacity(schema.len());
    for (key, entry) in schema.entries() {
        let path = parent.child(key);
        if !ControlPath::is_valid_segment(key) {
            out.diagnostics.push(SchemaDiagnostic {
                path,
                kind: DiagnosticKind::InvalidKey,
                substituted: None,
            });
            continue;
        }
        let record = match entry {
            Entry::Value(value) => {
                let (kind, initial) = infer_raw(value);
                ControlRecord {
                    path: path.clone(),
                    kind,
                    config: ControlConfig::default(),
                    initial: Some(initial),
                }
            }
            Entry::Control(spec) => resolve_spec(&path, spec, &mut out.diagnostics),
            Entry::Button(action, config) => ControlRecord {
                path: path.clone(),
                kind: ControlKind::Button(action.clone()),
                config: config.clone(),
                initial: None,
            },
            Entry::Folder(nested, settings) => {
                out.records.push(ControlRecord {
                    path: path.clone(),
                    kind: ControlKind::Folder,
                    config: ControlConfig {
                        label: settings.label.clone(),
                        ..ControlConfig::default()
                    },
                    initial: None,
                });
                let grandchildren = parse_level(&path, nested, out);
                out.folders.push(FolderMembership {
                    path: path.clone(),
                    children: grandchildren,
                    settings: settings.clone(),
                });
                children.push(path);
                continue;
            }
        };
        out.records.push(record);
        children.push(path);
    }
    children
}

fn infer_raw(value: &ControlValue) -> (ControlKind, ControlValue) {
    match value {
        ControlValue::Number(_) => (ControlKind::Number(NumberRange::UNBOUNDED), value.clone()),
        ControlValue::Bool(_) => (ControlKind::Boolean, value.clone()),
        ControlValue::String(s) => match Color::parse_hex(s) {
            Some(color) => (ControlKind::Color, ControlValue::Color(color)),
            None => (ControlKind::String, value.clone()),
        },
        ControlValue::Color(_) => (ControlKind::Color, value.clone()),
        ControlValue::Vector3(_) => (ControlKind::Vector3(NumberRange::UNBOUNDED), value.clone()),
    }
}

fn infer_type(spec: &ControlSpec) -> Option<ControlType> {
    if spec.options.is_some() {
        return Some(ControlType::Select);
    }
    match &spec.value {
        Some(ControlValue::String(s)) if Color::is_hex(s) => Some(ControlType::Color),
        Some(ControlValue::Number(_)) => Some(ControlType::Number),
        Some(ControlValue::Bool(_)) => Some(ControlType::Boolean),
        Some(ControlValue::String(_)) => Some(ControlType::String),
        Some(ControlValue::Color(_)) => Some(ControlType::Color),
        Some(ControlValue::Vector3(_)) => Some(ControlType::Vector3),
        None => spec.range.min.map(|_| ControlType::Number),
    }
}

fn fallback_string(
    path: &ControlPath,
    config: &ControlConfig,
    kind: DiagnosticKind,
    diagnostics: &mut Vec<SchemaDiagnostic>,
) -> ControlRecord {
    let initial = ControlValue::String(String::new());
    diagnostics.push(SchemaDiagnostic {
        path: path.clone(),
        kind,
        substituted: Some(initial.clone()),
    });
    ControlRecord {
        path: path.clone(),
        kind: ControlKind::String,
        config: config.clone(),
        initial: Some(initial),
    }
}

fn resolve_spec(
    path: &ControlPath,
    spec: &ControlSpec,
    diagnostics: &mut Vec<SchemaDiagnostic>,
) -> ControlRecord {
    let Some(ty) = spec.kind.or_else(|| infer_type(spec)) else {
        return fallback_string(path, &spec.config, DiagnosticKind::MissingValue, diagnostics);
    };

    let kind = match ty {
        ControlType::Number => ControlKind::Number(spec.range),
        ControlType::Boolean => ControlKind::Boolean,
        ControlType::String => ControlKind::String,
        ControlType::Color => ControlKind::Color,
        ControlType::Vector3 => ControlKind::Vector3(spec.range),
        ControlType::Select => match &spec.options {
            Some(options) if !options.is_empty() => ControlKind::Select(options.clone()),
            _ => {
                return fallback_string(
                    path,
                    &spec.config,
                    DiagnosticKind::EmptyOptions,
                    diagnostics,
                );
            }
        },
        ControlType::Button | ControlType::Folder => {
            return fallback_string(
                path,
                &spec.config,
                DiagnosticKind::UnsupportedKind(ty),
                diagnostics,
            );
        }
    };

    let initial = match &spec.value {
        Some(declared) => match kind.accept(declared.clone()) {
            Some(accepted) => Some(accepted),
            None => {
                let substituted = kind.default_value();
                let defect = if ty == ControlType::Select {
                    DiagnosticKind::NotInOptions
                } else {
                    DiagnosticKind::KindMismatch {
                        expected: ty,
                        found: declared.type_name(),
                    }
                };
                diagnostics.push(SchemaDiagnostic {
                    path: path.clone(),
                    kind: defect,
                    substituted: substituted.clone(),
                });
                substituted
            }
        },
        None => kind.default_value(),
    };

    ControlRecord {
        path: path.clone(),
        kind,
        config: spec.config.clone(),
        initial,
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn json_vector(value: &Value) -> Option<Vec3> {
    match value {
        Value::Array(items) if items.len() == 3 => {
            let x = items[0].as_f64()?;
            let y = items[1].as_f64()?;
            let z = items[2].as_f64()?;
            Some(Vec3::new(x as f32, y as f32, z as f32))
        }
        Value::Object(map) => {
            let x = map.get("x")?.as_f64()?;
            let y = map.get("y")?.as_f64()?;
            let z = map.get("z")?.as_f64()?;
            Some(Vec3::new(x as f32, y as f32, z as f32))
        }
        _ => None,
    }
}

fn json_value(value: &Value) -> Option<ControlValue> {
    match value {
        Value::Bool(b) => Some(ControlValue::Bool(*b)),
        Value::Number(n) => n.as_f64().map(ControlValue::Number),
        Value::String(s) => Some(ControlValue::String(s.clone())),
        Value::Array(_) | Value::Object(_) => json_vector(value).map(ControlValue::Vector3),
        Value::Null => None,
    }
}

fn json_options(value: &Value) -> Option<Vec<SelectOption>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(json_value)
                .map(SelectOption::from_value)
                .collect(),
        ),
        Value::Object(map) => Some(
            map.iter()
                .filter_map(|(label, v)| json_value(v).map(|v| SelectOption::new(label.clone(), v)))
                .collect(),
        ),
        _ => None,
    }
}

fn json_spec(map: &Map<String, Value>) -> ControlSpec {
    let number = |key: &str| map.get(key).and_then(Value::as_f64);
    let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_owned);
    ControlSpec {
        value: map.get("value").and_then(json_value),
        kind: map
            .get("type")
            .and_then(Value::as_str)
            .and_then(ControlType::from_name),
        range: NumberRange {
            min: number("min"),
            max: number("max"),
            step: number("step"),
        },
        options: map.get("options").and_then(json_options),
        config: ControlConfig {
            label: text("label"),
            hint: text("hint"),
            disabled: map.get("disabled").and_then(Value::as_bool).unwrap_or(false),
            on_change: None,
        },
    }
}

fn is_config_object(map: &Map<String, Value>) -> bool {
    !map.is_empty()
        && map.keys().all(|k| CONFIG_KEYS.contains(&k.as_str()))
        && map.keys().any(|k| CONFIG_MARKER_KEYS.contains(&k.as_str()))
}

fn json_folder_settings(value: Option<&Value>) -> FolderSettings {
    let Some(Value::Object(map)) = value else {
        return FolderSettings::default();
    };
    FolderSettings {
        label: map.get("label").and_then(Value::as_str).map(str::to_owned),
        collapsed: map.get("collapsed").and_then(Value::as_bool).unwrap_or(false),
        order: map
            .get("order")
            .and_then(Value::as_i64)
            .and_then(|o| i32::try_from(o).ok())
            .unwrap_or(0),
    }
}

fn json_folder(map: &Map<String, Value>) -> (Schema, FolderSettings) {
    let mut schema = Schema::new();
    for (key, value) in map {
        if key == FOLDER_SETTINGS_KEY {
            continue;
        }
        schema.insert(key.clone(), json_entry(value));
    }
    (schema, json_folder_settings(map.get(FOLDER_SETTINGS_KEY)))
}

fn json_entry(value: &Value) -> Entry {
    match value {
        Value::Object(map) if map.contains_key("value") => Entry::Control(json_spec(map)),
        Value::Object(map) => {
            if let Some(v) = json_vector(value) {
                Entry::Value(ControlValue::Vector3(v))
            } else if is_config_object(map) {
                Entry::Control(json_spec(map))
            } else {
                let (nested, settings) = json_folder(map);
                Entry::Folder(nested, settings)
            }
        }
        other => match json_value(other) {
            Some(v) => Entry::Value(v),
            None => Entry::Control(ControlSpec::empty()),
        },
    }
}
