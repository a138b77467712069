#![forbid(unsafe_code)]

//! Controls: schema parsing, the reactive registry, and panel projection.
//!
//! # Role in xrtune
//! Applications declare tunable parameters as a [`Schema`] near their point
//! of use and register it under an id. The [`ControlRegistry`] flattens it to
//! dot-joined paths (`"ctrl.light.intensity"`), keeps the live values, and
//! notifies subscribers when a value changes. Panels read a [`PanelView`]
//! projected from the registry and write user edits back through
//! [`ControlRegistry::set_value`].
//!
//! # Example
//!
//! ```
//! use xrtune_controls::{ControlRegistry, ControlSpec, ControlValue, Schema};
//!
//! let registry = ControlRegistry::new();
//! registry.register(
//!     "ctrl",
//!     &Schema::new().control("speed", ControlSpec::new(1.0).min(0.0).max(5.0)),
//! );
//! let _sub = registry.subscribe("ctrl.speed", |v| println!("speed = {v}"));
//! registry.set_value("ctrl.speed", 10.0);
//! assert_eq!(registry.get_value("ctrl.speed"), Some(ControlValue::Number(5.0)));
//! ```

pub mod global;
pub mod path;
pub mod projection;
pub mod record;
pub mod registry;
pub mod schema;
pub mod value;

pub use path::ControlPath;
pub use projection::{
    ControlView, FolderView, PanelOptions, PanelState, PanelView, project, select_active_folder,
};
pub use record::{
    ButtonAction, ControlConfig, ControlKind, ControlRecord, ControlType, FolderMembership,
    FolderSettings, NumberRange, SelectOption,
};
pub use registry::{ControlRegistry, RegisterOutcome, SchemaRejected, SetOutcome, Subscription};
pub use schema::{ControlSpec, DiagnosticKind, Entry, ParsedSchema, Schema, SchemaDiagnostic, parse};
pub use value::{Color, ControlValue};
