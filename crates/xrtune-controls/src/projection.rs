#![forbid(unsafe_code)]

//! Panel state projection.
//!
//! [`project`] derives a render-friendly [`PanelView`] from a registry
//! snapshot: the loose controls directly under the panel namespace, the
//! folders beneath it with their direct-child controls, and the active tab.
//! It only reads the registry.
//!
//! [`PanelState`] keeps what the user chose across refreshes (active tab,
//! collapse toggles) and re-projects only when the registry version moves.
//!
//! # Invariants
//!
//! 1. Loose controls and folders are sorted by path.
//! 2. Folder controls keep declaration order.
//! 3. With tabs disabled no folder is active; otherwise the active folder is
//!    the current one if it still exists, else the first folder.

use ahash::AHashMap;
use tracing::debug;

use crate::path::ControlPath;
use crate::record::{ControlRecord, ControlType};
use crate::registry::{ControlRegistry, RegistryInner};
use crate::value::ControlValue;

/// What part of the registry a panel shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelOptions {
    /// Path prefix the panel is scoped to. `None` shows every registration.
    pub namespace: Option<String>,
    /// Render folders as tabs (one active at a time).
    pub tabs: bool,
}

impl PanelOptions {
    /// Panel scoped to `namespace`.
    #[must_use]
    pub fn scoped(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            tabs: false,
        }
    }

    /// Builder-style tab mode.
    #[must_use]
    pub fn tabs(mut self, tabs: bool) -> Self {
        self.tabs = tabs;
        self
    }
}

/// One control as a renderer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlView {
    /// Address for `set_value`.
    pub path: ControlPath,
    /// Display label.
    pub label: String,
    /// Widget to draw.
    pub control_type: ControlType,
    /// Current value; `None` for buttons.
    pub value: Option<ControlValue>,
    /// Draw read-only.
    pub disabled: bool,
    /// Tooltip.
    pub hint: Option<String>,
}

impl ControlView {
    fn from_record(record: &ControlRecord, inner: &RegistryInner) -> Self {
        Self {
            path: record.path.clone(),
            label: record.label().to_owned(),
            control_type: record.control_type(),
            value: inner.values.get(&record.path).cloned(),
            disabled: record.config.disabled,
            hint: record.config.hint.clone(),
        }
    }
}

/// One folder with its direct-child controls.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderView {
    /// Folder path.
    pub path: ControlPath,
    /// Display label.
    pub label: String,
    /// Draw collapsed.
    pub collapsed: bool,
    /// Renderer sort hint.
    pub order: i32,
    /// Direct children that are not folders, in declaration order.
    pub controls: Vec<ControlView>,
}

/// Everything a panel renderer needs for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelView {
    /// Controls directly under the namespace.
    pub controls: Vec<ControlView>,
    /// Folders under the namespace, sorted by path.
    pub folders: Vec<FolderView>,
    /// Active tab, when tabs are enabled.
    pub active_folder: Option<ControlPath>,
}

impl PanelView {
    /// Folder at `path`.
    #[must_use]
    pub fn folder(&self, path: &str) -> Option<&FolderView> {
        self.folders.iter().find(|f| f.path.as_str() == path)
    }

    /// Index of the active folder.
    #[must_use]
    pub fn active_index(&self) -> Option<usize> {
        let active = self.active_folder.as_ref()?;
        self.folders.iter().position(|f| &f.path == active)
    }
}

/// Keep `current` if it still names a folder, else fall back to the first.
#[must_use]
pub fn select_active_folder(
    folders: &[FolderView],
    current: Option<&ControlPath>,
    tabs: bool,
) -> Option<ControlPath> {
    if !tabs {
        return None;
    }
    current
        .filter(|c| folders.iter().any(|f| &f.path == *c))
        .cloned()
        .or_else(|| folders.first().map(|f| f.path.clone()))
}

/// Project `registry` for a panel.
#[must_use]
pub fn project(
    registry: &ControlRegistry,
    options: &PanelOptions,
    current: Option<&ControlPath>,
) -> PanelView {
    registry.read(|inner| {
        let namespace = options.namespace.as_deref();
        let is_loose_parent = |parent: Option<ControlPath>| match (parent, namespace) {
            (Some(parent), Some(ns)) => parent.as_str() == ns,
            (Some(parent), None) => inner.ids.iter().any(|id| id == parent.as_str()),
            (None, _) => false,
        };
        let in_scope = |path: &ControlPath| match namespace {
            Some(ns) => path.is_within(ns) && path.as_str() != ns,
            None => true,
        };

        let mut controls: Vec<&ControlRecord> = inner
            .records
            .values()
            .filter(|r| r.control_type() != ControlType::Folder)
            .filter(|r| is_loose_parent(r.path.parent()))
            .collect();
        controls.sort_by(|a, b| a.path.cmp(&b.path));

        let mut folder_records: Vec<&ControlRecord> = inner
            .records
            .values()
            .filter(|r| r.control_type() == ControlType::Folder && in_scope(&r.path))
            .collect();
        folder_records.sort_by(|a, b| a.path.cmp(&b.path));

        let folders: Vec<FolderView> = folder_records
            .into_iter()
            .map(|record| folder_view(record, inner))
            .collect();

        let active_folder = select_active_folder(&folders, current, options.tabs);
        PanelView {
            controls: controls
                .into_iter()
                .map(|r| ControlView::from_record(r, inner))
                .collect(),
            folders,
            active_folder,
        }
    })
}

fn folder_view(record: &ControlRecord, inner: &RegistryInner) -> FolderView {
    let membership = inner.folders.get(&record.path);
    let controls = match membership {
        Some(membership) => membership
            .children
            .iter()
            .filter_map(|child| inner.records.get(child))
            .filter(|r| r.control_type() != ControlType::Folder)
            .map(|r| ControlView::from_record(r, inner))
            .collect(),
        None => {
            let mut children: Vec<_> = inner
                .records
                .values()
                .filter(|r| {
                    r.control_type() != ControlType::Folder
                        && r.path.is_child_of(record.path.as_str())
                })
                .collect();
            children.sort_by(|a, b| a.path.cmp(&b.path));
            children
                .into_iter()
                .map(|r| ControlView::from_record(r, inner))
                .collect()
        }
    };
    let settings = membership.map(|m| &m.settings);
    FolderView {
        path: record.path.clone(),
        label: record.label().to_owned(),
        collapsed: settings.is_some_and(|s| s.collapsed),
        order: settings.map_or(0, |s| s.order),
        controls,
    }
}

// ---------------------------------------------------------------------------
// PanelState
// ---------------------------------------------------------------------------

/// Persistent panel UI state.
#[derive(Debug, Clone, Default)]
pub struct PanelState {
    options: PanelOptions,
    view: PanelView,
    collapsed: AHashMap<ControlPath, bool>,
    seen_version: Option<u64>,
}

impl PanelState {
    /// Fresh state; call [`refresh`](Self::refresh) before reading the view.
    #[must_use]
    pub fn new(options: PanelOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Panel options.
    #[must_use]
    pub fn options(&self) -> &PanelOptions {
        &self.options
    }

    /// Latest projection.
    #[must_use]
    pub fn view(&self) -> &PanelView {
        &self.view
    }

    /// Re-project if the registry changed since the last refresh.
    pub fn refresh(&mut self, registry: &ControlRegistry) -> bool {
        let version = registry.version();
        if self.seen_version == Some(version) {
            return false;
        }
        let current = self.view.active_folder.take();
        let mut view = project(registry, &self.options, current.as_ref());
        for folder in &mut view.folders {
            if let Some(collapsed) = self.collapsed.get(&folder.path) {
                folder.collapsed = *collapsed;
            }
        }
        self.collapsed
            .retain(|path, _| view.folders.iter().any(|f| &f.path == path));
        self.view = view;
        self.seen_version = Some(version);
        true
    }

    /// Activate the tab at `index`, clamped to the folder count.
    pub fn select_tab(&mut self, index: usize) -> bool {
        if !self.options.tabs || self.view.folders.is_empty() {
            return false;
        }
        let from = self.view.active_index();
        let to = index.min(self.view.folders.len() - 1);
        if from == Some(to) {
            return false;
        }
        self.view.active_folder = Some(self.view.folders[to].path.clone());
        debug!(message = "panel.tab_switch", from = ?from, to);
        true
    }

    /// Activate the folder at `path`.
    pub fn select_folder(&mut self, path: &str) -> bool {
        match self.view.folders.iter().position(|f| f.path.as_str() == path) {
            Some(index) => self.select_tab(index),
            None => false,
        }
    }

    /// Move one tab right.
    pub fn next_tab(&mut self) -> bool {
        let next = self.view.active_index().map_or(0, |i| i.saturating_add(1));
        self.select_tab(next)
    }

    /// Move one tab left.
    pub fn previous_tab(&mut self) -> bool {
        let previous = self.view.active_index().map_or(0, |i| i.saturating_sub(1));
        self.select_tab(previous)
    }

    /// Flip a folder's collapsed flag; returns the new flag, or `None` if
    /// the folder is not shown.
    pub fn toggle_collapsed(&mut self, path: &str) -> Option<bool> {
        let folder = self
            .view
            .folders
            .iter_mut()
            .find(|f| f.path.as_str() == path)?;
        folder.collapsed = !folder.collapsed;
        self.collapsed.insert(folder.path.clone(), folder.collapsed);
        Some(folder.collapsed)
    }

    /// Whether the folder at `path` is collapsed.
    #[must_use]
    pub fn is_collapsed(&self, path: &str) -> bool {
        self.view.folder(path).is_some_and(|f| f.collapsed)
    }
}
