#![forbid(unsafe_code)]

//! The reactive control registry.
//!
//! # Design
//!
//! [`ControlRegistry`] is a cheap-to-clone handle onto shared state
//! (`Rc<RefCell<..>>`). It owns the flat record map, the current value map,
//! folder memberships, and per-path listener lists. Every consumer addresses
//! controls by their dot-joined path string.
//!
//! Registration is a value-preserving merge: re-registering a schema under
//! the same id keeps live values for paths that still exist (re-sanitized
//! against the new constraints) so callers may re-declare on every render.
//!
//! # Invariants
//!
//! 1. Paths are unique; the last registration of a path wins.
//! 2. A path holds a value iff its kind holds values (not button/folder).
//! 3. Listeners of one path are called in subscription order.
//! 4. `set_value` fully updates state before the first callback runs, and
//!    no registry borrow is held while callbacks run, so callbacks may read
//!    or write the registry.
//! 5. Inside [`batch`](ControlRegistry::batch), values update immediately
//!    and notifications are deferred; on exit each dirty path is notified
//!    once with its final value, in first-write order.
//!
//! # Failure Modes
//!
//! - **Unknown path**: `get_value` returns `None`, `set_value` returns
//!   [`SetOutcome::Unknown`]. Logged at `trace` only.
//! - **Incompatible value**: [`SetOutcome::Rejected`], logged at `debug`.
//! - **Schema defects**: never abort registration; see [`crate::schema`].
//! - **Panic inside a batch**: pending notifications are discarded.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::{AHashMap, AHashSet};
use tracing::{debug, info, info_span, trace};
use web_time::Instant;

use crate::path::ControlPath;
use crate::record::{ChangeCallback, ControlKind, ControlRecord, FolderMembership};
use crate::schema::{self, ParsedSchema, Schema, SchemaDiagnostic};
use crate::value::ControlValue;

type ListenerCallback = Rc<dyn Fn(&ControlValue)>;

struct Listener {
    id: u64,
    callback: ListenerCallback,
}

struct BatchState {
    depth: u32,
    dirty: Vec<ControlPath>,
}

/// Shared interior of a [`ControlRegistry`].
pub(crate) struct RegistryInner {
    pub(crate) records: AHashMap<ControlPath, ControlRecord>,
    pub(crate) values: AHashMap<ControlPath, ControlValue>,
    pub(crate) folders: AHashMap<ControlPath, FolderMembership>,
    /// Registration ids in first-registration order.
    pub(crate) ids: Vec<String>,
    listeners: AHashMap<ControlPath, Vec<Listener>>,
    next_listener: u64,
    version: u64,
    structure_version: u64,
    batch: Option<BatchState>,
}

impl RegistryInner {
    fn new() -> Self {
        Self {
            records: AHashMap::new(),
            values: AHashMap::new(),
            folders: AHashMap::new(),
            ids: Vec::new(),
            listeners: AHashMap::new(),
            next_listener: 0,
            version: 0,
            structure_version: 0,
            batch: None,
        }
    }

    fn remove_listener(&mut self, path: &ControlPath, id: u64) -> bool {
        let Some(list) = self.listeners.get_mut(path) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.listeners.remove(path);
        }
        removed
    }
}

/// Registry state plus listeners whose guards dropped while the state was
/// borrowed. Orphans are removed before the next fan-out.
pub(crate) struct Shared {
    state: RefCell<RegistryInner>,
    orphans: RefCell<Vec<(ControlPath, u64)>>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Summary of one [`ControlRegistry::register`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterOutcome {
    /// Paths that did not exist before.
    pub added: usize,
    /// Paths that existed and were re-declared.
    pub updated: usize,
    /// Paths under the id that the new schema no longer declares.
    pub removed: usize,
    /// Recovered schema defects.
    pub diagnostics: Vec<SchemaDiagnostic>,
}

impl RegisterOutcome {
    /// Whether the schema parsed without defects.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Result of [`ControlRegistry::set_value`].
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    /// Stored, after clamping and rounding. Carries the stored value.
    Applied(ControlValue),
    /// No control at that path. Nothing happened.
    Unknown,
    /// The control exists but cannot hold this value. Nothing happened.
    Rejected,
}

impl SetOutcome {
    /// Whether the value was stored.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Strict registration refused a schema with defects.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRejected {
    /// Registration id.
    pub id: String,
    /// Every defect found.
    pub diagnostics: Vec<SchemaDiagnostic>,
}

impl fmt::Display for SchemaRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "schema '{}' rejected with {} defect(s)",
            self.id,
            self.diagnostics.len()
        )?;
        if let Some(first) = self.diagnostics.first() {
            write!(f, ": {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaRejected {}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Shared, path-addressed store of control values with change notification.
///
/// Cloning creates another handle to the same store.
#[derive(Clone)]
pub struct ControlRegistry {
    inner: Rc<Shared>,
}

impl Default for ControlRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ControlRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.state.borrow();
        f.debug_struct("ControlRegistry")
            .field("ids", &inner.ids)
            .field("records", &inner.records.len())
            .field("listeners", &inner.listeners.len())
            .field("version", &inner.version)
            .finish()
    }
}

impl ControlRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Shared {
                state: RefCell::new(RegistryInner::new()),
                orphans: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Whether two handles share the same store.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&RegistryInner) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    // -- Registration -------------------------------------------------------

    /// Parse `schema` under `id` and merge it in.
    ///
    /// Existing values survive when the re-declared kind still accepts them.
    /// New paths (and paths whose old value no longer fits) take the
    /// declared initial value, and their listeners are notified. Paths under
    /// `id` that the schema no longer declares are dropped. An empty `id`, or
    /// one containing `.`, registers nothing. Never fails; defects come back
    /// in [`RegisterOutcome::diagnostics`].
    pub fn register(&self, id: &str, schema: &Schema) -> RegisterOutcome {
        self.apply(id, schema::parse(id, schema))
    }

    /// Like [`register`](Self::register), but refuses a schema with defects
    /// and leaves the registry untouched.
    pub fn register_strict(
        &self,
        id: &str,
        schema: &Schema,
    ) -> Result<RegisterOutcome, SchemaRejected> {
        let parsed = schema::parse(id, schema);
        if !parsed.diagnostics.is_empty() {
            return Err(SchemaRejected {
                id: id.to_owned(),
                diagnostics: parsed.diagnostics,
            });
        }
        Ok(self.apply(id, parsed))
    }

    fn apply(&self, id: &str, parsed: ParsedSchema) -> RegisterOutcome {
        let mut outcome = RegisterOutcome {
            diagnostics: parsed.diagnostics,
            ..RegisterOutcome::default()
        };
        if !ControlPath::is_valid_segment(id) {
            info!(
                message = "registry.register_refused",
                id,
                diagnostics = outcome.diagnostics.len()
            );
            return outcome;
        }
        let declared: AHashSet<ControlPath> = parsed
            .records
            .iter()
            .map(|r| r.path.clone())
            .chain(parsed.folders.iter().map(|f| f.path.clone()))
            .collect();
        let mut changed = Vec::new();
        {
            let mut inner = self.inner.state.borrow_mut();
            let mut structural = false;
            if !inner.ids.iter().any(|existing| existing == id) {
                inner.ids.push(id.to_owned());
                structural = true;
            }

            for record in parsed.records {
                let path = record.path.clone();
                match inner.records.get(&path) {
                    Some(old) => {
                        outcome.updated += 1;
                        structural |= !same_shape(old, &record);
                    }
                    None => {
                        outcome.added += 1;
                        structural = true;
                    }
                }

                if record.kind.holds_value() {
                    let previous = inner.values.get(&path).cloned();
                    let kept = previous.clone().and_then(|v| record.kind.accept(v));
                    let next = kept.or_else(|| record.initial.clone());
                    if let Some(next) = next {
                        if previous.as_ref() != Some(&next) {
                            changed.push(path.clone());
                        }
                        inner.values.insert(path.clone(), next);
                    }
                } else {
                    inner.values.remove(&path);
                }
                inner.records.insert(path, record);
            }

            let stale = |path: &ControlPath| path.is_within(id) && !declared.contains(path);
            let (records, folders) = (inner.records.len(), inner.folders.len());
            inner.records.retain(|path, _| !stale(path));
            inner.values.retain(|path, _| !stale(path));
            inner.folders.retain(|path, _| !stale(path));
            outcome.removed = records - inner.records.len();
            structural |= outcome.removed > 0 || folders != inner.folders.len();

            for folder in parsed.folders {
                if inner.folders.get(&folder.path) != Some(&folder) {
                    structural = true;
                    inner.folders.insert(folder.path.clone(), folder);
                }
            }

            if structural {
                inner.structure_version += 1;
            }
            if structural || !changed.is_empty() {
                inner.version += 1;
            }
        }

        info!(
            message = "registry.register",
            id,
            added = outcome.added,
            updated = outcome.updated,
            removed = outcome.removed,
            diagnostics = outcome.diagnostics.len()
        );
        for path in changed {
            self.notify_or_defer(path);
        }
        outcome
    }

    /// Remove every record, value, and folder at or beneath `id`.
    ///
    /// Listeners are left in place: they belong to their subscribers and
    /// fire again if the path is re-registered. Returns the number of
    /// records removed.
    pub fn unregister(&self, id: &str) -> usize {
        let removed = {
            let mut inner = self.inner.state.borrow_mut();
            let before = inner.records.len();
            inner.records.retain(|path, _| !path.is_within(id));
            inner.values.retain(|path, _| !path.is_within(id));
            inner.folders.retain(|path, _| !path.is_within(id));
            let had_id = inner.ids.iter().any(|existing| existing == id);
            inner.ids.retain(|existing| existing != id);
            let removed = before - inner.records.len();
            if removed > 0 || had_id {
                inner.structure_version += 1;
                inner.version += 1;
            }
            removed
        };
        info!(message = "registry.unregister", id, removed);
        removed
    }

    // -- Values -------------------------------------------------------------

    /// Current value at `path`, or `None` for unknown paths, buttons, and
    /// folders.
    #[must_use]
    pub fn get_value(&self, path: &str) -> Option<ControlValue> {
        self.inner.state.borrow().values.get(path).cloned()
    }

    /// Store `value` at `path` after clamping and rounding, then run the
    /// control's change callback and notify listeners.
    ///
    /// Unknown paths and incompatible values are no-ops.
    pub fn set_value(&self, path: &str, value: impl Into<ControlValue>) -> SetOutcome {
        let value = value.into();
        let (key, stored, deferred) = {
            let mut inner = self.inner.state.borrow_mut();
            let Some(record) = inner.records.get(path) else {
                trace!(message = "registry.set_unknown", path);
                return SetOutcome::Unknown;
            };
            let Some(stored) = record
                .kind
                .holds_value()
                .then(|| record.kind.accept(value.clone()))
                .flatten()
            else {
                debug!(
                    message = "registry.set_rejected",
                    path,
                    kind = %record.control_type(),
                    value = value.type_name()
                );
                return SetOutcome::Rejected;
            };
            let key = record.path.clone();
            inner.values.insert(key.clone(), stored.clone());
            inner.version += 1;
            let deferred = match inner.batch.as_mut() {
                Some(batch) => {
                    if !batch.dirty.contains(&key) {
                        batch.dirty.push(key.clone());
                    }
                    true
                }
                None => false,
            };
            (key, stored, deferred)
        };
        if !deferred {
            self.notify(&key);
        }
        SetOutcome::Applied(stored)
    }

    /// Apply several writes as one batch.
    pub fn set_values<I, P, V>(&self, writes: I) -> Vec<SetOutcome>
    where
        I: IntoIterator<Item = (P, V)>,
        P: AsRef<str>,
        V: Into<ControlValue>,
    {
        self.batch(|registry| {
            writes
                .into_iter()
                .map(|(path, value)| registry.set_value(path.as_ref(), value))
                .collect()
        })
    }

    /// Run `f` with notifications deferred until the outermost batch exits.
    pub fn batch<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        {
            let mut inner = self.inner.state.borrow_mut();
            match inner.batch.as_mut() {
                Some(batch) => batch.depth += 1,
                None => {
                    inner.batch = Some(BatchState {
                        depth: 1,
                        dirty: Vec::new(),
                    });
                }
            }
        }
        let guard = BatchGuard { registry: self };
        let out = f(self);
        drop(guard);
        out
    }

    /// Whether a batch is open.
    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.inner.state.borrow().batch.is_some()
    }

    fn end_batch(&self) {
        let dirty = {
            let mut inner = self.inner.state.borrow_mut();
            let Some(batch) = inner.batch.as_mut() else {
                return;
            };
            batch.depth -= 1;
            if batch.depth > 0 {
                return;
            }
            inner.batch.take().map(|b| b.dirty).unwrap_or_default()
        };
        if std::thread::panicking() {
            debug!(message = "registry.batch_discarded", pending = dirty.len());
            return;
        }
        for path in dirty {
            self.notify(&path);
        }
    }

    /// Invoke a button's action. Returns `false` if `path` is not a button.
    pub fn trigger(&self, path: &str) -> bool {
        let action = {
            let inner = self.inner.state.borrow();
            match inner.records.get(path).map(|r| &r.kind) {
                Some(ControlKind::Button(action)) => action.clone(),
                _ => {
                    trace!(message = "registry.trigger_miss", path);
                    return false;
                }
            }
        };
        debug!(message = "registry.trigger", path);
        action.invoke();
        true
    }

    /// Restore every value at or beneath `id` to its declared initial value.
    ///
    /// Only paths whose value actually changes are written (and notified).
    /// Returns the number of paths written.
    pub fn reset(&self, id: &str) -> usize {
        let pending: Vec<(ControlPath, ControlValue)> = {
            let inner = self.inner.state.borrow();
            let mut pending: Vec<_> = inner
                .records
                .values()
                .filter(|r| r.path.is_within(id))
                .filter_map(|r| {
                    let initial = r.initial.clone()?;
                    (inner.values.get(&r.path) != Some(&initial))
                        .then(|| (r.path.clone(), initial))
                })
                .collect();
            pending.sort_by(|a, b| a.0.cmp(&b.0));
            pending
        };
        let count = pending.len();
        self.set_values(pending);
        debug!(message = "registry.reset", id, count);
        count
    }

    /// Snapshot of values at or beneath `prefix`, sorted by path.
    #[must_use]
    pub fn values_under(&self, prefix: &str) -> Vec<(ControlPath, ControlValue)> {
        let inner = self.inner.state.borrow();
        let mut out: Vec<_> = inner
            .values
            .iter()
            .filter(|(path, _)| path.is_within(prefix))
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    // -- Introspection ------------------------------------------------------

    /// Record at `path`.
    #[must_use]
    pub fn record(&self, path: &str) -> Option<ControlRecord> {
        self.inner.state.borrow().records.get(path).cloned()
    }

    /// Folder membership at `path` (a folder or a registration id).
    #[must_use]
    pub fn folder(&self, path: &str) -> Option<FolderMembership> {
        self.inner.state.borrow().folders.get(path).cloned()
    }

    /// Whether a record exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.inner.state.borrow().records.contains_key(path)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.borrow().records.len()
    }

    /// Whether no records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().records.is_empty()
    }

    /// Registration ids in first-registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.inner.state.borrow().ids.clone()
    }

    /// Bumps on every mutation of records or values.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.state.borrow().version
    }

    /// Bumps when the record set, record presentation, or folder layout
    /// changes.
    #[must_use]
    pub fn structure_version(&self) -> u64 {
        self.inner.state.borrow().structure_version
    }

    // -- Subscriptions ------------------------------------------------------

    /// Call `callback` with the stored value after each accepted change at
    /// `path`.
    ///
    /// The path need not exist yet. Dropping the returned guard (or calling
    /// [`Subscription::unsubscribe`]) removes exactly this listener.
    pub fn subscribe(
        &self,
        path: impl Into<ControlPath>,
        callback: impl Fn(&ControlValue) + 'static,
    ) -> Subscription {
        let path = path.into();
        self.sweep_orphans();
        let mut inner = self.inner.state.borrow_mut();
        let id = inner.next_listener;
        inner.next_listener += 1;
        inner.listeners.entry(path.clone()).or_default().push(Listener {
            id,
            callback: Rc::new(callback),
        });
        trace!(message = "registry.subscribe", path = path.as_str(), id);
        Subscription {
            registry: Rc::downgrade(&self.inner),
            path,
            id,
            active: true,
        }
    }

    /// Number of listeners on `path`.
    #[must_use]
    pub fn listener_count(&self, path: &str) -> usize {
        self.sweep_orphans();
        self.inner.state.borrow().listeners.get(path).map_or(0, Vec::len)
    }

    /// Remove listeners whose guards dropped while the state was borrowed.
    fn sweep_orphans(&self) {
        let orphans = std::mem::take(&mut *self.inner.orphans.borrow_mut());
        if orphans.is_empty() {
            return;
        }
        match self.inner.state.try_borrow_mut() {
            Ok(mut inner) => {
                for (path, id) in &orphans {
                    inner.remove_listener(path, *id);
                }
            }
            Err(_) => self.inner.orphans.borrow_mut().extend(orphans),
        }
    }

    fn notify_or_defer(&self, path: ControlPath) {
        {
            let mut inner = self.inner.state.borrow_mut();
            if let Some(batch) = inner.batch.as_mut() {
                if !batch.dirty.contains(&path) {
                    batch.dirty.push(path);
                }
                return;
            }
        }
        self.notify_listeners(&path);
    }

    /// Change callback, then listeners, with the current value.
    fn notify(&self, path: &ControlPath) {
        let on_change: Option<ChangeCallback> = {
            let inner = self.inner.state.borrow();
            inner
                .records
                .get(path)
                .and_then(|r| r.config.on_change.clone())
        };
        if let Some(on_change) = on_change
            && let Some(value) = self.get_value(path.as_str())
        {
            on_change(&value);
        }
        self.notify_listeners(path);
    }

    fn notify_listeners(&self, path: &ControlPath) {
        self.sweep_orphans();
        let (value, callbacks): (ControlValue, Vec<ListenerCallback>) = {
            let inner = self.inner.state.borrow();
            let Some(value) = inner.values.get(path).cloned() else {
                return;
            };
            let callbacks = inner
                .listeners
                .get(path)
                .map(|list| list.iter().map(|l| Rc::clone(&l.callback)).collect())
                .unwrap_or_default();
            (value, callbacks)
        };
        if callbacks.is_empty() {
            return;
        }

        let listeners = callbacks.len() as u64;
        let start = Instant::now();
        let _span = info_span!(
            "registry.notify",
            path = path.as_str(),
            listeners,
            duration_us = tracing::field::Empty
        )
        .entered();
        for callback in &callbacks {
            callback(&value);
        }
        let duration_us = start.elapsed().as_micros() as u64;
        tracing::Span::current().record("duration_us", duration_us);
    }
}

struct BatchGuard<'a> {
    registry: &'a ControlRegistry,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.registry.end_batch();
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Disposer for one listener.
///
/// Holds only a weak handle to the registry, so it never keeps the store
/// alive.
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    registry: Weak<Shared>,
    path: ControlPath,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Path this listener watches.
    #[must_use]
    pub fn path(&self) -> &ControlPath {
        &self.path
    }

    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keep the listener for the registry's lifetime.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn remove(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        let Some(shared) = self.registry.upgrade() else {
            return;
        };
        match shared.state.try_borrow_mut() {
            Ok(mut inner) => {
                inner.remove_listener(&self.path, self.id);
            }
            Err(_) => {
                debug!(
                    message = "registry.unsubscribe_deferred",
                    path = self.path.as_str(),
                    id = self.id
                );
                shared.orphans.borrow_mut().push((self.path.clone(), self.id));
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

fn same_shape(old: &ControlRecord, new: &ControlRecord) -> bool {
    old.control_type() == new.control_type()
        && old.config.label == new.config.label
        && old.config.hint == new.config.hint
        && old.config.disabled == new.config.disabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SelectOption;
    use crate::schema::ControlSpec;
    use std::cell::Cell;

    fn speed_schema() -> Schema {
        Schema::new().control("speed", ControlSpec::new(1.0).min(0.0).max(5.0))
    }

    fn recorder(registry: &ControlRegistry, path: &str) -> (Rc<RefCell<Vec<ControlValue>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = registry.subscribe(path, move |v| sink.borrow_mut().push(v.clone()));
        (seen, sub)
    }

    #[test]
    fn register_exposes_initial_values() {
        let registry = ControlRegistry::new();
        let outcome = registry.register("ctrl", &speed_schema());
        assert_eq!(outcome.added, 1);
        assert!(outcome.is_clean());
        assert_eq!(registry.get_value("ctrl.speed"), Some(ControlValue::Number(1.0)));
        assert_eq!(registry.ids(), ["ctrl"]);
    }

    #[test]
    fn out_of_range_set_is_clamped_and_notified() {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &speed_schema());
        let (seen, _sub) = recorder(&registry, "ctrl.speed");

        let outcome = registry.set_value("ctrl.speed", 10.0);
        assert_eq!(outcome, SetOutcome::Applied(ControlValue::Number(5.0)));
        assert_eq!(registry.get_value("ctrl.speed"), Some(ControlValue::Number(5.0)));
        assert_eq!(*seen.borrow(), vec![ControlValue::Number(5.0)]);
    }

    #[test]
    fn reregistration_preserves_values() {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &speed_schema());
        registry.set_value("ctrl.speed", 3.0);
        let version = registry.version();
        let structure = registry.structure_version();

        let outcome = registry.register("ctrl", &speed_schema());
        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.updated, 1);
        assert_eq!(registry.get_value("ctrl.speed"), Some(ControlValue::Number(3.0)));
        assert_eq!(registry.version(), version);
        assert_eq!(registry.structure_version(), structure);
    }

    #[test]
    fn reregistration_drops_undeclared_controls() {
        let registry = ControlRegistry::new();
        registry.register(
            "ctrl",
            &Schema::new()
                .value("a", 1.0)
                .value("b", 2.0)
                .folder("f", Schema::new().value("c", 3.0)),
        );
        registry.register("other", &Schema::new().value("b", 5.0));
        registry.set_value("ctrl.a", 4.0);
        let structure = registry.structure_version();

        let outcome = registry.register("ctrl", &Schema::new().value("a", 1.0));
        assert_eq!(outcome.removed, 3);
        assert_eq!(registry.get_value("ctrl.a"), Some(ControlValue::Number(4.0)));
        assert_eq!(registry.get_value("ctrl.b"), None);
        assert_eq!(registry.get_value("ctrl.f.c"), None);
        assert!(!registry.contains("ctrl.f"));
        assert!(registry.folder("ctrl.f").is_none());
        assert_eq!(registry.get_value("other.b"), Some(ControlValue::Number(5.0)));
        assert!(registry.structure_version() > structure);
    }

    #[test]
    fn invalid_ids_register_nothing() {
        let registry = ControlRegistry::new();
        for id in ["", "a.b"] {
            let outcome = registry.register(id, &speed_schema());
            assert!(!outcome.is_clean());
            assert_eq!(outcome.added, 0);
            assert!(registry.register_strict(id, &speed_schema()).is_err());
        }
        assert!(registry.is_empty());
        assert!(registry.ids().is_empty());
        assert_eq!(registry.get_value(".speed"), None);
    }

    #[test]
    fn guard_dropped_while_registry_busy_is_removed_later() {
        let registry = ControlRegistry::new();
        let (seen, sub) = recorder(&registry, "ctrl.speed");
        let schema = Schema::new().control(
            "speed",
            ControlSpec::new(1.0).on_change(move |_| {
                let _ = sub.path();
            }),
        );
        registry.register("ctrl", &schema);
        drop(schema);
        assert_eq!(seen.borrow().len(), 1);

        // Replacing the record drops its callback, and the guard it owns,
        // while the registry state is mutably borrowed.
        registry.register("ctrl", &speed_schema());
        registry.set_value("ctrl.speed", 2.0);
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(registry.listener_count("ctrl.speed"), 0);
    }

    #[test]
    fn reregistration_with_new_kind_resets_value() {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &Schema::new().value("x", 2.0));
        registry.register("ctrl", &Schema::new().value("x", true));
        assert_eq!(registry.get_value("ctrl.x"), Some(ControlValue::Bool(true)));
    }

    #[test]
    fn reregistration_reclamps_to_new_range() {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &speed_schema());
        registry.set_value("ctrl.speed", 4.0);
        registry.register(
            "ctrl",
            &Schema::new().control("speed", ControlSpec::new(1.0).min(0.0).max(2.0)),
        );
        assert_eq!(registry.get_value("ctrl.speed"), Some(ControlValue::Number(2.0)));
    }

    #[test]
    fn unknown_and_rejected_sets_are_noops() {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &speed_schema());
        let version = registry.version();
        assert_eq!(registry.set_value("ctrl.nope", 1.0), SetOutcome::Unknown);
        assert_eq!(registry.set_value("ctrl.speed", true), SetOutcome::Rejected);
        assert_eq!(registry.version(), version);
        assert_eq!(registry.get_value("ctrl.nope"), None);
    }

    #[test]
    fn unregister_removes_prefix_only() {
        let registry = ControlRegistry::new();
        registry.register("a", &Schema::new().value("x", 1.0).folder("f", Schema::new().value("y", 2.0)));
        registry.register("ab", &Schema::new().value("x", 3.0));
        let removed = registry.unregister("a");
        assert_eq!(removed, 3);
        assert_eq!(registry.get_value("a.x"), None);
        assert_eq!(registry.get_value("a.f.y"), None);
        assert!(registry.folder("a").is_none());
        assert_eq!(registry.get_value("ab.x"), Some(ControlValue::Number(3.0)));
        assert_eq!(registry.ids(), ["ab"]);
    }

    #[test]
    fn unregister_keeps_listeners() {
        let registry = ControlRegistry::new();
        registry.register("a", &Schema::new().value("x", 1.0));
        let (seen, _sub) = recorder(&registry, "a.x");
        registry.unregister("a");
        assert_eq!(registry.listener_count("a.x"), 1);
        registry.register("a", &Schema::new().value("x", 7.0));
        assert_eq!(*seen.borrow(), vec![ControlValue::Number(7.0)]);
    }

    #[test]
    fn listeners_fire_in_subscription_order() {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &speed_schema());
        let order = Rc::new(RefCell::new(Vec::new()));
        let subs: Vec<_> = (0..3)
            .map(|i| {
                let order = Rc::clone(&order);
                registry.subscribe("ctrl.speed", move |_| order.borrow_mut().push(i))
            })
            .collect();
        registry.set_value("ctrl.speed", 2.0);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        drop(subs);
        assert_eq!(registry.listener_count("ctrl.speed"), 0);
    }

    #[test]
    fn unsubscribe_removes_only_own_listener() {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &speed_schema());
        let (first, sub_a) = recorder(&registry, "ctrl.speed");
        let (second, _sub_b) = recorder(&registry, "ctrl.speed");
        sub_a.unsubscribe();
        registry.set_value("ctrl.speed", 2.0);
        assert!(first.borrow().is_empty());
        assert_eq!(second.borrow().len(), 1);
    }

    #[test]
    fn detached_subscription_survives_guard() {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &speed_schema());
        let (seen, sub) = recorder(&registry, "ctrl.speed");
        sub.detach();
        registry.set_value("ctrl.speed", 2.0);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn on_change_runs_before_listeners() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let on_change_log = Rc::clone(&log);
        let registry = ControlRegistry::new();
        registry.register(
            "ctrl",
            &Schema::new().control(
                "speed",
                ControlSpec::new(1.0).on_change(move |_| on_change_log.borrow_mut().push("change")),
            ),
        );
        let listener_log = Rc::clone(&log);
        let _sub = registry.subscribe("ctrl.speed", move |_| listener_log.borrow_mut().push("listen"));
        registry.set_value("ctrl.speed", 2.0);
        assert_eq!(*log.borrow(), vec!["change", "listen"]);
    }

    #[test]
    fn callbacks_may_write_back() {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &Schema::new().value("a", 0.0).value("b", 0.0));
        let handle = registry.clone();
        let _sub = registry.subscribe("ctrl.a", move |v| {
            if let Some(n) = v.as_number() {
                handle.set_value("ctrl.b", n * 2.0);
            }
        });
        registry.set_value("ctrl.a", 4.0);
        assert_eq!(registry.get_value("ctrl.b"), Some(ControlValue::Number(8.0)));
    }

    #[test]
    fn batch_coalesces_notifications() {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &speed_schema());
        let (seen, _sub) = recorder(&registry, "ctrl.speed");
        registry.batch(|r| {
            r.set_value("ctrl.speed", 1.0);
            r.batch(|r| {
                r.set_value("ctrl.speed", 2.0);
            });
            assert!(seen.borrow().is_empty());
            assert_eq!(r.get_value("ctrl.speed"), Some(ControlValue::Number(2.0)));
            r.set_value("ctrl.speed", 3.0);
        });
        assert_eq!(*seen.borrow(), vec![ControlValue::Number(3.0)]);
        assert!(!registry.is_batching());
    }

    #[test]
    fn set_values_reports_each_outcome() {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &speed_schema());
        let outcomes = registry.set_values([("ctrl.speed", 9.0), ("ctrl.other", 1.0)]);
        assert_eq!(
            outcomes,
            vec![SetOutcome::Applied(ControlValue::Number(5.0)), SetOutcome::Unknown]
        );
    }

    #[test]
    fn trigger_invokes_button_only() {
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let registry = ControlRegistry::new();
        registry.register(
            "ctrl",
            &Schema::new()
                .button("go", move || counter.set(counter.get() + 1))
                .value("x", 1.0),
        );
        assert!(registry.trigger("ctrl.go"));
        assert!(!registry.trigger("ctrl.x"));
        assert!(!registry.trigger("ctrl.missing"));
        assert_eq!(hits.get(), 1);
        assert_eq!(registry.get_value("ctrl.go"), None);
    }

    #[test]
    fn reset_restores_initial_values() {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &speed_schema().value("on", true));
        registry.set_value("ctrl.speed", 4.0);
        let (seen, _sub) = recorder(&registry, "ctrl.on");
        assert_eq!(registry.reset("ctrl"), 1);
        assert_eq!(registry.get_value("ctrl.speed"), Some(ControlValue::Number(1.0)));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn select_rejects_unknown_option() {
        let registry = ControlRegistry::new();
        registry.register(
            "ctrl",
            &Schema::new().control(
                "q",
                ControlSpec::empty().options([
                    SelectOption::from_value("low"),
                    SelectOption::from_value("high"),
                ]),
            ),
        );
        assert!(registry.set_value("ctrl.q", "high").is_applied());
        assert_eq!(registry.set_value("ctrl.q", "ultra"), SetOutcome::Rejected);
        assert_eq!(registry.get_value("ctrl.q"), Some(ControlValue::from("high")));
    }

    #[test]
    fn strict_registration_refuses_defects() {
        let registry = ControlRegistry::new();
        let err = registry
            .register_strict("ctrl", &Schema::new().control("bad", ControlSpec::empty()))
            .expect_err("defective schema");
        assert_eq!(err.diagnostics.len(), 1);
        assert!(registry.is_empty());
        assert!(err.to_string().contains("ctrl"));
        assert!(registry.register_strict("ctrl", &speed_schema()).is_ok());
    }

    #[test]
    fn values_under_is_sorted_and_scoped() {
        let registry = ControlRegistry::new();
        registry.register("a", &Schema::new().value("z", 1.0).value("b", 2.0));
        registry.register("c", &Schema::new().value("x", 3.0));
        let keys: Vec<_> = registry
            .values_under("a")
            .into_iter()
            .map(|(p, _)| p.to_string())
            .collect();
        assert_eq!(keys, ["a.b", "a.z"]);
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let registry = ControlRegistry::new();
        let sub = registry.subscribe("a.x", |_| {});
        drop(registry);
        sub.unsubscribe();
    }
}
