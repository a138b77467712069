#![forbid(unsafe_code)]

//! Property tests for [`ControlRegistry`] invariants.
//!
//! Validates:
//! - Registered values equal declared initial values.
//! - Re-registering an identical schema never changes a live value.
//! - `unregister(id)` removes exactly the `id` prefix.
//! - One subscription sees each accepted write exactly once, and nothing
//!   after unsubscribing.
//! - Stored numbers always lie inside the declared range.
//! - Re-registering a smaller schema drops the paths it no longer declares.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use proptest::prelude::*;
use xrtune_controls::{ControlRegistry, ControlSpec, ControlValue, Schema, SetOutcome};

// ============================================================================
// Strategy helpers
// ============================================================================

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

fn flat_schema_strategy() -> impl Strategy<Value = BTreeMap<String, f64>> {
    prop::collection::btree_map(key_strategy(), -1000.0f64..1000.0, 1..12)
}

fn build(values: &BTreeMap<String, f64>) -> Schema {
    values
        .iter()
        .fold(Schema::new(), |schema, (key, value)| schema.value(key.as_str(), *value))
}

// ============================================================================
// Invariant 1: initial values are readable at their paths
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn registered_values_match_declaration(values in flat_schema_strategy()) {
        let registry = ControlRegistry::new();
        let outcome = registry.register("ctrl", &build(&values));
        prop_assert!(outcome.is_clean());
        prop_assert_eq!(outcome.added, values.len());
        for (key, value) in &values {
            prop_assert_eq!(
                registry.get_value(&format!("ctrl.{key}")),
                Some(ControlValue::Number(*value))
            );
        }
    }
}

// ============================================================================
// Invariant 2: identical re-registration preserves live values
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn reregistration_preserves_live_values(
        values in flat_schema_strategy(),
        edits in prop::collection::vec((any::<prop::sample::Index>(), -50.0f64..50.0), 0..10),
    ) {
        let registry = ControlRegistry::new();
        let schema = build(&values);
        registry.register("ctrl", &schema);

        let keys: Vec<&String> = values.keys().collect();
        for (index, value) in &edits {
            let key = index.get(&keys);
            registry.set_value(&format!("ctrl.{key}"), *value);
        }
        let before = registry.values_under("ctrl");
        let version = registry.version();

        registry.register("ctrl", &schema);
        prop_assert_eq!(registry.values_under("ctrl"), before);
        prop_assert_eq!(registry.version(), version);
    }
}

// ============================================================================
// Invariant 3: unregister removes exactly the id prefix
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn unregister_removes_only_its_prefix(
        ids in prop::collection::btree_set("[a-c]{1,3}", 2..5),
        values in flat_schema_strategy(),
    ) {
        let registry = ControlRegistry::new();
        let schema = build(&values);
        for id in &ids {
            registry.register(id, &schema);
        }
        let victim = ids.iter().next().cloned().unwrap_or_default();
        registry.unregister(&victim);

        for id in &ids {
            for key in values.keys() {
                let path = format!("{id}.{key}");
                if id == &victim {
                    prop_assert_eq!(registry.get_value(&path), None);
                } else {
                    prop_assert!(registry.get_value(&path).is_some(), "lost {}", path);
                }
            }
        }
        prop_assert!(!registry.ids().contains(&victim));
    }
}

// ============================================================================
// Invariant 4: exactly-once delivery, nothing after unsubscribe
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn subscription_sees_each_write_once(
        writes in prop::collection::vec(-10.0f64..10.0, 1..20),
        cut in any::<prop::sample::Index>(),
    ) {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &Schema::new().value("x", 0.0));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = registry.subscribe("ctrl.x", move |v| sink.borrow_mut().push(v.clone()));

        let split = cut.index(writes.len() + 1);
        for value in &writes[..split] {
            registry.set_value("ctrl.x", *value);
        }
        sub.unsubscribe();
        for value in &writes[split..] {
            registry.set_value("ctrl.x", *value);
        }

        let expected: Vec<_> = writes[..split].iter().map(|v| ControlValue::Number(*v)).collect();
        prop_assert_eq!(&*seen.borrow(), &expected);
        prop_assert_eq!(registry.listener_count("ctrl.x"), 0);
    }
}

// ============================================================================
// Invariant 5: clamp-and-round never escapes the range
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn stored_numbers_stay_in_range(
        min in -100.0f64..0.0,
        span in 0.1f64..100.0,
        step in prop::option::of(0.01f64..10.0),
        input in -1.0e6f64..1.0e6,
    ) {
        let max = min + span;
        let mut spec = ControlSpec::new(min).min(min).max(max);
        if let Some(step) = step {
            spec = spec.step(step);
        }
        let registry = ControlRegistry::new();
        registry.register("ctrl", &Schema::new().control("n", spec));

        match registry.set_value("ctrl.n", input) {
            SetOutcome::Applied(ControlValue::Number(stored)) => {
                prop_assert!(stored >= min && stored <= max, "{} outside [{}, {}]", stored, min, max);
            }
            other => prop_assert!(false, "unexpected outcome {:?}", other),
        }
    }
}

// ============================================================================
// Invariant 6: re-registration leaves exactly the declared paths
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn reregistration_drops_undeclared_paths(
        values in flat_schema_strategy(),
        keep in prop::collection::vec(any::<bool>(), 12),
    ) {
        let registry = ControlRegistry::new();
        registry.register("ctrl", &build(&values));
        registry.register("other", &build(&values));

        let kept: BTreeMap<String, f64> = values
            .iter()
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|((key, value), _)| (key.clone(), *value))
            .collect();
        let outcome = registry.register("ctrl", &build(&kept));
        prop_assert_eq!(outcome.removed, values.len() - kept.len());

        let live: Vec<String> = registry
            .values_under("ctrl")
            .into_iter()
            .map(|(path, _)| path.key().to_owned())
            .collect();
        let expected: Vec<String> = kept.keys().cloned().collect();
        prop_assert_eq!(live, expected);
        prop_assert_eq!(registry.values_under("other").len(), values.len());
    }
}
