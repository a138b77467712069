#![forbid(unsafe_code)]

//! Ambient registry reachable from anywhere on the current thread.
//!
//! Scene code that declares controls near their point of use reaches the
//! store through [`with`] instead of threading a handle through every layer.
//! The slot has an explicit lifecycle: [`install`] a registry, [`reset`] to
//! clear it. Tests should construct their own [`ControlRegistry`] instead.

use std::cell::RefCell;

use tracing::debug;

use crate::registry::ControlRegistry;

thread_local! {
    static GLOBAL: RefCell<Option<ControlRegistry>> = const { RefCell::new(None) };
}

/// Install `registry` as the ambient store, returning the previous one.
pub fn install(registry: ControlRegistry) -> Option<ControlRegistry> {
    debug!(message = "registry.global_install");
    GLOBAL.with(|slot| slot.borrow_mut().replace(registry))
}

/// Handle to the ambient store, installing a fresh one if none exists.
#[must_use]
pub fn global() -> ControlRegistry {
    GLOBAL.with(|slot| {
        slot.borrow_mut()
            .get_or_insert_with(ControlRegistry::new)
            .clone()
    })
}

/// Run `f` against the ambient store.
///
/// The slot is not borrowed while `f` runs, so `f` may call back into this
/// module.
pub fn with<R>(f: impl FnOnce(&ControlRegistry) -> R) -> R {
    let registry = global();
    f(&registry)
}

/// Clear the ambient slot, returning what was installed.
pub fn reset() -> Option<ControlRegistry> {
    debug!(message = "registry.global_reset");
    GLOBAL.with(|slot| slot.borrow_mut().take())
}

/// Whether a store is installed.
#[must_use]
pub fn is_installed() -> bool {
    GLOBAL.with(|slot| slot.borrow().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::value::ControlValue;

    #[test]
    fn lazily_installs_and_shares_state() {
        reset();
        assert!(!is_installed());
        with(|r| r.register("g", &Schema::new().value("x", 1.0)));
        assert!(is_installed());
        assert_eq!(
            with(|r| r.get_value("g.x")),
            Some(ControlValue::Number(1.0))
        );
        reset();
    }

    #[test]
    fn install_replaces_and_reset_clears() {
        reset();
        let first = ControlRegistry::new();
        assert!(install(first.clone()).is_none());
        assert!(global().ptr_eq(&first));
        let previous = install(ControlRegistry::new()).expect("previous store");
        assert!(previous.ptr_eq(&first));
        assert!(reset().is_some());
        assert!(!is_installed());
    }

    #[test]
    fn nested_access_does_not_deadlock() {
        reset();
        let inner_len = with(|_| with(|r| r.len()));
        assert_eq!(inner_len, 0);
        reset();
    }
}
