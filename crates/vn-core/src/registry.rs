//! Process-wide table of installed interception points.
//!
//! The registry owns the binding slots: it replaces `target[key]` with a
//! [`Hook`] wrapper and restores the original once the hook's last callback is
//! gone. Every component that intercepts a native entry point goes through
//! [`HookRegistry::attach`], so one slot is never wrapped twice.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::function::Function;
use crate::hook::Hook;
use crate::object::{Object, Property, WeakObject};
use crate::value::Value;

struct HookEntry {
    target: WeakObject,
    key: String,
    original: Function,
    hook: Hook,
}

impl HookEntry {
    fn is_slot(&self, target: &Object, key: &str) -> bool {
        self.key == key
            && self
                .target
                .upgrade()
                .is_some_and(|object| Object::ptr_eq(&object, target))
    }
}

/// Registry of hooked `(object, key)` slots.
#[derive(Clone, Default)]
pub struct HookRegistry {
    entries: Rc<RefCell<Vec<HookEntry>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The hook bound at `target[key]`, installing one if needed.
    ///
    /// The slot must hold a function as an own data property.
    pub fn attach(&self, target: &Object, key: &str) -> Result<Hook> {
        if let Some(hook) = self.hook_for(target, key) {
            return Ok(hook);
        }

        let original = match target.get_own_property(key) {
            Some(Property::Data(Value::Function(f))) => f,
            _ => return Err(Error::NotAFunction(key.to_string())),
        };

        let hook = Hook::new(original.clone());
        target.define_value(key, hook.function());

        let entries: Weak<RefCell<Vec<HookEntry>>> = Rc::downgrade(&self.entries);
        let slot = target.downgrade();
        let name = key.to_string();
        hook.set_empty_handler(move || {
            if let (Some(entries), Some(target)) = (entries.upgrade(), slot.upgrade()) {
                restore(&entries, &target, &name);
            }
        });

        self.entries.borrow_mut().push(HookEntry {
            target: target.downgrade(),
            key: key.to_string(),
            original,
            hook: hook.clone(),
        });
        log::debug!(target: "hook", "installed hook on '{key}'");

        Ok(hook)
    }

    pub fn hook_for(&self, target: &Object, key: &str) -> Option<Hook> {
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.is_slot(target, key))
            .map(|entry| entry.hook.clone())
    }

    /// The original function behind a hooked slot.
    pub fn original(&self, target: &Object, key: &str) -> Option<Function> {
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.is_slot(target, key))
            .map(|entry| entry.original.clone())
    }

    /// Restore the original binding regardless of installed callbacks.
    pub fn detach(&self, target: &Object, key: &str) -> bool {
        restore(&self.entries, target, key)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn restore(entries: &RefCell<Vec<HookEntry>>, target: &Object, key: &str) -> bool {
    let entry = {
        let mut entries = entries.borrow_mut();
        match entries.iter().position(|entry| entry.is_slot(target, key)) {
            Some(index) => entries.remove(index),
            None => return false,
        }
    };

    // Someone may have rebound the slot since; only undo our own wrapper.
    if let Some(Property::Data(Value::Function(current))) = target.get_own_property(key) {
        if Function::ptr_eq(&current, &entry.hook.function()) {
            target.define_value(key, entry.original);
        }
    }
    log::debug!(target: "hook", "restored original '{key}'");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::HookResult;

    fn global_with_fetch() -> (Object, Function) {
        let global = Object::new();
        let fetch = Function::new("fetch", |_, _| Ok(Value::from("network")));
        global.define_value("fetch", fetch.clone());
        (global, fetch)
    }

    fn slot(global: &Object) -> Function {
        match global.get("fetch").unwrap() {
            Value::Function(f) => f,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_attach_rebinds_slot() {
        let (global, fetch) = global_with_fetch();
        let registry = HookRegistry::new();
        let hook = registry.attach(&global, "fetch").unwrap();
        assert!(!Function::ptr_eq(&slot(&global), &fetch));
        assert!(Function::ptr_eq(&slot(&global), &hook.function()));
        assert!(Function::ptr_eq(&registry.original(&global, "fetch").unwrap(), &fetch));
    }

    #[test]
    fn test_attach_reuses_hook() {
        let (global, _) = global_with_fetch();
        let registry = HookRegistry::new();
        let a = registry.attach(&global, "fetch").unwrap();
        let b = registry.attach(&global, "fetch").unwrap();
        assert!(Hook::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_last_removal_restores_identity() {
        let (global, fetch) = global_with_fetch();
        let registry = HookRegistry::new();
        let hook = registry.attach(&global, "fetch").unwrap();
        let id = hook.add(|ctx| {
            ctx.return_value = Value::from("blocked");
            Ok(HookResult::EXECUTION_RETURN)
        });

        let out = global.get("fetch").unwrap().call(&Value::Undefined, &[]).unwrap();
        assert_eq!(out.as_str(), Some("blocked"));

        hook.remove(id);
        assert!(Function::ptr_eq(&slot(&global), &fetch));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_uninstall_vote_restores_slot() {
        let (global, fetch) = global_with_fetch();
        let registry = HookRegistry::new();
        registry
            .attach(&global, "fetch")
            .unwrap()
            .install(|_| Ok(HookResult::EXECUTION_CONTINUE | HookResult::ACTION_UNINSTALL));
        Value::from(global.clone()).call_method("fetch", &[]).unwrap();
        assert!(Function::ptr_eq(&slot(&global), &fetch));
    }

    #[test]
    fn test_attach_requires_function() {
        let global = Object::new();
        global.define_value("fetch", 1);
        let registry = HookRegistry::new();
        assert_eq!(
            registry.attach(&global, "fetch").unwrap_err(),
            Error::NotAFunction("fetch".into())
        );
        assert!(registry.attach(&global, "missing").is_err());
    }

    #[test]
    fn test_detach_leaves_foreign_binding() {
        let (global, _) = global_with_fetch();
        let registry = HookRegistry::new();
        registry.attach(&global, "fetch").unwrap();
        let page_override = Function::new("fetch", |_, _| Ok(Value::Null));
        global.define_value("fetch", page_override.clone());
        assert!(registry.detach(&global, "fetch"));
        assert!(Function::ptr_eq(&slot(&global), &page_override));
    }
}
