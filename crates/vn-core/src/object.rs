//! Reflective property bags with prototype chains.
//!
//! An [`Object`] is the explicit dispatch table that stands in for a global
//! object or a native prototype: hooks are installed by rebinding its slots.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::Result;
use crate::function::Function;
use crate::value::Value;

/// A property slot.
#[derive(Clone, Debug)]
pub enum Property {
    Data(Value),
    Accessor {
        get: Option<Function>,
        set: Option<Function>,
    },
}

#[derive(Default)]
struct ObjectInner {
    properties: RefCell<HashMap<String, Property>>,
    proto: RefCell<Option<Object>>,
}

/// Shared, mutable object. Cloning shares identity.
#[derive(Clone, Default)]
pub struct Object(Rc<ObjectInner>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proto(proto: &Object) -> Self {
        let object = Self::new();
        object.set_proto(Some(proto.clone()));
        object
    }

    pub fn proto(&self) -> Option<Object> {
        self.0.proto.borrow().clone()
    }

    pub fn set_proto(&self, proto: Option<Object>) {
        *self.0.proto.borrow_mut() = proto;
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.0))
    }

    /// Define (or overwrite) an own property.
    pub fn define(&self, key: impl Into<String>, property: Property) {
        self.0.properties.borrow_mut().insert(key.into(), property);
    }

    /// Shorthand for an own data property.
    pub fn define_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.define(key, Property::Data(value.into()));
    }

    /// Shorthand for an own data property holding a native function.
    pub fn define_method<F>(&self, key: &str, body: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + 'static,
    {
        self.define_value(key, Function::new(key, body));
    }

    pub fn get_own_property(&self, key: &str) -> Option<Property> {
        self.0.properties.borrow().get(key).cloned()
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.0.properties.borrow().contains_key(key)
    }

    /// `key in object`.
    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    pub fn delete(&self, key: &str) -> bool {
        self.0.properties.borrow_mut().remove(key).is_some()
    }

    pub fn own_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.0.properties.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Find a property on this object or its prototype chain.
    pub fn lookup(&self, key: &str) -> Option<Property> {
        let mut current = Some(self.clone());
        while let Some(object) = current {
            if let Some(property) = object.get_own_property(key) {
                return Some(property);
            }
            current = object.proto();
        }
        None
    }

    pub fn get(&self, key: &str) -> Result<Value> {
        self.get_with_receiver(key, &Value::Object(self.clone()))
    }

    /// Read `key`, running accessors against `receiver`.
    pub fn get_with_receiver(&self, key: &str, receiver: &Value) -> Result<Value> {
        match self.lookup(key) {
            Some(Property::Data(value)) => Ok(value),
            Some(Property::Accessor { get: Some(getter), .. }) => getter.call(receiver, &[]),
            Some(Property::Accessor { get: None, .. }) | None => Ok(Value::Undefined),
        }
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        self.set_with_receiver(key, value, &Value::Object(self.clone()))
    }

    /// Assign `key`. Accessors anywhere on the chain win; a getter-only
    /// accessor swallows the write.
    pub fn set_with_receiver(&self, key: &str, value: Value, receiver: &Value) -> Result<()> {
        match self.lookup(key) {
            Some(Property::Accessor { set: Some(setter), .. }) => {
                setter.call(receiver, &[value])?;
            }
            Some(Property::Accessor { set: None, .. }) => {}
            Some(Property::Data(_)) | None => self.define_value(key, value),
        }
        Ok(())
    }
}

/// Non-owning handle to an [`Object`].
#[derive(Clone)]
pub struct WeakObject(Weak<ObjectInner>);

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[object {{{}}}]", self.own_keys().join(", "))
    }
}
