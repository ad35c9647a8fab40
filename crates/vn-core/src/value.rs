//! Dynamic values exchanged with page code.
//!
//! Intercepted entry points receive and return [`Value`]s. Reference variants
//! (`Object`, `Function`, `Proxy`, `Promise`, `Host`) are cheap `Rc` handles and
//! compare by identity through [`Value::same_value`].

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::function::Function;
use crate::object::Object;
use crate::promise::Promise;
use crate::proxy_chain::ProxyChain;

// =============================================================================
// Host References
// =============================================================================

/// Type-erased handle to an object owned by the host (a DOM node, a request, ...).
///
/// A host reference may carry an expando [`Object`] so that property reads and
/// writes from page code go through the same reflective path as plain objects.
#[derive(Clone)]
pub struct HostRef {
    inner: Rc<dyn Any>,
    type_name: &'static str,
    object: Option<Object>,
}

impl HostRef {
    pub fn new<T: 'static>(inner: Rc<T>) -> Self {
        Self {
            inner,
            type_name: std::any::type_name::<T>(),
            object: None,
        }
    }

    /// Attach the expando object used for property access.
    pub fn with_object(mut self, object: Object) -> Self {
        self.object = Some(object);
        self
    }

    pub fn object(&self) -> Option<&Object> {
        self.object.as_ref()
    }

    pub fn downcast<T: 'static>(&self) -> Option<Rc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::as_ptr(&a.inner) as *const () == Rc::as_ptr(&b.inner) as *const ()
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[host {}]", self.type_name)
    }
}

// =============================================================================
// Value
// =============================================================================

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(Object),
    Function(Function),
    Proxy(ProxyChain),
    Promise(Promise),
    Host(HostRef),
}

impl Value {
    /// Result of the `typeof` operator.
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null | Self::Object(_) | Self::Promise(_) | Self::Host(_) => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) | Self::Proxy(_) => "function",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&ProxyChain> {
        match self {
            Self::Proxy(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Self::Promise(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_host(&self) -> Option<&HostRef> {
        match self {
            Self::Host(h) => Some(h),
            _ => None,
        }
    }

    /// Downcast a host value to its concrete type.
    pub fn downcast_host<T: 'static>(&self) -> Option<Rc<T>> {
        self.as_host().and_then(HostRef::downcast)
    }

    /// Truthiness, as `if (value)` would see it.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// `Object.is` semantics: identity for references, value for primitives.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Object::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Function::ptr_eq(a, b),
            (Self::Proxy(a), Self::Proxy(b)) => ProxyChain::ptr_eq(a, b),
            (Self::Promise(a), Self::Promise(b)) => Promise::ptr_eq(a, b),
            (Self::Host(a), Self::Host(b)) => HostRef::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `value[key]`.
    pub fn get(&self, key: &str) -> Result<Value> {
        match self {
            Self::Undefined | Self::Null => Err(Error::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                self.describe(),
                key
            ))),
            Self::Object(o) => o.get_with_receiver(key, self),
            Self::Proxy(p) => Ok(p.get(key)),
            Self::Function(f) if key == "name" => Ok(Value::from(f.name())),
            Self::Host(h) => match h.object() {
                Some(o) => o.get_with_receiver(key, self),
                None => Ok(Value::Undefined),
            },
            _ => Ok(Value::Undefined),
        }
    }

    /// `value[key] = v`.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        match self {
            Self::Undefined | Self::Null => Err(Error::type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                self.describe(),
                key
            ))),
            Self::Object(o) => o.set_with_receiver(key, value, self),
            Self::Proxy(p) => {
                p.set(key, value);
                Ok(())
            }
            Self::Host(h) => match h.object() {
                Some(o) => o.set_with_receiver(key, value, self),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// `value.apply(this, args)`.
    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        match self {
            Self::Function(f) => f.call(this, args),
            Self::Proxy(p) => p.invoke(this, args),
            _ => Err(Error::NotAFunction(self.describe())),
        }
    }

    /// `value[key](...args)` with `value` as the receiver.
    pub fn call_method(&self, key: &str, args: &[Value]) -> Result<Value> {
        let method = self.get(key)?;
        match method {
            Self::Function(_) | Self::Proxy(_) => method.call(self, args),
            _ => Err(Error::NotAFunction(key.to_string())),
        }
    }

    /// `new value(...args)`.
    pub fn construct(&self, args: &[Value]) -> Result<Value> {
        match self {
            Self::Proxy(p) => p.construct(args),
            _ => Err(Error::NotAConstructor(self.describe())),
        }
    }

    /// `Symbol.toPrimitive` coercion.
    pub fn to_primitive(&self) -> Value {
        match self {
            Self::Proxy(p) => p.to_primitive(),
            _ => self.clone(),
        }
    }

    /// Short label used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => format!("\"{s}\""),
            Self::Object(_) => "object".to_string(),
            Self::Function(f) => f.name().to_string(),
            Self::Proxy(p) => p.trace().join("."),
            Self::Promise(_) => "[object Promise]".to_string(),
            Self::Host(h) => h.type_name().to_string(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Object(o) => write!(f, "{o:?}"),
            Self::Function(func) => write!(f, "[function {}]", func.name()),
            Self::Proxy(p) => write!(f, "[ProxyChain {}]", p.trace().join(".")),
            Self::Promise(_) => f.write_str("[object Promise]"),
            Self::Host(h) => write!(f, "{h:?}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(n as f64)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Self::Object(o)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Self::Function(f)
    }
}

impl From<ProxyChain> for Value {
    fn from(p: ProxyChain) -> Self {
        Self::Proxy(p)
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Self {
        Self::Promise(p)
    }
}

impl From<HostRef> for Value {
    fn from(h: HostRef) -> Self {
        Self::Host(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget {
        id: u32,
    }

    #[test]
    fn test_same_value_primitives() {
        assert!(Value::from(1.0).same_value(&Value::from(1.0)));
        assert!(Value::Number(f64::NAN).same_value(&Value::Number(f64::NAN)));
        assert!(!Value::from("a").same_value(&Value::from("b")));
        assert!(!Value::Undefined.same_value(&Value::Null));
    }

    #[test]
    fn test_same_value_references() {
        let a = Object::new();
        let b = Object::new();
        assert!(Value::from(a.clone()).same_value(&Value::from(a)));
        assert!(!Value::from(b).same_value(&Value::from(Object::new())));
    }

    #[test]
    fn test_host_downcast_and_identity() {
        let widget = Rc::new(Widget { id: 7 });
        let v1 = Value::from(HostRef::new(widget.clone()));
        let v2 = Value::from(HostRef::new(widget));
        assert_eq!(v1.downcast_host::<Widget>().map(|w| w.id), Some(7));
        assert!(v1.downcast_host::<String>().is_none());
        assert!(v1.same_value(&v2));
    }

    #[test]
    fn test_reading_from_undefined_throws() {
        let err = Value::Undefined.get("x").unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_calling_non_callable() {
        let err = Value::from(3).call(&Value::Undefined, &[]).unwrap_err();
        assert_eq!(err, Error::NotAFunction("3".into()));
        let err = Value::from(Object::new()).call_method("missing", &[]).unwrap_err();
        assert_eq!(err, Error::NotAFunction("missing".into()));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from("").truthy());
        assert!(Value::from("x").truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(Value::from(Object::new()).truthy());
    }
}
