//! Self-extending fake objects.
//!
//! A [`ProxyChain`] stands in for a blocked third-party API (an analytics SDK,
//! an ad library) so that page code poking at it never fails with "undefined
//! is not a function". Unknown properties synthesize new nodes on demand and
//! are memoized per key; calls and constructions yield further nodes unless
//! the options say otherwise.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::function::Function;
use crate::object::{Object, Property};
use crate::value::Value;

/// Property key whose options apply to every unconfigured key.
pub const WILDCARD: &str = "*";

// =============================================================================
// Options
// =============================================================================

/// Behaviour when a node is called as a function.
#[derive(Clone, Default)]
pub enum Invoke {
    /// Return a new node configured by `returns`.
    #[default]
    Chain,
    /// Throw `TypeError: ... is not a function`.
    Deny,
    /// Delegate to a function with the original receiver and arguments.
    Handler(Function),
}

/// Configuration tree for a chain node and, recursively, its offspring.
#[derive(Clone)]
pub struct ProxyChainOptions {
    pub invoke: Invoke,
    /// `false` makes `new node()` throw.
    pub construct: bool,
    /// Result of primitive coercion.
    pub primitive: Value,
    /// Closed world: only keys listed in `properties` exist.
    pub fixed_properties: bool,
    /// Writes succeed silently without storing.
    pub readonly: bool,
    pub properties: HashMap<String, ProxyChainOptions>,
    /// Options for call results.
    pub returns: Option<Box<ProxyChainOptions>>,
    /// Options for constructed instances.
    pub instance: Option<Box<ProxyChainOptions>>,
    /// Diagnostic path prefix.
    pub trace: Vec<String>,
}

impl Default for ProxyChainOptions {
    fn default() -> Self {
        Self {
            invoke: Invoke::Chain,
            construct: true,
            primitive: Value::Undefined,
            fixed_properties: false,
            readonly: false,
            properties: HashMap::new(),
            returns: None,
            instance: None,
            trace: Vec::new(),
        }
    }
}

impl ProxyChainOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_invoke(mut self) -> Self {
        self.invoke = Invoke::Deny;
        self
    }

    pub fn invoke_with(mut self, handler: Function) -> Self {
        self.invoke = Invoke::Handler(handler);
        self
    }

    pub fn deny_construct(mut self) -> Self {
        self.construct = false;
        self
    }

    pub fn primitive(mut self, value: impl Into<Value>) -> Self {
        self.primitive = value.into();
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed_properties = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn property(mut self, key: impl Into<String>, options: ProxyChainOptions) -> Self {
        self.properties.insert(key.into(), options);
        self
    }

    pub fn returns(mut self, options: ProxyChainOptions) -> Self {
        self.returns = Some(Box::new(options));
        self
    }

    pub fn instance(mut self, options: ProxyChainOptions) -> Self {
        self.instance = Some(Box::new(options));
        self
    }

    pub fn trace<I, S>(mut self, trace: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trace = trace.into_iter().map(Into::into).collect();
        self
    }

    fn options_for(&self, key: &str) -> Option<ProxyChainOptions> {
        if let Some(options) = self.properties.get(key) {
            return Some(options.clone());
        }
        if self.fixed_properties {
            return None;
        }
        Some(self.properties.get(WILDCARD).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Chain Nodes
// =============================================================================

struct ProxyNode {
    options: ProxyChainOptions,
    trace: Vec<String>,
    store: RefCell<HashMap<String, Value>>,
}

/// One node of a fabricated object graph. Cloning shares identity.
#[derive(Clone)]
pub struct ProxyChain(Rc<ProxyNode>);

impl ProxyChain {
    pub fn new(options: ProxyChainOptions) -> Self {
        let trace = options.trace.clone();
        Self::with_trace(options, trace)
    }

    fn with_trace(options: ProxyChainOptions, trace: Vec<String>) -> Self {
        Self(Rc::new(ProxyNode {
            options,
            trace,
            store: RefCell::new(HashMap::new()),
        }))
    }

    fn child(&self, options: ProxyChainOptions, segment: &str) -> Self {
        let mut trace = self.0.trace.clone();
        trace.push(segment.to_string());
        log::trace!(target: "proxy_chain", "synthesized {}", trace.join("."));
        Self::with_trace(options, trace)
    }

    /// Define a getter-only `name` on `target` that always yields the same
    /// root node. Writes to it are swallowed.
    pub fn assign(target: &Object, name: &str, mut options: ProxyChainOptions) -> Self {
        options.trace.push(name.to_string());
        let root = Self::new(options);

        let node = root.clone();
        let getter = Function::new(format!("get {name}"), move |_, _| Ok(Value::Proxy(node.clone())));
        let setter = Function::new(format!("set {name}"), |_, _| Ok(Value::Undefined));
        target.define(
            name,
            Property::Accessor {
                get: Some(getter),
                set: Some(setter),
            },
        );
        log::debug!(target: "proxy_chain", "assigned stub {}", root.0.trace.join("."));
        root
    }

    pub fn options(&self) -> &ProxyChainOptions {
        &self.0.options
    }

    /// Diagnostic path of this node.
    pub fn trace(&self) -> &[String] {
        &self.0.trace
    }

    /// `node[key]`.
    pub fn get(&self, key: &str) -> Value {
        // Never look like a thenable to promise resolution.
        if key == "then" {
            return Value::Undefined;
        }
        if let Some(value) = self.0.store.borrow().get(key) {
            return value.clone();
        }
        let Some(options) = self.0.options.options_for(key) else {
            return Value::Undefined;
        };
        let node = Value::Proxy(self.child(options, key));
        self.0.store.borrow_mut().insert(key.to_string(), node.clone());
        node
    }

    /// `node[key] = value`. Always reports success.
    pub fn set(&self, key: &str, value: Value) -> bool {
        if self.0.options.readonly {
            log::trace!(target: "proxy_chain", "ignored write to {}.{key}", self.0.trace.join("."));
            return true;
        }
        self.0.store.borrow_mut().insert(key.to_string(), value);
        true
    }

    /// `key in node`.
    pub fn has(&self, key: &str) -> bool {
        self.0.store.borrow().contains_key(key) || self.0.options.properties.contains_key(key)
    }

    /// `node(...args)`.
    pub fn invoke(&self, this: &Value, args: &[Value]) -> Result<Value> {
        match &self.0.options.invoke {
            Invoke::Deny => Err(Error::NotAFunction(self.0.trace.join("."))),
            Invoke::Handler(handler) => handler.call(this, args),
            Invoke::Chain => {
                let options = self.0.options.returns.as_deref().cloned().unwrap_or_default();
                Ok(Value::Proxy(self.child(options, "()")))
            }
        }
    }

    /// `new node(...args)`.
    pub fn construct(&self, _args: &[Value]) -> Result<Value> {
        if !self.0.options.construct {
            return Err(Error::NotAConstructor(self.0.trace.join(".")));
        }
        let options = self.0.options.instance.as_deref().cloned().unwrap_or_default();
        Ok(Value::Proxy(self.child(options, "new")))
    }

    /// `Symbol.toPrimitive` result.
    pub fn to_primitive(&self) -> Value {
        self.0.options.primitive.clone()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for ProxyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProxyChain({})", self.0.trace.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(value: &Value) -> &ProxyChain {
        value.as_proxy().expect("expected a chain node")
    }

    #[test]
    fn test_unknown_key_is_memoized() {
        let root = ProxyChain::new(ProxyChainOptions::new());
        let a = root.get("tracker");
        let b = root.get("tracker");
        assert!(a.same_value(&b));
        assert!(!a.same_value(&root.get("other")));
    }

    #[test]
    fn test_then_is_undefined() {
        let root = ProxyChain::new(ProxyChainOptions::new());
        assert!(root.get("then").is_undefined());
        root.set("then", Value::from(1));
        assert!(root.get("then").is_undefined());
    }

    #[test]
    fn test_fixed_properties_close_the_world() {
        let options = ProxyChainOptions::new()
            .fixed()
            .property("push", ProxyChainOptions::new());
        let root = ProxyChain::new(options);
        assert!(root.get("push").as_proxy().is_some());
        assert!(root.get("anything").is_undefined());
        assert!(root.has("push"));
        assert!(!root.has("anything"));
    }

    #[test]
    fn test_wildcard_options_apply_to_unknown_keys() {
        let options = ProxyChainOptions::new().property(WILDCARD, ProxyChainOptions::new().deny_invoke());
        let root = ProxyChain::new(options);
        let child = root.get("whatever");
        assert!(child.call(&Value::Undefined, &[]).unwrap_err().is_type_error());
    }

    #[test]
    fn test_invoke_defaults_to_new_node() {
        let root = ProxyChain::new(ProxyChainOptions::new().trace(["gtag"]));
        let out = root.invoke(&Value::Undefined, &[Value::from("event")]).unwrap();
        assert_eq!(proxy(&out).trace(), ["gtag", "()"]);
        let again = root.invoke(&Value::Undefined, &[]).unwrap();
        assert!(!out.same_value(&again));
    }

    #[test]
    fn test_invoke_denied() {
        let root = ProxyChain::new(ProxyChainOptions::new().deny_invoke().trace(["adsbygoogle"]));
        let err = root.invoke(&Value::Undefined, &[]).unwrap_err();
        assert_eq!(err, Error::NotAFunction("adsbygoogle".into()));
    }

    #[test]
    fn test_invoke_handler_sees_receiver_and_args() {
        let handler = Function::new("handler", |this, args| {
            Ok(Value::from(format!("{}:{}", this.as_str().unwrap_or(""), args.len())))
        });
        let root = ProxyChain::new(ProxyChainOptions::new().invoke_with(handler));
        let out = root.invoke(&Value::from("me"), &[Value::Null, Value::Null]).unwrap();
        assert_eq!(out.as_str(), Some("me:2"));
    }

    #[test]
    fn test_returns_options_shape_call_results() {
        let options = ProxyChainOptions::new().returns(ProxyChainOptions::new().primitive("ok"));
        let root = ProxyChain::new(options);
        let out = root.invoke(&Value::Undefined, &[]).unwrap();
        assert_eq!(out.to_primitive().as_str(), Some("ok"));
    }

    #[test]
    fn test_construct() {
        let root = ProxyChain::new(ProxyChainOptions::new().instance(ProxyChainOptions::new().primitive(0)));
        let instance = root.construct(&[]).unwrap();
        assert_eq!(proxy(&instance).trace(), ["new"]);
        assert!(instance.to_primitive().same_value(&Value::from(0)));

        let denied = ProxyChain::new(ProxyChainOptions::new().deny_construct().trace(["Tracker"]));
        assert_eq!(
            denied.construct(&[]).unwrap_err(),
            Error::NotAConstructor("Tracker".into())
        );
    }

    #[test]
    fn test_readonly_swallows_writes() {
        let root = ProxyChain::new(ProxyChainOptions::new().readonly());
        let before = root.get("q");
        assert!(root.set("q", Value::from(1)));
        assert!(root.get("q").same_value(&before));
    }

    #[test]
    fn test_writable_stores() {
        let root = ProxyChain::new(ProxyChainOptions::new());
        root.set("q", Value::from(1));
        assert!(root.get("q").same_value(&Value::from(1)));
        assert!(root.has("q"));
    }

    #[test]
    fn test_primitive_default_is_undefined() {
        let root = ProxyChain::new(ProxyChainOptions::new());
        assert!(root.to_primitive().is_undefined());
        assert!(root.get("deep").to_primitive().is_undefined());
    }

    #[test]
    fn test_nested_property_options() {
        let options = ProxyChainOptions::new().property(
            "queue",
            ProxyChainOptions::new().fixed().property("push", ProxyChainOptions::new()),
        );
        let root = ProxyChain::new(options.trace(["fbq"]));
        let queue = root.get("queue");
        assert!(queue.get("push").unwrap().as_proxy().is_some());
        assert!(queue.get("pop").unwrap().is_undefined());
        assert_eq!(proxy(&queue.get("push").unwrap()).trace(), ["fbq", "queue", "push"]);
    }

    #[test]
    fn test_assign_stub_on_window() {
        let window = Object::new();
        ProxyChain::assign(&window, "ga", ProxyChainOptions::new().trace(["PRIVACY"]));
        let window = Value::from(window);

        let out = window
            .call_method("ga", &[Value::from("send"), Value::from("pageview")])
            .unwrap();
        assert_eq!(proxy(&out).trace(), ["PRIVACY", "ga", "()"]);

        let first = window.get("ga").unwrap();
        window.set("ga", Value::from("overwritten")).unwrap();
        assert!(window.get("ga").unwrap().same_value(&first));
    }
}
