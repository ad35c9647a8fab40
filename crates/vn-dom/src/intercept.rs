//! Insertion interception.
//!
//! [`InterceptDom`] lets rules veto nodes as they enter the tree. Each of the
//! three insertion methods gets one dispatcher that runs the registered
//! callbacks with ordinary hook semantics, and newly created nodes are
//! additionally scanned so that markup injected through `innerHTML`,
//! `importNode` or `cloneNode` is vetted before it can ever be inserted.
//! A registration is a single entry no matter how many slots it guards, so
//! an uninstall vote from any of them removes it everywhere.
//!
//! The scan inverts the usual polarity: a child is kept only when every
//! callback ignores it. Any decisive vote removes it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use vn_core::hook::{dispatch, Dispatch};
use vn_core::{
    CallContext, CallbackId, Function, HookCallback, HookRegistry, HookResult, Object, Property, Result, Value,
};

use crate::dom::Dom;
use crate::node::NodeRef;

const APPEND_METHODS: [&str; 3] = ["appendChild", "insertBefore", "replaceChild"];

/// Slot key and the callback bound there.
type Installed = Vec<(Object, &'static str, CallbackId)>;

struct AppendCallback {
    id: CallbackId,
    callback: HookCallback,
}

struct Inner {
    dom: Dom,
    registry: HookRegistry,
    /// Stand-in origin for the synthetic scan context.
    accept: Function,
    callbacks: RefCell<Vec<AppendCallback>>,
    /// Insertion dispatchers and creation hooks, present while any callback is.
    hooks: RefCell<Installed>,
}

/// Veto point for nodes entering the document.
#[derive(Clone)]
pub struct InterceptDom {
    inner: Rc<Inner>,
}

impl InterceptDom {
    pub fn new(dom: Dom, registry: HookRegistry) -> Self {
        Self {
            inner: Rc::new(Inner {
                dom,
                registry,
                accept: Function::new("accept", |_, _| Ok(Value::Undefined)),
                callbacks: RefCell::new(Vec::new()),
                hooks: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn dom(&self) -> &Dom {
        &self.inner.dom
    }

    /// Register an insertion callback. The same closure may be registered
    /// more than once; each registration gets its own id.
    pub fn set_append_child_callback<F>(&self, callback: F) -> Result<CallbackId>
    where
        F: Fn(&mut CallContext) -> Result<HookResult> + 'static,
    {
        self.set_shared_append_child_callback(Rc::new(callback))
    }

    pub fn set_shared_append_child_callback(&self, callback: HookCallback) -> Result<CallbackId> {
        self.inner.ensure_hooks()?;

        let id = CallbackId::next();
        self.inner.callbacks.borrow_mut().push(AppendCallback { id, callback });
        log::debug!(target: "dom", "append callback {id:?} registered");
        Ok(id)
    }

    /// Remove a callback from every chain. Removing the last one restores
    /// all native slots.
    pub fn remove_append_child_callback(&self, id: CallbackId) -> bool {
        self.inner.remove(id)
    }

    pub fn len(&self) -> usize {
        self.inner.callbacks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vet the subtree of a freshly created or reparsed node.
    pub fn on_create_node(&self, node: &NodeRef) -> Result<()> {
        self.inner.on_create_node(node)
    }
}

impl Inner {
    fn ensure_hooks(self: &Rc<Self>) -> Result<()> {
        if !self.hooks.borrow().is_empty() {
            return Ok(());
        }

        let document = self.dom.document_object();
        let proto = self.dom.node_prototype().clone();
        let mut installed = Vec::with_capacity(APPEND_METHODS.len() + 3);

        for method in APPEND_METHODS {
            let hook = self.registry.attach(&proto, method)?;
            let weak: Weak<Inner> = Rc::downgrade(self);
            let id = hook.add(move |ctx| match weak.upgrade() {
                Some(inner) => inner.on_append(ctx),
                None => Ok(HookResult::EXECUTION_IGNORE),
            });
            installed.push((proto.clone(), method, id));
        }

        let creators: [(Object, &'static str); 3] = [
            (document.clone(), "createElement"),
            (document, "importNode"),
            (proto, "cloneNode"),
        ];
        for (target, key) in creators {
            let hook = self.registry.attach(&target, key)?;
            let weak: Weak<Inner> = Rc::downgrade(self);
            let id = hook.add(move |ctx| {
                ctx.invoke_origin()?;
                if let (Some(inner), Some(node)) = (weak.upgrade(), NodeRef::from_value(&ctx.return_value)) {
                    inner.on_create_node(&node)?;
                }
                Ok(HookResult::EXECUTION_RETURN)
            });
            installed.push((target, key, id));
        }

        *self.hooks.borrow_mut() = installed;
        log::debug!(target: "dom", "insertion and creation hooks installed");
        Ok(())
    }

    fn release_hooks(&self) {
        let installed = std::mem::take(&mut *self.hooks.borrow_mut());
        for (target, key, id) in installed {
            if let Some(hook) = self.registry.hook_for(&target, key) {
                hook.remove(id);
            }
        }
        log::debug!(target: "dom", "insertion and creation hooks released");
    }

    fn remove(&self, id: CallbackId) -> bool {
        {
            let mut callbacks = self.callbacks.borrow_mut();
            match callbacks.iter().position(|entry| entry.id == id) {
                Some(index) => callbacks.remove(index),
                None => return false,
            };
        }
        log::debug!(target: "dom", "append callback {id:?} removed");

        if self.callbacks.borrow().is_empty() {
            self.release_hooks();
        }
        true
    }

    /// Run every registered callback for one insertion call. The verdict
    /// handed back to the slot's hook is decisive exactly when the callbacks
    /// were, so the hook invokes the native only on an aggregate ignore.
    fn on_append(&self, ctx: &mut CallContext) -> Result<HookResult> {
        let callbacks = self.scan_callbacks();
        let mut outcome = Dispatch::default();
        let result = dispatch(&callbacks, ctx, &mut outcome);
        for id in outcome.uninstall.iter().copied() {
            self.remove(id);
        }
        result?;

        if outcome.decisive() {
            Ok(HookResult::EXECUTION_RETURN)
        } else {
            Ok(HookResult::EXECUTION_IGNORE)
        }
    }

    fn scan_callbacks(&self) -> Vec<(CallbackId, HookCallback)> {
        self.callbacks
            .borrow()
            .iter()
            .map(|entry| (entry.id, entry.callback.clone()))
            .collect()
    }

    fn on_create_node(self: &Rc<Self>, node: &NodeRef) -> Result<()> {
        if node.is_element() && !node.object().has_own("innerHTML") {
            self.patch_inner_html(node);
        }

        let parent = node.template_content().unwrap_or_else(|| node.clone());
        for child in parent.children() {
            let callbacks = self.scan_callbacks();
            let mut ctx = CallContext::new(self.accept.clone(), parent.to_value(), vec![child.to_value()]);
            let mut outcome = Dispatch::default();
            let result = dispatch(&callbacks, &mut ctx, &mut outcome);
            for id in outcome.uninstall.iter().copied() {
                self.remove(id);
            }
            result?;

            if outcome.decisive() {
                if let Some(current) = child.parent() {
                    current.remove(&child)?;
                }
                log::debug!(target: "dom", "dropped {child:?} from {}", node.node_name());
            } else {
                self.on_create_node(&child)?;
            }
        }
        Ok(())
    }

    /// Shadow the inherited `innerHTML` with an own accessor that re-scans
    /// after every write.
    fn patch_inner_html(self: &Rc<Self>, node: &NodeRef) {
        let (get, set) = match node.object().lookup("innerHTML") {
            Some(Property::Accessor { get, set }) => (get, set),
            _ => (None, None),
        };

        let getter = Function::new("get innerHTML", move |this, args| match &get {
            Some(get) => get.call(this, args),
            None => Ok(Value::Undefined),
        });

        let weak = Rc::downgrade(self);
        let setter = Function::new("set innerHTML", move |this, args| {
            if let Some(set) = &set {
                set.call(this, args)?;
            }
            if let (Some(inner), Some(node)) = (weak.upgrade(), NodeRef::from_value(this)) {
                inner.on_create_node(&node)?;
            }
            Ok(Value::Undefined)
        });

        node.object().define(
            "innerHTML",
            Property::Accessor {
                get: Some(getter),
                set: Some(setter),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn slot(object: &Object, key: &str) -> Function {
        match object.get_own_property(key) {
            Some(Property::Data(Value::Function(f))) => f,
            other => panic!("unexpected slot {other:?}"),
        }
    }

    fn veto_tag(tag: &'static str) -> impl Fn(&mut CallContext) -> Result<HookResult> {
        move |ctx| {
            let node = NodeRef::from_value(&ctx.arg(0));
            if node.and_then(|n| n.tag_name()).as_deref() == Some(tag) {
                Ok(HookResult::EXECUTION_RETURN)
            } else {
                Ok(HookResult::EXECUTION_IGNORE)
            }
        }
    }

    #[test]
    fn test_register_installs_and_last_removal_restores() {
        let dom = Dom::new();
        let proto = dom.node_prototype().clone();
        let document = dom.document_object();
        let natives: Vec<_> = APPEND_METHODS.iter().map(|m| slot(&proto, m)).collect();
        let create_element = slot(&document, "createElement");
        let clone_node = slot(&proto, "cloneNode");

        let intercept = InterceptDom::new(dom, HookRegistry::new());
        let a = intercept.set_append_child_callback(|_| Ok(HookResult::EXECUTION_IGNORE)).unwrap();
        let b = intercept.set_append_child_callback(|_| Ok(HookResult::EXECUTION_IGNORE)).unwrap();
        assert!(!Function::ptr_eq(&slot(&proto, "appendChild"), &natives[0]));
        assert!(!Function::ptr_eq(&slot(&document, "createElement"), &create_element));

        assert!(intercept.remove_append_child_callback(a));
        assert!(!Function::ptr_eq(&slot(&proto, "appendChild"), &natives[0]));

        assert!(intercept.remove_append_child_callback(b));
        assert!(!intercept.remove_append_child_callback(b));
        for (method, native) in APPEND_METHODS.iter().zip(&natives) {
            assert!(Function::ptr_eq(&slot(&proto, method), native));
        }
        assert!(Function::ptr_eq(&slot(&document, "createElement"), &create_element));
        assert!(Function::ptr_eq(&slot(&proto, "cloneNode"), &clone_node));
    }

    #[test]
    fn test_append_uses_plain_hook_semantics() {
        let intercept = InterceptDom::new(Dom::new(), HookRegistry::new());
        intercept.set_append_child_callback(veto_tag("iframe")).unwrap();
        let dom = intercept.dom().clone();

        let frame = dom.create_element("iframe").unwrap();
        dom.append_child(dom.body(), &frame).unwrap();
        assert!(frame.parent().is_none());

        let div = dom.create_element("div").unwrap();
        dom.append_child(dom.body(), &div).unwrap();
        assert!(div.parent().is_some());
    }

    #[test]
    fn test_inner_html_is_scanned() {
        let intercept = InterceptDom::new(Dom::new(), HookRegistry::new());
        intercept.set_append_child_callback(veto_tag("iframe")).unwrap();
        let dom = intercept.dom().clone();

        let div = dom.create_element("div").unwrap();
        assert!(div.object().has_own("innerHTML"));
        dom.set_inner_html(&div, "<p><iframe></iframe>text</p>").unwrap();
        assert_eq!(dom.inner_html(&div).unwrap(), "<p>text</p>");
    }

    #[test]
    fn test_clone_and_import_are_scanned() {
        let dom = Dom::new();
        let source = dom.create_element("div").unwrap();
        dom.set_inner_html(&source, "<iframe></iframe><b>kept</b>").unwrap();

        let intercept = InterceptDom::new(dom.clone(), HookRegistry::new());
        intercept.set_append_child_callback(veto_tag("iframe")).unwrap();

        let cloned = dom.clone_node(&source, true).unwrap();
        assert_eq!(dom.inner_html(&cloned).unwrap(), "<b>kept</b>");
        let imported = dom.import_node(&source, true).unwrap();
        assert_eq!(dom.inner_html(&imported).unwrap(), "<b>kept</b>");
        // the source itself predates the interceptor
        assert_eq!(source.children().len(), 2);
    }

    #[test]
    fn test_scan_context_shape() {
        let intercept = InterceptDom::new(Dom::new(), HookRegistry::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = seen.clone();
        intercept
            .set_append_child_callback(move |ctx| {
                if ctx.origin.name() == "accept" {
                    let parent = NodeRef::from_value(&ctx.this).map(|n| n.node_name());
                    let child = NodeRef::from_value(&ctx.arg(0)).map(|n| n.node_name());
                    record.borrow_mut().push((parent, child, ctx.args.len()));
                }
                Ok(HookResult::EXECUTION_IGNORE)
            })
            .unwrap();
        let dom = intercept.dom().clone();
        let div = dom.create_element("div").unwrap();
        dom.set_inner_html(&div, "<span></span>").unwrap();

        assert_eq!(
            *seen.borrow(),
            [(Some("DIV".to_string()), Some("SPAN".to_string()), 1)]
        );
    }

    #[test]
    fn test_uninstall_vote_during_scan() {
        let intercept = InterceptDom::new(Dom::new(), HookRegistry::new());
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        intercept
            .set_append_child_callback(move |_| {
                counter.set(counter.get() + 1);
                Ok(HookResult::EXECUTION_IGNORE | HookResult::ACTION_UNINSTALL)
            })
            .unwrap();
        let dom = intercept.dom().clone();
        let div = dom.create_element("div").unwrap();
        dom.set_inner_html(&div, "<i></i><i></i>").unwrap();

        assert_eq!(calls.get(), 1);
        assert!(intercept.is_empty());
        assert_eq!(div.children().len(), 2);
    }

    #[test]
    fn test_uninstall_vote_on_insertion_removes_everywhere() {
        let dom = Dom::new();
        let proto = dom.node_prototype().clone();
        let natives: Vec<_> = APPEND_METHODS.iter().map(|m| slot(&proto, m)).collect();

        let intercept = InterceptDom::new(dom.clone(), HookRegistry::new());
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        intercept
            .set_append_child_callback(move |_| {
                counter.set(counter.get() + 1);
                Ok(HookResult::EXECUTION_IGNORE | HookResult::ACTION_UNINSTALL)
            })
            .unwrap();

        let first = dom.create_element("p").unwrap();
        dom.append_child(dom.body(), &first).unwrap();
        let second = dom.create_element("p").unwrap();
        dom.insert_before(dom.body(), &second, Some(&first)).unwrap();
        let div = dom.create_element("div").unwrap();
        dom.set_inner_html(&div, "<i></i>").unwrap();

        assert_eq!(calls.get(), 1);
        assert!(intercept.is_empty());
        // the ignore vote still let the first insertion through
        assert!(NodeRef::ptr_eq(&first.parent().unwrap(), dom.body()));
        assert!(NodeRef::ptr_eq(&dom.body().children()[0], &second));
        for (method, native) in APPEND_METHODS.iter().zip(&natives) {
            assert!(Function::ptr_eq(&slot(&proto, method), native));
        }
    }

    #[test]
    fn test_continue_vote_inserts_once() {
        let intercept = InterceptDom::new(Dom::new(), HookRegistry::new());
        intercept.set_append_child_callback(|_| Ok(HookResult::EXECUTION_CONTINUE)).unwrap();
        intercept.set_append_child_callback(|_| Ok(HookResult::EXECUTION_CONTINUE)).unwrap();
        let dom = intercept.dom().clone();

        let div = dom.create_element("div").unwrap();
        let returned = dom.append_child(dom.body(), &div).unwrap();
        assert!(NodeRef::ptr_eq(&NodeRef::from_value(&returned).unwrap(), &div));
        assert_eq!(dom.body().children().len(), 1);
    }

    #[test]
    fn test_callback_error_propagates_from_scan() {
        let intercept = InterceptDom::new(Dom::new(), HookRegistry::new());
        intercept
            .set_append_child_callback(|_| Err(vn_core::Error::type_error("boom")))
            .unwrap();
        let dom = intercept.dom().clone();
        let div = dom.create_element("div").unwrap();
        let err = dom.set_inner_html(&div, "<b></b>").unwrap_err();
        assert!(err.is_type_error());
    }
}
