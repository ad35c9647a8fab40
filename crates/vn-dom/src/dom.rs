//! The page realm: `Node.prototype` and `document` as dispatch tables.
//!
//! Native tree operations are installed as slots on [`Dom::node_prototype`]
//! and on the document's expando object, exactly where a page script would
//! find them. The page-level helpers on [`Dom`] always call through those
//! slots, so whatever is bound there (native or hook wrapper) observes them.

use vn_core::{Error, Function, Object, Property, Result, Value};

use crate::html;
use crate::node::{NodeKind, NodeRef};

/// One document and the prototype shared by all of its nodes.
#[derive(Clone)]
pub struct Dom {
    node_prototype: Object,
    document: NodeRef,
    body: NodeRef,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    /// A document with an empty `<html><head></head><body></body></html>`.
    pub fn new() -> Self {
        let node_prototype = Object::new();
        install_node_natives(&node_prototype);

        let document = NodeRef::new(NodeKind::Document, &node_prototype);
        install_document_natives(&document.object(), &node_prototype);

        let root = NodeRef::element("html", &node_prototype);
        let head = NodeRef::element("head", &node_prototype);
        let body = NodeRef::element("body", &node_prototype);
        root.adopt(head);
        root.adopt(body.clone());
        document.adopt(root);

        Self {
            node_prototype,
            document,
            body,
        }
    }

    /// `Node.prototype`.
    pub fn node_prototype(&self) -> &Object {
        &self.node_prototype
    }

    pub fn document(&self) -> &NodeRef {
        &self.document
    }

    /// The `document` object, where `createElement` and friends live.
    pub fn document_object(&self) -> Object {
        self.document.object()
    }

    pub fn body(&self) -> &NodeRef {
        &self.body
    }

    // =========================================================================
    // Page-level operations (always through the dispatch table)
    // =========================================================================

    pub fn create_element(&self, tag: &str) -> Result<NodeRef> {
        let created = self
            .document
            .to_value()
            .call_method("createElement", &[Value::from(tag)])?;
        expect_node(&created, "createElement")
    }

    pub fn create_text_node(&self, data: &str) -> Result<NodeRef> {
        let created = self
            .document
            .to_value()
            .call_method("createTextNode", &[Value::from(data)])?;
        expect_node(&created, "createTextNode")
    }

    pub fn import_node(&self, node: &NodeRef, deep: bool) -> Result<NodeRef> {
        let imported = self
            .document
            .to_value()
            .call_method("importNode", &[node.to_value(), Value::from(deep)])?;
        expect_node(&imported, "importNode")
    }

    pub fn clone_node(&self, node: &NodeRef, deep: bool) -> Result<NodeRef> {
        let copy = node.to_value().call_method("cloneNode", &[Value::from(deep)])?;
        expect_node(&copy, "cloneNode")
    }

    /// `parent.appendChild(child)`; the raw result is returned since a hook
    /// may substitute it.
    pub fn append_child(&self, parent: &NodeRef, child: &NodeRef) -> Result<Value> {
        parent.to_value().call_method("appendChild", &[child.to_value()])
    }

    pub fn insert_before(&self, parent: &NodeRef, child: &NodeRef, reference: Option<&NodeRef>) -> Result<Value> {
        let reference = reference.map_or(Value::Null, NodeRef::to_value);
        parent
            .to_value()
            .call_method("insertBefore", &[child.to_value(), reference])
    }

    pub fn replace_child(&self, parent: &NodeRef, child: &NodeRef, old: &NodeRef) -> Result<Value> {
        parent
            .to_value()
            .call_method("replaceChild", &[child.to_value(), old.to_value()])
    }

    pub fn remove_child(&self, parent: &NodeRef, child: &NodeRef) -> Result<Value> {
        parent.to_value().call_method("removeChild", &[child.to_value()])
    }

    pub fn inner_html(&self, node: &NodeRef) -> Result<String> {
        let html = node.to_value().get("innerHTML")?;
        Ok(html.as_str().unwrap_or_default().to_string())
    }

    pub fn set_inner_html(&self, node: &NodeRef, markup: &str) -> Result<()> {
        node.to_value().set("innerHTML", Value::from(markup))
    }
}

fn expect_node(value: &Value, method: &str) -> Result<NodeRef> {
    NodeRef::from_value(value)
        .ok_or_else(|| Error::type_error(format!("{method} did not return a Node ({})", value.describe())))
}

/// Argument `index` as a node, with the engine's error wording.
fn node_arg(args: &[Value], index: usize, method: &str) -> Result<NodeRef> {
    args.get(index).and_then(NodeRef::from_value).ok_or_else(|| {
        Error::type_error(format!(
            "Failed to execute '{method}' on 'Node': parameter {} is not of type 'Node'.",
            index + 1
        ))
    })
}

fn receiver(this: &Value, method: &str) -> Result<NodeRef> {
    NodeRef::from_value(this).ok_or_else(|| Error::type_error(format!("Illegal invocation of '{method}'")))
}

// =============================================================================
// Natives
// =============================================================================

fn install_node_natives(proto: &Object) {
    proto.define_method("appendChild", |this, args| {
        let parent = receiver(this, "appendChild")?;
        let child = node_arg(args, 0, "appendChild")?;
        parent.append(&child)?;
        Ok(child.to_value())
    });

    proto.define_method("insertBefore", |this, args| {
        let parent = receiver(this, "insertBefore")?;
        let child = node_arg(args, 0, "insertBefore")?;
        let reference = match args.get(1) {
            None | Some(Value::Undefined | Value::Null) => None,
            Some(_) => Some(node_arg(args, 1, "insertBefore")?),
        };
        parent.insert_before(&child, reference.as_ref())?;
        Ok(child.to_value())
    });

    proto.define_method("replaceChild", |this, args| {
        let parent = receiver(this, "replaceChild")?;
        let child = node_arg(args, 0, "replaceChild")?;
        let old = node_arg(args, 1, "replaceChild")?;
        parent.replace(&child, &old)?;
        Ok(old.to_value())
    });

    proto.define_method("removeChild", |this, args| {
        let parent = receiver(this, "removeChild")?;
        let child = node_arg(args, 0, "removeChild")?;
        parent.remove(&child)?;
        Ok(child.to_value())
    });

    proto.define_method("cloneNode", |this, args| {
        let node = receiver(this, "cloneNode")?;
        let deep = args.first().is_some_and(Value::truthy);
        Ok(node.clone_node(deep).to_value())
    });

    let get = Function::new("get innerHTML", |this, _| {
        let node = receiver(this, "innerHTML")?;
        Ok(Value::from(html::serialize_children(&node)))
    });
    let set = Function::new("set innerHTML", |this, args| {
        let node = receiver(this, "innerHTML")?;
        let markup = match args.first() {
            Some(Value::String(s)) => s.clone(),
            Some(v) if v.is_nullish() => String::new(),
            Some(v) => v.describe(),
            None => String::new(),
        };
        let target = node.template_content().unwrap_or_else(|| node.clone());
        let proto = node.object().proto().unwrap_or_default();
        target.clear();
        target.append(&html::parse_fragment(&markup, &proto))?;
        Ok(Value::Undefined)
    });
    proto.define(
        "innerHTML",
        Property::Accessor {
            get: Some(get),
            set: Some(set),
        },
    );
}

fn install_document_natives(document: &Object, node_prototype: &Object) {
    let proto = node_prototype.clone();
    document.define_method("createElement", move |_, args| {
        let tag = match args.first() {
            Some(Value::String(tag)) if !tag.is_empty() => tag.clone(),
            _ => {
                return Err(Error::thrown(
                    "InvalidCharacterError",
                    "The tag name provided is not a valid name.",
                ))
            }
        };
        Ok(NodeRef::element(&tag, &proto).to_value())
    });

    let proto = node_prototype.clone();
    document.define_method("createTextNode", move |_, args| {
        let data = args.first().and_then(Value::as_str).unwrap_or_default();
        Ok(NodeRef::text(data, &proto).to_value())
    });

    document.define_method("importNode", |_, args| {
        let node = node_arg(args, 0, "importNode")?;
        let deep = args.get(1).is_some_and(Value::truthy);
        Ok(node.clone_node(deep).to_value())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_skeleton() {
        let dom = Dom::new();
        let html = dom.document().first_child().unwrap();
        assert_eq!(html.node_name(), "HTML");
        assert!(NodeRef::ptr_eq(&html.parent().unwrap(), dom.document()));
        let names: Vec<_> = html.children().iter().map(NodeRef::node_name).collect();
        assert_eq!(names, ["HEAD", "BODY"]);
        assert!(NodeRef::ptr_eq(&dom.body().parent().unwrap(), &html));
        assert_eq!(crate::html::serialize_children(dom.document()), "<html><head></head><body></body></html>");
    }

    #[test]
    fn test_page_operations_go_through_slots() {
        let dom = Dom::new();
        let div = dom.create_element("div").unwrap();
        let text = dom.create_text_node("hello").unwrap();
        dom.append_child(&div, &text).unwrap();
        dom.append_child(dom.body(), &div).unwrap();
        assert_eq!(dom.inner_html(dom.body()).unwrap(), "<div>hello</div>");

        // rebinding the slot changes what the helper does
        dom.node_prototype()
            .define_method("appendChild", |_, _| Ok(Value::from("swallowed")));
        let span = dom.create_element("span").unwrap();
        let result = dom.append_child(&div, &span).unwrap();
        assert_eq!(result.as_str(), Some("swallowed"));
        assert!(span.parent().is_none());
    }

    #[test]
    fn test_inner_html_round_trip() {
        let dom = Dom::new();
        let div = dom.create_element("div").unwrap();
        dom.set_inner_html(&div, "<p>a</p><p>b</p>").unwrap();
        assert_eq!(div.children().len(), 2);
        dom.set_inner_html(&div, "<i>c</i>").unwrap();
        assert_eq!(dom.inner_html(&div).unwrap(), "<i>c</i>");
    }

    #[test]
    fn test_native_errors_are_dom_exceptions() {
        let dom = Dom::new();
        let div = dom.create_element("div").unwrap();
        let stray = dom.create_element("p").unwrap();

        let err = dom.remove_child(&div, &stray).unwrap_err();
        assert_eq!(err.name(), "NotFoundError");

        let err = div.to_value().call_method("appendChild", &[Value::from(1)]).unwrap_err();
        assert!(err.is_type_error());

        let err = dom.append_child(&div, &div).unwrap_err();
        assert_eq!(err.name(), "HierarchyRequestError");
    }

    #[test]
    fn test_import_and_clone() {
        let dom = Dom::new();
        let div = dom.create_element("div").unwrap();
        dom.set_inner_html(&div, "<b>x</b>").unwrap();

        let shallow = dom.clone_node(&div, false).unwrap();
        assert!(shallow.children().is_empty());
        let imported = dom.import_node(&div, true).unwrap();
        assert_eq!(dom.inner_html(&imported).unwrap(), "<b>x</b>");
    }

    #[test]
    fn test_insert_before_null_appends() {
        let dom = Dom::new();
        let list = dom.create_element("ul").unwrap();
        let a = dom.create_element("li").unwrap();
        let b = dom.create_element("li").unwrap();
        dom.insert_before(&list, &a, None).unwrap();
        dom.insert_before(&list, &b, Some(&a)).unwrap();
        assert!(NodeRef::ptr_eq(&list.first_child().unwrap(), &b));

        let c = dom.create_element("li").unwrap();
        let old = dom.replace_child(&list, &c, &a).unwrap();
        assert!(NodeRef::ptr_eq(&NodeRef::from_value(&old).unwrap(), &a));
    }
}
