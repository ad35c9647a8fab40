use regex::Regex;

use vn_core::{CallContext, HookRegistry, HookResult, Result};
use vn_dom::{Dom, InterceptDom, NodeRef};

/// Votes CONTINUE for any script whose `src` looks like an ad.
fn ad_script_rule() -> impl Fn(&mut CallContext) -> Result<HookResult> {
    let ads = Regex::new(r"(^|/)ads?[./]").unwrap();
    move |ctx| {
        let is_ad = NodeRef::from_value(&ctx.arg(0))
            .filter(|node| node.tag_name().as_deref() == Some("script"))
            .and_then(|node| node.attribute("src"))
            .is_some_and(|src| ads.is_match(&src));
        Ok(if is_ad {
            HookResult::EXECUTION_CONTINUE
        } else {
            HookResult::EXECUTION_IGNORE
        })
    }
}

fn setup() -> (InterceptDom, Dom) {
    let intercept = InterceptDom::new(Dom::new(), HookRegistry::new());
    intercept.set_append_child_callback(ad_script_rule()).unwrap();
    let dom = intercept.dom().clone();
    (intercept, dom)
}

#[test]
fn scan_drops_children_with_a_decisive_vote() {
    let (_intercept, dom) = setup();

    let div = dom.create_element("div").unwrap();
    dom.set_inner_html(&div, r#"<script src="ad.js"></script><p>hi</p>"#).unwrap();
    dom.append_child(dom.body(), &div).unwrap();

    assert!(NodeRef::ptr_eq(&div.parent().unwrap(), dom.body()));
    assert_eq!(dom.inner_html(&div).unwrap(), "<p>hi</p>");
}

#[test]
fn direct_append_keeps_plain_hook_polarity() {
    let (_intercept, dom) = setup();

    // CONTINUE on the append path means "run the real append"
    let script = dom.create_element("script").unwrap();
    script.set_attribute("src", "/ads/loader.js");
    dom.append_child(dom.body(), &script).unwrap();
    assert!(script.parent().is_some());
}

#[test]
fn template_content_is_scanned() {
    let (_intercept, dom) = setup();

    let holder = dom.create_element("div").unwrap();
    dom.set_inner_html(
        &holder,
        r#"<template><script src="ads.js"></script><em>ok</em></template>"#,
    )
    .unwrap();

    let template = holder.first_child().unwrap();
    let content = template.template_content().unwrap();
    let names: Vec<_> = content.children().iter().map(NodeRef::node_name).collect();
    assert_eq!(names, ["EM"]);
}

#[test]
fn nested_markup_is_scanned_recursively() {
    let (_intercept, dom) = setup();

    let div = dom.create_element("div").unwrap();
    dom.set_inner_html(
        &div,
        r#"<section><div><script src="https://cdn.example/ad.js"></script></div><script src="app.js"></script></section>"#,
    )
    .unwrap();
    assert_eq!(
        dom.inner_html(&div).unwrap(),
        r#"<section><div></div><script src="app.js"></script></section>"#
    );
}

#[test]
fn rescans_after_every_inner_html_write() {
    let (_intercept, dom) = setup();

    let div = dom.create_element("div").unwrap();
    dom.set_inner_html(&div, "<b>1</b>").unwrap();
    dom.set_inner_html(&div, r#"<script src="ad.js"></script>"#).unwrap();
    assert!(div.children().is_empty());
}

#[test]
fn releasing_the_last_callback_stops_scanning() {
    let intercept = InterceptDom::new(Dom::new(), HookRegistry::new());
    let dom = intercept.dom().clone();
    let first = intercept.set_append_child_callback(ad_script_rule()).unwrap();
    let second = intercept.set_append_child_callback(ad_script_rule()).unwrap();

    assert!(intercept.remove_append_child_callback(first));
    let div = dom.create_element("div").unwrap();
    dom.set_inner_html(&div, r#"<script src="ad.js"></script>"#).unwrap();
    assert!(div.children().is_empty());

    assert!(intercept.remove_append_child_callback(second));
    assert!(intercept.is_empty());
    let fresh = dom.create_element("div").unwrap();
    assert!(!fresh.object().has_own("innerHTML"));
    dom.set_inner_html(&fresh, r#"<script src="ad.js"></script>"#).unwrap();
    assert_eq!(fresh.children().len(), 1);
}
