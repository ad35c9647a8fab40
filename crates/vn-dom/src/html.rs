//! Tolerant HTML fragment parsing and serialization for `innerHTML`.
//!
//! This is not a full HTML5 tree builder. It handles what markup injected
//! by page scripts usually contains: nested elements, attributes in any
//! quoting style, void elements, raw-text elements, comments and `<template>`.

use std::fmt::Write as _;

use vn_core::Object;

use crate::node::{NodeKind, NodeRef, VOID_ELEMENTS};

/// Elements whose content is text up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Raw-text elements whose content is neither decoded nor escaped.
const UNESCAPED_ELEMENTS: &[&str] = &["script", "style"];

// =============================================================================
// Parsing
// =============================================================================

struct StartTag {
    name: String,
    attributes: Vec<(String, String)>,
    self_closing: bool,
}

/// Parse `html` into a detached document fragment.
pub fn parse_fragment(html: &str, proto: &Object) -> NodeRef {
    let root = NodeRef::new(NodeKind::Fragment, proto);
    let mut open = vec![root.clone()];
    let mut rest = html;

    while !rest.is_empty() {
        let parent = insertion_point(&open);

        if !is_markup(rest) {
            let end = next_markup(rest);
            append(&parent, NodeRef::text(&decode_entities(&rest[..end]), proto));
            rest = &rest[end..];
            continue;
        }

        if let Some(after) = rest.strip_prefix("<!--") {
            let (data, tail) = match after.find("-->") {
                Some(end) => (&after[..end], &after[end + 3..]),
                None => (after, ""),
            };
            append(&parent, NodeRef::new(NodeKind::Comment(data.to_string()), proto));
            rest = tail;
        } else if let Some(after) = rest.strip_prefix("<!") {
            // doctype and other declarations are dropped
            rest = after.find('>').map_or("", |end| &after[end + 1..]);
        } else if let Some(after) = rest.strip_prefix("</") {
            let end = after.find('>').unwrap_or(after.len());
            let name = after[..end].trim().to_ascii_lowercase();
            rest = after.get(end + 1..).unwrap_or("");
            close_element(&mut open, &name);
        } else {
            let (tag, consumed) = parse_start_tag(&rest[1..]);
            rest = &rest[1 + consumed..];

            let element = NodeRef::new(
                NodeKind::Element {
                    tag: tag.name.clone(),
                    attributes: tag.attributes,
                    content: None,
                },
                proto,
            );
            append(&parent, element.clone());

            if RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) {
                let (text, tail) = split_raw_text(rest, &tag.name);
                if !text.is_empty() {
                    let text = if UNESCAPED_ELEMENTS.contains(&tag.name.as_str()) {
                        text.to_string()
                    } else {
                        decode_entities(text)
                    };
                    append(&element, NodeRef::text(&text, proto));
                }
                rest = tail;
            } else if !tag.self_closing && !VOID_ELEMENTS.contains(&tag.name.as_str()) {
                open.push(element);
            }
        }
    }

    root
}

fn append(parent: &NodeRef, node: NodeRef) {
    // fresh nodes under an element or fragment never violate the hierarchy
    if let Err(err) = parent.append(&node) {
        log::warn!(target: "dom", "parser dropped {node:?}: {err}");
    }
}

/// Where new nodes go: the innermost open element, or its template content.
fn insertion_point(open: &[NodeRef]) -> NodeRef {
    let top = &open[open.len() - 1];
    top.template_content().unwrap_or_else(|| top.clone())
}

fn close_element(open: &mut Vec<NodeRef>, name: &str) {
    let found = open
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .find(|(_, node)| node.tag_name().as_deref() == Some(name))
        .map(|(index, _)| index);
    // stray end tags are ignored
    if let Some(index) = found {
        open.truncate(index);
    }
}

fn is_markup(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() > 1
        && bytes[0] == b'<'
        && (bytes[1].is_ascii_alphabetic() || bytes[1] == b'/' || bytes[1] == b'!')
}

fn next_markup(s: &str) -> usize {
    let mut from = 0;
    while let Some(offset) = s[from..].find('<') {
        let at = from + offset;
        if is_markup(&s[at..]) {
            return at;
        }
        from = at + 1;
    }
    s.len()
}

/// Parse a start tag; `s` begins right after `<`. Returns the tag and the
/// number of bytes consumed (including the closing `>`).
fn parse_start_tag(s: &str) -> (StartTag, usize) {
    let b = s.as_bytes();
    let mut i = 0;
    while i < b.len() && !b[i].is_ascii_whitespace() && b[i] != b'>' && b[i] != b'/' {
        i += 1;
    }
    let name = s[..i].to_ascii_lowercase();
    let mut attributes: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;

    loop {
        while i < b.len() && b[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= b.len() {
            break;
        }
        match b[i] {
            b'>' => {
                i += 1;
                break;
            }
            b'/' => {
                i += 1;
                if i < b.len() && b[i] == b'>' {
                    self_closing = true;
                    i += 1;
                    break;
                }
                continue;
            }
            _ => {}
        }

        let start = i;
        while i < b.len() && !b[i].is_ascii_whitespace() && !matches!(b[i], b'=' | b'>' | b'/') {
            i += 1;
        }
        let key = s[start..i].to_ascii_lowercase();
        while i < b.len() && b[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut value = String::new();
        if i < b.len() && b[i] == b'=' {
            i += 1;
            while i < b.len() && b[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < b.len() && (b[i] == b'"' || b[i] == b'\'') {
                let quote = b[i];
                i += 1;
                let from = i;
                while i < b.len() && b[i] != quote {
                    i += 1;
                }
                value = decode_entities(&s[from..i]);
                if i < b.len() {
                    i += 1;
                }
            } else {
                let from = i;
                while i < b.len() && !b[i].is_ascii_whitespace() && b[i] != b'>' {
                    i += 1;
                }
                value = decode_entities(&s[from..i]);
            }
        }

        // first occurrence wins, as in browsers
        if !key.is_empty() && !attributes.iter().any(|(k, _)| *k == key) {
            attributes.push((key, value));
        }
    }

    (
        StartTag {
            name,
            attributes,
            self_closing,
        },
        i,
    )
}

/// Split raw text content from the remainder after its end tag.
fn split_raw_text<'a>(s: &'a str, name: &str) -> (&'a str, &'a str) {
    let needle = format!("</{name}");
    match s.to_ascii_lowercase().find(&needle) {
        Some(at) => {
            let tail = &s[at..];
            let rest = tail.find('>').map_or("", |end| &tail[end + 1..]);
            (&s[..at], rest)
        }
        None => (s, ""),
    }
}

/// Decode the character references page markup commonly uses.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let c = match &tail[1..end] {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                entity => parse_numeric_reference(entity),
            };
            c.map(|c| (c, end + 1))
        });
        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_numeric_reference(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code)
}

// =============================================================================
// Serialization
// =============================================================================

/// The `innerHTML` of `node`: its children (template content for templates).
pub fn serialize_children(node: &NodeRef) -> String {
    let source = node.template_content().unwrap_or_else(|| node.clone());
    let raw = node
        .tag_name()
        .is_some_and(|tag| UNESCAPED_ELEMENTS.contains(&tag.as_str()));
    let mut out = String::new();
    for child in source.children() {
        write_node(&child, raw, &mut out);
    }
    out
}

/// The `outerHTML` of `node`.
pub fn serialize(node: &NodeRef) -> String {
    let mut out = String::new();
    write_node(node, false, &mut out);
    out
}

fn write_node(node: &NodeRef, raw_parent: bool, out: &mut String) {
    match node.kind() {
        NodeKind::Element { tag, attributes, .. } => {
            out.push('<');
            out.push_str(&tag);
            for (key, value) in &attributes {
                let _ = write!(out, " {key}=\"{}\"", escape(value, true));
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            out.push_str(&serialize_children(node));
            let _ = write!(out, "</{tag}>");
        }
        NodeKind::Text(data) if raw_parent => out.push_str(&data),
        NodeKind::Text(data) => out.push_str(&escape(&data, false)),
        NodeKind::Comment(data) => {
            let _ = write!(out, "<!--{data}-->");
        }
        NodeKind::Document | NodeKind::Fragment => {
            for child in node.children() {
                write_node(&child, false, out);
            }
        }
    }
}

fn escape(s: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> NodeRef {
        parse_fragment(html, &Object::new())
    }

    #[test]
    fn test_nested_elements() {
        let fragment = parse("<div id=a><p>one<b>two</b></p>three</div>");
        let div = fragment.first_child().unwrap();
        assert_eq!(div.tag_name().as_deref(), Some("div"));
        assert_eq!(div.attribute("id").as_deref(), Some("a"));
        assert_eq!(div.text_content(), "onetwothree");
        assert_eq!(div.children().len(), 2);
    }

    #[test]
    fn test_attribute_quoting() {
        let fragment = parse(r#"<img src='a.png' alt="x &amp; y" hidden data-n=3>"#);
        let img = fragment.first_child().unwrap();
        assert_eq!(img.attribute("src").as_deref(), Some("a.png"));
        assert_eq!(img.attribute("alt").as_deref(), Some("x & y"));
        assert_eq!(img.attribute("hidden").as_deref(), Some(""));
        assert_eq!(img.attribute("data-n").as_deref(), Some("3"));
        assert!(img.children().is_empty());
    }

    #[test]
    fn test_void_and_self_closing() {
        let fragment = parse("<br><span/>after");
        let names: Vec<_> = fragment.children().iter().map(NodeRef::node_name).collect();
        assert_eq!(names, ["BR", "SPAN", "#text"]);
    }

    #[test]
    fn test_script_is_raw_text() {
        let fragment = parse("<script>if (a < b && c) { x('</p>') }</script><i></i>");
        let script = fragment.first_child().unwrap();
        assert_eq!(script.text_content(), "if (a < b && c) { x('</p>') }");
        assert_eq!(fragment.children().len(), 2);
    }

    #[test]
    fn test_template_children_go_to_content() {
        let fragment = parse("<template><script src=ad.js></script></template>");
        let template = fragment.first_child().unwrap();
        assert!(template.children().is_empty());
        let content = template.template_content().unwrap();
        assert_eq!(content.first_child().unwrap().attribute("src").as_deref(), Some("ad.js"));
    }

    #[test]
    fn test_comments_and_stray_tags() {
        let fragment = parse("<!-- note --></em>text<!doctype html>");
        let children = fragment.children();
        assert_eq!(children[0].data().as_deref(), Some(" note "));
        assert_eq!(children[1].data().as_deref(), Some("text"));
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_lone_angle_bracket_is_text() {
        let fragment = parse("1 < 2 <b>ok</b>");
        assert_eq!(fragment.first_child().unwrap().data().as_deref(), Some("1 < 2 "));
    }

    #[test]
    fn test_entities() {
        assert_eq!(decode_entities("&lt;a&gt; &#65;&#x42; &bogus; &"), "<a> AB &bogus; &");
    }

    #[test]
    fn test_serialize() {
        let html = r#"<div class="x"><p>a &amp; b</p><br><!--c--><script>1<2</script></div>"#;
        let fragment = parse(html);
        assert_eq!(serialize_children(&fragment), html);
    }

    #[test]
    fn test_serialize_template_content() {
        let fragment = parse("<template><b>t</b></template>");
        assert_eq!(serialize(&fragment.first_child().unwrap()), "<template><b>t</b></template>");
    }
}
