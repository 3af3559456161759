//! Owned, detached copy of a live DOM tree.
//!
//! The in-page capture script serializes the document (including open shadow
//! roots and same-origin iframe documents) into this shape. Nothing here
//! refers back to the page.

use crate::config::MAX_FLATTEN_DEPTH;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Elements with no end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose text children are emitted without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "style", "script", "xmp", "iframe", "noembed", "noframes", "noscript",
];

/// A captured document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomSnapshot {
    /// The `<html>` element.
    pub root: ElementNode,
}

/// A captured node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DomNode {
    Element(ElementNode),
    Text { text: String },
    Comment { text: String },
    /// An element past the capture depth ceiling, kept as its `outerHTML`.
    Raw { html: String },
}

/// A captured element with its light-DOM children and, when present, its
/// shadow root children and iframe document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub tag: String,
    #[serde(default)]
    pub attrs: Vec<(String, String)>,
    #[serde(default)]
    pub children: Vec<DomNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_root: Option<Vec<DomNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<FrameContent>,
}

/// What the capture script found behind an `<iframe>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FrameContent {
    Document {
        #[serde(default)]
        head: Vec<DomNode>,
        #[serde(default)]
        body: Vec<DomNode>,
    },
    /// Cross-origin or otherwise unreadable.
    Inaccessible { reason: String },
}

impl DomSnapshot {
    pub fn new(root: ElementNode) -> Self {
        Self { root }
    }

    /// Decode the capture script's result. The script returns a JSON string,
    /// but an already-decoded object is accepted too.
    pub fn from_script_value(value: serde_json::Value, max_depth: usize) -> Result<Self> {
        match value {
            serde_json::Value::String(raw) => Self::from_json(&raw, max_depth),
            serde_json::Value::Null => anyhow::bail!("capture script returned null"),
            other => Self::from_json(&other.to_string(), max_depth),
        }
    }

    /// Parse snapshot JSON captured with the given depth ceiling.
    ///
    /// Nesting is checked before decoding, so a snapshot deeper than the
    /// ceiling allows is rejected instead of recursing through it.
    pub fn from_json(raw: &str, max_depth: usize) -> Result<Self> {
        let limit = nesting_limit(max_depth);
        if exceeds_nesting(raw, limit) {
            anyhow::bail!(
                "DOM snapshot is nested deeper than the depth ceiling of {} allows",
                max_depth.min(MAX_FLATTEN_DEPTH)
            );
        }

        let mut de = serde_json::Deserializer::from_str(raw);
        de.disable_recursion_limit();
        let snapshot = Self::deserialize(&mut de).context("malformed DOM snapshot")?;
        de.end().context("trailing data after DOM snapshot")?;
        Ok(snapshot)
    }
}

/// JSON nesting a snapshot may reach. Each element level costs at most three
/// (element object, `frame` object, child array), plus the wrapper object,
/// attribute pairs and raw leaves past the ceiling.
fn nesting_limit(max_depth: usize) -> usize {
    3 * (max_depth.min(MAX_FLATTEN_DEPTH) + 1) + 8
}

/// Whether `{`/`[` nesting in a JSON text goes past `limit`. Iterative, so it
/// is safe on arbitrarily deep input.
fn exceeds_nesting(raw: &str, limit: usize) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for b in raw.bytes() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}

impl ElementNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
            shadow_root: None,
            frame: None,
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, node: impl Into<DomNode>) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(DomNode::Text { text: text.into() })
    }

    /// Attach an open shadow root.
    pub fn shadow(mut self, children: Vec<DomNode>) -> Self {
        self.shadow_root = Some(children);
        self
    }

    pub fn frame(mut self, frame: FrameContent) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of direct text children.
    pub fn own_text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                DomNode::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl From<ElementNode> for DomNode {
    fn from(el: ElementNode) -> Self {
        DomNode::Element(el)
    }
}

/// Serialize a snapshot the way `documentElement.outerHTML` would, ignoring
/// shadow roots and iframe documents.
pub fn render_snapshot(snapshot: &DomSnapshot) -> String {
    let mut out = String::new();
    render_element(&snapshot.root, &mut out);
    out
}

pub(crate) fn render_element(el: &ElementNode, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&el.tag.as_str()) {
        return;
    }

    let raw = RAW_TEXT_ELEMENTS.contains(&el.tag.as_str());
    for child in &el.children {
        render_node(child, raw, out);
    }

    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}

fn render_node(node: &DomNode, raw_text: bool, out: &mut String) {
    match node {
        DomNode::Element(el) => render_element(el, out),
        DomNode::Text { text } if raw_text => out.push_str(text),
        DomNode::Text { text } => escape_text(text, out),
        DomNode::Raw { html } => out.push_str(html),
        DomNode::Comment { text } => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FLATTEN_MAX_DEPTH;

    /// `levels` nested `<div>`s under `<html>`, built as text so no deep
    /// value ever exists on the Rust side.
    fn nested_divs_json(levels: usize) -> String {
        let mut raw = String::from(r#"{"root":{"tag":"html","children":["#);
        for _ in 0..levels {
            raw.push_str(r#"{"type":"element","tag":"div","attrs":[["class","x"]],"children":["#);
        }
        raw.push_str(r#"{"type":"text","text":"leaf"}"#);
        for _ in 0..levels {
            raw.push_str("]}");
        }
        raw.push_str("]}}");
        raw
    }

    #[test]
    fn test_render_escapes_text_and_attributes() {
        let snapshot = DomSnapshot::new(
            ElementNode::new("html").child(
                ElementNode::new("body").child(
                    ElementNode::new("p")
                        .attr("title", "a \"quoted\" & co")
                        .text("1 < 2 & 3 > 2"),
                ),
            ),
        );
        assert_eq!(
            render_snapshot(&snapshot),
            "<html><body><p title=\"a &quot;quoted&quot; &amp; co\">1 &lt; 2 &amp; 3 &gt; 2</p></body></html>"
        );
    }

    #[test]
    fn test_render_void_and_raw_text_elements() {
        let snapshot = DomSnapshot::new(
            ElementNode::new("html")
                .child(
                    ElementNode::new("head")
                        .child(ElementNode::new("meta").attr("charset", "utf-8"))
                        .child(ElementNode::new("style").text(".a > .b { color: red; }")),
                )
                .child(
                    ElementNode::new("body")
                        .child(ElementNode::new("br"))
                        .child(DomNode::Comment { text: " note ".to_string() }),
                ),
        );
        assert_eq!(
            render_snapshot(&snapshot),
            "<html><head><meta charset=\"utf-8\"><style>.a > .b { color: red; }</style></head>\
             <body><br><!-- note --></body></html>"
        );
    }

    #[test]
    fn test_render_ignores_shadow_and_frame_content() {
        let snapshot = DomSnapshot::new(
            ElementNode::new("html").child(
                ElementNode::new("body")
                    .child(
                        ElementNode::new("x-card")
                            .shadow(vec![ElementNode::new("span").text("hidden").into()]),
                    )
                    .child(ElementNode::new("iframe").attr("src", "/f").frame(
                        FrameContent::Inaccessible {
                            reason: "cross-origin".to_string(),
                        },
                    )),
            ),
        );
        let html = render_snapshot(&snapshot);
        assert_eq!(
            html,
            "<html><body><x-card></x-card><iframe src=\"/f\"></iframe></body></html>"
        );
    }

    #[test]
    fn test_decode_script_output() {
        let raw = r#"{"root":{"type":"element","tag":"html","attrs":[],"children":[
            {"type":"element","tag":"body","attrs":[["class","main"]],"children":[
                {"type":"element","tag":"my-el","attrs":[],"children":[],
                 "shadowRoot":[{"type":"text","text":"inside"}]},
                {"type":"element","tag":"iframe","attrs":[["src","https://other.example"]],"children":[],
                 "frame":{"status":"inaccessible","reason":"Blocked a frame"}}
            ]}
        ]}}"#;
        let value = serde_json::Value::String(raw.to_string());
        let snapshot = DomSnapshot::from_script_value(value, DEFAULT_FLATTEN_MAX_DEPTH).unwrap();
        let body = match &snapshot.root.children[0] {
            DomNode::Element(el) => el,
            other => panic!("unexpected node {other:?}"),
        };
        assert_eq!(body.get_attr("class"), Some("main"));
        match &body.children[0] {
            DomNode::Element(el) => assert!(el.shadow_root.is_some()),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_output() {
        let depth = DEFAULT_FLATTEN_MAX_DEPTH;
        assert!(DomSnapshot::from_script_value(serde_json::Value::Null, depth).is_err());
        assert!(DomSnapshot::from_script_value(
            serde_json::Value::String("{\"root\":".into()),
            depth
        )
        .is_err());
        assert!(
            DomSnapshot::from_script_value(serde_json::json!({"html": "<html>"}), depth).is_err()
        );
    }

    #[test]
    fn test_decode_snapshot_at_the_ceiling() {
        let raw = nested_divs_json(DEFAULT_FLATTEN_MAX_DEPTH);
        let snapshot = DomSnapshot::from_json(&raw, DEFAULT_FLATTEN_MAX_DEPTH).unwrap();
        let html = render_snapshot(&snapshot);
        assert_eq!(html.matches("<div class=\"x\">").count(), DEFAULT_FLATTEN_MAX_DEPTH);
        assert!(html.contains(">leaf</div>"));
    }

    #[test]
    fn test_decode_rejects_snapshot_past_the_ceiling() {
        let raw = nested_divs_json(10_000);
        let err = DomSnapshot::from_json(&raw, DEFAULT_FLATTEN_MAX_DEPTH).unwrap_err();
        assert!(err.to_string().contains("depth ceiling of 100"), "{err:#}");

        let err = DomSnapshot::from_script_value(serde_json::Value::String(raw), 100_000)
            .unwrap_err();
        assert!(err.to_string().contains("depth ceiling of 256"), "{err:#}");
    }

    #[test]
    fn test_nesting_scan_ignores_brackets_in_strings() {
        let raw = format!(r#"{{"root":{{"tag":"html","attrs":[["title","{}"]]}}}}"#, "[{".repeat(500));
        assert!(!exceeds_nesting(&raw, 10));
        assert!(exceeds_nesting(&"[".repeat(11), 10));
        assert!(!exceeds_nesting(r#"["\"[[[["]"#, 1));
    }

    #[test]
    fn test_raw_nodes_render_verbatim() {
        let raw = r#"{"root":{"tag":"html","children":[{"type":"element","tag":"body","children":[
            {"type":"raw","html":"<x-deep a=\"1\"><b>kept</b></x-deep>"}
        ]}]}}"#;
        let snapshot = DomSnapshot::from_json(raw, DEFAULT_FLATTEN_MAX_DEPTH).unwrap();
        assert_eq!(
            render_snapshot(&snapshot),
            "<html><body><x-deep a=\"1\"><b>kept</b></x-deep></body></html>"
        );
    }
}
