//! DOM flattening: inline shadow roots and iframe documents into one document.
//!
//! Web-component portals render their data behind nested shadow roots with
//! iframes interleaved, so a plain `outerHTML` only shows empty custom
//! element shells. The capture script in [`script`] copies the live tree
//! into a [`DomSnapshot`]; [`flatten_snapshot`] then rewrites that owned copy
//! bottom-up so every nested piece of content becomes reachable by ordinary
//! CSS selectors.
//!
//! Output markers:
//! - shadow content is appended to its host as
//!   `<div data-shadow-root="true" data-shadow-host="<tag>">`
//! - iframes are replaced by `<div data-captured-iframe="true" ...>`
//! - copied styles are tagged `data-from-shadow` / `data-from-iframe`

pub mod script;
pub mod snapshot;

pub use script::{snapshot_script, SNAPSHOT_SCRIPT};
pub use snapshot::{render_snapshot, DomNode, DomSnapshot, ElementNode, FrameContent};

use crate::cancel::{guard_step, CancelSignal, StepError};
use crate::config::{BankSettings, DEFAULT_FLATTEN_MAX_DEPTH};
use crate::renderer::RenderContext;
use serde::Serialize;
use std::time::Duration;

/// Result of one flattening pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenedDocument {
    pub markup: String,
    /// Shadow roots inlined.
    pub shadow_roots: usize,
    /// Iframe documents inlined. Error markers are not counted.
    pub iframes: usize,
    /// True when the capture failed and `markup` is the page's plain HTML.
    pub degraded: bool,
}

/// Knobs for a flattening pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenOptions {
    /// Elements deeper than this are emitted unflattened.
    pub max_depth: usize,
    /// Budget for the capture script and the fallback HTML read.
    pub script_timeout: Duration,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_FLATTEN_MAX_DEPTH,
            script_timeout: Duration::from_secs(20),
        }
    }
}

impl FlattenOptions {
    pub fn from_settings(settings: &BankSettings) -> Self {
        Self {
            max_depth: settings.flatten_max_depth,
            script_timeout: settings.script_timeout(),
        }
    }
}

/// Flattening could not produce any markup.
#[derive(thiserror::Error, Debug)]
pub enum FlattenError {
    #[error("flattening cancelled")]
    Cancelled,

    #[error("flattening timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Both the capture script and the plain-HTML fallback failed.
    #[error("page unreadable: {0:#}")]
    Page(anyhow::Error),
}

impl From<StepError> for FlattenError {
    fn from(e: StepError) -> Self {
        match e {
            StepError::Cancelled => FlattenError::Cancelled,
            StepError::TimedOut(limit) => FlattenError::Timeout(limit),
            StepError::Failed(inner) => FlattenError::Page(inner),
        }
    }
}

/// Capture the page and flatten it.
///
/// A failing or malformed capture degrades to the page's plain markup with
/// zero counts. Cancellation and timeouts are returned as errors and never
/// produce a document.
pub async fn flatten_page(
    ctx: &dyn RenderContext,
    options: &FlattenOptions,
    cancel: &CancelSignal,
) -> Result<FlattenedDocument, FlattenError> {
    let script = snapshot_script(options.max_depth);
    let captured = guard_step(cancel, options.script_timeout, ctx.execute_js(&script)).await;

    let failure = match captured {
        Ok(value) => match DomSnapshot::from_script_value(value, options.max_depth) {
            Ok(snapshot) => {
                let doc = flatten_snapshot(&snapshot, options.max_depth);
                tracing::debug!(
                    "flattened {} shadow roots, {} iframes",
                    doc.shadow_roots,
                    doc.iframes
                );
                return Ok(doc);
            }
            Err(e) => e,
        },
        Err(StepError::Failed(e)) => e,
        Err(other) => return Err(other.into()),
    };

    tracing::warn!("DOM capture failed, falling back to plain HTML: {failure:#}");
    let markup = guard_step(cancel, options.script_timeout, ctx.get_html())
        .await
        .map_err(|e| match e {
            StepError::Failed(inner) => FlattenError::Page(
                inner.context(format!("capture failed ({failure:#}) and fallback HTML failed")),
            ),
            other => other.into(),
        })?;

    Ok(FlattenedDocument {
        markup,
        shadow_roots: 0,
        iframes: 0,
        degraded: true,
    })
}

/// Flatten an owned snapshot. The root element sits at depth 0. Raw nodes
/// left by the capture ceiling pass through unchanged.
pub fn flatten_snapshot(snapshot: &DomSnapshot, max_depth: usize) -> FlattenedDocument {
    let mut pass = Flattener {
        max_depth,
        shadow_roots: 0,
        iframes: 0,
    };
    let root = match pass.element(&snapshot.root, 0) {
        DomNode::Element(el) => el,
        // The root is never an iframe in a captured document; render what came back anyway.
        other => ElementNode::new("html").child(other),
    };

    let mut markup = String::new();
    snapshot::render_element(&root, &mut markup);

    FlattenedDocument {
        markup,
        shadow_roots: pass.shadow_roots,
        iframes: pass.iframes,
        degraded: false,
    }
}

struct Flattener {
    max_depth: usize,
    shadow_roots: usize,
    iframes: usize,
}

impl Flattener {
    fn nodes(&mut self, nodes: &[DomNode], depth: usize) -> Vec<DomNode> {
        nodes
            .iter()
            .map(|n| match n {
                DomNode::Element(el) => self.element(el, depth),
                other => other.clone(),
            })
            .collect()
    }

    fn element(&mut self, el: &ElementNode, depth: usize) -> DomNode {
        if depth > self.max_depth {
            return DomNode::Element(el.clone());
        }
        if el.tag == "iframe" {
            return self.iframe(el, depth);
        }

        // Light DOM first: slotted children can be shadow hosts themselves.
        let mut out = ElementNode {
            tag: el.tag.clone(),
            attrs: el.attrs.clone(),
            children: self.nodes(&el.children, depth + 1),
            shadow_root: None,
            frame: None,
        };

        if let Some(shadow) = &el.shadow_root {
            let content = self.nodes(shadow, depth + 1);
            let marker = ElementNode::new("div")
                .attr("data-shadow-root", "true")
                .attr("data-shadow-host", el.tag.as_str());
            out.children
                .push(DomNode::Element(with_styles(marker, content, "data-from-shadow")));
            self.shadow_roots += 1;
        }

        DomNode::Element(out)
    }

    fn iframe(&mut self, el: &ElementNode, depth: usize) -> DomNode {
        let marker = iframe_marker(el);
        match &el.frame {
            Some(FrameContent::Document { head, body }) => {
                let head = self.nodes(head, depth + 1);
                let body = self.nodes(body, depth + 1);

                let mut marker = marker;
                for style in head.iter().filter_map(top_level_style) {
                    marker = marker.child(tagged_style(style, "data-from-iframe"));
                }
                marker.children.extend(body);
                self.iframes += 1;
                DomNode::Element(marker)
            }
            Some(FrameContent::Inaccessible { reason }) => error_marker(marker, reason),
            None => error_marker(marker, "no contentDocument available"),
        }
    }
}

fn iframe_marker(iframe: &ElementNode) -> ElementNode {
    let mut marker = ElementNode::new("div")
        .attr("data-captured-iframe", "true")
        .attr("data-iframe-src", iframe.get_attr("src").unwrap_or(""))
        .attr("data-iframe-id", iframe.get_attr("id").unwrap_or(""))
        .attr("data-iframe-name", iframe.get_attr("name").unwrap_or(""));
    if let Some(width) = iframe.get_attr("width") {
        marker = marker.attr("data-iframe-width", width);
    }
    if let Some(height) = iframe.get_attr("height") {
        marker = marker.attr("data-iframe-height", height);
    }
    marker
}

fn error_marker(marker: ElementNode, reason: &str) -> DomNode {
    DomNode::Element(
        marker
            .attr("data-iframe-error", reason)
            .text(format!("[iframe not accessible: {reason}]")),
    )
}

/// Move top-level `<style>` children into tagged copies ahead of the content.
fn with_styles(mut marker: ElementNode, content: Vec<DomNode>, tag_attr: &str) -> ElementNode {
    let (styles, rest): (Vec<DomNode>, Vec<DomNode>) = content
        .into_iter()
        .partition(|n| top_level_style(n).is_some());
    for style in styles.iter().filter_map(top_level_style) {
        marker = marker.child(tagged_style(style, tag_attr));
    }
    marker.children.extend(rest);
    marker
}

fn top_level_style(node: &DomNode) -> Option<&ElementNode> {
    match node {
        DomNode::Element(el) if el.tag == "style" => Some(el),
        _ => None,
    }
}

fn tagged_style(style: &ElementNode, tag_attr: &str) -> ElementNode {
    ElementNode::new("style")
        .attr(tag_attr, "true")
        .text(style.own_text())
}
