//! In-page capture script.
//!
//! Serialize-only: it reads the live document and returns a JSON string in
//! the [`DomSnapshot`](super::DomSnapshot) shape. It never mutates the page,
//! so it can run repeatedly on the same document.

use crate::config::MAX_FLATTEN_DEPTH;

/// Captures `document.documentElement` with open shadow roots and
/// same-origin iframe documents. Takes the depth ceiling as its argument;
/// elements past it are captured as their `outerHTML`.
pub const SNAPSHOT_SCRIPT: &str = r#"(maxDepth) => {
    function attrs(el) {
        return Array.from(el.attributes).map((a) => [a.name, a.value]);
    }

    function nodes(list, depth) {
        const out = [];
        for (const n of Array.from(list)) {
            if (n.nodeType === Node.ELEMENT_NODE) {
                out.push(element(n, depth));
            } else if (n.nodeType === Node.TEXT_NODE) {
                out.push({ type: 'text', text: n.data });
            } else if (n.nodeType === Node.COMMENT_NODE) {
                out.push({ type: 'comment', text: n.data });
            }
        }
        return out;
    }

    function frame(iframe, depth) {
        try {
            const doc = iframe.contentDocument
                || (iframe.contentWindow && iframe.contentWindow.document);
            if (!doc || !doc.documentElement) {
                return { status: 'inaccessible', reason: 'no contentDocument available' };
            }
            return {
                status: 'document',
                head: doc.head ? nodes(doc.head.childNodes, depth + 1) : [],
                body: doc.body ? nodes(doc.body.childNodes, depth + 1) : [],
            };
        } catch (e) {
            return { status: 'inaccessible', reason: String((e && e.message) || e) };
        }
    }

    function element(el, depth) {
        if (depth > maxDepth) {
            return { type: 'raw', html: el.outerHTML };
        }
        const out = {
            type: 'element',
            tag: el.tagName.toLowerCase(),
            attrs: attrs(el),
            children: nodes(el.childNodes, depth + 1),
        };
        if (el.shadowRoot) {
            out.shadowRoot = nodes(el.shadowRoot.childNodes, depth + 1);
        }
        if (el.tagName === 'IFRAME') {
            out.frame = frame(el, depth);
        }
        return out;
    }

    return JSON.stringify({ root: element(document.documentElement, 0) });
}"#;

/// The capture script applied to a depth ceiling, ready to evaluate.
pub fn snapshot_script(max_depth: usize) -> String {
    format!("({SNAPSHOT_SCRIPT})({})", max_depth.min(MAX_FLATTEN_DEPTH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_is_read_only() {
        for mutator in [
            "appendChild",
            "replaceChild",
            "removeChild",
            "innerHTML =",
            "setAttribute",
        ] {
            assert!(
                !SNAPSHOT_SCRIPT.contains(mutator),
                "capture script must not call {mutator}"
            );
        }
    }

    #[test]
    fn test_script_emits_snapshot_fields() {
        for field in [
            "shadowRoot",
            "status: 'document'",
            "status: 'inaccessible'",
            "type: 'raw'",
            "root:",
        ] {
            assert!(SNAPSHOT_SCRIPT.contains(field), "missing {field}");
        }
    }

    #[test]
    fn test_script_is_invoked_with_clamped_ceiling() {
        assert!(snapshot_script(100).ends_with("})(100)"));
        assert!(snapshot_script(1_000_000).ends_with("})(256)"));
        assert!(snapshot_script(5).starts_with("((maxDepth) => {"));
    }
}
