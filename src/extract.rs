//! Structural extraction over parsed HTML.
//!
//! Program pages carry no stable schema, so fields are located by predicates
//! over the element tree (tag name, attribute value, shape of the ancestor
//! chain) instead of fixed paths. Two rules hold throughout:
//!
//! - A field assumed to be unique goes through [`find_single`], which fails
//!   with [`ScrapeError::AmbiguousStructure`] on a second match rather than
//!   picking one.
//! - A missing optional field is `Ok(None)`, not an error.
//!
//! Some pages need "take this heading, then everything else is the
//! description". That is a two-pass affair: the first pass records consumed
//! nodes in a [`Pruning`], [`Pruning::apply`] returns a scratch clone of the
//! document without them, and the second pass reads the leftovers with
//! [`text_with_br`]. The parsed document itself is never modified.

use crate::error::ScrapeError;
use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Elements under `root` (root included) for which `pred` holds, in document
/// order. The subtree of a match is not searched any further.
pub fn find_all<'a, P>(root: ElementRef<'a>, pred: P) -> Vec<ElementRef<'a>>
where
    P: Fn(&ElementRef<'a>) -> bool,
{
    let mut found = Vec::new();
    collect(root, &pred, &mut found);
    found
}

fn collect<'a, P>(el: ElementRef<'a>, pred: &P, found: &mut Vec<ElementRef<'a>>)
where
    P: Fn(&ElementRef<'a>) -> bool,
{
    if pred(&el) {
        found.push(el);
        return;
    }
    for child in el.children().filter_map(ElementRef::wrap) {
        collect(child, pred, found);
    }
}

/// The one element matching `pred`, `None` if there is none.
///
/// # Errors
///
/// [`ScrapeError::AmbiguousStructure`] naming `what` if more than one element
/// matches.
pub fn find_single<'a, P>(root: ElementRef<'a>, pred: P, what: &str) -> Result<Option<ElementRef<'a>>, ScrapeError>
where
    P: Fn(&ElementRef<'a>) -> bool,
{
    let mut found = find_all(root, pred);
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        n => Err(ScrapeError::ambiguous(what, n)),
    }
}

/// First element matching `pred` in document order.
pub fn find_first<'a, P>(root: ElementRef<'a>, pred: P) -> Option<ElementRef<'a>>
where
    P: Fn(&ElementRef<'a>) -> bool,
{
    find_all(root, pred).into_iter().next()
}

/// Last match in document order, for fields where a later node overrides
/// earlier ones.
pub fn find_last<'a, P>(root: ElementRef<'a>, pred: P) -> Option<ElementRef<'a>>
where
    P: Fn(&ElementRef<'a>) -> bool,
{
    find_all(root, pred).pop()
}

/// Tag name test.
pub fn is_tag(el: &ElementRef<'_>, name: &str) -> bool {
    el.value().name() == name
}

/// Attribute value, empty string if absent.
pub fn attr<'a>(el: &ElementRef<'a>, name: &str) -> &'a str {
    el.value().attr(name).unwrap_or("")
}

/// Whether `class` is one of the element's classes.
pub fn has_class(el: &ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// Parent element, if any.
pub fn parent<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.parent().and_then(ElementRef::wrap)
}

/// Whether the ancestor chain directly above `el` has the given tag names,
/// nearest first, e.g. `["td", "tr"]`.
pub fn has_ancestors(el: &ElementRef<'_>, tags: &[&str]) -> bool {
    let mut cur = *el;
    for tag in tags {
        match parent(&cur) {
            Some(p) if is_tag(&p, tag) => cur = p,
            _ => return false,
        }
    }
    true
}

/// All descendant text, each piece trimmed, empty pieces dropped, joined by
/// a single space.
pub fn text(el: &ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the direct text children only, trimmed and space-joined.
pub fn own_text(el: &ElementRef<'_>) -> String {
    el.children()
        .filter_map(|n| match n.value() {
            Node::Text(t) => {
                let s: &str = t;
                let s = s.trim();
                (!s.is_empty()).then_some(s)
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Paragraph text of several nodes.
///
/// Inside a node `<br>` becomes a line break, other whitespace collapses to a
/// single space and every line is trimmed. Non-empty nodes are joined by a
/// blank line.
pub fn text_with_br(nodes: &[ElementRef<'_>]) -> String {
    nodes
        .iter()
        .map(paragraph)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn paragraph(el: &ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(t) => {
                let s: &str = t;
                // source line breaks are layout, only <br> counts
                raw.extend(s.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
            }
            Node::Element(e) if e.name() == "br" => raw.push('\n'),
            _ => {}
        }
    }
    raw.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

/// Nodes consumed by a first extraction pass.
#[derive(Debug)]
pub struct Pruning<'a> {
    doc: &'a Html,
    consumed: Vec<ElementRef<'a>>,
}

impl<'a> Pruning<'a> {
    pub fn new(doc: &'a Html) -> Self {
        Self {
            doc,
            consumed: Vec::new(),
        }
    }

    /// Mark `el` and its subtree as consumed.
    pub fn consume(&mut self, el: ElementRef<'a>) {
        self.consumed.push(el);
    }

    /// Whether `el` lies inside a consumed subtree.
    pub fn is_consumed(&self, el: &ElementRef<'_>) -> bool {
        let id = el.id();
        self.consumed
            .iter()
            .any(|c| c.id() == id || el.ancestors().any(|a| a.id() == c.id()))
    }

    /// A clone of the document with every consumed subtree detached.
    pub fn apply(&self) -> Html {
        let mut scratch = self.doc.clone();
        for el in &self.consumed {
            if let Some(mut node) = scratch.tree.get_mut(el.id()) {
                node.detach();
            }
        }
        scratch
    }
}

/// The counterpart of `el` (an element of the original document) inside a
/// scratch copy made by [`Pruning::apply`]. `None` if it was detached.
pub fn relocate<'s>(scratch: &'s Html, el: &ElementRef<'_>) -> Option<ElementRef<'s>> {
    let node = scratch.tree.get(el.id())?;
    let attached = node.ancestors().any(|a| a.id() == scratch.tree.root().id());
    if attached {
        ElementRef::wrap(node)
    } else {
        None
    }
}
