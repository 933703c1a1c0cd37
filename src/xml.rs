//! Generic XML tree used for OPF and container documents.
//!
//! Every element keeps its tag, its attributes and its children in document
//! order, so repeated elements (several `<dc:creator>`, several `<item>`)
//! stay visible as siblings. Lookups match on the local name, which keeps
//! `opf:meta` and `meta` interchangeable.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum XmlNode {
    Text(String),
    Element(XmlElement),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlElement {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn local_name(&self) -> &str {
        local_name(&self.tag)
    }

    pub fn is(&self, name: &str) -> bool {
        self.local_name() == name
    }

    /// Attribute lookup; `name` matches the full key first, then the local part
    /// of a prefixed key (`opf:role` answers to `role`).
    pub fn attr(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.attributes.get(name) {
            return Some(value.as_str());
        }
        self.attributes
            .iter()
            .find(|(key, _)| local_name(key) == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |element| element.is(name))
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|element| element.is(name))
    }

    /// Concatenated text of this element and all of its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(element: &XmlElement, out: &mut String) {
    for child in &element.children {
        match child {
            XmlNode::Text(text) => out.push_str(text),
            XmlNode::Element(inner) => collect_text(inner, out),
        }
    }
}

/// Parse a document and return its root element.
///
/// Returns `Ok(None)` for documents without any element.
pub fn parse(content: &str) -> Result<Option<XmlElement>, quick_xml::Error> {
    let mut reader = Reader::from_str(content);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(element_from_start(&e)),
            Event::Empty(e) => {
                let element = element_from_start(&e);
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(e) => {
                push_text(&mut stack, &String::from_utf8_lossy(e.as_ref()));
            }
            Event::CData(e) => {
                push_text(&mut stack, &String::from_utf8_lossy(&e.into_inner()));
            }
            Event::GeneralRef(e) => {
                let entity = String::from_utf8_lossy(e.as_ref()).into_owned();
                match resolve_entity(&entity) {
                    Some(resolved) => push_text(&mut stack, &resolved),
                    None => push_text(&mut stack, &format!("&{entity};")),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // Unclosed elements at end of input still count.
    while let Some(element) = stack.pop() {
        attach(&mut stack, &mut root, element);
    }

    Ok(root)
}

fn element_from_start(start: &BytesStart<'_>) -> XmlElement {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value).into_owned();
        let value = quick_xml::escape::unescape(&raw)
            .map(|value| value.into_owned())
            .unwrap_or(raw);
        element.attributes.insert(key, value);
    }
    element
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, mut element: XmlElement) {
    drop_layout_whitespace(&mut element);
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

// Text arrives in pieces split around entity references, so it is not
// trimmed here. A whitespace-only run is kept once the parent has children,
// since it may separate inline elements (`<b>a</b> <i>b</i>`).
fn push_text(stack: &mut [XmlElement], text: &str) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if let Some(XmlNode::Text(existing)) = parent.children.last_mut() {
        existing.push_str(text);
    } else if !text.trim().is_empty() || !parent.children.is_empty() {
        parent.children.push(XmlNode::Text(text.to_owned()));
    }
}

/// Remove indentation between the children of a pure container element:
/// whitespace-only runs spanning a line break, when the element holds no
/// other text. Trailing whitespace-only runs are always removed.
fn drop_layout_whitespace(element: &mut XmlElement) {
    let is_blank = |node: &XmlNode| matches!(node, XmlNode::Text(text) if text.trim().is_empty());
    while element.children.last().is_some_and(is_blank) {
        element.children.pop();
    }
    let has_text = element
        .children
        .iter()
        .any(|node| matches!(node, XmlNode::Text(text) if !text.trim().is_empty()));
    if !has_text {
        element
            .children
            .retain(|node| !matches!(node, XmlNode::Text(text) if text.contains('\n') && text.trim().is_empty()));
    }
}

pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

/// Resolve an XML or common HTML entity name (without `&` and `;`).
pub fn resolve_entity(entity: &str) -> Option<String> {
    let named = match entity {
        "apos" => Some('\''),
        "quot" => Some('"'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "nbsp" => Some('\u{00A0}'),
        "mdash" => Some('\u{2014}'),
        "ndash" => Some('\u{2013}'),
        "hellip" => Some('\u{2026}'),
        "lsquo" => Some('\u{2018}'),
        "rsquo" => Some('\u{2019}'),
        "ldquo" => Some('\u{201C}'),
        "rdquo" => Some('\u{201D}'),
        "copy" => Some('\u{00A9}'),
        _ => None,
    };
    if let Some(c) = named {
        return Some(c.to_string());
    }

    let code = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    code.and_then(char::from_u32).map(|c| c.to_string())
}
