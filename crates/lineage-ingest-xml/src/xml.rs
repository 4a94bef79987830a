//! Minimal element tree over `quick-xml`.
//!
//! Workflow exports are small enough to hold in memory, and the builder
//! needs random access (folder-level definitions are referenced from inside
//! mappings), so events are folded into a tree once per file.

use crate::attrs::Attr;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Raw attribute by exact (case-insensitive) key.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Logical attribute: the first non-blank value among its accepted
    /// spellings, in priority order.
    pub fn get(&self, attr: Attr) -> Option<&str> {
        attr.candidates()
            .iter()
            .filter_map(|key| self.attr(key))
            .find(|v| !v.trim().is_empty())
    }

    /// Logical attribute, trimmed, or the empty string.
    pub fn get_or_empty(&self, attr: Attr) -> &str {
        self.get(attr).map(str::trim).unwrap_or("")
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.is(name))
    }

    /// Depth-first, document order.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut out = Vec::new();
        self.collect_named(name, &mut out);
        out
    }

    fn collect_named<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if child.is(name) {
                out.push(child);
            }
            child.collect_named(name, out);
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed XML at byte {position}: {message}")]
pub struct XmlError {
    pub position: usize,
    pub message: String,
}

/// Parse a document into a synthetic `#document` root.
pub fn parse_document(text: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut stack: Vec<XmlElement> = vec![XmlElement::new("#document")];
    loop {
        let event = reader.read_event().map_err(|e| XmlError {
            position: reader.buffer_position(),
            message: e.to_string(),
        })?;
        match event {
            Event::Start(e) => stack.push(element_from(&e)),
            Event::Empty(e) => {
                let el = element_from(&e);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(el);
                }
            }
            Event::End(_) => fold_top(&mut stack),
            Event::Eof => break,
            _ => {}
        }
    }

    // Unclosed elements at EOF are kept rather than rejected.
    while stack.len() > 1 {
        fold_top(&mut stack);
    }
    Ok(stack.pop().unwrap_or_else(|| XmlElement::new("#document")))
}

fn fold_top(stack: &mut Vec<XmlElement>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(done) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(done);
        }
    }
}

fn element_from(start: &BytesStart<'_>) -> XmlElement {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes().with_checks(false).flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attrs.push((key, value));
    }
    XmlElement {
        name,
        attrs,
        children: Vec::new(),
    }
}
