//! XML engine seam and the default in-memory tree.
//!
//! The package never interprets the XML it stores; it only needs a way to
//! turn bytes into a tree and back. [`XmlEngine`] is that contract.
//! [`QuickXmlEngine`] is the default implementation producing [`XmlDocument`].

use std::borrow::Cow;

use quick_xml::escape::unescape;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::OdfError;

/// Parse/serialize service for the document trees held by a package.
pub trait XmlEngine {
    /// Parsed representation of one XML stream.
    type Tree;

    /// Parse bytes into a tree.
    fn parse(&self, bytes: &[u8]) -> Result<Self::Tree, OdfError>;

    /// Serialize a tree back to bytes.
    fn serialize(&self, tree: &Self::Tree) -> Result<Vec<u8>, OdfError>;
}

/// Default engine backed by quick-xml.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuickXmlEngine;

impl XmlEngine for QuickXmlEngine {
    type Tree = XmlDocument;

    fn parse(&self, bytes: &[u8]) -> Result<XmlDocument, OdfError> {
        XmlDocument::parse(bytes)
    }

    fn serialize(&self, tree: &XmlDocument) -> Result<Vec<u8>, OdfError> {
        tree.to_bytes()
    }
}

/// Node in an [`XmlElement`]'s content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlNode {
    /// Nested element
    Element(XmlElement),
    /// Character data, unescaped
    Text(String),
    /// CDATA section content
    CData(String),
    /// Comment content
    Comment(String),
    /// Processing instruction (`target content`)
    ProcessingInstruction(String),
}

/// Element with qualified name, attributes in document order, and children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name, e.g. `office:document-content`
    pub name: String,
    /// Attributes as `(qualified name, unescaped value)`
    pub attributes: Vec<(String, String)>,
    /// Child nodes
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Create an element without attributes or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder-style child appender.
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Builder-style text appender.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    /// Attribute value by qualified name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set or replace an attribute.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Append text, merging with a trailing text node.
    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if let Some(XmlNode::Text(last)) = self.children.last_mut() {
            last.push_str(&text);
        } else {
            self.children.push(XmlNode::Text(text));
        }
    }

    /// Child elements.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    /// First descendant element (depth-first, including `self`) named `name`.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        if self.name == name {
            return Some(self);
        }
        self.elements().find_map(|child| child.find(name))
    }

    /// Mutable variant of [`XmlElement::find`].
    pub fn find_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(child) => child.find_mut(name),
            _ => None,
        })
    }

    /// Concatenated text and CDATA of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                XmlNode::Element(el) => el.collect_text(out),
                _ => {}
            }
        }
    }
}

/// Parsed XML stream: prolog nodes plus the root element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlDocument {
    /// Comments and processing instructions before the root element
    pub prolog: Vec<XmlNode>,
    /// Document element
    pub root: XmlElement,
}

impl XmlDocument {
    /// Wrap a root element.
    pub fn new(root: XmlElement) -> Self {
        Self {
            prolog: Vec::new(),
            root,
        }
    }

    /// Parse a complete XML document.
    pub fn parse(bytes: &[u8]) -> Result<Self, OdfError> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut prolog = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    stack.push(start_element(&reader, &e)?);
                }
                Ok(Event::Empty(e)) => {
                    let el = start_element(&reader, &e)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Ok(Event::End(_)) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| OdfError::Xml("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, el)?;
                }
                Ok(Event::Text(e)) => {
                    let text = e.decode().map_err(|err| OdfError::Xml(err.to_string()))?;
                    push_text(&mut stack, &text)?;
                }
                Ok(Event::GeneralRef(e)) => {
                    let entity = e.decode().map_err(|err| OdfError::Xml(err.to_string()))?;
                    let raw = format!("&{};", entity);
                    let resolved = unescape(&raw)
                        .map(Cow::into_owned)
                        .map_err(|err| OdfError::Xml(err.to_string()))?;
                    push_text(&mut stack, &resolved)?;
                }
                Ok(Event::CData(e)) => {
                    let text = decode_raw(&reader, &e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::CData(text)),
                        None => return Err(OdfError::Xml("CDATA outside root".to_string())),
                    }
                }
                Ok(Event::Comment(e)) => {
                    let node = XmlNode::Comment(decode_raw(&reader, &e)?);
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None if root.is_none() => prolog.push(node),
                        None => {}
                    }
                }
                Ok(Event::PI(e)) => {
                    let node = XmlNode::ProcessingInstruction(decode_raw(&reader, &e)?);
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None if root.is_none() => prolog.push(node),
                        None => {}
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => return Err(err.into()),
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(OdfError::Xml("unclosed element at end of input".to_string()));
        }
        let root = root.ok_or_else(|| OdfError::Xml("document has no root element".to_string()))?;
        Ok(Self { prolog, root })
    }

    /// Serialize with an XML declaration (`UTF-8`).
    pub fn to_bytes(&self) -> Result<Vec<u8>, OdfError> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;
        Ok(writer.into_inner())
    }
}

fn start_element(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<XmlElement, OdfError> {
    let name = reader
        .decoder()
        .decode(e.name().as_ref())
        .map_err(|err| OdfError::Xml(err.to_string()))?
        .into_owned();
    let mut el = XmlElement::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| OdfError::Xml(err.to_string()))?;
        let key = reader
            .decoder()
            .decode(attr.key.as_ref())
            .map_err(|err| OdfError::Xml(err.to_string()))?
            .into_owned();
        let raw = reader
            .decoder()
            .decode(&attr.value)
            .map_err(|err| OdfError::Xml(err.to_string()))?;
        let value = unescape(&raw)
            .map_err(|err| OdfError::Xml(err.to_string()))?
            .into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn decode_raw(reader: &Reader<&[u8]>, raw: &[u8]) -> Result<String, OdfError> {
    reader
        .decoder()
        .decode(raw)
        .map(Cow::into_owned)
        .map_err(|err| OdfError::Xml(err.to_string()))
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    el: XmlElement,
) -> Result<(), OdfError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(el)),
        None if root.is_none() => *root = Some(el),
        None => return Err(OdfError::Xml("multiple root elements".to_string())),
    }
    Ok(())
}

fn push_text(stack: &mut [XmlElement], text: &str) -> Result<(), OdfError> {
    match stack.last_mut() {
        Some(parent) => parent.push_text(text),
        None if text.trim().is_empty() => {}
        None => return Err(OdfError::Xml("text outside root element".to_string())),
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &XmlElement) -> Result<(), OdfError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if el.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for child in &el.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    Ok(())
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<(), OdfError> {
    match node {
        XmlNode::Element(el) => write_element(writer, el)?,
        XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        XmlNode::CData(text) => writer.write_event(Event::CData(BytesCData::new(text.as_str())))?,
        XmlNode::Comment(text) => {
            writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?
        }
        XmlNode::ProcessingInstruction(text) => {
            writer.write_event(Event::PI(BytesPI::new(text.as_str())))?
        }
    }
    Ok(())
}
