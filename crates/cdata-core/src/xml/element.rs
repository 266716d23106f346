use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::{BufRead, Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML parse error at byte {position}: {message}")]
    Read { position: u64, message: String },
    #[error("XML write error: {0}")]
    Write(String),
    #[error("Malformed XML document: {0}")]
    Malformed(String),
}

/// An owned XML element: tag, ordered attributes, optional text and child
/// elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, replacing an existing value in place.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// The first child with tag `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// True when the element has neither text nor children.
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.children.is_empty()
    }

    /// Serialises the element as a standalone document with an XML
    /// declaration and two-space indentation.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), XmlError> {
        let mut xml = Writer::new_with_indent(&mut *writer, b' ', 2);
        xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_error)?;
        write_element(&mut xml, self)?;
        writer.write_all(b"\n").map_err(write_error)
    }

    pub fn to_xml_string(&self) -> Result<String, XmlError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        String::from_utf8(buffer).map_err(write_error)
    }

    pub fn read_from(reader: &mut impl BufRead) -> Result<Element, XmlError> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|e| XmlError::Read {
                position: 0,
                message: e.to_string(),
            })?;
        Self::parse(&content)
    }

    /// Parses a document holding exactly one root element.
    ///
    /// `<a/>` has no text while `<a></a>` has empty text. Text of elements
    /// that also have children is trimmed, and whitespace-only text is
    /// dropped.
    pub fn parse(xml: &str) -> Result<Element, XmlError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    return Err(XmlError::Read {
                        position: reader.buffer_position() as u64,
                        message: e.to_string(),
                    });
                }
            };
            match event {
                Event::Start(start) => stack.push(open_element(&start)?),
                Event::Empty(start) => {
                    let element = open_element(&start)?;
                    close_element(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        let text = text.unescape().map_err(|e| XmlError::Malformed(e.to_string()))?;
                        top.text.get_or_insert_with(String::new).push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(top) = stack.last_mut() {
                        let data = data.into_inner();
                        top.text
                            .get_or_insert_with(String::new)
                            .push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::End(_) => {
                    let Some(mut element) = stack.pop() else {
                        return Err(XmlError::Malformed("unexpected closing tag".to_string()));
                    };
                    normalise_text(&mut element);
                    close_element(&mut stack, &mut root, element)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::Malformed(format!("element <{}> is never closed", open.name)));
        }
        root.ok_or_else(|| XmlError::Malformed("document has no root element".to_string()))
    }
}

fn open_element(start: &BytesStart) -> Result<Element, XmlError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| XmlError::Malformed(e.to_string()))?
        .to_string();
    let mut element = Element::new(name);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| XmlError::Malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| XmlError::Malformed(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn close_element(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::Malformed("more than one root element".to_string()));
    }
    *root = Some(element);
    Ok(())
}

/// Leaf elements keep their text verbatim, and an explicit start/end pair
/// with nothing between carries the empty string. Text mixed with child
/// elements is trimmed and dropped when only whitespace remains.
fn normalise_text(element: &mut Element) {
    if element.children.is_empty() {
        element.text.get_or_insert_with(String::new);
        return;
    }
    let Some(text) = element.text.take() else {
        return;
    };
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        element.text = Some(trimmed.to_string());
    }
}

fn write_error(e: impl std::fmt::Display) -> XmlError {
    XmlError::Write(e.to_string())
}

fn write_element<W: Write>(xml: &mut Writer<W>, element: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if element.is_empty() {
        return xml.write_event(Event::Empty(start)).map_err(write_error);
    }
    xml.write_event(Event::Start(start)).map_err(write_error)?;
    if let Some(text) = &element.text {
        xml.write_event(Event::Text(BytesText::new(text))).map_err(write_error)?;
    }
    for child in &element.children {
        write_element(xml, child)?;
    }
    xml.write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(write_error)
}
