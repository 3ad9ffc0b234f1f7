/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

pub(crate) mod error;
mod reader;

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

pub use error::SourceError;
pub use reader::XmlReaderSource;

/// Well known property names for [EventSource::property()].
pub mod property {
    /// [Property::Flag] telling if the last character event carries binary content.
    pub const IS_BINARY: &str = "iksom.is-binary";
    /// [Property::Binary] with the decoded content of the last character event.
    pub const BINARY: &str = "iksom.binary";
    /// [Property::Flag] telling if the binary content may be sent as an attachment.
    pub const OPTIMIZE: &str = "iksom.optimize";
    /// [Property::Text] with the content-id already assigned to the binary content.
    pub const CONTENT_ID: &str = "iksom.content-id";
}

/// A namespace qualified name.
///
/// Missing namespace URIs and prefixes are stored as empty strings, so
/// `None` and `Some("")` are the same name.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct QName {
    namespace_uri: String,
    prefix: String,
    local_name: String,
}

impl QName {
    /// Creates a name without a namespace.
    pub fn new(local_name: &str) -> QName {
        QName::with_prefix("", "", local_name)
    }

    /// Creates a namespaced name without a preferred prefix.
    pub fn with_namespace(namespace_uri: &str, local_name: &str) -> QName {
        QName::with_prefix(namespace_uri, "", local_name)
    }

    pub fn with_prefix(namespace_uri: &str, prefix: &str, local_name: &str) -> QName {
        QName {
            namespace_uri: namespace_uri.to_string(),
            prefix: prefix.to_string(),
            local_name: local_name.to_string(),
        }
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn namespace_uri(&self) -> Option<&str> {
        if self.namespace_uri.is_empty() {
            None
        } else {
            Some(&self.namespace_uri)
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        if self.prefix.is_empty() {
            None
        } else {
            Some(&self.prefix)
        }
    }

    pub(crate) fn namespace_str(&self) -> &str {
        &self.namespace_uri
    }

    pub(crate) fn prefix_str(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn set_prefix(&mut self, prefix: &str) {
        self.prefix = prefix.to_string();
    }

    /// Checks the namespace URI and local name, ignoring the prefix.
    pub fn matches(&self, namespace_uri: Option<&str>, local_name: &str) -> bool {
        self.namespace_uri == namespace_uri.unwrap_or("") && self.local_name == local_name
    }

    /// Returns the name as written in XML text, `prefix:local` or `local`.
    pub fn qualified(&self) -> String {
        if self.prefix.is_empty() {
            self.local_name.clone()
        } else {
            format!("{}:{}", self.prefix, self.local_name)
        }
    }
}

impl Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.prefix.is_empty() {
            write!(f, "{}:", self.prefix)?;
        }
        f.write_str(&self.local_name)
    }
}

/// A namespace declaration, binding a prefix to a URI.
///
/// The empty prefix is the default namespace.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Namespace {
    pub prefix: String,
    pub uri: String,
}

impl Namespace {
    pub fn new(prefix: &str, uri: &str) -> Namespace {
        Namespace {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        }
    }
}

pub const DEFAULT_ATTRIBUTE_TYPE: &str = "CDATA";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
    /// Attribute type reported by the source, "CDATA" when unknown.
    pub attr_type: String,
}

impl Attribute {
    pub fn new(name: QName, value: &str) -> Attribute {
        Attribute {
            name,
            value: value.to_string(),
            attr_type: DEFAULT_ATTRIBUTE_TYPE.to_string(),
        }
    }
}

/// Payload of a start element event.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StartElement {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub namespaces: Vec<Namespace>,
}

impl StartElement {
    pub fn new(name: QName) -> StartElement {
        StartElement {
            name,
            attributes: Vec::new(),
            namespaces: Vec::new(),
        }
    }

    pub fn attribute(&self, namespace_uri: Option<&str>, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name.matches(namespace_uri, local_name))
            .map(|attr| attr.value.as_str())
    }
}

/// A token in a linear XML event stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum XmlEvent {
    StartDocument {
        version: Option<String>,
        encoding: Option<String>,
    },
    StartElement(StartElement),
    EndElement,
    Characters(String),
    CData(String),
    /// Ignorable whitespace.
    Whitespace(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
    EntityReference {
        name: String,
        replacement: Option<String>,
    },
    /// Document type declaration, the text between `<!DOCTYPE` and `>`.
    Dtd(String),
    EndDocument,
}

/// Out of band information about the last pulled event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Property {
    Flag(bool),
    Text(String),
    Binary(Arc<[u8]>),
}

/// Pull style cursor over an XML event stream.
pub trait EventSource {
    /// Pulls the next event.
    ///
    /// Pulling past the [XmlEvent::EndDocument] event is an error.
    fn next_event(&mut self) -> Result<XmlEvent, SourceError>;

    /// Looks up a named property of the last pulled event.
    ///
    /// Unrecognized names return `None`.
    fn property(&self, _name: &str) -> Option<Property> {
        None
    }
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn next_event(&mut self) -> Result<XmlEvent, SourceError> {
        (**self).next_event()
    }

    fn property(&self, name: &str) -> Option<Property> {
        (**self).property(name)
    }
}

impl<S: EventSource + ?Sized> EventSource for &mut S {
    fn next_event(&mut self) -> Result<XmlEvent, SourceError> {
        (**self).next_event()
    }

    fn property(&self, name: &str) -> Option<Property> {
        (**self).property(name)
    }
}

/// Binary content of a character event, as reported by the properties.
pub(crate) struct BinaryEvent {
    pub data: Arc<[u8]>,
    pub optimize: bool,
    pub content_id: Option<String>,
}

pub(crate) fn binary_event(source: &dyn EventSource) -> Option<BinaryEvent> {
    if source.property(property::IS_BINARY) != Some(Property::Flag(true)) {
        return None;
    }
    let Some(Property::Binary(data)) = source.property(property::BINARY) else {
        return None;
    };
    let optimize = !matches!(
        source.property(property::OPTIMIZE),
        Some(Property::Flag(false))
    );
    let content_id = match source.property(property::CONTENT_ID) {
        Some(Property::Text(id)) => Some(id),
        _ => None,
    };
    Some(BinaryEvent {
        data,
        optimize,
        content_id,
    })
}

struct ListEntry {
    event: XmlEvent,
    binary: Option<Arc<[u8]>>,
}

/// An in-memory event source.
///
/// Useful for synthetic streams and for replaying recorded events.
/// The chaining methods append events:
/// ```
/// use iksom::{EventList, QName};
///
/// let events = EventList::new()
///     .start_document()
///     .start_element(QName::new("greeting"))
///     .attribute(QName::new("lang"), "en")
///     .characters("hello")
///     .end_element()
///     .end_document();
/// assert_eq!(events.len(), 5);
/// ```
#[derive(Default)]
pub struct EventList {
    entries: VecDeque<ListEntry>,
    current_binary: Option<Arc<[u8]>>,
}

impl EventList {
    pub fn new() -> EventList {
        EventList {
            entries: VecDeque::new(),
            current_binary: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, event: XmlEvent) {
        self.entries.push_back(ListEntry {
            event,
            binary: None,
        });
    }

    pub fn event(mut self, event: XmlEvent) -> Self {
        self.push(event);
        self
    }

    pub fn start_document(self) -> Self {
        self.event(XmlEvent::StartDocument {
            version: None,
            encoding: None,
        })
    }

    pub fn end_document(self) -> Self {
        self.event(XmlEvent::EndDocument)
    }

    pub fn start_element(self, name: QName) -> Self {
        self.event(XmlEvent::StartElement(StartElement::new(name)))
    }

    pub fn end_element(self) -> Self {
        self.event(XmlEvent::EndElement)
    }

    /// Adds an attribute to the last start element event.
    pub fn attribute(mut self, name: QName, value: &str) -> Self {
        if let Some(ListEntry {
            event: XmlEvent::StartElement(start),
            ..
        }) = self.entries.back_mut()
        {
            start.attributes.push(Attribute::new(name, value));
        }
        self
    }

    /// Adds a namespace declaration to the last start element event.
    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        if let Some(ListEntry {
            event: XmlEvent::StartElement(start),
            ..
        }) = self.entries.back_mut()
        {
            start.namespaces.push(Namespace::new(prefix, uri));
        }
        self
    }

    pub fn characters(self, text: &str) -> Self {
        self.event(XmlEvent::Characters(text.to_string()))
    }

    pub fn comment(self, text: &str) -> Self {
        self.event(XmlEvent::Comment(text.to_string()))
    }

    /// Adds a character event carrying pre-decoded binary content.
    ///
    /// The event text is the base64 form of the content, and the
    /// binary properties are reported while it is the last pulled event.
    pub fn binary(mut self, data: &[u8]) -> Self {
        self.entries.push_back(ListEntry {
            event: XmlEvent::Characters(BASE64.encode(data)),
            binary: Some(Arc::from(data)),
        });
        self
    }
}

impl From<Vec<XmlEvent>> for EventList {
    fn from(events: Vec<XmlEvent>) -> Self {
        let mut list = EventList::new();
        for event in events {
            list.push(event);
        }
        list
    }
}

impl EventSource for EventList {
    fn next_event(&mut self) -> Result<XmlEvent, SourceError> {
        match self.entries.pop_front() {
            Some(entry) => {
                self.current_binary = entry.binary;
                Ok(entry.event)
            }
            None => Err(SourceError::UnexpectedEnd),
        }
    }

    fn property(&self, name: &str) -> Option<Property> {
        match name {
            property::IS_BINARY => Some(Property::Flag(self.current_binary.is_some())),
            property::BINARY => self.current_binary.clone().map(Property::Binary),
            _ => None,
        }
    }
}
