/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::borrow::Cow;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::NodeId;
use crate::event::Attribute;
use crate::event::EventSource;
use crate::event::Namespace;
use crate::event::QName;
use crate::event::StartElement;
use crate::event::XmlEvent;
use crate::event::binary_event;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeKind {
    Element,
    Text,
    CData,
    Comment,
    DocumentTypeDecl,
    ProcessingInstruction,
    EntityReference,
    Whitespace,
}

/// Name, attributes and namespace declarations of an element.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Element {
    pub(crate) name: QName,
    pub(crate) attributes: Vec<Attribute>,
    pub(crate) namespaces: Vec<Namespace>,
}

impl Element {
    pub fn new(name: QName) -> Element {
        Element {
            name,
            attributes: Vec::new(),
            namespaces: Vec::new(),
        }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Namespace declarations made on this element.
    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    pub fn attribute(&self, namespace_uri: Option<&str>, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name.matches(namespace_uri, local_name))
            .map(|attr| attr.value.as_str())
    }

    pub(crate) fn set_attribute(&mut self, name: QName, value: &str) {
        let existing = self
            .attributes
            .iter_mut()
            .find(|attr| attr.name.matches(name.namespace_uri(), name.local_name()));
        match existing {
            Some(attr) => {
                attr.name = name;
                attr.value = value.to_string();
            }
            None => self.attributes.push(Attribute::new(name, value)),
        }
    }

    pub(crate) fn remove_attribute(&mut self, namespace_uri: Option<&str>, local_name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes
            .retain(|attr| !attr.name.matches(namespace_uri, local_name));
        before != self.attributes.len()
    }

    /// Declares or redeclares a prefix on this element.
    pub(crate) fn declare(&mut self, prefix: &str, uri: &str) {
        match self.namespaces.iter_mut().find(|ns| ns.prefix == prefix) {
            Some(ns) => ns.uri = uri.to_string(),
            None => self.namespaces.push(Namespace::new(prefix, uri)),
        }
    }

    pub(crate) fn declared_uri(&self, prefix: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|ns| ns.prefix == prefix)
            .map(|ns| ns.uri.as_str())
    }

    pub(crate) fn to_start_event(&self) -> XmlEvent {
        XmlEvent::StartElement(StartElement {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            namespaces: self.namespaces.clone(),
        })
    }
}

impl From<StartElement> for Element {
    fn from(start: StartElement) -> Self {
        Element {
            name: start.name,
            attributes: start.attributes,
            namespaces: start.namespaces,
        }
    }
}

/// Binary content of a text node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct BinaryText {
    pub(crate) data: Arc<[u8]>,
    pub(crate) content_id: Option<String>,
    pub(crate) optimize: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum TextContent {
    Chars(String),
    Binary(BinaryText),
}

#[derive(Clone, Debug, Default)]
pub(crate) struct DocumentInfo {
    pub(crate) root: Option<NodeId>,
    pub(crate) charset: Option<String>,
    pub(crate) xml_version: Option<String>,
}

pub(crate) enum Payload {
    Document(DocumentInfo),
    Element(Element),
    Text(TextContent),
    CData(String),
    Comment(String),
    Whitespace(String),
    ProcessingInstruction { target: String, data: String },
    EntityReference { name: String, replacement: Option<String> },
    DocumentTypeDecl(String),
}

impl Payload {
    pub(crate) fn kind(&self) -> Option<NodeKind> {
        match self {
            Payload::Document(_) => None,
            Payload::Element(_) => Some(NodeKind::Element),
            Payload::Text(_) => Some(NodeKind::Text),
            Payload::CData(_) => Some(NodeKind::CData),
            Payload::Comment(_) => Some(NodeKind::Comment),
            Payload::Whitespace(_) => Some(NodeKind::Whitespace),
            Payload::ProcessingInstruction { .. } => Some(NodeKind::ProcessingInstruction),
            Payload::EntityReference { .. } => Some(NodeKind::EntityReference),
            Payload::DocumentTypeDecl(_) => Some(NodeKind::DocumentTypeDecl),
        }
    }

    pub(crate) fn text_size(&self) -> usize {
        match self {
            Payload::Text(TextContent::Chars(s))
            | Payload::CData(s)
            | Payload::Comment(s)
            | Payload::Whitespace(s)
            | Payload::DocumentTypeDecl(s) => s.len(),
            Payload::Text(TextContent::Binary(binary)) => binary.data.len(),
            Payload::ProcessingInstruction { target, data } => target.len() + data.len(),
            Payload::EntityReference { name, replacement } => {
                name.len() + replacement.as_ref().map_or(0, |r| r.len())
            }
            Payload::Document(_) | Payload::Element(_) => 0,
        }
    }

    /// Character content of a leaf, binary content as base64.
    pub(crate) fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            Payload::Text(TextContent::Chars(s))
            | Payload::CData(s)
            | Payload::Comment(s)
            | Payload::Whitespace(s)
            | Payload::DocumentTypeDecl(s) => Some(Cow::Borrowed(s)),
            Payload::Text(TextContent::Binary(binary)) => {
                Some(Cow::Owned(BASE64.encode(&binary.data)))
            }
            Payload::ProcessingInstruction { data, .. } => Some(Cow::Borrowed(data)),
            Payload::EntityReference { replacement, .. } => {
                replacement.as_deref().map(Cow::Borrowed)
            }
            Payload::Document(_) | Payload::Element(_) => None,
        }
    }

    /// The event reported for a leaf node.
    pub(crate) fn to_leaf_event(&self) -> Option<XmlEvent> {
        let event = match self {
            Payload::Text(TextContent::Chars(s)) => XmlEvent::Characters(s.clone()),
            Payload::Text(TextContent::Binary(binary)) => {
                XmlEvent::Characters(BASE64.encode(&binary.data))
            }
            Payload::CData(s) => XmlEvent::CData(s.clone()),
            Payload::Comment(s) => XmlEvent::Comment(s.clone()),
            Payload::Whitespace(s) => XmlEvent::Whitespace(s.clone()),
            Payload::ProcessingInstruction { target, data } => XmlEvent::ProcessingInstruction {
                target: target.clone(),
                data: data.clone(),
            },
            Payload::EntityReference { name, replacement } => XmlEvent::EntityReference {
                name: name.clone(),
                replacement: replacement.clone(),
            },
            Payload::DocumentTypeDecl(s) => XmlEvent::Dtd(s.clone()),
            Payload::Document(_) | Payload::Element(_) => return None,
        };
        Some(event)
    }

    /// Builds the leaf payload for a non-structural event.
    pub(crate) fn from_leaf_event(event: XmlEvent) -> Option<Payload> {
        let payload = match event {
            XmlEvent::Characters(s) => Payload::Text(TextContent::Chars(s)),
            XmlEvent::CData(s) => Payload::CData(s),
            XmlEvent::Whitespace(s) => Payload::Whitespace(s),
            XmlEvent::Comment(s) => Payload::Comment(s),
            XmlEvent::ProcessingInstruction { target, data } => {
                Payload::ProcessingInstruction { target, data }
            }
            XmlEvent::EntityReference { name, replacement } => {
                Payload::EntityReference { name, replacement }
            }
            XmlEvent::Dtd(s) => Payload::DocumentTypeDecl(s),
            XmlEvent::StartDocument { .. }
            | XmlEvent::StartElement(_)
            | XmlEvent::EndElement
            | XmlEvent::EndDocument => return None,
        };
        Some(payload)
    }

    /// Builds the leaf payload for an event pulled from the source,
    /// picking up binary content reported through the properties.
    pub(crate) fn from_source_event(event: XmlEvent, source: &dyn EventSource) -> Option<Payload> {
        if let XmlEvent::Characters(_) = event
            && let Some(binary) = binary_event(source)
        {
            return Some(Payload::Text(TextContent::Binary(BinaryText {
                data: binary.data,
                content_id: binary.content_id,
                optimize: binary.optimize,
            })));
        }
        Payload::from_leaf_event(event)
    }

    pub(crate) fn as_element(&self) -> Option<&Element> {
        match self {
            Payload::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Payload::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn as_binary(&self) -> Option<&BinaryText> {
        match self {
            Payload::Text(TextContent::Binary(binary)) => Some(binary),
            _ => None,
        }
    }
}
