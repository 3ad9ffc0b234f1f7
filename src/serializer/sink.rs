/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::io::Write;

use crate::entities::escape;
use crate::entities::escape_attribute;
use crate::entities::escaped_size;
use crate::event::Attribute;
use crate::event::EventList;
use crate::event::Namespace;
use crate::event::QName;
use crate::event::StartElement;
use crate::event::XmlEvent;
use crate::namespace::NamespaceContext;
use crate::namespace::XMLNS_PREFIX;

use super::SinkError;
use super::error::description;

/// When a sink expects the namespace declarations of an element.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BindingOrder {
    /// Declarations are pushed before the start element they belong to.
    #[default]
    BeforeStartTag,
    /// Declarations are pushed right after their start element.
    AfterStartTag,
}

/// Push style receiver of XML events.
///
/// For each element the sink receives [EventSink::start_element], then
/// its namespace declarations (before or after the start element, as
/// told by [EventSink::binding_order]), then its attributes.
pub trait EventSink {
    fn binding_order(&self) -> BindingOrder {
        BindingOrder::BeforeStartTag
    }

    /// Bindings visible at the current output position.
    fn namespace_context(&self) -> &NamespaceContext;

    fn start_document(&mut self, version: &str, encoding: &str) -> Result<(), SinkError>;
    fn end_document(&mut self) -> Result<(), SinkError>;
    fn start_element(&mut self, name: &QName) -> Result<(), SinkError>;
    fn namespace(&mut self, prefix: &str, uri: &str) -> Result<(), SinkError>;
    fn attribute(&mut self, attribute: &Attribute) -> Result<(), SinkError>;
    fn end_element(&mut self) -> Result<(), SinkError>;
    fn characters(&mut self, text: &str) -> Result<(), SinkError>;
    fn cdata(&mut self, text: &str) -> Result<(), SinkError>;
    fn comment(&mut self, text: &str) -> Result<(), SinkError>;
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), SinkError>;
    fn entity_reference(&mut self, name: &str) -> Result<(), SinkError>;
    fn dtd(&mut self, text: &str) -> Result<(), SinkError>;
}

/// An [EventSink] writing XML text.
///
/// Elements without content are written as empty element tags. The XML
/// declaration is only written when enabled.
pub struct XmlWriter<W: Write> {
    out: W,
    buf: String,
    binding_order: BindingOrder,
    xml_declaration: bool,
    context: NamespaceContext,
    pending: Vec<Namespace>,
    open_tag: bool,
    elements: Vec<String>,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(out: W) -> XmlWriter<W> {
        XmlWriter {
            out,
            buf: String::new(),
            binding_order: BindingOrder::default(),
            xml_declaration: false,
            context: NamespaceContext::new(),
            pending: Vec::new(),
            open_tag: false,
            elements: Vec::new(),
        }
    }

    pub fn with_binding_order(mut self, order: BindingOrder) -> Self {
        self.binding_order = order;
        self
    }

    pub fn with_xml_declaration(mut self, enabled: bool) -> Self {
        self.xml_declaration = enabled;
        self
    }

    /// Writes out everything buffered so far.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.close_tag();
        self.flush_buf()?;
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<W, SinkError> {
        self.flush()?;
        Ok(self.out)
    }

    fn close_tag(&mut self) {
        if self.open_tag {
            self.buf.push('>');
            self.open_tag = false;
        }
    }

    fn write_declaration(&mut self, prefix: &str, uri: &str) {
        self.buf.push(' ');
        self.buf.push_str(XMLNS_PREFIX);
        if !prefix.is_empty() {
            self.buf.push(':');
            self.buf.push_str(prefix);
        }
        self.buf.push_str("=\"");
        escape_attribute(uri, &mut self.buf);
        self.buf.push('"');
        self.context.bind(prefix, uri);
    }

    fn flush_buf(&mut self) -> Result<(), SinkError> {
        self.out.write_all(self.buf.as_bytes())?;
        self.buf.clear();
        Ok(())
    }
}

impl XmlWriter<Vec<u8>> {
    pub fn into_string(self) -> Result<String, SinkError> {
        String::from_utf8(self.into_inner()?).map_err(|_| SinkError::BadState(description::NOT_UTF8))
    }
}

impl<W: Write> EventSink for XmlWriter<W> {
    fn binding_order(&self) -> BindingOrder {
        self.binding_order
    }

    fn namespace_context(&self) -> &NamespaceContext {
        &self.context
    }

    fn start_document(&mut self, version: &str, encoding: &str) -> Result<(), SinkError> {
        if self.xml_declaration {
            self.buf.push_str("<?xml version=\"");
            self.buf.push_str(version);
            self.buf.push_str("\" encoding=\"");
            self.buf.push_str(encoding);
            self.buf.push_str("\"?>");
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), SinkError> {
        self.flush()
    }

    fn start_element(&mut self, name: &QName) -> Result<(), SinkError> {
        self.close_tag();
        let qualified = name.qualified();
        self.buf.push('<');
        self.buf.push_str(&qualified);
        self.context.push_scope();
        for ns in std::mem::take(&mut self.pending) {
            self.write_declaration(&ns.prefix, &ns.uri);
        }
        self.elements.push(qualified);
        self.open_tag = true;
        Ok(())
    }

    fn namespace(&mut self, prefix: &str, uri: &str) -> Result<(), SinkError> {
        match self.binding_order {
            BindingOrder::BeforeStartTag => {
                self.pending.push(Namespace::new(prefix, uri));
            }
            BindingOrder::AfterStartTag => {
                if !self.open_tag {
                    return Err(SinkError::BadState(description::NO_OPEN_TAG));
                }
                self.write_declaration(prefix, uri);
            }
        }
        Ok(())
    }

    fn attribute(&mut self, attribute: &Attribute) -> Result<(), SinkError> {
        if !self.open_tag {
            return Err(SinkError::BadState(description::NO_OPEN_TAG));
        }
        self.buf.push(' ');
        self.buf.push_str(&attribute.name.qualified());
        self.buf.push_str("=\"");
        escape_attribute(&attribute.value, &mut self.buf);
        self.buf.push('"');
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), SinkError> {
        let qualified = self
            .elements
            .pop()
            .ok_or(SinkError::BadState(description::NO_OPEN_ELEMENT))?;
        if self.open_tag {
            self.buf.push_str("/>");
            self.open_tag = false;
        } else {
            self.buf.push_str("</");
            self.buf.push_str(&qualified);
            self.buf.push('>');
        }
        self.context.pop_scope();
        if self.elements.is_empty() {
            self.flush_buf()?;
        }
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), SinkError> {
        self.close_tag();
        self.buf.reserve(escaped_size(text));
        escape(text, &mut self.buf);
        Ok(())
    }

    fn cdata(&mut self, text: &str) -> Result<(), SinkError> {
        self.close_tag();
        self.buf.push_str("<![CDATA[");
        // A terminator inside the text splits it into two sections
        self.buf.push_str(&text.replace("]]>", "]]]]><![CDATA[>"));
        self.buf.push_str("]]>");
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), SinkError> {
        if text.contains("--") || text.ends_with('-') {
            return Err(SinkError::BadState(description::BAD_COMMENT));
        }
        self.close_tag();
        self.buf.push_str("<!--");
        self.buf.push_str(text);
        self.buf.push_str("-->");
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), SinkError> {
        if data.contains("?>") {
            return Err(SinkError::BadState(description::BAD_PI));
        }
        self.close_tag();
        self.buf.push_str("<?");
        self.buf.push_str(target);
        if !data.is_empty() {
            self.buf.push(' ');
            self.buf.push_str(data);
        }
        self.buf.push_str("?>");
        Ok(())
    }

    fn entity_reference(&mut self, name: &str) -> Result<(), SinkError> {
        self.close_tag();
        self.buf.push('&');
        self.buf.push_str(name);
        self.buf.push(';');
        Ok(())
    }

    fn dtd(&mut self, text: &str) -> Result<(), SinkError> {
        self.buf.push_str("<!DOCTYPE ");
        self.buf.push_str(text);
        self.buf.push('>');
        Ok(())
    }
}

/// An [EventSink] collecting the events it receives.
///
/// Declarations and attributes are folded back into their start element
/// event, so the recording can be replayed as an [EventList].
pub struct EventRecorder {
    events: Vec<XmlEvent>,
    binding_order: BindingOrder,
    context: NamespaceContext,
    pending: Vec<Namespace>,
    open: Option<StartElement>,
}

impl EventRecorder {
    pub fn new() -> EventRecorder {
        EventRecorder {
            events: Vec::new(),
            binding_order: BindingOrder::default(),
            context: NamespaceContext::new(),
            pending: Vec::new(),
            open: None,
        }
    }

    pub fn with_binding_order(mut self, order: BindingOrder) -> Self {
        self.binding_order = order;
        self
    }

    fn flush_open(&mut self) {
        if let Some(start) = self.open.take() {
            self.events.push(XmlEvent::StartElement(start));
        }
    }

    fn push(&mut self, event: XmlEvent) {
        self.flush_open();
        self.events.push(event);
    }

    pub fn events(&self) -> &[XmlEvent] {
        &self.events
    }

    pub fn into_events(mut self) -> Vec<XmlEvent> {
        self.flush_open();
        self.events
    }

    pub fn into_source(self) -> EventList {
        EventList::from(self.into_events())
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventRecorder {
    fn binding_order(&self) -> BindingOrder {
        self.binding_order
    }

    fn namespace_context(&self) -> &NamespaceContext {
        &self.context
    }

    fn start_document(&mut self, version: &str, encoding: &str) -> Result<(), SinkError> {
        self.push(XmlEvent::StartDocument {
            version: Some(version.to_string()),
            encoding: Some(encoding.to_string()),
        });
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), SinkError> {
        self.push(XmlEvent::EndDocument);
        Ok(())
    }

    fn start_element(&mut self, name: &QName) -> Result<(), SinkError> {
        self.flush_open();
        let mut start = StartElement::new(name.clone());
        self.context.push_scope();
        for ns in std::mem::take(&mut self.pending) {
            self.context.bind(&ns.prefix, &ns.uri);
            start.namespaces.push(ns);
        }
        self.open = Some(start);
        Ok(())
    }

    fn namespace(&mut self, prefix: &str, uri: &str) -> Result<(), SinkError> {
        match self.binding_order {
            BindingOrder::BeforeStartTag => self.pending.push(Namespace::new(prefix, uri)),
            BindingOrder::AfterStartTag => {
                let start = self
                    .open
                    .as_mut()
                    .ok_or(SinkError::BadState(description::NO_OPEN_TAG))?;
                start.namespaces.push(Namespace::new(prefix, uri));
                self.context.bind(prefix, uri);
            }
        }
        Ok(())
    }

    fn attribute(&mut self, attribute: &Attribute) -> Result<(), SinkError> {
        let start = self
            .open
            .as_mut()
            .ok_or(SinkError::BadState(description::NO_OPEN_TAG))?;
        start.attributes.push(attribute.clone());
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), SinkError> {
        if self.context.depth() == 0 {
            return Err(SinkError::BadState(description::NO_OPEN_ELEMENT));
        }
        self.push(XmlEvent::EndElement);
        self.context.pop_scope();
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), SinkError> {
        self.push(XmlEvent::Characters(text.to_string()));
        Ok(())
    }

    fn cdata(&mut self, text: &str) -> Result<(), SinkError> {
        self.push(XmlEvent::CData(text.to_string()));
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), SinkError> {
        self.push(XmlEvent::Comment(text.to_string()));
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), SinkError> {
        self.push(XmlEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
        Ok(())
    }

    fn entity_reference(&mut self, name: &str) -> Result<(), SinkError> {
        self.push(XmlEvent::EntityReference {
            name: name.to_string(),
            replacement: None,
        });
        Ok(())
    }

    fn dtd(&mut self, text: &str) -> Result<(), SinkError> {
        self.push(XmlEvent::Dtd(text.to_string()));
        Ok(())
    }
}
