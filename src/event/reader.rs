/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::VecDeque;
use std::io::BufRead;
use std::io::Cursor;

use quick_xml::NsReader;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::name::PrefixDeclaration;
use quick_xml::name::ResolveResult;

use super::Attribute;
use super::EventSource;
use super::Namespace;
use super::QName;
use super::SourceError;
use super::StartElement;
use super::XmlEvent;
use super::error::description;

/// An [EventSource] reading XML text.
///
/// Element and attribute names are resolved against the namespace
/// declarations in scope, and `xmlns` attributes are reported as
/// namespace declarations of the element instead of attributes.
/// Empty element tags are reported as a start and an end element.
///
/// ```
/// use iksom::{EventSource, XmlEvent, XmlReaderSource};
///
/// let mut source = XmlReaderSource::from_text("<a xmlns='urn:x'>hi</a>");
/// assert!(matches!(source.next_event(), Ok(XmlEvent::StartDocument { .. })));
/// let Ok(XmlEvent::StartElement(start)) = source.next_event() else { panic!() };
/// assert_eq!(start.name.namespace_uri(), Some("urn:x"));
/// ```
pub struct XmlReaderSource<R: BufRead> {
    reader: NsReader<R>,
    buffer: Vec<u8>,
    pending: VecDeque<XmlEvent>,
    depth: usize,
    started: bool,
    finished: bool,
}

impl XmlReaderSource<Cursor<Vec<u8>>> {
    pub fn from_text(xml: &str) -> Self {
        Self::new(Cursor::new(xml.as_bytes().to_vec()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(Cursor::new(bytes.to_vec()))
    }
}

impl<R: BufRead> XmlReaderSource<R> {
    pub fn new(input: R) -> Self {
        let mut reader = NsReader::from_reader(input);
        let config = reader.config_mut();
        config.expand_empty_elements = true;
        config.trim_text(false);
        XmlReaderSource {
            reader,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            depth: 0,
            started: false,
            finished: false,
        }
    }

    /// Drops whitespace around character data.
    pub fn with_trim_text(mut self, trim: bool) -> Self {
        self.reader.config_mut().trim_text(trim);
        self
    }

    fn begin_document(&mut self) {
        if !self.started {
            self.started = true;
            self.pending.push_back(XmlEvent::StartDocument {
                version: None,
                encoding: None,
            });
        }
    }

    fn read(&mut self) -> Result<(), SourceError> {
        loop {
            self.buffer.clear();
            let event = self.reader.read_event_into(&mut self.buffer)?.into_owned();
            match event {
                Event::Decl(decl) => {
                    if !self.started {
                        self.started = true;
                        let version = decode(&decl.version()?)?;
                        let encoding = match decl.encoding() {
                            Some(encoding) => Some(decode(&encoding?)?),
                            None => None,
                        };
                        self.pending.push_back(XmlEvent::StartDocument {
                            version: Some(version),
                            encoding,
                        });
                        return Ok(());
                    }
                }
                Event::Start(start) => {
                    let start = start_element(&self.reader, &start)?;
                    self.begin_document();
                    self.depth += 1;
                    self.pending.push_back(XmlEvent::StartElement(start));
                    return Ok(());
                }
                Event::Empty(start) => {
                    let start = start_element(&self.reader, &start)?;
                    self.begin_document();
                    self.pending.push_back(XmlEvent::StartElement(start));
                    self.pending.push_back(XmlEvent::EndElement);
                    return Ok(());
                }
                Event::End(_) => {
                    self.depth = self
                        .depth
                        .checked_sub(1)
                        .ok_or_else(|| SourceError::bad_xml(description::UNBALANCED_END))?;
                    self.pending.push_back(XmlEvent::EndElement);
                    return Ok(());
                }
                Event::Text(text) => {
                    let value = text.unescape()?.into_owned();
                    if self.depth == 0 {
                        if value.trim().is_empty() {
                            continue;
                        }
                        return Err(SourceError::bad_xml(description::TEXT_OUTSIDE_ROOT));
                    }
                    self.pending.push_back(XmlEvent::Characters(value));
                    return Ok(());
                }
                Event::CData(cdata) => {
                    let value = decode(&cdata)?;
                    self.pending.push_back(XmlEvent::CData(value));
                    return Ok(());
                }
                Event::Comment(comment) => {
                    self.begin_document();
                    let value = decode(&comment)?;
                    self.pending.push_back(XmlEvent::Comment(value));
                    return Ok(());
                }
                Event::PI(pi) => {
                    self.begin_document();
                    let value = decode(&pi)?;
                    let (target, data) = match value.split_once(char::is_whitespace) {
                        Some((target, data)) => (target.to_string(), data.trim_start().to_string()),
                        None => (value, String::new()),
                    };
                    self.pending
                        .push_back(XmlEvent::ProcessingInstruction { target, data });
                    return Ok(());
                }
                Event::DocType(doctype) => {
                    self.begin_document();
                    let value = decode(&doctype)?;
                    self.pending.push_back(XmlEvent::Dtd(value.trim().to_string()));
                    return Ok(());
                }
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(SourceError::bad_xml(description::UNCLOSED_ELEMENTS));
                    }
                    self.begin_document();
                    self.pending.push_back(XmlEvent::EndDocument);
                    self.finished = true;
                    return Ok(());
                }
            }
        }
    }
}

impl<R: BufRead> EventSource for XmlReaderSource<R> {
    fn next_event(&mut self) -> Result<XmlEvent, SourceError> {
        if self.pending.is_empty() {
            if self.finished {
                return Err(SourceError::UnexpectedEnd);
            }
            self.read()?;
        }
        self.pending.pop_front().ok_or(SourceError::UnexpectedEnd)
    }
}

fn decode(bytes: &[u8]) -> Result<String, SourceError> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => Err(SourceError::bad_xml(description::BAD_UTF8)),
    }
}

fn namespace_of(result: ResolveResult) -> Result<String, SourceError> {
    match result {
        ResolveResult::Bound(namespace) => decode(namespace.into_inner()),
        ResolveResult::Unbound => Ok(String::new()),
        ResolveResult::Unknown(prefix) => Err(SourceError::BadXml(format!(
            "unknown namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn start_element<R>(reader: &NsReader<R>, start: &BytesStart) -> Result<StartElement, SourceError> {
    let (resolved, local_name) = reader.resolve_element(start.name());
    let namespace_uri = namespace_of(resolved)?;
    let prefix = match start.name().prefix() {
        Some(prefix) => decode(prefix.into_inner())?,
        None => String::new(),
    };
    let local_name = decode(local_name.into_inner())?;
    let mut element = StartElement::new(QName::with_prefix(&namespace_uri, &prefix, &local_name));

    for attr in start.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?.into_owned();
        if let Some(binding) = attr.key.as_namespace_binding() {
            let prefix = match binding {
                PrefixDeclaration::Default => String::new(),
                PrefixDeclaration::Named(prefix) => decode(prefix)?,
            };
            element.namespaces.push(Namespace::new(&prefix, &value));
            continue;
        }
        let (resolved, local_name) = reader.resolve_attribute(attr.key);
        let namespace_uri = namespace_of(resolved)?;
        let prefix = match attr.key.prefix() {
            Some(prefix) => decode(prefix.into_inner())?,
            None => String::new(),
        };
        let local_name = decode(local_name.into_inner())?;
        element.attributes.push(Attribute::new(
            QName::with_prefix(&namespace_uri, &prefix, &local_name),
            &value,
        ));
    }

    Ok(element)
}
