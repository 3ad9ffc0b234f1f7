/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;
mod sink;

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use crate::Document;
use crate::DocumentError;
use crate::NodeId;
use crate::OutputConfig;
use crate::SourceError;
use crate::TreeSource;
use crate::attachment;
use crate::attachment::AttachmentAccessor;
use crate::attachment::Disposition;
use crate::event::EventSource;
use crate::event::Namespace;
use crate::event::Property;
use crate::event::StartElement;
use crate::event::XmlEvent;
use crate::event::binary_event;
use crate::event::error::description as source_description;
use crate::namespace::NamespaceContext;
use crate::namespace::generate_prefix;

pub use error::SinkError;
pub use sink::BindingOrder;
pub use sink::EventRecorder;
pub use sink::EventSink;
pub use sink::XmlWriter;

/// Where [Serializer::serialize] takes its first event from.
#[derive(Clone, Debug)]
pub enum StartMode {
    /// Pull the first event from the source.
    Advance,
    /// The source is already positioned, this is its current event.
    Positioned(XmlEvent),
}

/// Re-emits one element subtree or one document to a sink.
///
/// Namespace declarations are reconciled against the bindings the sink
/// already has, so every name written resolves to its namespace. Binary
/// content is written inline as base64 or handed to the attachment
/// accessor, as decided by the output configuration.
pub struct Serializer<'a> {
    config: &'a OutputConfig,
    attachments: Option<&'a mut dyn AttachmentAccessor>,
    prefix_seq: u32,
}

impl<'a> Serializer<'a> {
    pub fn new(config: &'a OutputConfig) -> Serializer<'a> {
        Serializer {
            config,
            attachments: None,
            prefix_seq: 0,
        }
    }

    /// Sets the accessor used to resolve placeholders and to receive
    /// externalized binary content.
    pub fn with_attachments(mut self, attachments: &'a mut dyn AttachmentAccessor) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// Copies events from the source to the sink until the first
    /// element or document is closed.
    pub fn serialize(
        &mut self,
        source: &mut dyn EventSource,
        sink: &mut dyn EventSink,
        start: StartMode,
    ) -> Result<(), DocumentError> {
        let mut depth: usize = 0;
        let mut positioned = match start {
            StartMode::Advance => None,
            StartMode::Positioned(event) => Some(event),
        };
        loop {
            let event = match positioned.take() {
                Some(event) => event,
                None => source.next_event()?,
            };
            match event {
                XmlEvent::StartDocument { .. } => {
                    depth += 1;
                    sink.start_document(self.config.xml_version(), self.config.charset())?;
                }
                XmlEvent::EndDocument => {
                    sink.end_document()?;
                    depth = depth.saturating_sub(1);
                }
                XmlEvent::StartElement(start) => match self.resolve_placeholder(&start) {
                    Some((content_id, data)) => {
                        skip_element(source)?;
                        self.write_binary(sink, data, true, Some(content_id))?;
                    }
                    None => {
                        depth += 1;
                        self.write_start_element(sink, start)?;
                    }
                },
                XmlEvent::EndElement => {
                    sink.end_element()?;
                    depth = depth.saturating_sub(1);
                }
                XmlEvent::Characters(text) => match binary_event(&*source) {
                    Some(binary) => {
                        self.write_binary(sink, binary.data, binary.optimize, binary.content_id)?
                    }
                    None => sink.characters(&text)?,
                },
                XmlEvent::Whitespace(text) => sink.characters(&text)?,
                XmlEvent::CData(text) => sink.cdata(&text)?,
                XmlEvent::Comment(text) => sink.comment(&text)?,
                XmlEvent::ProcessingInstruction { target, data } => {
                    sink.processing_instruction(&target, &data)?
                }
                XmlEvent::EntityReference { name, .. } => sink.entity_reference(&name)?,
                XmlEvent::Dtd(text) => sink.dtd(&text)?,
            }
            if depth == 0 {
                return Ok(());
            }
        }
    }

    /// Serializes a node of the document, building its subtree first.
    pub fn serialize_node(
        &mut self,
        document: &mut Document,
        node: NodeId,
        sink: &mut dyn EventSink,
    ) -> Result<(), DocumentError> {
        let mut source = document.tree_source(node)?;
        self.serialize(&mut source, sink, StartMode::Advance)
    }

    /// Serializes the built part of the node from the tree and the rest
    /// straight from the document's event source.
    pub fn serialize_and_consume(
        &mut self,
        document: &mut Document,
        node: NodeId,
        sink: &mut dyn EventSink,
    ) -> Result<(), DocumentError> {
        if document.is_complete(node) {
            return self.serialize_node(document, node, sink);
        }
        let (arena, raw) = document.split_for_consume()?;
        let mut source = ConsumeSource {
            tree: TreeSource::partial(arena, node),
            raw,
            in_raw: false,
        };
        self.serialize(&mut source, sink, StartMode::Advance)
    }

    fn resolve_placeholder(&self, start: &StartElement) -> Option<(String, Arc<[u8]>)> {
        let content_id = attachment::placeholder_content_id(start)?;
        let accessor = self.attachments.as_deref()?;
        match attachment::resolve_content_id(accessor, content_id) {
            Some(data) => Some((content_id.to_string(), data)),
            None => {
                debug!(content_id, "attachment placeholder left unresolved");
                None
            }
        }
    }

    fn write_binary(
        &mut self,
        sink: &mut dyn EventSink,
        data: Arc<[u8]>,
        optimize: bool,
        content_id: Option<String>,
    ) -> Result<(), DocumentError> {
        let disposition = Disposition::decide(self.config, optimize, data.len());
        match (disposition, self.attachments.as_mut()) {
            (Disposition::External, Some(accessor)) => {
                let content_id = content_id.unwrap_or_else(|| self.config.next_content_id());
                debug!(%content_id, size = data.len(), "binary content sent as attachment");
                accessor.attach(&content_id, data);
                self.write_start_element(sink, attachment::placeholder(&content_id))?;
                sink.end_element()?;
            }
            _ => sink.characters(&BASE64.encode(&data))?,
        }
        Ok(())
    }

    fn write_start_element(
        &mut self,
        sink: &mut dyn EventSink,
        start: StartElement,
    ) -> Result<(), DocumentError> {
        let StartElement {
            name,
            mut attributes,
            namespaces,
        } = start;

        let pending = {
            let context = sink.namespace_context();
            let mut pending: Vec<Namespace> = Vec::new();

            for ns in namespaces {
                if !is_bound(context, &pending, &ns.prefix, &ns.uri) {
                    pending.push(ns);
                }
            }

            let prefix = name.prefix_str();
            let uri = name.namespace_str();
            if !(uri.is_empty() && !prefix.is_empty()) && !is_bound(context, &pending, prefix, uri) {
                pending.push(Namespace::new(prefix, uri));
            }

            for attr in attributes.iter_mut() {
                let uri = attr.name.namespace_str().to_string();
                if uri.is_empty() {
                    continue;
                }
                let prefix = attr.name.prefix_str();
                if !prefix.is_empty() {
                    if is_bound(context, &pending, prefix, &uri) {
                        continue;
                    }
                    if !is_taken(context, &pending, prefix) {
                        pending.push(Namespace::new(prefix, &uri));
                        continue;
                    }
                }
                let existing = pending
                    .iter()
                    .rev()
                    .find(|ns| !ns.prefix.is_empty() && ns.uri == uri)
                    .map(|ns| ns.prefix.clone())
                    .or_else(|| {
                        context
                            .prefixes(&uri)
                            .find(|p| !pending.iter().any(|ns| ns.prefix == *p))
                            .map(str::to_string)
                    });
                let prefix = match existing {
                    Some(prefix) => prefix,
                    None => {
                        let prefix = generate_prefix(&mut self.prefix_seq, |p| {
                            is_taken(context, &pending, p)
                        });
                        pending.push(Namespace::new(&prefix, &uri));
                        prefix
                    }
                };
                attr.name.set_prefix(&prefix);
            }
            pending
        };

        match sink.binding_order() {
            BindingOrder::BeforeStartTag => {
                for ns in &pending {
                    sink.namespace(&ns.prefix, &ns.uri)?;
                }
                sink.start_element(&name)?;
            }
            BindingOrder::AfterStartTag => {
                sink.start_element(&name)?;
                for ns in &pending {
                    sink.namespace(&ns.prefix, &ns.uri)?;
                }
            }
        }
        for attr in &attributes {
            sink.attribute(attr)?;
        }
        Ok(())
    }
}

fn is_bound(context: &NamespaceContext, pending: &[Namespace], prefix: &str, uri: &str) -> bool {
    match pending.iter().rev().find(|ns| ns.prefix == prefix) {
        Some(ns) => ns.uri == uri,
        None => context.is_bound(prefix, uri),
    }
}

fn is_taken(context: &NamespaceContext, pending: &[Namespace], prefix: &str) -> bool {
    pending.iter().any(|ns| ns.prefix == prefix) || context.namespace_uri(prefix).is_some()
}

/// Consumes the rest of an element whose start was already pulled.
fn skip_element(source: &mut dyn EventSource) -> Result<(), DocumentError> {
    let mut depth = 1;
    while depth > 0 {
        match source.next_event()? {
            XmlEvent::StartElement(_) => depth += 1,
            XmlEvent::EndElement => depth -= 1,
            XmlEvent::EndDocument => {
                return Err(SourceError::bad_xml(source_description::END_INSIDE_ELEMENT).into());
            }
            _ => {}
        }
    }
    Ok(())
}

/// Walks the built part of the tree, then continues with the raw source.
struct ConsumeSource<'a> {
    tree: TreeSource<'a>,
    raw: &'a mut dyn EventSource,
    in_raw: bool,
}

impl EventSource for ConsumeSource<'_> {
    fn next_event(&mut self) -> Result<XmlEvent, SourceError> {
        if !self.in_raw && self.tree.at_frontier() {
            debug!("serialization continues from the raw event source");
            self.in_raw = true;
        }
        if self.in_raw {
            self.raw.next_event()
        } else {
            self.tree.next_event()
        }
    }

    fn property(&self, name: &str) -> Option<Property> {
        if self.in_raw {
            self.raw.property(name)
        } else {
            self.tree.property(name)
        }
    }
}

#[cfg(test)]
mod tests;
