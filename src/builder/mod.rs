/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod delegate;

use std::collections::HashMap;

use tracing::debug;
use tracing::trace;

use crate::DocumentError;
use crate::NodeId;
use crate::SourceError;
use crate::arena::Arena;
use crate::arena::BuilderId;
use crate::document::ArenaExt;
use crate::document::Element;
use crate::document::Payload;
use crate::document::error::description;
use crate::event::EventSource;
use crate::event::Namespace;
use crate::event::StartElement;
use crate::event::XmlEvent;
use crate::event::error::description as source_description;
use crate::namespace::generate_prefix;

pub use delegate::Delegate;
pub use delegate::DelegateContext;

struct Registration {
    max_depth: usize,
    delegate: Box<dyn Delegate + Send>,
}

struct PayloadDelegate {
    depth: usize,
    fired: bool,
    delegate: Box<dyn Delegate + Send>,
}

/// Pulls events from a source and materializes them into an arena.
///
/// Each call to [Builder::build_next] consumes exactly one event. The
/// position of the next node is decided by `last_node`: an incomplete
/// container receives it as a child, anything else gets it as the next
/// sibling.
pub(crate) struct Builder {
    id: BuilderId,
    source: Box<dyn EventSource + Send>,
    done: bool,
    cache: bool,
    raw_issued: bool,
    started: bool,
    element_level: usize,
    last_node: NodeId,
    delegates: HashMap<(String, String), Registration>,
    payload: Option<PayloadDelegate>,
    prefix_seq: u32,
}

impl Builder {
    pub(crate) fn new(id: BuilderId, source: Box<dyn EventSource + Send>) -> Builder {
        Builder {
            id,
            source,
            done: false,
            cache: true,
            raw_issued: false,
            started: false,
            element_level: 0,
            last_node: NodeId::DOCUMENT,
            delegates: HashMap::new(),
            payload: None,
            prefix_seq: 0,
        }
    }

    pub(crate) fn id(&self) -> BuilderId {
        self.id
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn is_caching(&self) -> bool {
        self.cache
    }

    pub(crate) fn element_level(&self) -> usize {
        self.element_level
    }

    pub(crate) fn set_caching(&mut self, cache: bool) -> Result<(), DocumentError> {
        if cache && self.raw_issued {
            return Err(DocumentError::IllegalState(description::RAW_CURSOR_ISSUED));
        }
        if cache != self.cache {
            debug!(cache, "builder caching mode changed");
        }
        self.cache = cache;
        Ok(())
    }

    /// Hands out the underlying event source.
    ///
    /// The caller takes over the stream position, so the builder turns
    /// caching off for good.
    pub(crate) fn raw_source(&mut self) -> &mut dyn EventSource {
        if !self.raw_issued {
            debug!(level = self.element_level, "raw event source handed out");
        }
        self.raw_issued = true;
        self.cache = false;
        self.source.as_mut()
    }

    pub(crate) fn register_delegate(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        max_depth: usize,
        delegate: Box<dyn Delegate + Send>,
    ) -> Result<(), DocumentError> {
        if self.started {
            return Err(DocumentError::IllegalState(description::DELEGATE_AFTER_START));
        }
        self.delegates.insert(
            (namespace_uri.to_string(), local_name.to_string()),
            Registration {
                max_depth,
                delegate,
            },
        );
        Ok(())
    }

    pub(crate) fn set_payload_delegate(
        &mut self,
        depth: usize,
        delegate: Box<dyn Delegate + Send>,
    ) -> Result<(), DocumentError> {
        if self.started {
            return Err(DocumentError::IllegalState(description::DELEGATE_AFTER_START));
        }
        self.payload = Some(PayloadDelegate {
            depth,
            fired: false,
            delegate,
        });
        Ok(())
    }

    /// Returns the container the next node goes into.
    fn open_container(&self, arena: &Arena) -> Result<NodeId, DocumentError> {
        let last = arena.get(self.last_node);
        if last.is_container() && !last.complete {
            Ok(self.last_node)
        } else {
            last.parent
                .ok_or(DocumentError::BadStructure(description::NO_PARENT))
        }
    }

    pub(crate) fn build_next(&mut self, arena: &mut Arena) -> Result<(), DocumentError> {
        if self.done {
            return Err(DocumentError::IllegalState(description::ALREADY_COMPLETE));
        }
        if !self.cache {
            return Err(DocumentError::IllegalState(description::CACHE_DISABLED));
        }

        let event = self.source.next_event()?;
        trace!(level = self.element_level, "builder pulled {:?}", event);
        match event {
            XmlEvent::StartDocument { version, encoding } => {
                let info = arena.document_info_mut();
                info.xml_version = version;
                info.charset = encoding;
            }
            XmlEvent::StartElement(start) => self.start_element(arena, start)?,
            XmlEvent::EndElement => self.end_element(arena)?,
            XmlEvent::EndDocument => {
                if self.element_level != 0 {
                    return Err(SourceError::bad_xml(source_description::END_INSIDE_ELEMENT).into());
                }
                arena.set_complete(NodeId::DOCUMENT);
                self.last_node = NodeId::DOCUMENT;
                self.done = true;
                debug!("builder consumed the whole document");
            }
            event => self.leaf(arena, event)?,
        }
        Ok(())
    }

    fn leaf(&mut self, arena: &mut Arena, event: XmlEvent) -> Result<(), DocumentError> {
        let Some(payload) = Payload::from_source_event(event, self.source.as_ref()) else {
            return Ok(());
        };

        let parent = self.open_container(arena)?;
        if parent == NodeId::DOCUMENT {
            match payload {
                Payload::Whitespace(_) => return Ok(()),
                Payload::Text(_) | Payload::CData(_) | Payload::EntityReference { .. } => {
                    return Err(SourceError::bad_xml(source_description::TEXT_OUTSIDE_ROOT).into());
                }
                _ => {}
            }
        }
        let node = arena.alloc(payload);
        arena.append_child(parent, node);
        self.last_node = node;
        Ok(())
    }

    fn start_element(&mut self, arena: &mut Arena, start: StartElement) -> Result<(), DocumentError> {
        self.started = true;
        let depth = self.element_level + 1;
        let parent = self.open_container(arena)?;
        if parent == NodeId::DOCUMENT && arena.document_info().root.is_some() {
            return Err(SourceError::bad_xml(source_description::MULTIPLE_ROOTS).into());
        }

        let key = (
            start.name.namespace_str().to_string(),
            start.name.local_name().to_string(),
        );
        let delegate: Option<&mut dyn Delegate> = match self.delegates.get_mut(&key) {
            Some(registration) if depth <= registration.max_depth => {
                Some(registration.delegate.as_mut())
            }
            _ => match self.payload.as_mut() {
                Some(payload) if !payload.fired && payload.depth == depth => {
                    payload.fired = true;
                    Some(payload.delegate.as_mut())
                }
                _ => None,
            },
        };

        if let Some(delegate) = delegate {
            debug!(element = %start.name, depth, "delegate takes over element");
            let mut context = DelegateContext::new(start, self.source.as_mut(), arena);
            let node = delegate.build(&mut context)?;
            context.check_finished()?;
            if !arena.contains(node) {
                return Err(DocumentError::BadStructure(description::UNKNOWN_NODE));
            }
            if node == NodeId::DOCUMENT || arena.is_ancestor_or_self(node, parent) {
                return Err(DocumentError::BadStructure(description::CYCLE));
            }
            if arena.get(node).parent.is_some() {
                arena.unlink(node);
            }
            arena.append_child(parent, node);
            if parent == NodeId::DOCUMENT && arena.payload(node).as_element().is_some() {
                arena.document_info_mut().root = Some(node);
            }
            self.last_node = node;
            return Ok(());
        }

        let node = arena.alloc_pending(Payload::Element(Element::from(start)), self.id);
        arena.append_child(parent, node);
        if parent == NodeId::DOCUMENT {
            arena.document_info_mut().root = Some(node);
        }
        self.resolve_namespaces(arena, node);
        self.last_node = node;
        self.element_level = depth;
        Ok(())
    }

    /// Makes sure the element and attribute prefixes resolve to their
    /// namespaces, declaring missing bindings on the element itself.
    fn resolve_namespaces(&mut self, arena: &mut Arena, node: NodeId) {
        let Some(element) = arena.payload(node).as_element() else {
            return;
        };
        let mut declare: Vec<Namespace> = Vec::new();
        let mut renames: Vec<(usize, String)> = Vec::new();

        let declared = |declare: &Vec<Namespace>, prefix: &str, uri: &str| {
            declare.iter().any(|ns| ns.prefix == prefix && ns.uri == uri)
        };

        let prefix = element.name.prefix_str();
        let uri = element.name.namespace_str();
        if !(uri.is_empty() && !prefix.is_empty())
            && !arena.is_bound(node, prefix, uri)
            && !declared(&declare, prefix, uri)
        {
            declare.push(Namespace::new(prefix, uri));
        }

        for (index, attr) in element.attributes.iter().enumerate() {
            let uri = attr.name.namespace_str();
            if uri.is_empty() {
                continue;
            }
            let prefix = attr.name.prefix_str();
            if !prefix.is_empty() {
                if arena.is_bound(node, prefix, uri) || declared(&declare, prefix, uri) {
                    continue;
                }
                let taken = arena.lookup_namespace_uri(node, prefix).is_some()
                    || declare.iter().any(|ns| ns.prefix == prefix);
                if !taken {
                    declare.push(Namespace::new(prefix, uri));
                    continue;
                }
            }
            let existing = declare
                .iter()
                .find(|ns| !ns.prefix.is_empty() && ns.uri == uri)
                .map(|ns| ns.prefix.clone())
                .or_else(|| arena.lookup_prefix(node, uri).map(str::to_string));
            let prefix = match existing {
                Some(prefix) => prefix,
                None => {
                    let prefix = generate_prefix(&mut self.prefix_seq, |p| {
                        arena.lookup_namespace_uri(node, p).is_some()
                            || declare.iter().any(|ns| ns.prefix == p)
                    });
                    debug!(%prefix, uri, "generated prefix for attribute namespace");
                    declare.push(Namespace::new(&prefix, uri));
                    prefix
                }
            };
            renames.push((index, prefix));
        }

        if declare.is_empty() && renames.is_empty() {
            return;
        }
        if let Some(element) = arena.payload_mut(node).as_element_mut() {
            for ns in declare {
                element.declare(&ns.prefix, &ns.uri);
            }
            for (index, prefix) in renames {
                element.attributes[index].name.set_prefix(&prefix);
            }
        }
    }

    fn end_element(&mut self, arena: &mut Arena) -> Result<(), DocumentError> {
        let container = self.open_container(arena)?;
        if container == NodeId::DOCUMENT {
            return Err(SourceError::bad_xml(source_description::UNBALANCED_END).into());
        }
        arena.set_complete(container);
        self.last_node = container;
        self.element_level -= 1;
        Ok(())
    }

    /// Skips the rest of an incomplete element without materializing it.
    ///
    /// The element is unlinked from its parent and the builder resumes
    /// after its end, with the previous sibling or the parent as the last
    /// produced node.
    pub(crate) fn discard(&mut self, arena: &mut Arena, node: NodeId) -> Result<(), DocumentError> {
        if self.raw_issued {
            return Err(DocumentError::IllegalState(description::RAW_CURSOR_ISSUED));
        }
        let depth = arena.element_depth(node);
        if depth == 0 || depth > self.element_level {
            return Err(DocumentError::BadStructure(description::NO_PARENT));
        }
        debug!(%node, depth, level = self.element_level, "discarding element");

        while self.element_level >= depth {
            match self.source.next_event()? {
                XmlEvent::StartElement(_) => self.element_level += 1,
                XmlEvent::EndElement => self.element_level -= 1,
                XmlEvent::EndDocument => {
                    return Err(SourceError::bad_xml(source_description::END_INSIDE_ELEMENT).into());
                }
                _ => {}
            }
        }

        let (parent, previous) = {
            let record = arena.get(node);
            (record.parent, record.previous)
        };
        for id in arena.descendants_or_self(node) {
            arena.set_complete(id);
        }
        arena.unlink(node);
        self.last_node = previous
            .or(parent)
            .ok_or(DocumentError::BadStructure(description::NO_PARENT))?;
        Ok(())
    }
}
