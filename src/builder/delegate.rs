/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::sync::Arc;

use crate::DocumentError;
use crate::NodeId;
use crate::SourceError;
use crate::arena::Arena;
use crate::document::BinaryText;
use crate::document::Element;
use crate::document::Payload;
use crate::document::TextContent;
use crate::document::error::description;
use crate::event::EventSource;
use crate::event::Property;
use crate::event::QName;
use crate::event::StartElement;
use crate::event::XmlEvent;
use crate::event::error::description as source_description;

/// Custom construction of an element subtree.
///
/// A delegate is invoked with the start element already pulled from the
/// source. It must consume the events up to and including the matching
/// end element, and return the node to put in place of the element.
///
/// Closures with the matching signature are delegates too:
/// ```
/// use iksom::{DelegateContext, Document, DocumentError, NodeId};
///
/// let mut doc: Document = Document::from_text("<a><secret>x</secret><b/></a>");
/// doc.register_delegate("", "secret", usize::MAX, |ctx: &mut DelegateContext<'_>| {
///     ctx.skip()?;
///     Ok::<NodeId, DocumentError>(ctx.create_comment("removed"))
/// })?;
/// let root = doc.root_element()?.unwrap();
/// assert_eq!(doc.to_xml_string(root)?, "<a><!--removed--><b/></a>");
/// # Ok::<(), DocumentError>(())
/// ```
pub trait Delegate {
    fn build(&mut self, context: &mut DelegateContext<'_>) -> Result<NodeId, DocumentError>;
}

impl<F> Delegate for F
where
    F: FnMut(&mut DelegateContext<'_>) -> Result<NodeId, DocumentError>,
{
    fn build(&mut self, context: &mut DelegateContext<'_>) -> Result<NodeId, DocumentError> {
        self(context)
    }
}

/// Event cursor and node factory handed to a [Delegate].
///
/// The cursor is limited to the element being built, reading past its
/// end element is an error. Nodes created here are complete.
pub struct DelegateContext<'a> {
    start: StartElement,
    source: &'a mut dyn EventSource,
    arena: &'a mut Arena,
    depth: usize,
    pulled: bool,
}

impl<'a> DelegateContext<'a> {
    pub(crate) fn new(
        start: StartElement,
        source: &'a mut dyn EventSource,
        arena: &'a mut Arena,
    ) -> DelegateContext<'a> {
        DelegateContext {
            start,
            source,
            arena,
            depth: 1,
            pulled: false,
        }
    }

    /// The start element which triggered the delegate.
    pub fn start(&self) -> &StartElement {
        &self.start
    }

    /// Number of elements still open, zero once the matching end
    /// element is consumed.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn next_event(&mut self) -> Result<XmlEvent, DocumentError> {
        if self.depth == 0 {
            return Err(DocumentError::IllegalState(description::DELEGATE_OVERRUN));
        }
        self.pulled = true;
        let event = self.source.next_event()?;
        match event {
            XmlEvent::StartElement(_) => self.depth += 1,
            XmlEvent::EndElement => self.depth -= 1,
            XmlEvent::EndDocument => {
                return Err(SourceError::bad_xml(source_description::END_INSIDE_ELEMENT).into());
            }
            _ => {}
        }
        Ok(event)
    }

    /// Looks up a property of the last pulled event.
    pub fn property(&self, name: &str) -> Option<Property> {
        self.source.property(name)
    }

    /// Consumes the rest of the element.
    pub fn skip(&mut self) -> Result<(), DocumentError> {
        while self.depth > 0 {
            self.next_event()?;
        }
        Ok(())
    }

    /// Materializes the element the way the builder does.
    ///
    /// Must be called before any content is pulled through this context.
    pub fn build_element(&mut self) -> Result<NodeId, DocumentError> {
        if self.pulled {
            return Err(DocumentError::IllegalState(description::DELEGATE_PARTIAL));
        }
        let top = self.arena.alloc(Payload::Element(Element::from(self.start.clone())));
        let mut current = top;
        while self.depth > 0 {
            let event = self.next_event()?;
            match event {
                XmlEvent::StartElement(start) => {
                    let node = self.arena.alloc(Payload::Element(Element::from(start)));
                    self.arena.append_child(current, node);
                    current = node;
                }
                XmlEvent::EndElement => {
                    if let Some(parent) = self.arena.get(current).parent {
                        current = parent;
                    }
                }
                event => {
                    if let Some(payload) = Payload::from_source_event(event, &*self.source) {
                        let node = self.arena.alloc(payload);
                        self.arena.append_child(current, node);
                    }
                }
            }
        }
        Ok(top)
    }

    pub fn create_element(&mut self, name: QName) -> NodeId {
        self.arena.alloc(Payload::Element(Element::new(name)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.arena
            .alloc(Payload::Text(TextContent::Chars(text.to_string())))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.arena.alloc(Payload::Comment(text.to_string()))
    }

    /// Creates a text node with binary content which may be sent as an
    /// attachment.
    pub fn create_binary(&mut self, data: Arc<[u8]>, content_id: Option<&str>) -> NodeId {
        self.arena.alloc(Payload::Text(TextContent::Binary(BinaryText {
            data,
            content_id: content_id.map(str::to_string),
            optimize: true,
        })))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DocumentError> {
        if !self.arena.contains(parent) || !self.arena.contains(child) {
            return Err(DocumentError::BadStructure(description::UNKNOWN_NODE));
        }
        if !self.arena.get(parent).is_container() {
            return Err(DocumentError::BadStructure(description::NOT_CONTAINER));
        }
        if child == NodeId::DOCUMENT || self.arena.is_ancestor_or_self(child, parent) {
            return Err(DocumentError::BadStructure(description::CYCLE));
        }
        if self.arena.get(child).parent.is_some() {
            self.arena.unlink(child);
        }
        self.arena.append_child(parent, child);
        Ok(())
    }

    pub fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        if !self.arena.contains(node) {
            return None;
        }
        self.arena.payload_mut(node).as_element_mut()
    }

    pub(crate) fn check_finished(&self) -> Result<(), DocumentError> {
        if self.depth != 0 {
            return Err(DocumentError::IllegalState(description::DELEGATE_UNDERRUN));
        }
        Ok(())
    }
}
