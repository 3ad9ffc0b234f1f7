/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::NodeId;
use crate::SourceError;
use crate::arena::Arena;
use crate::event::EventSource;
use crate::event::Property;
use crate::event::XmlEvent;
use crate::event::property;

use super::BinaryText;
use super::Payload;

#[derive(Clone, Copy)]
enum Step {
    Enter(NodeId),
    Leave(NodeId),
    Done,
}

/// Walks a materialized subtree as an event stream.
///
/// Elements produce a start and an end event, the document node a
/// start and an end document event, and every other node a single
/// event. Binary text reports its content through the binary
/// properties while it is the last pulled event.
pub struct TreeSource<'a> {
    arena: &'a Arena,
    top: NodeId,
    step: Step,
    partial: bool,
    binary: Option<&'a BinaryText>,
}

impl<'a> TreeSource<'a> {
    pub(crate) fn new(arena: &'a Arena, top: NodeId) -> TreeSource<'a> {
        TreeSource {
            arena,
            top,
            step: Step::Enter(top),
            partial: false,
            binary: None,
        }
    }

    /// Creates a walker which stops at the first incomplete container
    /// whose materialized children are exhausted.
    pub(crate) fn partial(arena: &'a Arena, top: NodeId) -> TreeSource<'a> {
        TreeSource {
            partial: true,
            ..TreeSource::new(arena, top)
        }
    }

    /// Checks if the walk reached content not built yet.
    pub(crate) fn at_frontier(&self) -> bool {
        match self.step {
            Step::Leave(node) => self.partial && !self.arena.is_complete(node),
            _ => false,
        }
    }

    fn after(&self, node: NodeId) -> Step {
        if node == self.top {
            return Step::Done;
        }
        let record = self.arena.get(node);
        match (record.next, record.parent) {
            (Some(next), _) => Step::Enter(next),
            (None, Some(parent)) => Step::Leave(parent),
            (None, None) => Step::Done,
        }
    }
}

impl EventSource for TreeSource<'_> {
    fn next_event(&mut self) -> Result<XmlEvent, SourceError> {
        self.binary = None;
        if self.at_frontier() {
            return Err(SourceError::UnexpectedEnd);
        }
        match self.step {
            Step::Enter(node) => {
                let arena = self.arena;
                let record = arena.get(node);
                let event = match &record.payload {
                    Payload::Document(info) => XmlEvent::StartDocument {
                        version: info.xml_version.clone(),
                        encoding: info.charset.clone(),
                    },
                    Payload::Element(element) => element.to_start_event(),
                    payload => {
                        self.binary = payload.as_binary();
                        payload.to_leaf_event().ok_or(SourceError::UnexpectedEnd)?
                    }
                };
                self.step = if record.is_container() {
                    match record.first_child {
                        Some(child) => Step::Enter(child),
                        None => Step::Leave(node),
                    }
                } else {
                    self.after(node)
                };
                Ok(event)
            }
            Step::Leave(node) => {
                let event = match self.arena.payload(node) {
                    Payload::Document(_) => XmlEvent::EndDocument,
                    _ => XmlEvent::EndElement,
                };
                self.step = self.after(node);
                Ok(event)
            }
            Step::Done => Err(SourceError::UnexpectedEnd),
        }
    }

    fn property(&self, name: &str) -> Option<Property> {
        match name {
            property::IS_BINARY => Some(Property::Flag(self.binary.is_some())),
            property::BINARY => self.binary.map(|binary| Property::Binary(binary.data.clone())),
            property::OPTIMIZE => self.binary.map(|binary| Property::Flag(binary.optimize)),
            property::CONTENT_ID => self
                .binary
                .and_then(|binary| binary.content_id.clone().map(Property::Text)),
            _ => None,
        }
    }
}
