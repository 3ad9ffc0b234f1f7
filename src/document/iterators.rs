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

use super::Document;
use super::DocumentError;

enum Position {
    Start,
    At(NodeId),
    Done,
}

/// Lazily extending iterator over the children of a container.
///
/// Each step builds only as far as needed to find the next child. The
/// iterator stops after the first error.
pub struct Children<'a> {
    document: &'a mut Document,
    parent: NodeId,
    position: Position,
}

impl<'a> Children<'a> {
    pub(super) fn new(document: &'a mut Document, parent: NodeId) -> Self {
        Children {
            document,
            parent,
            position: Position::Start,
        }
    }

    /// Read access to the document while iterating.
    pub fn document(&self) -> &Document {
        self.document
    }
}

impl Iterator for Children<'_> {
    type Item = Result<NodeId, DocumentError>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.position {
            Position::Start => self.document.first_child(self.parent),
            Position::At(node) => self.document.next_sibling(node),
            Position::Done => return None,
        };
        match result {
            Ok(Some(node)) => {
                self.position = Position::At(node);
                Some(Ok(node))
            }
            Ok(None) => {
                self.position = Position::Done;
                None
            }
            Err(err) => {
                self.position = Position::Done;
                Some(Err(err))
            }
        }
    }
}
