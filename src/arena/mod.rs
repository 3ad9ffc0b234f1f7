/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Display;

use crate::document::Payload;

/// Stable handle of a node inside a [Document](crate::Document).
///
/// Handles stay valid for the lifetime of the document, even after the
/// node is detached or discarded. Handles of another document are
/// rejected as unknown nodes, or read as absent by the accessors.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(u32);

impl NodeId {
    /// The document node itself, always the first record.
    pub(crate) const DOCUMENT: NodeId = NodeId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies the builder which will complete a pending container.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct BuilderId(pub(crate) u32);

pub(crate) struct NodeRecord {
    pub(crate) parent: Option<NodeId>,
    pub(crate) previous: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) complete: bool,
    pub(crate) builder: Option<BuilderId>,
    pub(crate) payload: Payload,
}

impl NodeRecord {
    pub(crate) fn is_container(&self) -> bool {
        matches!(self.payload, Payload::Document(_) | Payload::Element(_))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ArenaStats {
    /// Number of node records, including detached ones.
    pub nr_nodes: usize,
    /// Bytes of character data held by text-like nodes.
    pub nr_text_bytes: usize,
}

/// Node storage for a document.
///
/// Records are never freed before the arena itself, so a [NodeId] is a
/// plain index. Parent and sibling links are indices too and never own
/// anything; a container reaches its children through `first_child`
/// and the `next` chain.
pub(crate) struct Arena {
    records: Vec<NodeRecord>,
    text_bytes: usize,
}

impl Arena {
    /// Creates an arena holding only the document record.
    ///
    /// The document is complete unless a builder is going to fill it.
    pub(crate) fn new(payload: Payload, builder: Option<BuilderId>) -> Arena {
        let mut arena = Arena {
            records: Vec::new(),
            text_bytes: 0,
        };
        arena.push(payload, builder.is_none(), builder);
        arena
    }

    fn push(&mut self, payload: Payload, complete: bool, builder: Option<BuilderId>) -> NodeId {
        self.text_bytes += payload.text_size();
        let id = NodeId(self.records.len() as u32);
        self.records.push(NodeRecord {
            parent: None,
            previous: None,
            next: None,
            first_child: None,
            last_child: None,
            complete,
            builder,
            payload,
        });
        id
    }

    /// Allocates a complete, unattached node.
    pub(crate) fn alloc(&mut self, payload: Payload) -> NodeId {
        self.push(payload, true, None)
    }

    /// Allocates an incomplete container which the builder will fill.
    pub(crate) fn alloc_pending(&mut self, payload: Payload, builder: BuilderId) -> NodeId {
        self.push(payload, false, Some(builder))
    }

    pub(crate) fn get(&self, id: NodeId) -> &NodeRecord {
        &self.records[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut NodeRecord {
        &mut self.records[id.index()]
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        id.index() < self.records.len()
    }

    pub(crate) fn payload(&self, id: NodeId) -> &Payload {
        &self.get(id).payload
    }

    pub(crate) fn payload_mut(&mut self, id: NodeId) -> &mut Payload {
        &mut self.get_mut(id).payload
    }

    pub(crate) fn is_complete(&self, id: NodeId) -> bool {
        self.get(id).complete
    }

    /// Marks the node complete and releases its builder.
    ///
    /// There is no way back, completeness only ever goes from false to true.
    pub(crate) fn set_complete(&mut self, id: NodeId) {
        let record = self.get_mut(id);
        record.complete = true;
        record.builder = None;
    }

    /// Appends an unattached node as the last child of the parent.
    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let last = self.get(parent).last_child;
        {
            let record = self.get_mut(child);
            record.parent = Some(parent);
            record.previous = last;
            record.next = None;
        }
        match last {
            Some(last) => self.get_mut(last).next = Some(child),
            None => self.get_mut(parent).first_child = Some(child),
        }
        self.get_mut(parent).last_child = Some(child);
    }

    /// Links an unattached node right before an attached one.
    pub(crate) fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        let (parent, previous) = {
            let record = self.get(reference);
            (record.parent, record.previous)
        };
        {
            let record = self.get_mut(node);
            record.parent = parent;
            record.previous = previous;
            record.next = Some(reference);
        }
        self.get_mut(reference).previous = Some(node);
        match previous {
            Some(previous) => self.get_mut(previous).next = Some(node),
            None => {
                if let Some(parent) = parent {
                    self.get_mut(parent).first_child = Some(node);
                }
            }
        }
    }

    /// Links an unattached node right after an attached one.
    pub(crate) fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        let (parent, next) = {
            let record = self.get(reference);
            (record.parent, record.next)
        };
        {
            let record = self.get_mut(node);
            record.parent = parent;
            record.previous = Some(reference);
            record.next = next;
        }
        self.get_mut(reference).next = Some(node);
        match next {
            Some(next) => self.get_mut(next).previous = Some(node),
            None => {
                if let Some(parent) = parent {
                    self.get_mut(parent).last_child = Some(node);
                }
            }
        }
    }

    /// Removes the node from its parent's child list.
    ///
    /// The subtree below the node stays intact.
    pub(crate) fn unlink(&mut self, node: NodeId) {
        let (parent, previous, next) = {
            let record = self.get_mut(node);
            let links = (record.parent, record.previous, record.next);
            record.parent = None;
            record.previous = None;
            record.next = None;
            links
        };
        match previous {
            Some(previous) => self.get_mut(previous).next = next,
            None => {
                if let Some(parent) = parent {
                    self.get_mut(parent).first_child = next;
                }
            }
        }
        match next {
            Some(next) => self.get_mut(next).previous = previous,
            None => {
                if let Some(parent) = parent {
                    self.get_mut(parent).last_child = previous;
                }
            }
        }
    }

    /// Checks if `ancestor` is `node` or one of its ancestors.
    pub(crate) fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).parent;
        }
        false
    }

    /// Iterates over the node and its ancestors, innermost first.
    pub(crate) fn ancestors_or_self(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(node), |id| self.get(*id).parent)
    }

    /// Collects the materialized subtree in document order.
    pub(crate) fn descendants_or_self(&self, node: NodeId) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            nodes.push(id);
            let mut child = self.get(id).last_child;
            while let Some(c) = child {
                stack.push(c);
                child = self.get(c).previous;
            }
        }
        nodes
    }

    pub(crate) fn stats(&self) -> ArenaStats {
        ArenaStats {
            nr_nodes: self.records.len(),
            nr_text_bytes: self.text_bytes,
        }
    }
}
