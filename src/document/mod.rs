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
mod iterators;
mod node;
mod visitor;

use std::borrow::Cow;
use std::io::BufRead;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use tracing::debug;

use crate::OutputConfig;
use crate::arena::Arena;
use crate::arena::ArenaStats;
use crate::arena::BuilderId;
use crate::arena::NodeId;
use crate::builder::Builder;
use crate::builder::Delegate;
use crate::event::EventSource;
use crate::event::QName;
use crate::event::XmlReaderSource;
use crate::namespace::XML_NAMESPACE;
use crate::namespace::XML_PREFIX;
use crate::serializer::EventSink;
use crate::serializer::Serializer;
use crate::serializer::XmlWriter;
use error::description;

pub use error::DocumentError;
pub use iterators::Children;
pub use node::Element;
pub use node::NodeKind;
pub(crate) use node::BinaryText;
pub(crate) use node::DocumentInfo;
pub(crate) use node::Payload;
pub(crate) use node::TextContent;
pub use visitor::TreeSource;

pub(crate) trait ArenaExt {
    fn document_info(&self) -> &DocumentInfo;
    fn document_info_mut(&mut self) -> &mut DocumentInfo;
    fn lookup_namespace_uri(&self, node: NodeId, prefix: &str) -> Option<&str>;
    fn lookup_prefix(&self, node: NodeId, uri: &str) -> Option<&str>;
    fn is_bound(&self, node: NodeId, prefix: &str, uri: &str) -> bool;
    fn element_depth(&self, node: NodeId) -> usize;
}

impl ArenaExt for Arena {
    fn document_info(&self) -> &DocumentInfo {
        match self.payload(NodeId::DOCUMENT) {
            Payload::Document(info) => info,
            // First record is always the document
            _ => unreachable!(),
        }
    }

    fn document_info_mut(&mut self) -> &mut DocumentInfo {
        match self.payload_mut(NodeId::DOCUMENT) {
            Payload::Document(info) => info,
            _ => unreachable!(),
        }
    }

    fn lookup_namespace_uri(&self, node: NodeId, prefix: &str) -> Option<&str> {
        if prefix == XML_PREFIX {
            return Some(XML_NAMESPACE);
        }
        self.ancestors_or_self(node)
            .filter_map(|id| self.payload(id).as_element())
            .find_map(|element| element.declared_uri(prefix))
    }

    fn lookup_prefix(&self, node: NodeId, uri: &str) -> Option<&str> {
        if uri == XML_NAMESPACE {
            return Some(XML_PREFIX);
        }
        for id in self.ancestors_or_self(node) {
            let Some(element) = self.payload(id).as_element() else {
                continue;
            };
            for ns in element.namespaces() {
                if !ns.prefix.is_empty()
                    && ns.uri == uri
                    && self.lookup_namespace_uri(node, &ns.prefix) == Some(uri)
                {
                    return Some(&ns.prefix);
                }
            }
        }
        None
    }

    fn is_bound(&self, node: NodeId, prefix: &str, uri: &str) -> bool {
        match self.lookup_namespace_uri(node, prefix) {
            Some(bound) => bound == uri,
            None => prefix.is_empty() && uri.is_empty(),
        }
    }

    fn element_depth(&self, node: NodeId) -> usize {
        self.ancestors_or_self(node)
            .filter(|id| self.payload(*id).as_element().is_some())
            .count()
    }
}

/// An XML document whose nodes are materialized on demand.
///
/// A document created from an event source keeps a builder which pulls
/// events only when an accessor needs nodes that do not exist yet.
/// Accessors which may build take `&mut self` and return a `Result`,
/// since pulling more events can fail.
///
/// ```
/// use iksom::Document;
///
/// let mut doc = Document::from_text("<a><b>hello</b><c/></a>");
/// let root = doc.root_element()?.unwrap();
/// let b = doc.first_child(root)?.unwrap();
/// assert!(!doc.is_complete(root));
/// assert_eq!(doc.element(b).unwrap().name().local_name(), "b");
/// let c = doc.next_sibling(b)?.unwrap();
/// assert_eq!(doc.to_xml_string(c)?, "<c/>");
/// # Ok::<(), iksom::DocumentError>(())
/// ```
///
/// Documents are `Send` and `Sync`, a complete one can be read from
/// several threads through shared references.
pub struct Document {
    arena: Arena,
    builder: Option<Mutex<Builder>>,
}

fn exclusive(builder: &mut Mutex<Builder>) -> &mut Builder {
    builder.get_mut().unwrap_or_else(PoisonError::into_inner)
}

fn shared<T>(builder: &Mutex<Builder>, f: impl FnOnce(&Builder) -> T) -> T {
    let guard = builder.lock().unwrap_or_else(PoisonError::into_inner);
    f(&*guard)
}

impl Document {
    /// Creates an empty, complete document for building by hand.
    pub fn new() -> Document {
        Document {
            arena: Arena::new(Payload::Document(DocumentInfo::default()), None),
            builder: None,
        }
    }

    /// Creates a document which materializes lazily from the source.
    pub fn from_source(source: impl EventSource + Send + 'static) -> Document {
        let id = BuilderId(1);
        Document {
            arena: Arena::new(Payload::Document(DocumentInfo::default()), Some(id)),
            builder: Some(Mutex::new(Builder::new(id, Box::new(source)))),
        }
    }

    pub fn from_reader<R: BufRead + Send + 'static>(input: R) -> Document {
        Document::from_source(XmlReaderSource::new(input))
    }

    /// Creates a lazy document reading the XML text.
    ///
    /// Syntax errors show up when the erroneous part is built. Use
    /// [str::parse] to build the whole document at once.
    pub fn from_text(xml: &str) -> Document {
        Document::from_reader(Cursor::new(xml.as_bytes().to_vec()))
    }

    /// Handle of the document node, the parent of the root element.
    pub fn document_node(&self) -> NodeId {
        NodeId::DOCUMENT
    }

    pub fn arena_stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    fn check(&self, node: NodeId) -> Result<(), DocumentError> {
        if self.arena.contains(node) {
            Ok(())
        } else {
            Err(DocumentError::BadStructure(description::UNKNOWN_NODE))
        }
    }

    //
    // Lazy materialization
    //

    /// Lets the builder consume one event on behalf of an incomplete
    /// container.
    fn build_step(&mut self, owner: NodeId) -> Result<(), DocumentError> {
        let owner_builder = self.arena.get(owner).builder;
        match self.builder.as_mut().map(exclusive) {
            Some(builder) if owner_builder == Some(builder.id()) => {
                builder.build_next(&mut self.arena)
            }
            _ => Err(DocumentError::IllegalState(description::NO_BUILDER)),
        }
    }

    pub fn is_complete(&self, node: NodeId) -> bool {
        self.arena.contains(node) && self.arena.is_complete(node)
    }

    /// Materializes the whole subtree of the node.
    pub fn build(&mut self, node: NodeId) -> Result<(), DocumentError> {
        self.check(node)?;
        while !self.arena.is_complete(node) {
            self.build_step(node)?;
        }
        Ok(())
    }

    pub fn build_all(&mut self) -> Result<(), DocumentError> {
        self.build(NodeId::DOCUMENT)
    }

    pub fn root_element(&mut self) -> Result<Option<NodeId>, DocumentError> {
        loop {
            if let Some(root) = self.arena.document_info().root {
                return Ok(Some(root));
            }
            if self.arena.is_complete(NodeId::DOCUMENT) {
                return Ok(None);
            }
            self.build_step(NodeId::DOCUMENT)?;
        }
    }

    /// Returns the first child, building just enough to know it.
    pub fn first_child(&mut self, node: NodeId) -> Result<Option<NodeId>, DocumentError> {
        self.check(node)?;
        loop {
            let record = self.arena.get(node);
            if record.first_child.is_some() || record.complete || !record.is_container() {
                return Ok(record.first_child);
            }
            self.build_step(node)?;
        }
    }

    pub fn last_child(&mut self, node: NodeId) -> Result<Option<NodeId>, DocumentError> {
        self.build(node)?;
        Ok(self.arena.get(node).last_child)
    }

    /// Returns the next sibling, building the parent until it is known.
    pub fn next_sibling(&mut self, node: NodeId) -> Result<Option<NodeId>, DocumentError> {
        self.check(node)?;
        loop {
            let record = self.arena.get(node);
            if record.next.is_some() {
                return Ok(record.next);
            }
            let Some(parent) = record.parent else {
                return Ok(None);
            };
            if self.arena.is_complete(parent) {
                return Ok(None);
            }
            self.build_step(parent)?;
        }
    }

    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.arena.contains(node).then(|| self.arena.get(node).previous)?
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.contains(node).then(|| self.arena.get(node).parent)?
    }

    /// Iterates over the children, materializing them one by one.
    pub fn children(&mut self, node: NodeId) -> Children<'_> {
        Children::new(self, node)
    }

    pub fn find_first_child_by<P>(
        &mut self,
        node: NodeId,
        mut predicate: P,
    ) -> Result<Option<NodeId>, DocumentError>
    where
        P: FnMut(&Document, NodeId) -> bool,
    {
        let mut children = self.children(node);
        while let Some(child) = children.next() {
            let child = child?;
            if predicate(children.document(), child) {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Finds the first child element with the given name.
    pub fn find_element(
        &mut self,
        node: NodeId,
        namespace_uri: Option<&str>,
        local_name: &str,
    ) -> Result<Option<NodeId>, DocumentError> {
        self.find_first_child_by(node, |doc, child| {
            doc.element(child)
                .is_some_and(|element| element.name().matches(namespace_uri, local_name))
        })
    }

    //
    // Read access to materialized nodes
    //

    fn payload(&self, node: NodeId) -> Option<&Payload> {
        self.arena.contains(node).then(|| self.arena.payload(node))
    }

    /// Returns the kind of the node, `None` for the document node and
    /// for handles of other documents.
    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.payload(node)?.kind()
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        self.payload(node)?.as_element()
    }

    pub fn name(&self, node: NodeId) -> Option<&QName> {
        self.element(node).map(|element| element.name())
    }

    pub fn attribute(&self, node: NodeId, namespace_uri: Option<&str>, local_name: &str) -> Option<&str> {
        self.element(node)
            .and_then(|element| element.attribute(namespace_uri, local_name))
    }

    /// Character content of a leaf node, binary content as base64.
    pub fn text(&self, node: NodeId) -> Option<Cow<'_, str>> {
        self.payload(node)?.text()
    }

    pub fn binary(&self, node: NodeId) -> Option<&[u8]> {
        self.payload(node)?.as_binary().map(|binary| &binary.data[..])
    }

    pub fn content_id(&self, node: NodeId) -> Option<&str> {
        self.payload(node)?
            .as_binary()
            .and_then(|binary| binary.content_id.as_deref())
    }

    /// Character set from the XML declaration, known once building started.
    pub fn charset(&self) -> Option<&str> {
        self.arena.document_info().charset.as_deref()
    }

    pub fn xml_version(&self) -> Option<&str> {
        self.arena.document_info().xml_version.as_deref()
    }

    /// Looks up the URI bound to the prefix in scope of the node.
    pub fn lookup_namespace_uri(&self, node: NodeId, prefix: &str) -> Option<&str> {
        if !self.arena.contains(node) {
            return None;
        }
        self.arena.lookup_namespace_uri(node, prefix)
    }

    pub fn lookup_prefix(&self, node: NodeId, uri: &str) -> Option<&str> {
        if !self.arena.contains(node) {
            return None;
        }
        self.arena.lookup_prefix(node, uri)
    }

    //
    // Node factory, created nodes are complete and unattached
    //

    pub fn create_element(&mut self, name: QName) -> NodeId {
        self.arena.alloc(Payload::Element(Element::new(name)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.arena
            .alloc(Payload::Text(TextContent::Chars(text.to_string())))
    }

    pub fn create_cdata(&mut self, text: &str) -> NodeId {
        self.arena.alloc(Payload::CData(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.arena.alloc(Payload::Comment(text.to_string()))
    }

    pub fn create_whitespace(&mut self, text: &str) -> NodeId {
        self.arena.alloc(Payload::Whitespace(text.to_string()))
    }

    pub fn create_processing_instruction(&mut self, target: &str, data: &str) -> NodeId {
        self.arena.alloc(Payload::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })
    }

    pub fn create_entity_reference(&mut self, name: &str, replacement: Option<&str>) -> NodeId {
        self.arena.alloc(Payload::EntityReference {
            name: name.to_string(),
            replacement: replacement.map(str::to_string),
        })
    }

    pub fn create_dtd(&mut self, text: &str) -> NodeId {
        self.arena.alloc(Payload::DocumentTypeDecl(text.to_string()))
    }

    /// Creates a text node with binary content.
    ///
    /// When `optimize` is set the content may be sent as an attachment
    /// instead of inline base64 text.
    pub fn create_binary(&mut self, data: impl Into<Arc<[u8]>>, optimize: bool) -> NodeId {
        self.arena.alloc(Payload::Text(TextContent::Binary(BinaryText {
            data: data.into(),
            content_id: None,
            optimize,
        })))
    }

    //
    // Mutation
    //

    fn check_insert(&self, parent: NodeId, node: NodeId) -> Result<(), DocumentError> {
        self.check(parent)?;
        self.check(node)?;
        if !self.arena.get(parent).is_container() {
            return Err(DocumentError::BadStructure(description::NOT_CONTAINER));
        }
        if node == NodeId::DOCUMENT || self.arena.is_ancestor_or_self(node, parent) {
            return Err(DocumentError::BadStructure(description::CYCLE));
        }
        if parent == NodeId::DOCUMENT {
            match self.arena.payload(node).kind() {
                Some(NodeKind::Element) => {
                    if self.arena.document_info().root.is_some() {
                        return Err(DocumentError::BadStructure(description::ROOT_ALREADY_SET));
                    }
                }
                Some(NodeKind::Comment)
                | Some(NodeKind::ProcessingInstruction)
                | Some(NodeKind::DocumentTypeDecl)
                | Some(NodeKind::Whitespace) => {}
                _ => return Err(DocumentError::BadStructure(description::DOCUMENT_CHILD)),
            }
        }
        Ok(())
    }

    fn attached(&mut self, parent: Option<NodeId>, node: NodeId) {
        if parent == Some(NodeId::DOCUMENT) && self.arena.payload(node).as_element().is_some() {
            self.arena.document_info_mut().root = Some(node);
        }
    }

    /// Appends the node as the last child of the parent.
    ///
    /// The parent is built completely first. A node which is attached
    /// somewhere else is detached before the move.
    pub fn add_child(&mut self, parent: NodeId, node: NodeId) -> Result<(), DocumentError> {
        self.check_insert(parent, node)?;
        self.build(parent)?;
        self.detach(node)?;
        self.arena.append_child(parent, node);
        self.attached(Some(parent), node);
        Ok(())
    }

    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) -> Result<(), DocumentError> {
        self.check(reference)?;
        let parent = self
            .parent(reference)
            .ok_or(DocumentError::BadStructure(description::NO_PARENT))?;
        self.check_insert(parent, node)?;
        if node == reference {
            return Ok(());
        }
        self.detach(node)?;
        self.arena.insert_before(reference, node);
        self.attached(Some(parent), node);
        Ok(())
    }

    /// Inserts the node right after the reference.
    ///
    /// The reference's next sibling is built first, so the new node never
    /// lands inside content the builder has yet to produce.
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) -> Result<(), DocumentError> {
        self.check(reference)?;
        let parent = self
            .parent(reference)
            .ok_or(DocumentError::BadStructure(description::NO_PARENT))?;
        self.check_insert(parent, node)?;
        if node == reference {
            return Ok(());
        }
        self.next_sibling(reference)?;
        self.detach(node)?;
        self.arena.insert_after(reference, node);
        self.attached(Some(parent), node);
        Ok(())
    }

    /// Removes the node from its parent.
    ///
    /// The next sibling is built first to keep the sibling chain intact.
    /// Namespace declarations inherited from the old ancestors are not
    /// copied into the detached subtree.
    pub fn detach(&mut self, node: NodeId) -> Result<(), DocumentError> {
        self.check(node)?;
        if self.parent(node).is_none() {
            return Ok(());
        }
        if self.arena.document_info().root == Some(node) {
            return Err(DocumentError::BadStructure(description::ROOT_DETACH));
        }
        self.next_sibling(node)?;
        self.arena.unlink(node);
        Ok(())
    }

    /// Drops an incomplete element without building the rest of it.
    pub fn discard(&mut self, node: NodeId) -> Result<(), DocumentError> {
        self.check(node)?;
        if self.element(node).is_none() {
            return Err(DocumentError::BadStructure(description::NOT_ELEMENT));
        }
        if self.arena.is_complete(node) {
            return Err(DocumentError::IllegalState(description::DISCARD_COMPLETE));
        }
        if self.arena.document_info().root == Some(node) {
            return Err(DocumentError::BadStructure(description::DISCARD_ROOT));
        }
        let builder = self
            .builder
            .as_mut()
            .map(exclusive)
            .ok_or(DocumentError::IllegalState(description::NO_BUILDER))?;
        builder.discard(&mut self.arena, node)
    }

    fn element_mut(&mut self, node: NodeId) -> Result<&mut Element, DocumentError> {
        self.check(node)?;
        self.arena
            .payload_mut(node)
            .as_element_mut()
            .ok_or(DocumentError::BadStructure(description::NOT_ELEMENT))
    }

    /// Sets an attribute, replacing the value of an existing one with the
    /// same namespace and local name.
    pub fn set_attribute(&mut self, node: NodeId, name: QName, value: &str) -> Result<(), DocumentError> {
        self.element_mut(node)?.set_attribute(name, value);
        Ok(())
    }

    pub fn remove_attribute(
        &mut self,
        node: NodeId,
        namespace_uri: Option<&str>,
        local_name: &str,
    ) -> Result<bool, DocumentError> {
        Ok(self.element_mut(node)?.remove_attribute(namespace_uri, local_name))
    }

    pub fn declare_namespace(&mut self, node: NodeId, prefix: &str, uri: &str) -> Result<(), DocumentError> {
        self.element_mut(node)?.declare(prefix, uri);
        Ok(())
    }

    //
    // Builder controls
    //

    fn builder_mut(&mut self) -> Result<&mut Builder, DocumentError> {
        self.builder
            .as_mut()
            .map(exclusive)
            .ok_or(DocumentError::IllegalState(description::NO_BUILDER))
    }

    /// Switches between materializing and pass-through modes.
    ///
    /// Caching cannot be turned back on once the raw source was handed out.
    pub fn set_caching(&mut self, cache: bool) -> Result<(), DocumentError> {
        self.builder_mut()?.set_caching(cache)
    }

    pub fn is_caching(&self) -> bool {
        self.builder
            .as_ref()
            .is_some_and(|builder| shared(builder, Builder::is_caching))
    }

    /// Hands out the event source positioned after the last built node.
    ///
    /// Caching is turned off permanently, incomplete containers can no
    /// longer be built.
    pub fn raw_source(&mut self) -> Result<&mut dyn EventSource, DocumentError> {
        Ok(self.builder_mut()?.raw_source())
    }

    /// Registers a custom builder for elements with the given name, up to
    /// `max_depth` (the root element has depth 1).
    pub fn register_delegate(
        &mut self,
        namespace_uri: &str,
        local_name: &str,
        max_depth: usize,
        delegate: impl Delegate + Send + 'static,
    ) -> Result<(), DocumentError> {
        self.builder_mut()?
            .register_delegate(namespace_uri, local_name, max_depth, Box::new(delegate))
    }

    /// Registers a custom builder for the first element found at `depth`,
    /// whatever its name.
    pub fn set_payload_delegate(
        &mut self,
        depth: usize,
        delegate: impl Delegate + Send + 'static,
    ) -> Result<(), DocumentError> {
        self.builder_mut()?
            .set_payload_delegate(depth, Box::new(delegate))
    }

    /// Releases the builder and its event source.
    ///
    /// Incomplete containers stay incomplete, building them afterwards is
    /// an error.
    pub fn close(&mut self) {
        if self.builder.take().is_some() {
            debug!(complete = self.arena.is_complete(NodeId::DOCUMENT), "builder closed");
        }
    }

    pub fn is_done(&self) -> bool {
        match &self.builder {
            Some(builder) => shared(builder, Builder::is_done),
            None => self.arena.is_complete(NodeId::DOCUMENT),
        }
    }

    /// Current element nesting of the builder, the root element being 1.
    pub fn element_level(&self) -> usize {
        self.builder
            .as_ref()
            .map_or(0, |builder| shared(builder, Builder::element_level))
    }

    pub(crate) fn split_for_consume(&mut self) -> Result<(&Arena, &mut dyn EventSource), DocumentError> {
        let builder = self
            .builder
            .as_mut()
            .map(exclusive)
            .ok_or(DocumentError::IllegalState(description::NO_BUILDER))?;
        if !builder.is_caching() {
            return Err(DocumentError::IllegalState(description::CACHE_DISABLED));
        }
        Ok((&self.arena, builder.raw_source()))
    }

    //
    // Serialization
    //

    /// Builds the subtree of the node and walks it as events.
    pub fn tree_source(&mut self, node: NodeId) -> Result<TreeSource<'_>, DocumentError> {
        self.build(node)?;
        Ok(TreeSource::new(&self.arena, node))
    }

    /// Serializes the subtree of the node, materializing it first.
    pub fn serialize(
        &mut self,
        node: NodeId,
        sink: &mut dyn EventSink,
        config: &OutputConfig,
    ) -> Result<(), DocumentError> {
        Serializer::new(config).serialize_node(self, node, sink)
    }

    /// Serializes the node, streaming the unbuilt rest straight from the
    /// event source.
    ///
    /// The builder is left in pass-through mode for good.
    pub fn serialize_and_consume(
        &mut self,
        node: NodeId,
        sink: &mut dyn EventSink,
        config: &OutputConfig,
    ) -> Result<(), DocumentError> {
        Serializer::new(config).serialize_and_consume(self, node, sink)
    }

    pub fn to_xml_string(&mut self, node: NodeId) -> Result<String, DocumentError> {
        let mut writer = XmlWriter::new(Vec::new());
        self.serialize(node, &mut writer, &OutputConfig::default())?;
        Ok(writer.into_string()?)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats the materialized part of the document.
impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = OutputConfig::default();
        let mut writer = XmlWriter::new(Vec::new());
        let mut source = TreeSource::new(&self.arena, NodeId::DOCUMENT);
        Serializer::new(&config)
            .serialize(&mut source, &mut writer, crate::StartMode::Advance)
            .map_err(|_| std::fmt::Error)?;
        let xml = writer.into_string().map_err(|_| std::fmt::Error)?;
        f.write_str(&xml)
    }
}

impl FromStr for Document {
    type Err = DocumentError;

    /// Parses and builds the whole document.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut doc = Document::from_text(s);
        doc.build_all()?;
        Ok(doc)
    }
}
