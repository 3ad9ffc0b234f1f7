/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Binary content sent next to the XML as MIME attachments.
//!
//! Optimized binary text is replaced in the output by an `xop:Include`
//! placeholder element referring to the attachment by its content id.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::DocumentError;
use crate::NodeId;
use crate::OutputConfig;
use crate::builder::Delegate;
use crate::builder::DelegateContext;
use crate::event::Attribute;
use crate::event::QName;
use crate::event::StartElement;

pub const XOP_NAMESPACE: &str = "http://www.w3.org/2004/08/xop/include";
pub const XOP_PREFIX: &str = "xop";
pub const INCLUDE: &str = "Include";
pub const HREF: &str = "href";
pub const CID_SCHEME: &str = "cid:";

/// Storage of attachments keyed by content id.
pub trait AttachmentAccessor {
    fn resolve(&self, content_id: &str) -> Option<Arc<[u8]>>;

    fn attach(&mut self, content_id: &str, data: Arc<[u8]>);
}

/// An in-memory attachment collection which remembers insertion order.
#[derive(Clone, Debug, Default)]
pub struct AttachmentStore {
    parts: HashMap<String, Arc<[u8]>>,
    order: Vec<String>,
}

impl AttachmentStore {
    pub fn new() -> AttachmentStore {
        AttachmentStore::default()
    }

    pub fn insert(&mut self, content_id: &str, data: impl Into<Arc<[u8]>>) {
        if self.parts.insert(content_id.to_string(), data.into()).is_none() {
            self.order.push(content_id.to_string());
        }
    }

    pub fn get(&self, content_id: &str) -> Option<&[u8]> {
        self.parts.get(content_id).map(|data| &data[..])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Content ids in the order the attachments were added.
    pub fn content_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl AttachmentAccessor for AttachmentStore {
    fn resolve(&self, content_id: &str) -> Option<Arc<[u8]>> {
        self.parts.get(content_id).cloned()
    }

    fn attach(&mut self, content_id: &str, data: Arc<[u8]>) {
        self.insert(content_id, data);
    }
}

/// Looks the content id up as written, then percent-decoded.
pub fn resolve_content_id(accessor: &dyn AttachmentAccessor, content_id: &str) -> Option<Arc<[u8]>> {
    if let Some(data) = accessor.resolve(content_id) {
        return Some(data);
    }
    let decoded = percent_decode(content_id)?;
    accessor.resolve(&decoded)
}

/// Decodes `%XX` escapes, `None` when there are none or they are invalid.
pub fn percent_decode(text: &str) -> Option<String> {
    if !text.contains('%') {
        return None;
    }
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = text.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Returns the content id referenced by an `xop:Include` element.
pub fn placeholder_content_id(start: &StartElement) -> Option<&str> {
    if !start.name.matches(Some(XOP_NAMESPACE), INCLUDE) {
        return None;
    }
    start.attribute(None, HREF)?.strip_prefix(CID_SCHEME)
}

/// Start event of a placeholder referring to the content id.
pub fn placeholder(content_id: &str) -> StartElement {
    let mut start = StartElement::new(QName::with_prefix(XOP_NAMESPACE, XOP_PREFIX, INCLUDE));
    start.attributes.push(Attribute::new(
        QName::new(HREF),
        &format!("{CID_SCHEME}{content_id}"),
    ));
    start
}

/// How a piece of binary content is written.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Disposition {
    /// Base64 character data in the XML.
    Inline,
    /// An attachment with a placeholder in the XML.
    External,
}

impl Disposition {
    pub fn decide(config: &OutputConfig, optimize: bool, size: usize) -> Disposition {
        if config.is_optimized() && optimize && size >= config.threshold() {
            Disposition::External
        } else {
            Disposition::Inline
        }
    }
}

/// Builder delegate turning `xop:Include` placeholders into binary text.
///
/// Register it for the placeholder element name. Placeholders whose
/// attachment cannot be found are built as ordinary elements.
///
/// ```
/// use iksom::attachment::{AttachmentStore, INCLUDE, XOP_NAMESPACE, XopDecoder};
/// use iksom::Document;
///
/// let mut store = AttachmentStore::new();
/// store.insert("part1@example.org", &b"\x00\x01\x02"[..]);
///
/// let mut doc = Document::from_text(concat!(
///     "<data xmlns:xop='http://www.w3.org/2004/08/xop/include'>",
///     "<xop:Include href='cid:part1@example.org'/></data>",
/// ));
/// doc.register_delegate(XOP_NAMESPACE, INCLUDE, usize::MAX, XopDecoder::new(store))?;
/// let root = doc.root_element()?.unwrap();
/// let text = doc.first_child(root)?.unwrap();
/// assert_eq!(doc.binary(text), Some(&[0u8, 1, 2][..]));
/// assert_eq!(doc.content_id(text), Some("part1@example.org"));
/// # Ok::<(), iksom::DocumentError>(())
/// ```
pub struct XopDecoder<A> {
    accessor: A,
}

impl<A: AttachmentAccessor> XopDecoder<A> {
    pub fn new(accessor: A) -> XopDecoder<A> {
        XopDecoder { accessor }
    }

    pub fn into_inner(self) -> A {
        self.accessor
    }
}

impl<A: AttachmentAccessor> Delegate for XopDecoder<A> {
    fn build(&mut self, context: &mut DelegateContext<'_>) -> Result<NodeId, DocumentError> {
        let Some(content_id) = placeholder_content_id(context.start()).map(str::to_string) else {
            return context.build_element();
        };
        match resolve_content_id(&self.accessor, &content_id) {
            Some(data) => {
                context.skip()?;
                Ok(context.create_binary(data, Some(&content_id)))
            }
            None => {
                debug!(%content_id, "attachment not found, keeping placeholder");
                context.build_element()
            }
        }
    }
}
