/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::error::Error;
use std::fmt::Display;

use crate::SinkError;
use crate::SourceError;

#[derive(Debug)]
pub enum DocumentError {
    /// Reading the event source failed.
    Source(SourceError),

    /// Writing to an event sink failed.
    Sink(SinkError),

    /// The operation is not allowed in the current builder or node state.
    IllegalState(&'static str),

    /// The operation would leave the tree inconsistent.
    BadStructure(&'static str),
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentError::Source(err) => write!(f, "{err}"),
            DocumentError::Sink(err) => write!(f, "{err}"),
            DocumentError::IllegalState(msg) => write!(f, "illegal state: {msg}"),
            DocumentError::BadStructure(msg) => write!(f, "bad structure: {msg}"),
        }
    }
}

impl Error for DocumentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DocumentError::Source(err) => Some(err),
            DocumentError::Sink(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SourceError> for DocumentError {
    fn from(err: SourceError) -> Self {
        DocumentError::Source(err)
    }
}

impl From<SinkError> for DocumentError {
    fn from(err: SinkError) -> Self {
        DocumentError::Sink(err)
    }
}

impl DocumentError {
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, DocumentError::IllegalState(_))
    }
}

pub(crate) mod description {
    pub(crate) const ALREADY_COMPLETE: &str = "builder already consumed the whole input";
    pub(crate) const CACHE_DISABLED: &str = "cannot materialize nodes while caching is off";
    pub(crate) const RAW_CURSOR_ISSUED: &str =
        "caching cannot be enabled after the raw event source was handed out";
    pub(crate) const NO_BUILDER: &str = "incomplete container has no builder attached";
    pub(crate) const DISCARD_COMPLETE: &str = "only incomplete elements can be discarded";
    pub(crate) const DISCARD_ROOT: &str = "root element cannot be discarded";
    pub(crate) const DELEGATE_AFTER_START: &str =
        "delegates must be registered before building starts";
    pub(crate) const DELEGATE_UNDERRUN: &str =
        "delegate returned before consuming the whole element";
    pub(crate) const DELEGATE_PARTIAL: &str =
        "element content was already read by the delegate";
    pub(crate) const DELEGATE_OVERRUN: &str = "delegate read past the end of its element";
    pub(crate) const NOT_CONTAINER: &str = "node cannot have children";
    pub(crate) const NOT_ELEMENT: &str = "node is not an element";
    pub(crate) const ROOT_ALREADY_SET: &str = "document already has a root element";
    pub(crate) const ROOT_DETACH: &str = "root element cannot be detached";
    pub(crate) const DOCUMENT_CHILD: &str = "only elements, comments and processing instructions can be document children";
    pub(crate) const CYCLE: &str = "node cannot be added below itself";
    pub(crate) const NO_PARENT: &str = "node is not attached to a parent";
    pub(crate) const UNKNOWN_NODE: &str = "node does not belong to this document";
}
