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

use quick_xml::events::attributes::AttrError;

/// Errors reported by an [EventSource](super::EventSource).
///
/// The underlying cause is kept, either as the reader's message or as
/// the original I/O error.
#[derive(Debug)]
pub enum SourceError {
    /// The input is not well-formed XML.
    BadXml(String),

    /// The source was pulled after it ran out of events.
    UnexpectedEnd,

    /// Reading the underlying input failed.
    Io(std::io::Error),
}

impl Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::BadXml(msg) => write!(f, "invalid XML input: {msg}"),
            SourceError::UnexpectedEnd => write!(f, "event source ended unexpectedly"),
            SourceError::Io(err) => write!(f, "input error: {err}"),
        }
    }
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SourceError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err)
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(err: quick_xml::Error) -> Self {
        SourceError::BadXml(err.to_string())
    }
}

impl From<AttrError> for SourceError {
    fn from(err: AttrError) -> Self {
        SourceError::BadXml(err.to_string())
    }
}

impl SourceError {
    pub(crate) fn bad_xml(msg: &'static str) -> SourceError {
        SourceError::BadXml(msg.to_string())
    }
}

pub(crate) mod description {
    pub(crate) const BAD_UTF8: &str = "content is not valid UTF-8";
    pub(crate) const TEXT_OUTSIDE_ROOT: &str = "character data is not allowed outside of the root element";
    pub(crate) const UNCLOSED_ELEMENTS: &str = "input ended with unclosed elements";
    pub(crate) const UNBALANCED_END: &str = "end element without a matching start element";
    pub(crate) const END_INSIDE_ELEMENT: &str = "document ended inside an element";
    pub(crate) const MULTIPLE_ROOTS: &str = "document has more than one root element";
}
