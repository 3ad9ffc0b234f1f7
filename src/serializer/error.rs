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

/// Errors reported by an [EventSink](super::EventSink).
#[derive(Debug)]
pub enum SinkError {
    /// Writing the output failed.
    Io(std::io::Error),

    /// The sink cannot accept the event in its current state.
    BadState(&'static str),
}

impl Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(err) => write!(f, "output error: {err}"),
            SinkError::BadState(msg) => write!(f, "invalid output sequence: {msg}"),
        }
    }
}

impl Error for SinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SinkError::Io(err) => Some(err),
            SinkError::BadState(_) => None,
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

pub(crate) mod description {
    pub(crate) const NO_OPEN_TAG: &str = "attribute or declaration outside of a start tag";
    pub(crate) const NO_OPEN_ELEMENT: &str = "end element without an open element";
    pub(crate) const NOT_UTF8: &str = "output is not valid UTF-8";
    pub(crate) const BAD_COMMENT: &str = "comment text contains '--' or ends with '-'";
    pub(crate) const BAD_PI: &str = "processing instruction data contains '?>'";
}
