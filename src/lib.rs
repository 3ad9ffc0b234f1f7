/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod arena;
pub mod attachment;
mod builder;
mod config;
mod document;
mod entities;
mod event;
pub mod namespace;
mod serializer;

pub use arena::ArenaStats;
pub use arena::NodeId;

pub use attachment::AttachmentAccessor;
pub use attachment::AttachmentStore;
pub use attachment::Disposition;
pub use attachment::XopDecoder;

pub use builder::Delegate;
pub use builder::DelegateContext;

pub use config::ACTION_PROPERTY;
pub use config::OutputConfig;
pub use config::ProtocolVersion;

pub use document::Children;
pub use document::Document;
pub use document::DocumentError;
pub use document::Element;
pub use document::NodeKind;
pub use document::TreeSource;

pub use event::Attribute;
pub use event::EventList;
pub use event::EventSource;
pub use event::Namespace;
pub use event::Property;
pub use event::QName;
pub use event::SourceError;
pub use event::StartElement;
pub use event::XmlEvent;
pub use event::XmlReaderSource;
pub use event::property;

pub use namespace::NamespaceContext;

pub use serializer::BindingOrder;
pub use serializer::EventRecorder;
pub use serializer::EventSink;
pub use serializer::Serializer;
pub use serializer::SinkError;
pub use serializer::StartMode;
pub use serializer::XmlWriter;
