/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::cell::Cell;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::hash::RandomState;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use tracing::debug;

/// Property naming the action folded into the content type.
pub const ACTION_PROPERTY: &str = "action";

const DEFAULT_CHARSET: &str = "utf-8";
const DEFAULT_XML_VERSION: &str = "1.0";
const CONTENT_ID_DOMAIN: &str = "iksom.local";

const SOAP11_CONTENT_TYPE: &str = "text/xml";
const SOAP12_CONTENT_TYPE: &str = "application/soap+xml";
const XOP_CONTENT_TYPE: &str = "application/xop+xml";
const MULTIPART_RELATED: &str = "multipart/related";

/// Envelope protocol version, selecting the default content type.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ProtocolVersion {
    #[default]
    Soap11,
    Soap12,
}

impl ProtocolVersion {
    pub fn content_type(&self) -> &'static str {
        match self {
            ProtocolVersion::Soap11 => SOAP11_CONTENT_TYPE,
            ProtocolVersion::Soap12 => SOAP12_CONTENT_TYPE,
        }
    }
}

/// Settings for writing a message.
///
/// The MIME boundary, the root content id and the content id sequence
/// are generated on first use and stay fixed for this instance. A clone
/// gets its own identifiers.
///
/// ```
/// use iksom::OutputConfig;
///
/// let config = OutputConfig::new().with_optimize(true).with_threshold(1024);
/// assert!(config.is_optimized());
/// assert!(config.content_type().starts_with("multipart/related; boundary="));
/// assert_ne!(config.next_content_id(), config.next_content_id());
/// ```
#[derive(Debug)]
pub struct OutputConfig {
    charset: String,
    xml_version: String,
    content_type: Option<String>,
    protocol: ProtocolVersion,
    optimize: bool,
    swa: bool,
    threshold: usize,
    properties: HashMap<String, String>,
    uid: OnceCell<String>,
    mime_boundary: OnceCell<String>,
    root_content_id: OnceCell<String>,
    next_id: Cell<u32>,
}

impl OutputConfig {
    pub fn new() -> OutputConfig {
        OutputConfig {
            charset: DEFAULT_CHARSET.to_string(),
            xml_version: DEFAULT_XML_VERSION.to_string(),
            content_type: None,
            protocol: ProtocolVersion::default(),
            optimize: false,
            swa: false,
            threshold: 0,
            properties: HashMap::new(),
            uid: OnceCell::new(),
            mime_boundary: OnceCell::new(),
            root_content_id: OnceCell::new(),
            next_id: Cell::new(1),
        }
    }

    pub fn with_charset(mut self, charset: &str) -> Self {
        self.charset = charset.to_string();
        self
    }

    pub fn with_xml_version(mut self, version: &str) -> Self {
        self.xml_version = version.to_string();
        self
    }

    /// Overrides the content type derived from the protocol version.
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    /// Enables sending optimizable binary content as XOP attachments.
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Enables SOAP with attachments, which takes precedence over XOP.
    pub fn with_swa(mut self, swa: bool) -> Self {
        self.swa = swa;
        self
    }

    /// Smallest binary content size, in bytes, worth an attachment.
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn set_property(&mut self, name: &str, value: &str) {
        self.properties.insert(name.to_string(), value.to_string());
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn xml_version(&self) -> &str {
        &self.xml_version
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn is_optimized(&self) -> bool {
        self.optimize && !self.swa
    }

    pub fn is_swa(&self) -> bool {
        self.swa
    }

    fn uid(&self) -> &str {
        self.uid.get_or_init(|| {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();
            let salt = RandomState::new().hash_one(nanos);
            format!("{nanos:x}{salt:016x}")
        })
    }

    pub fn mime_boundary(&self) -> &str {
        self.mime_boundary.get_or_init(|| {
            let boundary = format!("MIMEBoundary_{}", self.uid());
            debug!(%boundary, "MIME boundary generated");
            boundary
        })
    }

    /// Content id of the MIME part holding the XML.
    pub fn root_content_id(&self) -> &str {
        self.root_content_id
            .get_or_init(|| format!("0.{}@{CONTENT_ID_DOMAIN}", self.uid()))
    }

    /// Generates a content id for the next attachment.
    pub fn next_content_id(&self) -> String {
        let n = self.next_id.get();
        self.next_id.set(n + 1);
        format!("{n}.{}@{CONTENT_ID_DOMAIN}", self.uid())
    }

    /// Returns the MIME content type of the message.
    pub fn content_type(&self) -> String {
        let action = self.property(ACTION_PROPERTY);
        if self.is_optimized() {
            let mut start_info = self.protocol.content_type().to_string();
            if let Some(action) = action {
                start_info.push_str(&format!("; action=\\\"{action}\\\""));
            }
            format!(
                "{MULTIPART_RELATED}; boundary=\"{}\"; type=\"{XOP_CONTENT_TYPE}\"; start=\"<{}>\"; start-info=\"{start_info}\"",
                self.mime_boundary(),
                self.root_content_id(),
            )
        } else if self.swa {
            format!(
                "{MULTIPART_RELATED}; boundary=\"{}\"; type=\"{}\"; start=\"<{}>\"",
                self.mime_boundary(),
                self.content_type
                    .as_deref()
                    .unwrap_or(self.protocol.content_type()),
                self.root_content_id(),
            )
        } else {
            let base = self
                .content_type
                .as_deref()
                .unwrap_or(self.protocol.content_type());
            let mut content_type = format!("{base}; charset={}", self.charset);
            if self.protocol == ProtocolVersion::Soap12
                && let Some(action) = action
            {
                content_type.push_str(&format!("; action=\"{action}\""));
            }
            content_type
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for OutputConfig {
    fn clone(&self) -> Self {
        OutputConfig {
            charset: self.charset.clone(),
            xml_version: self.xml_version.clone(),
            content_type: self.content_type.clone(),
            protocol: self.protocol,
            optimize: self.optimize,
            swa: self.swa,
            threshold: self.threshold,
            properties: self.properties.clone(),
            ..OutputConfig::new()
        }
    }
}
