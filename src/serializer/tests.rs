/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::AttachmentStore;
use crate::Document;
use crate::EventList;
use crate::QName;
use crate::attachment::INCLUDE;
use crate::attachment::XOP_NAMESPACE;
use crate::attachment::XOP_PREFIX;
use crate::event::Attribute;

use super::error::description;
use super::*;

/// Logs the sink calls in the order they arrive.
struct CallLog {
    calls: Vec<String>,
    order: BindingOrder,
    context: NamespaceContext,
    pending: Vec<Namespace>,
}

impl CallLog {
    fn new(order: BindingOrder) -> CallLog {
        CallLog {
            calls: Vec::new(),
            order,
            context: NamespaceContext::new(),
            pending: Vec::new(),
        }
    }
}

impl EventSink for CallLog {
    fn binding_order(&self) -> BindingOrder {
        self.order
    }

    fn namespace_context(&self) -> &NamespaceContext {
        &self.context
    }

    fn start_document(&mut self, version: &str, encoding: &str) -> Result<(), SinkError> {
        self.calls.push(format!("document {version} {encoding}"));
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), SinkError> {
        self.calls.push("end document".to_string());
        Ok(())
    }

    fn start_element(&mut self, name: &QName) -> Result<(), SinkError> {
        self.context.push_scope();
        for ns in std::mem::take(&mut self.pending) {
            self.context.bind(&ns.prefix, &ns.uri);
        }
        self.calls.push(format!("start {name}"));
        Ok(())
    }

    fn namespace(&mut self, prefix: &str, uri: &str) -> Result<(), SinkError> {
        match self.order {
            BindingOrder::BeforeStartTag => self.pending.push(Namespace::new(prefix, uri)),
            BindingOrder::AfterStartTag => self.context.bind(prefix, uri),
        }
        self.calls.push(format!("ns {prefix}={uri}"));
        Ok(())
    }

    fn attribute(&mut self, attribute: &Attribute) -> Result<(), SinkError> {
        self.calls.push(format!("attr {}={}", attribute.name, attribute.value));
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), SinkError> {
        self.context.pop_scope();
        self.calls.push("end".to_string());
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), SinkError> {
        self.calls.push(format!("text {text}"));
        Ok(())
    }

    fn cdata(&mut self, text: &str) -> Result<(), SinkError> {
        self.calls.push(format!("cdata {text}"));
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), SinkError> {
        self.calls.push(format!("comment {text}"));
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), SinkError> {
        self.calls.push(format!("pi {target} {data}"));
        Ok(())
    }

    fn entity_reference(&mut self, name: &str) -> Result<(), SinkError> {
        self.calls.push(format!("entity {name}"));
        Ok(())
    }

    fn dtd(&mut self, text: &str) -> Result<(), SinkError> {
        self.calls.push(format!("dtd {text}"));
        Ok(())
    }
}

fn write(source: &mut dyn EventSource, config: &OutputConfig) -> String {
    let mut writer = XmlWriter::new(Vec::new());
    Serializer::new(config)
        .serialize(source, &mut writer, StartMode::Advance)
        .unwrap();
    writer.into_string().unwrap()
}

fn unbound_attribute() -> EventList {
    EventList::new()
        .start_element(QName::new("e"))
        .attribute(QName::with_namespace("urn:a", "x"), "1")
        .end_element()
}

#[test]
fn binding_order() {
    let config = OutputConfig::new();

    let mut log = CallLog::new(BindingOrder::BeforeStartTag);
    Serializer::new(&config)
        .serialize(&mut unbound_attribute(), &mut log, StartMode::Advance)
        .unwrap();
    assert_eq!(log.calls, ["ns ns0=urn:a", "start e", "attr ns0:x=1", "end"]);

    let mut log = CallLog::new(BindingOrder::AfterStartTag);
    Serializer::new(&config)
        .serialize(&mut unbound_attribute(), &mut log, StartMode::Advance)
        .unwrap();
    assert_eq!(log.calls, ["start e", "ns ns0=urn:a", "attr ns0:x=1", "end"]);

    let mut writer = XmlWriter::new(Vec::new()).with_binding_order(BindingOrder::AfterStartTag);
    Serializer::new(&config)
        .serialize(&mut unbound_attribute(), &mut writer, StartMode::Advance)
        .unwrap();
    assert_eq!(
        writer.into_string().unwrap(),
        "<e xmlns:ns0=\"urn:a\" ns0:x=\"1\"/>"
    );
}

#[test]
fn one_subtree() {
    let config = OutputConfig::new();
    let mut source = EventList::new()
        .start_element(QName::new("a"))
        .characters("t")
        .end_element()
        .start_element(QName::new("b"))
        .end_element();
    assert_eq!(write(&mut source, &config), "<a>t</a>");

    let first = source.next_event().unwrap();
    let mut writer = XmlWriter::new(Vec::new());
    Serializer::new(&config)
        .serialize(&mut source, &mut writer, StartMode::Positioned(first))
        .unwrap();
    assert_eq!(writer.into_string().unwrap(), "<b/>");
    assert!(source.is_empty());
}

#[test]
fn leaf_events() {
    let config = OutputConfig::new();
    let mut log = CallLog::new(BindingOrder::BeforeStartTag);
    let mut source = EventList::from(vec![
        XmlEvent::StartDocument {
            version: Some("1.1".to_string()),
            encoding: None,
        },
        XmlEvent::Dtd("r".to_string()),
        XmlEvent::StartElement(StartElement::new(QName::new("r"))),
        XmlEvent::CData("c".to_string()),
        XmlEvent::Whitespace(" ".to_string()),
        XmlEvent::ProcessingInstruction {
            target: "t".to_string(),
            data: "d".to_string(),
        },
        XmlEvent::EntityReference {
            name: "e".to_string(),
            replacement: None,
        },
        XmlEvent::Comment("x".to_string()),
        XmlEvent::EndElement,
        XmlEvent::EndDocument,
    ]);
    Serializer::new(&config)
        .serialize(&mut source, &mut log, StartMode::Advance)
        .unwrap();
    assert_eq!(
        log.calls,
        [
            "document 1.0 utf-8",
            "dtd r",
            "start r",
            "cdata c",
            "text  ",
            "pi t d",
            "entity e",
            "comment x",
            "end",
            "end document"
        ]
    );
}

#[test]
fn default_namespace() {
    let config = OutputConfig::new();
    let mut source = EventList::new()
        .start_element(QName::with_namespace("urn:d", "root"))
        .start_element(QName::new("c"))
        .end_element()
        .start_element(QName::with_namespace("urn:d", "same"))
        .end_element()
        .end_element();
    assert_eq!(
        write(&mut source, &config),
        "<root xmlns=\"urn:d\"><c xmlns=\"\"/><same/></root>"
    );
}

#[test]
fn prefix_conflicts() {
    let config = OutputConfig::new();
    let mut source = EventList::new()
        .start_element(QName::new("root"))
        .namespace("ns0", "urn:zero")
        .start_element(QName::new("child"))
        .attribute(QName::with_namespace("urn:b", "x"), "1")
        .attribute(QName::with_prefix("urn:c", "ns0", "y"), "2")
        .attribute(QName::with_prefix("urn:zero", "z", "w"), "3")
        .end_element()
        .end_element();
    assert_eq!(
        write(&mut source, &config),
        concat!(
            "<root xmlns:ns0=\"urn:zero\">",
            "<child xmlns:ns1=\"urn:b\" xmlns:ns2=\"urn:c\" xmlns:z=\"urn:zero\" ",
            "ns1:x=\"1\" ns2:y=\"2\" z:w=\"3\"/>",
            "</root>"
        )
    );
}

#[test]
fn existing_binding_reused() {
    let config = OutputConfig::new();
    let mut source = EventList::new()
        .start_element(QName::with_prefix("urn:p", "p", "root"))
        .start_element(QName::new("child"))
        .attribute(QName::with_namespace("urn:p", "x"), "1")
        .end_element()
        .end_element();
    assert_eq!(
        write(&mut source, &config),
        "<p:root xmlns:p=\"urn:p\"><child p:x=\"1\"/></p:root>"
    );
}

fn placeholder_events(href: &str) -> EventList {
    EventList::new()
        .start_element(QName::new("root"))
        .start_element(QName::with_prefix(XOP_NAMESPACE, XOP_PREFIX, INCLUDE))
        .attribute(QName::new("href"), href)
        .end_element()
        .end_element()
}

#[test]
fn placeholder_resolution() {
    let config = OutputConfig::new();
    let mut store = AttachmentStore::new();
    store.insert("part@1", &[0u8, 1, 2][..]);

    for href in ["cid:part@1", "cid:part%401"] {
        let mut writer = XmlWriter::new(Vec::new());
        Serializer::new(&config)
            .with_attachments(&mut store)
            .serialize(&mut placeholder_events(href), &mut writer, StartMode::Advance)
            .unwrap();
        assert_eq!(writer.into_string().unwrap(), "<root>AAEC</root>");
    }

    let mut writer = XmlWriter::new(Vec::new());
    Serializer::new(&config)
        .with_attachments(&mut store)
        .serialize(
            &mut placeholder_events("cid:missing"),
            &mut writer,
            StartMode::Advance,
        )
        .unwrap();
    assert_eq!(
        writer.into_string().unwrap(),
        concat!(
            "<root><xop:Include xmlns:xop=\"http://www.w3.org/2004/08/xop/include\" ",
            "href=\"cid:missing\"/></root>"
        )
    );

    // without an accessor placeholders are ordinary elements
    let xml = write(&mut placeholder_events("cid:part@1"), &config);
    assert!(xml.starts_with("<root><xop:Include"));
}

#[test]
fn placeholder_kept_as_attachment() {
    let config = OutputConfig::new().with_optimize(true);
    let mut store = AttachmentStore::new();
    store.insert("part@1", &[0u8, 1, 2][..]);
    let mut writer = XmlWriter::new(Vec::new());
    Serializer::new(&config)
        .with_attachments(&mut store)
        .serialize(&mut placeholder_events("cid:part@1"), &mut writer, StartMode::Advance)
        .unwrap();
    assert_eq!(
        writer.into_string().unwrap(),
        concat!(
            "<root><xop:Include xmlns:xop=\"http://www.w3.org/2004/08/xop/include\" ",
            "href=\"cid:part@1\"/></root>"
        )
    );
    assert_eq!(store.len(), 1);
}

#[test]
fn binary_disposition() {
    let config = OutputConfig::new().with_optimize(true).with_threshold(4);
    let mut store = AttachmentStore::new();
    let mut source = EventList::new()
        .start_element(QName::new("r"))
        .binary(&[7u8; 8])
        .binary(&[1u8, 2])
        .end_element();
    let mut writer = XmlWriter::new(Vec::new());
    Serializer::new(&config)
        .with_attachments(&mut store)
        .serialize(&mut source, &mut writer, StartMode::Advance)
        .unwrap();

    assert_eq!(store.len(), 1);
    let content_id = store.content_ids().next().unwrap().to_string();
    assert!(content_id.starts_with("1."));
    assert!(content_id.ends_with("@iksom.local"));
    assert_eq!(store.get(&content_id), Some(&[7u8; 8][..]));
    assert_eq!(
        writer.into_string().unwrap(),
        format!(
            "<r><xop:Include xmlns:xop=\"{XOP_NAMESPACE}\" href=\"cid:{content_id}\"/>AQI=</r>"
        )
    );

    // optimization needs somewhere to put the attachment
    let mut source = EventList::new()
        .start_element(QName::new("r"))
        .binary(&[7u8; 8])
        .end_element();
    assert_eq!(write(&mut source, &config), "<r>BwcHBwcHBwc=</r>");
}

#[test]
fn swa_disables_optimization() {
    let config = OutputConfig::new().with_optimize(true).with_swa(true);
    let mut store = AttachmentStore::new();
    let mut source = EventList::new()
        .start_element(QName::new("r"))
        .binary(&[7u8; 8])
        .end_element();
    let mut writer = XmlWriter::new(Vec::new());
    Serializer::new(&config)
        .with_attachments(&mut store)
        .serialize(&mut source, &mut writer, StartMode::Advance)
        .unwrap();
    assert!(store.is_empty());
    assert_eq!(writer.into_string().unwrap(), "<r>BwcHBwcHBwc=</r>");
}

#[test]
fn xml_declaration() {
    let mut doc: Document = "<a/>".parse().unwrap();
    let config = OutputConfig::new().with_charset("iso-8859-9");
    let mut writer = XmlWriter::new(Vec::new()).with_xml_declaration(true);
    doc.serialize(NodeId::DOCUMENT, &mut writer, &config).unwrap();
    assert_eq!(
        writer.into_string().unwrap(),
        "<?xml version=\"1.0\" encoding=\"iso-8859-9\"?><a/>"
    );
}

#[test]
fn serialize_and_consume() {
    let mut doc = Document::from_text("<a><b>1</b><c>2<d x='y'/></c><e/></a>");
    let a = doc.root_element().unwrap().unwrap();
    let b = doc.first_child(a).unwrap().unwrap();
    let c = doc.next_sibling(b).unwrap().unwrap();
    doc.first_child(c).unwrap().unwrap();
    let nodes = doc.arena_stats().nr_nodes;

    let mut writer = XmlWriter::new(Vec::new());
    doc.serialize_and_consume(a, &mut writer, &OutputConfig::new())
        .unwrap();
    assert_eq!(
        writer.into_string().unwrap(),
        "<a><b>1</b><c>2<d x=\"y\"/></c><e/></a>"
    );
    assert_eq!(doc.arena_stats().nr_nodes, nodes);
    assert!(!doc.is_caching());
    assert!(doc.set_caching(true).unwrap_err().is_illegal_state());

    let mut writer = XmlWriter::new(Vec::new());
    doc.serialize_and_consume(b, &mut writer, &OutputConfig::new())
        .unwrap();
    assert_eq!(writer.into_string().unwrap(), "<b>1</b>");
}

#[test]
fn serialize_and_consume_needs_cache() {
    let mut doc = Document::from_text("<a><b/></a>");
    let a = doc.root_element().unwrap().unwrap();
    doc.set_caching(false).unwrap();
    let mut writer = XmlWriter::new(Vec::new());
    let err = doc
        .serialize_and_consume(a, &mut writer, &OutputConfig::new())
        .unwrap_err();
    assert!(err.is_illegal_state());
}

#[test]
fn idempotent_namespaces() {
    let mut doc = Document::from_source(
        EventList::new()
            .start_document()
            .start_element(QName::with_prefix("urn:a", "a", "root"))
            .attribute(QName::with_namespace("urn:b", "x"), "1")
            .start_element(QName::with_namespace("urn:c", "child"))
            .attribute(QName::with_namespace("urn:b", "y"), "2")
            .end_element()
            .end_element()
            .end_document(),
    );
    let root = doc.root_element().unwrap().unwrap();
    let first = doc.to_xml_string(root).unwrap();
    let second = doc.to_xml_string(root).unwrap();
    assert_eq!(first, second);

    let mut reparsed: Document = first.parse().unwrap();
    let root2 = reparsed.root_element().unwrap().unwrap();
    assert_eq!(reparsed.name(root2).unwrap().namespace_uri(), Some("urn:a"));
    assert_eq!(reparsed.attribute(root2, Some("urn:b"), "x"), Some("1"));
    let child = reparsed.first_child(root2).unwrap().unwrap();
    assert_eq!(reparsed.name(child).unwrap().namespace_uri(), Some("urn:c"));
    assert_eq!(reparsed.attribute(child, Some("urn:b"), "y"), Some("2"));
}

#[test]
fn recorder_replay() {
    let mut doc: Document = "<a xmlns='urn:x'><b k='v'>t</b><!--c--></a>".parse().unwrap();
    let mut recorder = EventRecorder::new();
    doc.serialize(NodeId::DOCUMENT, &mut recorder, &OutputConfig::new())
        .unwrap();
    let recorded = recorder.into_events();
    assert_eq!(recorded.len(), 8);

    let mut copy = Document::from_source(EventList::from(recorded));
    let root = copy.root_element().unwrap().unwrap();
    assert_eq!(
        copy.to_xml_string(root).unwrap(),
        "<a xmlns=\"urn:x\"><b k=\"v\">t</b><!--c--></a>"
    );
}

#[test]
fn sink_errors() {
    let mut writer = XmlWriter::new(Vec::new());
    assert!(matches!(
        writer.end_element(),
        Err(SinkError::BadState(_))
    ));
    assert!(matches!(
        writer.attribute(&Attribute::new(QName::new("a"), "b")),
        Err(SinkError::BadState(_))
    ));
    let mut recorder = EventRecorder::new().with_binding_order(BindingOrder::AfterStartTag);
    assert!(matches!(
        recorder.namespace("p", "urn:p"),
        Err(SinkError::BadState(_))
    ));
}

#[test]
fn cdata_terminator_split() {
    let mut doc = Document::new();
    let root = doc.create_element(QName::new("r"));
    doc.add_child(doc.document_node(), root).unwrap();
    let cdata = doc.create_cdata("a]]>b");
    doc.add_child(root, cdata).unwrap();
    let xml = doc.to_xml_string(root).unwrap();
    assert_eq!(xml, "<r><![CDATA[a]]]]><![CDATA[>b]]></r>");

    let mut reparsed: Document = xml.parse().unwrap();
    let root = reparsed.root_element().unwrap().unwrap();
    let children: Vec<NodeId> = reparsed.children(root).collect::<Result<_, _>>().unwrap();
    let text: String = children
        .iter()
        .map(|child| reparsed.text(*child).unwrap().into_owned())
        .collect();
    assert_eq!(text, "a]]>b");
}

#[test]
fn unrepresentable_markup() {
    let mut writer = XmlWriter::new(Vec::new());
    writer.start_element(&QName::new("r")).unwrap();
    assert!(matches!(
        writer.comment("a--b"),
        Err(SinkError::BadState(description::BAD_COMMENT))
    ));
    assert!(matches!(
        writer.comment("tail-"),
        Err(SinkError::BadState(description::BAD_COMMENT))
    ));
    assert!(matches!(
        writer.processing_instruction("t", "x?>y"),
        Err(SinkError::BadState(description::BAD_PI))
    ));
    writer.comment("a-b").unwrap();
    writer.end_element().unwrap();
    assert_eq!(writer.into_string().unwrap(), "<r><!--a-b--></r>");

    let mut doc = Document::new();
    let root = doc.create_element(QName::new("r"));
    doc.add_child(doc.document_node(), root).unwrap();
    let comment = doc.create_comment("x--y");
    doc.add_child(root, comment).unwrap();
    assert!(matches!(
        doc.to_xml_string(root),
        Err(DocumentError::Sink(SinkError::BadState(_)))
    ));
}
