/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use iksom::AttachmentStore;
use iksom::BindingOrder;
use iksom::Document;
use iksom::EventList;
use iksom::EventRecorder;
use iksom::NodeId;
use iksom::OutputConfig;
use iksom::QName;
use iksom::Serializer;
use iksom::StartMode;
use iksom::XmlReaderSource;
use iksom::XmlWriter;
use iksom::attachment::XOP_NAMESPACE;

const MESSAGE: &str = concat!(
    "<env:Envelope xmlns:env='urn:env' xmlns:m='urn:msg'>",
    "<env:Header><m:id>7</m:id></env:Header>",
    "<env:Body m:kind='order'>",
    "<order xmlns='urn:order' count='2'><item>a &amp; b</item><!--gap--><item/></order>",
    "<![CDATA[<raw>]]><?note here?>",
    "</env:Body></env:Envelope>"
);

fn tree() -> EventList {
    EventList::new()
        .start_document()
        .start_element(QName::new("a"))
        .start_element(QName::new("b"))
        .start_element(QName::new("c"))
        .characters("deep")
        .end_element()
        .end_element()
        .start_element(QName::new("b2"))
        .end_element()
        .end_element()
        .end_document()
}

fn local_name(doc: &Document, node: NodeId) -> String {
    doc.name(node).unwrap().local_name().to_string()
}

/// Resolved names of every element and attribute, in document order.
fn resolved_names(doc: &mut Document, node: NodeId, names: &mut Vec<String>) {
    if let Some(element) = doc.element(node) {
        let name = element.name();
        names.push(format!("{{{}}}{}", name.namespace_uri().unwrap_or(""), name.local_name()));
        for attr in element.attributes() {
            let name = &attr.name;
            names.push(format!("@{{{}}}{}", name.namespace_uri().unwrap_or(""), name.local_name()));
        }
    }
    let children: Vec<NodeId> = doc.children(node).collect::<Result<_, _>>().unwrap();
    for child in children {
        resolved_names(doc, child, names);
    }
}

fn write_with(config: &OutputConfig, store: &mut AttachmentStore, source: &mut EventList) -> String {
    let mut writer = XmlWriter::new(Vec::new());
    Serializer::new(config)
        .with_attachments(store)
        .serialize(source, &mut writer, StartMode::Advance)
        .unwrap();
    writer.into_string().unwrap()
}

#[test]
fn builds_one_level_at_a_time() {
    let mut doc = Document::from_source(tree());
    let a = doc.root_element().unwrap().unwrap();
    let before = doc.arena_stats().nr_nodes;

    let b = doc.first_child(a).unwrap().unwrap();
    assert_eq!(doc.arena_stats().nr_nodes, before + 1);
    assert!(!doc.is_complete(b));

    let c = doc.first_child(b).unwrap().unwrap();
    assert_eq!(doc.arena_stats().nr_nodes, before + 2);
    assert_eq!(local_name(&doc, c), "c");
    assert!(!doc.is_complete(c));

    let children: Vec<NodeId> = doc.children(a).collect::<Result<_, _>>().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(local_name(&doc, children[1]), "b2");
    assert!(doc.is_complete(b));
    assert!(doc.is_complete(c));
    let deep = doc.first_child(c).unwrap().unwrap();
    assert_eq!(doc.text(deep).unwrap(), "deep");
}

#[test]
fn discards_middle_sibling() {
    let mut doc = Document::from_text("<list><one/><two><x>1</x><y>2</y></two><three/></list>");
    let list = doc.root_element().unwrap().unwrap();
    let one = doc.first_child(list).unwrap().unwrap();
    let two = doc.next_sibling(one).unwrap().unwrap();
    doc.first_child(two).unwrap();
    assert_eq!(doc.element_level(), 3);

    doc.discard(two).unwrap();
    assert_eq!(doc.element_level(), 1);

    let three = doc.next_sibling(one).unwrap().unwrap();
    assert_eq!(local_name(&doc, three), "three");
    assert_eq!(doc.previous_sibling(three), Some(one));
    assert_eq!(doc.next_sibling(three).unwrap(), None);
    assert_eq!(doc.last_child(list).unwrap(), Some(three));
    assert_eq!(doc.to_xml_string(list).unwrap(), "<list><one/><three/></list>");
}

#[test]
fn binding_order_of_sink() {
    let config = OutputConfig::new();
    let source = || {
        EventList::new()
            .start_element(QName::new("e"))
            .attribute(QName::with_namespace("urn:a", "x"), "1")
            .end_element()
    };

    let mut before = EventRecorder::new();
    Serializer::new(&config)
        .serialize(&mut source(), &mut before, StartMode::Advance)
        .unwrap();
    let events = before.into_events();
    let iksom::XmlEvent::StartElement(start) = &events[0] else {
        panic!("expected a start element, got {:?}", events[0]);
    };
    assert_eq!(start.namespaces.len(), 1);
    assert_eq!(start.namespaces[0].uri, "urn:a");
    assert_eq!(
        start.attributes[0].name.prefix(),
        Some(start.namespaces[0].prefix.as_str())
    );

    for order in [BindingOrder::BeforeStartTag, BindingOrder::AfterStartTag] {
        let mut writer = XmlWriter::new(Vec::new()).with_binding_order(order);
        Serializer::new(&config)
            .serialize(&mut source(), &mut writer, StartMode::Advance)
            .unwrap();
        assert_eq!(
            writer.into_string().unwrap(),
            "<e xmlns:ns0=\"urn:a\" ns0:x=\"1\"/>"
        );
    }
}

#[test]
fn large_binary_is_externalized() {
    let config = OutputConfig::new().with_optimize(true).with_threshold(1024);
    let large = vec![0x5au8; 2048];
    let mut store = AttachmentStore::new();
    let mut source = EventList::new()
        .start_element(QName::new("data"))
        .binary(&large)
        .end_element();
    let xml = write_with(&config, &mut store, &mut source);

    let prefix = format!("<data><xop:Include xmlns:xop=\"{XOP_NAMESPACE}\" href=\"cid:");
    assert!(xml.starts_with(&prefix), "{xml}");
    assert!(xml.ends_with("\"/></data>"), "{xml}");
    let content_id = &xml[prefix.len()..xml.len() - "\"/></data>".len()];
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(content_id), Some(&large[..]));

    let mut reparsed = Document::from_text(&xml);
    reparsed
        .register_delegate(
            XOP_NAMESPACE,
            "Include",
            usize::MAX,
            iksom::XopDecoder::new(store),
        )
        .unwrap();
    let data = reparsed.root_element().unwrap().unwrap();
    let text = reparsed.first_child(data).unwrap().unwrap();
    assert_eq!(reparsed.binary(text), Some(&large[..]));
}

#[test]
fn small_binary_is_inlined() {
    let config = OutputConfig::new().with_optimize(true).with_threshold(1024);
    let mut store = AttachmentStore::new();
    let mut source = EventList::new()
        .start_element(QName::new("data"))
        .binary(b"0123456789")
        .end_element();
    let xml = write_with(&config, &mut store, &mut source);
    assert_eq!(xml, "<data>MDEyMzQ1Njc4OQ==</data>");
    assert!(store.is_empty());
}

#[test]
fn binary_from_tree() {
    let mut doc = Document::new();
    let root = doc.create_element(QName::new("data"));
    doc.add_child(doc.document_node(), root).unwrap();
    let kept = doc.create_binary(vec![1u8; 8], false);
    let sent = doc.create_binary(vec![2u8; 8], true);
    doc.add_child(root, kept).unwrap();
    doc.add_child(root, sent).unwrap();

    let config = OutputConfig::new().with_optimize(true);
    let mut store = AttachmentStore::new();
    let mut writer = XmlWriter::new(Vec::new());
    Serializer::new(&config)
        .with_attachments(&mut store)
        .serialize_node(&mut doc, root, &mut writer)
        .unwrap();
    let xml = writer.into_string().unwrap();
    assert!(xml.starts_with("<data>AQEBAQEBAQE=<xop:Include "), "{xml}");
    let content_id = store.content_ids().next().unwrap().to_string();
    assert!(xml.contains(&format!("href=\"cid:{content_id}\"")));
    assert_eq!(store.get(&content_id), Some(&[2u8; 8][..]));
}

#[test]
fn lazy_build_equivalence() {
    let mut built = Document::from_text(MESSAGE);
    built.build_all().unwrap();
    let from_tree = built.to_xml_string(built.document_node()).unwrap();

    let config = OutputConfig::new();
    let mut writer = XmlWriter::new(Vec::new());
    Serializer::new(&config)
        .serialize(
            &mut XmlReaderSource::from_text(MESSAGE),
            &mut writer,
            StartMode::Advance,
        )
        .unwrap();
    assert_eq!(writer.into_string().unwrap(), from_tree);

    let mut partial = Document::from_text(MESSAGE);
    let envelope = partial.root_element().unwrap().unwrap();
    let header = partial.first_child(envelope).unwrap().unwrap();
    partial.first_child(header).unwrap();
    let mut writer = XmlWriter::new(Vec::new());
    partial
        .serialize_and_consume(envelope, &mut writer, &config)
        .unwrap();
    let consumed = writer.into_string().unwrap();
    let root = built.root_element().unwrap().unwrap();
    assert_eq!(consumed, built.to_xml_string(root).unwrap());
}

#[test]
fn recorded_events_rebuild_the_tree() {
    let mut doc = Document::from_text(MESSAGE);
    let mut recorder = EventRecorder::new();
    doc.serialize(doc.document_node(), &mut recorder, &OutputConfig::new())
        .unwrap();
    let mut copy = Document::from_source(recorder.into_source());
    assert_eq!(
        copy.to_xml_string(copy.document_node()).unwrap(),
        doc.to_xml_string(doc.document_node()).unwrap()
    );
}

#[test]
fn document_order_survives_reparse() {
    let mut doc = Document::from_text("<r><b/><d/></r>");
    let r = doc.root_element().unwrap().unwrap();
    let b = doc.first_child(r).unwrap().unwrap();
    let d = doc.next_sibling(b).unwrap().unwrap();
    let a = doc.create_element(QName::new("a"));
    let c = doc.create_element(QName::new("c"));
    let e = doc.create_element(QName::new("e"));
    doc.insert_before(b, a).unwrap();
    doc.insert_after(b, c).unwrap();
    doc.insert_after(d, e).unwrap();

    let xml = doc.to_xml_string(r).unwrap();
    let mut reparsed = Document::from_text(&xml);
    let root = reparsed.root_element().unwrap().unwrap();
    let children: Vec<NodeId> = reparsed.children(root).collect::<Result<_, _>>().unwrap();
    let names: Vec<String> = children
        .iter()
        .map(|child| local_name(&reparsed, *child))
        .collect();
    assert_eq!(names, ["a", "b", "c", "d", "e"]);
}

#[test]
fn namespace_reconciliation_is_idempotent() {
    let mut doc = Document::new();
    let root = doc.create_element(QName::with_prefix("urn:a", "a", "root"));
    doc.add_child(doc.document_node(), root).unwrap();
    doc.set_attribute(root, QName::with_namespace("urn:b", "x"), "1")
        .unwrap();
    let child = doc.create_element(QName::with_namespace("urn:c", "child"));
    doc.add_child(root, child).unwrap();
    doc.set_attribute(child, QName::with_prefix("urn:d", "a", "y"), "2")
        .unwrap();
    doc.set_attribute(child, QName::with_namespace("urn:b", "z"), "3")
        .unwrap();

    let first = doc.to_xml_string(root).unwrap();
    let second = doc.to_xml_string(root).unwrap();
    assert_eq!(first, second);

    let mut expected = Vec::new();
    resolved_names(&mut doc, root, &mut expected);
    for xml in [first, second] {
        let mut reparsed = Document::from_text(&xml);
        let root = reparsed.root_element().unwrap().unwrap();
        let mut names = Vec::new();
        resolved_names(&mut reparsed, root, &mut names);
        assert_eq!(names, expected);
    }
}

#[test]
fn completeness_is_monotonic() {
    let mut doc = Document::from_text("<a><b><c/></b><d/></a>");
    let a = doc.root_element().unwrap().unwrap();
    let b = doc.first_child(a).unwrap().unwrap();
    doc.build(b).unwrap();
    assert!(doc.is_complete(b));

    let moved = doc.create_element(QName::new("m"));
    doc.add_child(b, moved).unwrap();
    doc.detach(moved).unwrap();
    let c = doc.first_child(b).unwrap().unwrap();
    doc.detach(c).unwrap();
    doc.add_child(a, c).unwrap();
    assert!(doc.is_complete(b));
    assert!(doc.is_complete(a));
    assert_eq!(doc.to_xml_string(a).unwrap(), "<a><b/><d/><c/></a>");
}

#[test]
fn caching_cannot_return_after_raw_access() {
    let mut doc = Document::from_text("<a><b/><c/></a>");
    let a = doc.root_element().unwrap().unwrap();
    doc.raw_source().unwrap();
    assert!(doc.set_caching(true).unwrap_err().is_illegal_state());
    assert!(doc.first_child(a).unwrap_err().is_illegal_state());
    assert!(!doc.is_caching());
}
