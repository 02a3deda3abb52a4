//! Written output: header, cross-reference forms, containers, encryption and
//! update modes.

mod common;

use common::{IM1, IM2, build_minimal_pdf_with_pages, count_object_headers, dict, shared_filter_page};
use folio_core::parser::SourceEntry;
use folio_core::{
    Document, FlushEvent, Node, ObjectId, Rc4ObjectCipher, ReaderConfig, Stream, WriterConfig,
    XrefForm,
};
use std::sync::Arc;

const CONTENT: &[u8] = b"BT /F1 12 Tf 72 712 Td (Hello, folio) Tj ET\n\
BT /F1 12 Tf 72 698 Td (Hello, folio) Tj ET\n\
BT /F1 12 Tf 72 684 Td (Hello, folio) Tj ET\n";

fn startxref_of(output: &[u8]) -> usize {
    let keyword = b"startxref\n";
    let pos = output
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .expect("startxref present");
    let digits: String = output[pos + keyword.len()..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| b as char)
        .collect();
    digits.parse().unwrap()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

/// Single page whose content stream gets a Flate filter at flush.
fn document_with_content(config: WriterConfig) -> (Vec<u8>, ObjectId) {
    let mut doc = Document::with_config(Vec::new(), config);
    let content = doc.add(Stream::from_data(dict([]), CONTENT.to_vec())).unwrap();
    let catalog = doc
        .add(dict([("Type", Node::name("Catalog")), ("Content", Node::from(content))]))
        .unwrap();
    doc.set_root(catalog).unwrap();
    (doc.finish().unwrap(), content)
}

#[test]
fn test_header_and_classic_table() {
    let (output, _) = document_with_content(WriterConfig::default());
    assert!(output.starts_with(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n"));
    assert!(output.ends_with(b"%%EOF\n"));

    let xref = startxref_of(&output);
    assert!(output[xref..].starts_with(b"xref\n0 3\n0000000000 65535 f \n"));
    assert!(contains(&output, b"trailer\n<</Size 3/Root 2 0 R/ID ["));
}

#[test]
fn test_version_is_configurable() {
    let (output, _) = document_with_content(WriterConfig::default().with_version("2.0"));
    assert!(output.starts_with(b"%PDF-2.0\n"));
}

#[test]
fn test_new_streams_get_flate_unless_level_is_zero() {
    let (output, content) = document_with_content(WriterConfig::default());
    let mut reopened = Document::open(output).unwrap();
    let stream = reopened.get(content).and_then(Node::as_stream).unwrap();
    assert_eq!(stream.dict.get_name("Filter"), Some("FlateDecode"));
    assert!(stream.raw().len() < CONTENT.len());
    assert_eq!(reopened.decode_stream(content).unwrap(), CONTENT);

    let (output, content) = document_with_content(WriterConfig::default().with_compression_level(0));
    let reopened = Document::open(output).unwrap();
    let stream = reopened.get(content).and_then(Node::as_stream).unwrap();
    assert!(!stream.dict.contains_key("Filter"));
    assert_eq!(stream.raw(), CONTENT);
    assert_eq!(stream.dict.get_i64("Length"), Some(CONTENT.len() as i64));
}

#[test]
fn test_append_survives_every_compression_level() {
    let (base, content) = document_with_content(WriterConfig::default());
    for level in [0, 1, 9, -1] {
        let mut doc = Document::open_for_update(
            base.clone(),
            Vec::new(),
            ReaderConfig::default(),
            WriterConfig::default().with_compression_level(level),
        )
        .unwrap();
        doc.append_stream_data(content, b"BT (appended) Tj ET\n").unwrap();
        let output = doc.finish().unwrap();

        let mut reopened = Document::open(output).unwrap();
        let mut expected = CONTENT.to_vec();
        expected.extend_from_slice(b"BT (appended) Tj ET\n");
        assert_eq!(reopened.decode_stream(content).unwrap(), expected, "level {level}");
        let dict = reopened.get(content).and_then(Node::as_dict).unwrap();
        assert_eq!(dict.get_name("Filter"), Some("FlateDecode"), "level {level}");
    }
}

#[test]
fn test_per_stream_level_recompresses_existing_payload() {
    let (base, content) = document_with_content(WriterConfig::default());
    let mut doc =
        Document::open_for_update(base, Vec::new(), ReaderConfig::default(), WriterConfig::default())
            .unwrap();
    doc.set_compression_level(content, Some(0)).unwrap();
    let output = doc.finish().unwrap();

    let mut reopened = Document::open(output).unwrap();
    let stored = reopened.get(content).and_then(Node::as_stream).unwrap().raw().len();
    assert!(stored > CONTENT.len());
    assert_eq!(reopened.decode_stream(content).unwrap(), CONTENT);
}

#[test]
fn test_xref_stream_form() {
    let mut fixture = shared_filter_page(WriterConfig::default().with_xref_form(XrefForm::Stream), true);
    fixture.doc.close().unwrap();
    let output = fixture.doc.into_inner().unwrap();

    assert!(!contains(&output, b"trailer"));
    assert!(contains(&output, b"/Type /XRef"));
    let mut reopened = Document::open(output).unwrap();
    assert_eq!(reopened.root(), Some(fixture.catalog));
    assert_eq!(reopened.decode_stream(fixture.im2).unwrap(), IM2);
}

#[test]
fn test_object_containers() {
    let config = WriterConfig::default()
        .with_object_streams(true)
        .with_container_capacity(2);
    let mut fixture = shared_filter_page(config, true);
    fixture.doc.close().unwrap();
    assert_eq!(
        fixture
            .doc
            .events()
            .iter()
            .filter(|e| matches!(e, FlushEvent::DependencyAlreadyFlushed { .. }))
            .count(),
        2
    );
    let output = fixture.doc.into_inner().unwrap();

    // Catalog, filter, pages and page: two full containers.
    assert_eq!(count(&output, b"/Type /ObjStm"), 2);
    assert_eq!(count_object_headers(&output, fixture.catalog), 0);
    assert_eq!(count_object_headers(&output, fixture.im1), 1);

    let mut reopened = Document::open(output).unwrap();
    let source = reopened.registry().source().unwrap();
    assert!(matches!(
        source.entry(fixture.catalog.number),
        Some(SourceEntry::InContainer { .. })
    ));
    let pages = reopened.get(fixture.pages).and_then(Node::as_dict).unwrap();
    assert_eq!(pages.get_i64("Count"), Some(1));
    assert_eq!(reopened.decode_stream(fixture.im1).unwrap(), IM1);
}

fn cipher() -> Arc<Rc4ObjectCipher> {
    let encrypt = dict([
        ("Filter", Node::name("Standard")),
        ("V", Node::from(2)),
        ("R", Node::from(3)),
        ("Length", Node::from(128)),
    ]);
    Arc::new(
        Rc4ObjectCipher::new(b"0123456789abcdef".to_vec())
            .unwrap()
            .with_dictionary(encrypt),
    )
}

#[test]
fn test_encryption_is_keyed_by_object() {
    let mut doc = Document::with_config(Vec::new(), WriterConfig::default().with_encryption(cipher()));
    let a = doc.add(dict([("Note", Node::string(b"secret".to_vec()))])).unwrap();
    let b = doc.add(dict([("Note", Node::string(b"secret".to_vec()))])).unwrap();
    let content = doc.add(Stream::from_data(dict([]), CONTENT.to_vec())).unwrap();
    let catalog = doc
        .add(dict([
            ("Type", Node::name("Catalog")),
            ("A", Node::from(a)),
            ("B", Node::from(b)),
            ("Content", Node::from(content)),
        ]))
        .unwrap();
    doc.set_root(catalog).unwrap();
    let encrypt = doc.trailer().get_reference("Encrypt").unwrap();
    let output = doc.finish().unwrap();
    assert!(!contains(&output, b"secret"));

    let plain = Document::open(output.clone()).unwrap();
    let note = |doc: &Document, id| doc.get(id).and_then(Node::as_dict).and_then(|d| d.get_bytes("Note")).map(<[u8]>::to_vec);
    assert_ne!(note(&plain, a), note(&plain, b));
    assert_ne!(note(&plain, a).as_deref(), Some(&b"secret"[..]));
    let encrypt_dict = plain.get(encrypt).and_then(Node::as_dict).unwrap();
    assert_eq!(encrypt_dict.get_name("Filter"), Some("Standard"));

    let mut decrypted =
        Document::open_with(output, ReaderConfig::default().with_decryption(cipher())).unwrap();
    assert_eq!(note(&decrypted, a).as_deref(), Some(&b"secret"[..]));
    assert_eq!(note(&decrypted, b).as_deref(), Some(&b"secret"[..]));
    assert_eq!(decrypted.decode_stream(content).unwrap(), CONTENT);
}

#[test]
fn test_incremental_update_appends_a_section() {
    let base = build_minimal_pdf_with_pages(1);
    let base_xref = startxref_of(&base);
    let page = ObjectId::new(3, 0);

    let mut doc = Document::open_for_update(
        base.clone(),
        Vec::new(),
        ReaderConfig::default(),
        WriterConfig::default().with_incremental(true),
    )
    .unwrap();
    doc.put(page, "Rotate", 90).unwrap();
    let annot = doc.add(dict([("Type", Node::name("Annot"))])).unwrap();
    assert_eq!(annot, ObjectId::new(5, 0));
    doc.put(page, "Annots", Node::Array(vec![Node::from(annot)])).unwrap();
    let output = doc.finish().unwrap();

    assert!(output.starts_with(&base));
    let update = &output[base.len() - 1..];
    assert_eq!(count_object_headers(update, page), 1);
    assert_eq!(count_object_headers(update, ObjectId::new(1, 0)), 0);
    assert_eq!(count_object_headers(update, ObjectId::new(4, 0)), 0);
    assert!(contains(update, format!("/Prev {base_xref}").as_bytes()));

    let reopened = Document::open(output).unwrap();
    let page_dict = reopened.get(page).and_then(Node::as_dict).unwrap();
    assert_eq!(page_dict.get_i64("Rotate"), Some(90));
    assert_eq!(page_dict.get_array("Annots"), Some(&[Node::from(annot)][..]));
    assert!(reopened.get(annot).is_some());
    assert!(reopened.get(ObjectId::new(4, 0)).is_some());
    assert_eq!(reopened.root(), Some(ObjectId::new(1, 0)));
}

#[test]
fn test_freed_numbers_are_listed_and_reused() {
    let mut doc = Document::new(Vec::new());
    let scratch = doc.add(dict([("Scratch", Node::from(true))])).unwrap();
    let catalog = doc.add(dict([("Type", Node::name("Catalog"))])).unwrap();
    doc.set_root(catalog).unwrap();
    doc.delete(scratch).unwrap();
    let output = doc.finish().unwrap();

    let xref = startxref_of(&output);
    assert!(output[xref..].starts_with(
        b"xref\n0 3\n0000000001 65535 f \n0000000000 00001 f \n"
    ));

    let mut updated =
        Document::open_for_update(output, Vec::new(), ReaderConfig::default(), WriterConfig::default())
            .unwrap();
    let reused = updated.add(Node::from(7)).unwrap();
    assert_eq!(reused, ObjectId::new(scratch.number, 1));
}

#[test]
fn test_containers_never_take_freed_numbers() {
    let mut doc = Document::with_config(Vec::new(), WriterConfig::default().with_object_streams(true));
    let scratch = doc.add(dict([("Scratch", Node::from(true))])).unwrap();
    let catalog = doc.add(dict([("Type", Node::name("Catalog"))])).unwrap();
    doc.set_root(catalog).unwrap();
    doc.delete(scratch).unwrap();
    let output = doc.finish().unwrap();

    assert_eq!(count_object_headers(&output, ObjectId::new(scratch.number, 1)), 0);
    let reopened = Document::open(output).unwrap();
    assert_eq!(reopened.root(), Some(catalog));
    let root = reopened.get(catalog).and_then(Node::as_dict).unwrap();
    assert!(root.has_type("Catalog"));
    assert!(reopened.get(scratch).is_none());
}
