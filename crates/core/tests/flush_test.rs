//! Flush lifecycle: shared filter objects, cascades, duplicates and close.

mod common;

use common::{IM1, IM2, count_object_headers, dict, shared_filter_page};
use folio_core::{
    DependencyCheck, Document, FlushEvent, Node, ObjectId, ObjectState, PdfError, Stream,
    WriterConfig,
};

fn dependency_events(doc: &Document) -> Vec<(ObjectId, ObjectId)> {
    doc.events()
        .iter()
        .filter_map(|event| match *event {
            FlushEvent::DependencyAlreadyFlushed { stream, dependency } => Some((stream, dependency)),
            FlushEvent::AlreadyFlushed { .. } => None,
        })
        .collect()
}

#[test]
fn test_indirect_filter_in_catalog_is_shared_by_both_images() {
    let mut fixture = shared_filter_page(WriterConfig::default(), true);
    fixture.doc.close().unwrap();

    let filter = fixture.filter;
    assert_eq!(
        dependency_events(&fixture.doc),
        vec![(fixture.im1, filter), (fixture.im2, filter)]
    );
    let output = fixture.doc.into_inner().unwrap();
    assert_eq!(count_object_headers(&output, filter), 1);

    let mut reopened = Document::open(output).unwrap();
    assert_eq!(reopened.decode_stream(fixture.im1).unwrap(), IM1);
    assert_eq!(reopened.decode_stream(fixture.im2).unwrap(), IM2);
    let dict = reopened.get(fixture.im1).and_then(Node::as_dict).unwrap();
    assert_eq!(dict.get_reference("Filter"), Some(filter));
}

#[test]
fn test_filter_flushed_before_stream_is_read_fails_close() {
    let mut fixture = shared_filter_page(WriterConfig::default(), false);
    assert!(fixture.doc.get(fixture.im1).is_some());
    fixture.doc.flush(fixture.filter).unwrap();

    let err = fixture.doc.close().unwrap_err();
    let PdfError::FlushedDependencyMismatch { object, dependency } = &err else {
        panic!("expected a dependency mismatch, got {err:?}");
    };
    assert_eq!(*object, fixture.im1);
    assert_eq!(*dependency, fixture.filter);
    assert!(
        err.to_string()
            .contains(&format!("stream {} 0", fixture.im1.number)),
        "{err}"
    );
    assert!(!fixture.doc.is_closed());
}

#[test]
fn test_filter_flushed_after_stream_is_read() {
    let mut fixture = shared_filter_page(WriterConfig::default(), false);
    assert_eq!(fixture.doc.decode_stream(fixture.im1).unwrap(), IM1);
    fixture.doc.flush(fixture.filter).unwrap();
    fixture.doc.close().unwrap();

    // im2 was never read; it relies on the value written while im1 watched it.
    assert_eq!(dependency_events(&fixture.doc).len(), 2);
    let output = fixture.doc.into_inner().unwrap();
    let mut reopened = Document::open(output).unwrap();
    assert_eq!(reopened.decode_stream(fixture.im2).unwrap(), IM2);
}

#[test]
fn test_cascade_from_one_image_then_close() {
    let mut fixture = shared_filter_page(WriterConfig::default(), false);
    fixture.doc.flush(fixture.im1).unwrap();
    assert_eq!(fixture.doc.state(fixture.im1), Some(ObjectState::Flushed));
    assert_eq!(fixture.doc.state(fixture.filter), Some(ObjectState::Flushed));
    assert_eq!(fixture.doc.state(fixture.im2), Some(ObjectState::InUse));

    fixture.doc.close().unwrap();
    assert_eq!(
        dependency_events(&fixture.doc),
        vec![(fixture.im2, fixture.filter)]
    );
    let output = fixture.doc.into_inner().unwrap();
    let mut reopened = Document::open(output).unwrap();
    assert_eq!(reopened.decode_stream(fixture.im1).unwrap(), IM1);
    assert_eq!(reopened.decode_stream(fixture.im2).unwrap(), IM2);
}

#[test]
fn test_filter_changed_after_read_is_a_mismatch() {
    let mut fixture = shared_filter_page(WriterConfig::default(), false);
    fixture.doc.decode_stream(fixture.im1).unwrap();
    fixture
        .doc
        .set(fixture.filter, Node::name("ASCIIHexDecode"))
        .unwrap();
    fixture.doc.flush(fixture.filter).unwrap();

    assert!(matches!(
        fixture.doc.close(),
        Err(PdfError::FlushedDependencyMismatch { object, .. }) if object == fixture.im1
    ));
}

fn predictor_stream(check: DependencyCheck) -> (Document, ObjectId, ObjectId) {
    let mut doc = Document::with_config(Vec::new(), WriterConfig::default().with_dependency_check(check));
    let parms = doc
        .add(dict([("Predictor", Node::from(12)), ("Columns", Node::from(4))]))
        .unwrap();
    let stream = doc
        .add(Stream::from_data(
            dict([
                ("Filter", Node::name("FlateDecode")),
                ("DecodeParms", Node::from(parms)),
            ]),
            (0u8..64).collect(),
        ))
        .unwrap();
    let catalog = doc
        .add(dict([("Type", Node::name("Catalog")), ("Data", Node::from(stream))]))
        .unwrap();
    doc.set_root(catalog).unwrap();

    doc.decode_stream(stream).unwrap();
    // Same entries, different key order.
    doc.set(
        parms,
        dict([("Columns", Node::from(4)), ("Predictor", Node::from(12))]),
    )
    .unwrap();
    doc.flush(parms).unwrap();
    (doc, stream, parms)
}

#[test]
fn test_structural_check_ignores_key_order() {
    let (mut doc, stream, parms) = predictor_stream(DependencyCheck::Structural);
    doc.close().unwrap();
    assert_eq!(dependency_events(&doc), vec![(stream, parms)]);

    let output = doc.into_inner().unwrap();
    let mut reopened = Document::open(output).unwrap();
    assert_eq!(reopened.decode_stream(stream).unwrap(), (0u8..64).collect::<Vec<_>>());
}

#[test]
fn test_exact_check_compares_written_bytes() {
    let (mut doc, stream, parms) = predictor_stream(DependencyCheck::Exact);
    assert!(matches!(
        doc.close(),
        Err(PdfError::FlushedDependencyMismatch { object, dependency })
            if object == stream && dependency == parms
    ));
}

#[test]
fn test_duplicate_flush_is_informational() {
    let mut fixture = shared_filter_page(WriterConfig::default(), false);
    fixture.doc.flush(fixture.page).unwrap();
    fixture.doc.flush(fixture.page).unwrap();
    fixture.doc.flush_value(&Node::from(fixture.page)).unwrap();

    let duplicates = fixture
        .doc
        .events()
        .iter()
        .filter(|e| matches!(e, FlushEvent::AlreadyFlushed { object } if *object == fixture.page))
        .count();
    assert_eq!(duplicates, 2);

    fixture.doc.close().unwrap();
    let output = fixture.doc.into_inner().unwrap();
    assert_eq!(count_object_headers(&output, fixture.page), 1);
}

#[test]
fn test_explicit_flush_does_not_climb_to_parent() {
    let mut fixture = shared_filter_page(WriterConfig::default(), false);
    fixture.doc.flush(fixture.page).unwrap();
    assert_eq!(fixture.doc.state(fixture.page), Some(ObjectState::Flushed));
    assert_eq!(fixture.doc.state(fixture.im1), Some(ObjectState::Flushed));
    assert_eq!(fixture.doc.state(fixture.im2), Some(ObjectState::Flushed));
    assert_eq!(fixture.doc.state(fixture.pages), Some(ObjectState::InUse));
    assert_eq!(fixture.doc.state(fixture.catalog), Some(ObjectState::InUse));
}

#[test]
fn test_mark_for_flush_then_flush_waiting() {
    let mut fixture = shared_filter_page(WriterConfig::default(), false);
    fixture.doc.mark_for_flush(fixture.im2).unwrap();
    fixture.doc.mark_for_flush(fixture.im2).unwrap();
    assert_eq!(fixture.doc.state(fixture.im2), Some(ObjectState::MarkedForFlush));

    fixture.doc.flush_waiting().unwrap();
    assert_eq!(fixture.doc.state(fixture.im2), Some(ObjectState::Flushed));
    assert_eq!(fixture.doc.state(fixture.filter), Some(ObjectState::Flushed));
    assert_eq!(fixture.doc.state(fixture.im1), Some(ObjectState::InUse));

    // Marking a flushed object is a no-op.
    fixture.doc.mark_for_flush(fixture.im2).unwrap();
    fixture.doc.close().unwrap();
}

#[test]
fn test_flushed_objects_are_immutable() {
    let mut fixture = shared_filter_page(WriterConfig::default(), false);
    let page = fixture.page;
    fixture.doc.flush(page).unwrap();

    let doc = &mut fixture.doc;
    assert!(matches!(doc.put(page, "Rotate", 90), Err(PdfError::ObjectAlreadyFlushed(id)) if id == page));
    assert!(matches!(doc.set(page, Node::Null), Err(PdfError::ObjectAlreadyFlushed(_))));
    assert!(matches!(doc.remove(page, "Parent"), Err(PdfError::ObjectAlreadyFlushed(_))));
    assert!(matches!(doc.delete(page), Err(PdfError::ObjectAlreadyFlushed(_))));
    assert!(matches!(
        doc.set_stream_data(fixture.im1, b"late".to_vec()),
        Err(PdfError::ObjectAlreadyFlushed(_))
    ));
    assert!(matches!(doc.fetch(page), Err(PdfError::ObjectAlreadyFlushed(_))));
    assert!(doc.get(page).is_none());
}

#[test]
fn test_closed_document_rejects_everything() {
    let mut fixture = shared_filter_page(WriterConfig::default(), false);
    fixture.doc.close().unwrap();
    let doc = &mut fixture.doc;
    assert!(doc.is_closed());
    assert!(matches!(doc.add(Node::from(1)), Err(PdfError::DocumentClosed)));
    assert!(matches!(doc.flush(fixture.catalog), Err(PdfError::DocumentClosed)));
    assert!(matches!(doc.mark_for_flush(fixture.catalog), Err(PdfError::DocumentClosed)));
    assert!(matches!(doc.set_root(fixture.catalog), Err(PdfError::DocumentClosed)));
    assert!(matches!(doc.close(), Err(PdfError::DocumentClosed)));
}

#[test]
fn test_close_requires_root() {
    let mut doc = Document::new(Vec::new());
    doc.add(dict([("Type", Node::name("Catalog"))])).unwrap();
    assert!(matches!(doc.close(), Err(PdfError::MissingRoot)));
}

#[test]
fn test_flush_value_requires_indirect_object() {
    let mut doc = Document::new(Vec::new());
    assert!(matches!(
        doc.flush_value(&Node::from(3)),
        Err(PdfError::RequiresIndirectObject)
    ));
    assert!(matches!(
        doc.flush(ObjectId::new(9, 0)),
        Err(PdfError::ObjectNotFound(_))
    ));
}

#[test]
fn test_read_only_document_is_not_writable() {
    let mut fixture = shared_filter_page(WriterConfig::default(), false);
    fixture.doc.close().unwrap();
    let output = fixture.doc.into_inner().unwrap();

    let mut reopened = Document::open(output).unwrap();
    assert!(matches!(reopened.flush(fixture.page), Err(PdfError::NotWritable)));
    assert!(matches!(
        reopened.mark_for_flush(fixture.page),
        Err(PdfError::NotWritable)
    ));
    reopened.close().unwrap();
    assert!(reopened.is_closed());
}

#[test]
fn test_unreachable_objects_are_not_written() {
    let mut fixture = shared_filter_page(WriterConfig::default(), false);
    let orphan = fixture.doc.add(dict([("Orphan", Node::from(true))])).unwrap();
    fixture.doc.close().unwrap();
    let output = fixture.doc.into_inner().unwrap();
    assert_eq!(count_object_headers(&output, orphan), 0);

    let reopened = Document::open(output).unwrap();
    assert!(reopened.get(orphan).is_none());
}
