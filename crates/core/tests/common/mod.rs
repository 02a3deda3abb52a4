#![allow(dead_code)]

use folio_core::{Dictionary, Document, Name, Node, ObjectId, Stream, WriterConfig};

pub const IM1: &[u8] = b"\x00\x10\x20\x30 first image samples \x40\x50\x60\x70";
pub const IM2: &[u8] = b"second image samples, a little longer than the first one";

pub fn dict<const N: usize>(entries: [(&str, Node); N]) -> Dictionary {
    entries
        .into_iter()
        .map(|(key, value)| (Name::new(key), value))
        .collect()
}

/// One page showing two images that share an indirect `/FlateDecode` filter.
pub struct SharedFilterPage {
    pub doc: Document,
    pub catalog: ObjectId,
    pub pages: ObjectId,
    pub page: ObjectId,
    pub filter: ObjectId,
    pub im1: ObjectId,
    pub im2: ObjectId,
}

pub fn shared_filter_page(config: WriterConfig, filter_in_catalog: bool) -> SharedFilterPage {
    let mut doc = Document::with_config(Vec::new(), config);
    let filter = doc.add(Node::name("FlateDecode")).unwrap();

    let image = |data: &[u8]| {
        Stream::from_data(
            dict([
                ("Type", Node::name("XObject")),
                ("Subtype", Node::name("Image")),
                ("Filter", Node::from(filter)),
            ]),
            data.to_vec(),
        )
    };
    let im1 = doc.add(image(IM1)).unwrap();
    let im2 = doc.add(image(IM2)).unwrap();

    let xobjects = dict([("Im1", Node::from(im1)), ("Im2", Node::from(im2))]);
    let page = doc
        .add(dict([
            ("Type", Node::name("Page")),
            ("MediaBox", Node::Array(vec![0.into(), 0.into(), 200.into(), 200.into()])),
            ("Resources", Node::from(dict([("XObject", Node::from(xobjects))]))),
        ]))
        .unwrap();
    let pages = doc
        .add(dict([
            ("Type", Node::name("Pages")),
            ("Kids", Node::Array(vec![Node::from(page)])),
            ("Count", Node::from(1)),
        ]))
        .unwrap();
    doc.put(page, "Parent", pages).unwrap();

    let catalog = if filter_in_catalog {
        dict([
            ("Type", Node::name("Catalog")),
            ("Filter", Node::from(filter)),
            ("Pages", Node::from(pages)),
        ])
    } else {
        dict([("Type", Node::name("Catalog")), ("Pages", Node::from(pages))])
    };
    let catalog = doc.add(catalog).unwrap();
    doc.set_root(catalog).unwrap();

    SharedFilterPage {
        doc,
        catalog,
        pages,
        page,
        filter,
        im1,
        im2,
    }
}

/// Classic single-section file with one empty content stream per page.
pub fn build_minimal_pdf_with_pages(page_count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    let mut push_obj = |buf: &mut Vec<u8>, obj: String| {
        offsets.push(buf.len());
        buf.extend_from_slice(obj.as_bytes());
    };

    push_obj(
        &mut out,
        "1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_string(),
    );
    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", 3 + i))
        .collect::<Vec<_>>()
        .join(" ");
    push_obj(
        &mut out,
        format!("2 0 obj\n<< /Type /Pages /Kids [{kids}] /Count {page_count} >>\nendobj\n"),
    );
    for i in 0..page_count {
        push_obj(
            &mut out,
            format!(
                "{} 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Contents {} 0 R >>\nendobj\n",
                3 + i,
                3 + page_count + i
            ),
        );
    }
    for i in 0..page_count {
        push_obj(
            &mut out,
            format!(
                "{} 0 obj\n<< /Length 0 >>\nstream\n\nendstream\nendobj\n",
                3 + page_count + i
            ),
        );
    }

    let xref_pos = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", offsets.len() + 1).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_pos}\n%%EOF\n",
            offsets.len() + 1
        )
        .as_bytes(),
    );
    out
}

/// Number of `n g obj` headers for `id` in written output.
pub fn count_object_headers(output: &[u8], id: ObjectId) -> usize {
    let header = format!("\n{} {} obj", id.number, id.generation);
    output
        .windows(header.len())
        .filter(|w| *w == header.as_bytes())
        .count()
}
