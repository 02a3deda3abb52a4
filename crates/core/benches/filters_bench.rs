//! Benchmarks for stream encoding and document output.
//!
//! Benchmark groups:
//! - `filters_encode`: chain encoding throughput per filter
//! - `filters_decode`: chain decoding throughput per filter
//! - `document_close`: building and closing a many-page document

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use folio_core::{
    Dictionary, Document, FilterChain, FilterKind, FilterStage, Name, Node, Stream, WriterConfig,
};

/// Content-stream shaped payload of roughly `len` bytes.
fn content_payload(len: usize) -> Vec<u8> {
    let line = b"BT /F1 12 Tf 72 712 Td (The quick brown fox) Tj ET 0.5 0 0 rg\n";
    line.iter().copied().cycle().take(len).collect()
}

fn chains() -> Vec<(&'static str, FilterChain)> {
    vec![
        ("flate", FilterChain::flate()),
        ("lzw", FilterChain::new().then(FilterStage::new(FilterKind::LzwDecode))),
        ("a85", FilterChain::new().then(FilterStage::new(FilterKind::Ascii85Decode))),
        ("runlength", FilterChain::new().then(FilterStage::new(FilterKind::RunLengthDecode))),
        (
            "flate_ahx",
            FilterChain::flate().then(FilterStage::new(FilterKind::AsciiHexDecode)),
        ),
    ]
}

fn bench_encode(c: &mut Criterion) {
    let payload = content_payload(256 * 1024);
    let mut group = c.benchmark_group("filters_encode");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    for (name, chain) in chains() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &chain, |b, chain| {
            b.iter(|| chain.encode(black_box(&payload), -1).unwrap());
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let payload = content_payload(256 * 1024);
    let mut group = c.benchmark_group("filters_decode");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    for (name, chain) in chains() {
        let encoded = chain.encode(&payload, -1).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &encoded, |b, encoded| {
            b.iter(|| chain.decode(black_box(encoded)).unwrap());
        });
    }
    group.finish();
}

fn page_document(pages: usize, config: WriterConfig) -> Document {
    let mut doc = Document::with_config(Vec::new(), config);
    let filter = doc.add(Node::name("FlateDecode")).unwrap();
    let mut kids = Vec::with_capacity(pages);
    for _ in 0..pages {
        let mut stream_dict = Dictionary::new();
        stream_dict.insert(Name::new("Filter"), filter);
        let content = doc
            .add(Stream::from_data(stream_dict, content_payload(4096)))
            .unwrap();
        let mut page = Dictionary::new();
        page.insert("Type", Node::name("Page"));
        page.insert("Contents", content);
        kids.push(Node::from(doc.add(page).unwrap()));
    }
    let mut tree = Dictionary::new();
    tree.insert("Type", Node::name("Pages"));
    tree.insert("Count", pages);
    tree.insert("Kids", Node::Array(kids));
    let tree = doc.add(tree).unwrap();

    let mut catalog = Dictionary::new();
    catalog.insert("Type", Node::name("Catalog"));
    catalog.insert("Pages", tree);
    let catalog = doc.add(catalog).unwrap();
    doc.set_root(catalog).unwrap();
    doc
}

fn bench_close(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_close");
    group.sample_size(20);
    for (name, config) in [
        ("table", WriterConfig::default()),
        (
            "containers",
            WriterConfig::default().with_object_streams(true),
        ),
    ] {
        group.bench_with_input(BenchmarkId::new(name, 200), &config, |b, config| {
            b.iter(|| page_document(200, config.clone()).finish().unwrap());
        });
    }
    group.finish();
}

criterion_group!(filters_benches, bench_encode, bench_decode, bench_close);
criterion_main!(filters_benches);
