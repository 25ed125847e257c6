use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jsonfy_dom::html::parse_document;
use jsonfy_dom::{serializer, Scanner};

/// A form-heavy page with a few hundred interactive elements
fn synthetic_page(sections: usize) -> String {
    let mut page = String::from("<!DOCTYPE html><html><head><title>Bench</title></head><body>");
    for i in 0..sections {
        page.push_str(&format!(
            r##"<section id="s{i}"><h2>Section {i}</h2>
            <p>Some text with a <a href="/item/{i}">link</a> inside.</p>
            <form><label for="q{i}">Query</label><input id="q{i}" placeholder="Search">
            <select><option>One</option><option selected>Two</option></select>
            <button type="submit">Go</button></form>
            <div role="tab" tabindex="0">Tab {i}</div><div><div><span></span></div></div>
            <script>var x{i} = {i};</script></section>"##
        ));
    }
    page.push_str("</body></html>");
    page
}

fn bench_pipeline(c: &mut Criterion) {
    let page = synthetic_page(200);

    c.bench_function("parse_document", |b| {
        b.iter(|| parse_document(black_box(&page), None))
    });

    let arena = parse_document(&page, None);
    let scanner = Scanner::new();
    c.bench_function("scan", |b| {
        b.iter(|| {
            let mut working = arena.clone();
            scanner.scan(black_box(&mut working))
        })
    });

    let document = arena.root_id().unwrap_or_default();
    c.bench_function("serialize_body", |b| {
        b.iter(|| serializer::serialize_body(black_box(&arena), document))
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
