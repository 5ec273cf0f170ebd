//! End-to-end smoke test: build a small document through the public
//! `Generator`/`DrawContext` API and confirm `writer::write` produces a
//! well-formed PDF byte stream.

use pdfcraft::color::Color;
use pdfcraft::document::{DocumentProperties, Generator};
use pdfcraft::draw::{DrawContext, DrawContextKind};
use pdfcraft::writer;

#[test]
fn builds_a_one_page_document() {
    let mut generator = Generator::new(DocumentProperties::default()).unwrap();
    let mut page = generator.add_page(None);

    let mut ctx = DrawContext::new(DrawContextKind::Page, false);
    ctx.set_fill_color(Color::DeviceRgb(1.0, 0.0, 0.0)).unwrap();
    ctx.re(10.0, 10.0, 100.0, 50.0);
    ctx.fill();

    page.content = ctx.serialize(&mut generator).unwrap();
    page.absorb_resources(&ctx);
    generator.commit_page(page);

    let bytes = writer::write(&mut generator).unwrap();
    let text = String::from_utf8_lossy(&bytes);

    assert!(text.starts_with("%PDF-"));
    assert!(text.contains("/Type /Catalog"));
    assert!(text.contains("/Type /Page"));
    assert!(text.contains("xref"));
    assert!(text.trim_end().ends_with("%%EOF"));
}

#[test]
fn writing_twice_is_rejected() {
    let mut generator = Generator::new(DocumentProperties::default()).unwrap();
    let page = generator.add_page(None);
    generator.commit_page(page);

    writer::write(&mut generator).unwrap();
    assert!(writer::write(&mut generator).is_err());
}

#[test]
fn empty_document_still_produces_a_valid_trailer() {
    let mut generator = Generator::new(DocumentProperties::default()).unwrap();
    let bytes = writer::write(&mut generator).unwrap();
    let text = String::from_utf8_lossy(&bytes);

    assert!(text.contains("trailer"));
    assert!(text.contains("/Root"));
    assert!(text.contains("startxref"));
}
