//! pdfcraft: a Rust library for generating PDF 1.7 / 2.0 and PDF-A / PDF-X
//! conformant documents.
//!
//! The document object model lives in [`document`]: a `Generator` that
//! owns every registry (fonts, images, color spaces, patterns, shadings,
//! transparency groups, outlines, structure tree, annotations, optional
//! content groups, embedded files) behind opaque typed handles. Content
//! streams are built through [`draw::DrawContext`], which wraps
//! [`content_stream::ContentStreamFormatter`] for the q/Q, BT/ET and
//! BMC/EMC nesting invariants. [`font`] parses and subsets TrueType/CFF
//! fonts; [`icc`] implements the color-space conversions that back
//! [`color::Color`]. [`writer`] resolves deferred objects and serializes
//! the finished document to PDF bytes.

#![allow(dead_code)]

pub mod annotation;
pub mod bytes;
pub mod color;
pub mod conformance;
pub mod constants;
pub mod content_stream;
pub mod date;
pub mod document;
pub mod draw;
pub mod errors;
pub mod font;
pub mod graphics;
pub mod icc;
pub mod matrix;
pub mod object_formatter;
pub mod text;
pub mod units;
pub mod utils;
pub mod writer;

pub use color::Color;
pub use document::{DocumentProperties, Generator};
pub use draw::{DrawContext, DrawContextKind, XObjectRef};
pub use errors::{Error, Result};
pub use font::ParsedFont;
