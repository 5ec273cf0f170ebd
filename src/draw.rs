//! Content-stream draw context: the public surface pages, form XObjects,
//! patterns and transparency groups build their appearance streams
//! through. Wraps [`ContentStreamFormatter`] for the q/Q, BT/ET and
//! BMC/EMC nesting invariants, and adds the argument validation and
//! resource bookkeeping the raw operator stream doesn't know about.

use std::collections::{BTreeMap, BTreeSet};

use crate::bytes::format_real;
use crate::color::{Color, DeviceFallback};
use crate::content_stream::ContentStreamFormatter;
use crate::document::{
    AnnotationId, FontId, FormXObjectId, Generator, GraphicsStateId, ImageId, PatternId,
    ShadingId, StructureItemId, TransparencyGroupId,
};
use crate::errors::{Error, Result};
use crate::graphics::{Line, LineCapStyle, LineJoinStyle, PaintMode, Polygon, WindingOrder};
use crate::matrix::CurTransMat;
use crate::text::TextBuilder;

/// What a draw context is building. Mostly informs callers how to wrap
/// the returned stream (page content vs. a self-contained XObject body);
/// `serialize` itself emits the same bare operator stream either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawContextKind {
    Page,
    FormXObject,
    Pattern,
    TransparencyGroup,
}

/// Target of a `Do` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XObjectRef {
    Image(ImageId),
    Form(FormXObjectId),
    TransparencyGroup(TransparencyGroupId),
}

/// A marked-content span, optionally tied to a structure-tree item for
/// tagged PDF.
#[derive(Debug, Clone)]
pub enum MarkedContentTag {
    Tag(String),
    StructureItem(StructureItemId),
}

#[derive(Debug, Clone)]
enum DrawOp {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    CurveTo(f32, f32, f32, f32, f32, f32),
    CurveToV(f32, f32, f32, f32),
    CurveToY(f32, f32, f32, f32),
    Rect(f32, f32, f32, f32),
    ClosePath,
    Transform([f32; 6]),

    Stroke,
    CloseStroke,
    Fill,
    FillEvenOdd,
    FillStroke,
    FillStrokeEvenOdd,
    CloseFillStroke,
    CloseFillStrokeEvenOdd,
    EndPath,

    Clip,
    ClipEvenOdd,

    SaveState,
    RestoreState,
    SetLineWidth(f32),
    SetMiterLimit(f32),
    SetLineJoin(LineJoinStyle),
    SetLineCap(LineCapStyle),
    SetDash(Vec<f32>, f32),
    SetFlatness(f32),
    ApplyExtGState(GraphicsStateId),

    SetFillColor(Color),
    SetStrokeColor(Color),

    PaintShading(ShadingId),
    PaintXObject(XObjectRef),

    Text(FontId, TextBuilder),

    BeginMarkedContent(MarkedContentTag),
    EndMarkedContent,
}

#[derive(Default)]
struct ResourceUsage {
    fonts: BTreeSet<usize>,
    images: BTreeSet<usize>,
    graphics_states: BTreeSet<usize>,
    patterns: BTreeSet<usize>,
    shadings: BTreeSet<usize>,
    forms: BTreeSet<usize>,
    transparency_groups: BTreeSet<usize>,
    lab_colorspaces: BTreeSet<usize>,
    icc_colorspaces: BTreeSet<usize>,
    separations: BTreeMap<String, DeviceFallback>,
    annotations: Vec<AnnotationId>,
}

/// A single page's, form XObject's, pattern's or transparency group's
/// appearance stream under construction.
pub struct DrawContext {
    kind: DrawContextKind,
    ops: Vec<DrawOp>,
    resources: ResourceUsage,
    has_cmyk_profile: bool,
}

fn f(v: f32) -> String {
    format_real(v as f64)
}

pub(crate) fn sanitize_separation_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

impl DrawContext {
    pub fn new(kind: DrawContextKind, has_cmyk_profile: bool) -> Self {
        DrawContext { kind, ops: Vec::new(), resources: ResourceUsage::default(), has_cmyk_profile }
    }

    pub fn kind(&self) -> DrawContextKind {
        self.kind
    }

    fn check_cmyk(&self, color: &Color) -> Result<()> {
        if matches!(color, Color::DeviceCmyk(_)) && !self.has_cmyk_profile {
            return Err(Error::NoCmykProfile);
        }
        Ok(())
    }

    // --- path construction -------------------------------------------

    pub fn m(&mut self, x: f32, y: f32) -> &mut Self {
        self.ops.push(DrawOp::MoveTo(x, y));
        self
    }

    pub fn l(&mut self, x: f32, y: f32) -> &mut Self {
        self.ops.push(DrawOp::LineTo(x, y));
        self
    }

    pub fn c(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32) -> &mut Self {
        self.ops.push(DrawOp::CurveTo(x1, y1, x2, y2, x3, y3));
        self
    }

    pub fn v(&mut self, x2: f32, y2: f32, x3: f32, y3: f32) -> &mut Self {
        self.ops.push(DrawOp::CurveToV(x2, y2, x3, y3));
        self
    }

    pub fn y(&mut self, x1: f32, y1: f32, x3: f32, y3: f32) -> &mut Self {
        self.ops.push(DrawOp::CurveToY(x1, y1, x3, y3));
        self
    }

    pub fn re(&mut self, x: f32, y: f32, width: f32, height: f32) -> &mut Self {
        self.ops.push(DrawOp::Rect(x, y, width, height));
        self
    }

    pub fn h(&mut self) -> &mut Self {
        self.ops.push(DrawOp::ClosePath);
        self
    }

    pub fn cm(&mut self, matrix: CurTransMat) -> &mut Self {
        self.ops.push(DrawOp::Transform(matrix.as_array()));
        self
    }

    pub fn scale(&mut self, sx: f32, sy: f32) -> &mut Self {
        self.cm(CurTransMat::Scale(sx, sy))
    }

    pub fn translate(&mut self, x: f32, y: f32) -> &mut Self {
        self.cm(CurTransMat::Translate(crate::units::Pt(x), crate::units::Pt(y)))
    }

    pub fn rotate(&mut self, angle_rad: f32) -> &mut Self {
        self.cm(CurTransMat::Rotate(angle_rad.to_degrees()))
    }

    // --- painting ------------------------------------------------------

    pub fn stroke(&mut self) -> &mut Self {
        self.ops.push(DrawOp::Stroke);
        self
    }

    pub fn close_stroke(&mut self) -> &mut Self {
        self.ops.push(DrawOp::CloseStroke);
        self
    }

    pub fn fill(&mut self) -> &mut Self {
        self.ops.push(DrawOp::Fill);
        self
    }

    pub fn fill_even_odd(&mut self) -> &mut Self {
        self.ops.push(DrawOp::FillEvenOdd);
        self
    }

    pub fn fill_stroke(&mut self) -> &mut Self {
        self.ops.push(DrawOp::FillStroke);
        self
    }

    pub fn fill_stroke_even_odd(&mut self) -> &mut Self {
        self.ops.push(DrawOp::FillStrokeEvenOdd);
        self
    }

    pub fn close_fill_stroke(&mut self) -> &mut Self {
        self.ops.push(DrawOp::CloseFillStroke);
        self
    }

    pub fn close_fill_stroke_even_odd(&mut self) -> &mut Self {
        self.ops.push(DrawOp::CloseFillStrokeEvenOdd);
        self
    }

    pub fn end_path(&mut self) -> &mut Self {
        self.ops.push(DrawOp::EndPath);
        self
    }

    // --- clipping --------------------------------------------------------

    pub fn clip(&mut self) -> &mut Self {
        self.ops.push(DrawOp::Clip);
        self
    }

    pub fn clip_even_odd(&mut self) -> &mut Self {
        self.ops.push(DrawOp::ClipEvenOdd);
        self
    }

    // --- graphics state --------------------------------------------------

    pub fn save_state(&mut self) -> &mut Self {
        self.ops.push(DrawOp::SaveState);
        self
    }

    pub fn restore_state(&mut self) -> &mut Self {
        self.ops.push(DrawOp::RestoreState);
        self
    }

    pub fn set_line_width(&mut self, width: f32) -> Result<&mut Self> {
        if width < 0.0 {
            return Err(Error::dynamic(format!("negative line width: {width}")));
        }
        self.ops.push(DrawOp::SetLineWidth(width));
        Ok(self)
    }

    pub fn set_miter_limit(&mut self, limit: f32) -> &mut Self {
        self.ops.push(DrawOp::SetMiterLimit(limit));
        self
    }

    pub fn set_line_join(&mut self, join: LineJoinStyle) -> &mut Self {
        self.ops.push(DrawOp::SetLineJoin(join));
        self
    }

    pub fn set_line_cap(&mut self, cap: LineCapStyle) -> &mut Self {
        self.ops.push(DrawOp::SetLineCap(cap));
        self
    }

    pub fn set_dash(&mut self, pattern: Vec<f32>, phase: f32) -> Result<&mut Self> {
        if pattern.iter().any(|v| *v < 0.0) {
            return Err(Error::dynamic("dash pattern entries must be non-negative"));
        }
        self.ops.push(DrawOp::SetDash(pattern, phase));
        Ok(self)
    }

    pub fn set_flatness(&mut self, flatness: f32) -> Result<&mut Self> {
        if !(0.0..=100.0).contains(&flatness) {
            return Err(Error::dynamic(format!("flatness out of range [0, 100]: {flatness}")));
        }
        self.ops.push(DrawOp::SetFlatness(flatness));
        Ok(self)
    }

    pub fn apply_graphics_state(&mut self, state: GraphicsStateId) -> &mut Self {
        self.resources.graphics_states.insert(state.index());
        self.ops.push(DrawOp::ApplyExtGState(state));
        self
    }

    // --- color -----------------------------------------------------------

    pub fn set_fill_color(&mut self, color: Color) -> Result<&mut Self> {
        self.check_cmyk(&color)?;
        self.track_color_resource(&color);
        self.ops.push(DrawOp::SetFillColor(color));
        Ok(self)
    }

    pub fn set_stroke_color(&mut self, color: Color) -> Result<&mut Self> {
        self.check_cmyk(&color)?;
        self.track_color_resource(&color);
        self.ops.push(DrawOp::SetStrokeColor(color));
        Ok(self)
    }

    fn track_color_resource(&mut self, color: &Color) {
        match color {
            Color::Lab(id, ..) => {
                self.resources.lab_colorspaces.insert(id.index());
            }
            Color::Icc(id, ..) => {
                self.resources.icc_colorspaces.insert(id.index());
            }
            Color::Separation(sep) => {
                self.resources
                    .separations
                    .insert(sanitize_separation_name(&sep.name), sep.fallback);
            }
            Color::Pattern(id) => {
                self.resources.patterns.insert(id.index());
            }
            _ => {}
        }
    }

    // --- shading / patterns -----------------------------------------------

    pub fn paint_shading(&mut self, shading: ShadingId) -> &mut Self {
        self.resources.shadings.insert(shading.index());
        self.ops.push(DrawOp::PaintShading(shading));
        self
    }

    // --- images / xobjects -------------------------------------------------

    pub fn use_xobject(&mut self, xobj: XObjectRef, transform: CurTransMat) -> &mut Self {
        match xobj {
            XObjectRef::Image(id) => {
                self.resources.images.insert(id.index());
            }
            XObjectRef::Form(id) => {
                self.resources.forms.insert(id.index());
            }
            XObjectRef::TransparencyGroup(id) => {
                self.resources.transparency_groups.insert(id.index());
            }
        }
        self.ops.push(DrawOp::SaveState);
        self.ops.push(DrawOp::Transform(transform.as_array()));
        self.ops.push(DrawOp::PaintXObject(xobj));
        self.ops.push(DrawOp::RestoreState);
        self
    }

    // --- text --------------------------------------------------------------

    /// Opens a text object, lets `build` populate a [`TextBuilder`] against
    /// `font`, then closes it. Glyph subsetting and width lookups for this
    /// span are resolved against `font` at [`serialize`](Self::serialize)
    /// time.
    pub fn text(&mut self, font: FontId, build: impl FnOnce(&mut TextBuilder)) -> &mut Self {
        self.resources.fonts.insert(font.index());
        let mut builder = TextBuilder::new();
        build(&mut builder);
        self.ops.push(DrawOp::Text(font, builder));
        self
    }

    // --- marked content ------------------------------------------------------

    pub fn begin_marked_content(&mut self, tag: impl Into<String>) -> &mut Self {
        self.ops.push(DrawOp::BeginMarkedContent(MarkedContentTag::Tag(tag.into())));
        self
    }

    pub fn begin_marked_content_structure(&mut self, item: StructureItemId) -> &mut Self {
        self.ops.push(DrawOp::BeginMarkedContent(MarkedContentTag::StructureItem(item)));
        self
    }

    pub fn end_marked_content(&mut self) -> &mut Self {
        self.ops.push(DrawOp::EndMarkedContent);
        self
    }

    // --- annotations / widgets -------------------------------------------------

    /// Records that the page (or form) this context belongs to references
    /// `annotation`. Reuse is enforced by the document generator's
    /// annotation registry once this context's resources are drained into
    /// a page via [`Generator::use_annotation_on_page`].
    pub fn annotate(&mut self, annotation: AnnotationId) -> &mut Self {
        self.resources.annotations.push(annotation);
        self
    }

    pub fn annotations(&self) -> &[AnnotationId] {
        &self.resources.annotations
    }

    // --- higher-level shape helpers, grounded in the geometry module ---------

    pub fn draw_line(&mut self, line: &Line) -> Result<&mut Self> {
        if line.points.is_empty() {
            return Ok(self);
        }
        emit_point_path(self, &line.points, line.is_closed);
        self.stroke();
        Ok(self)
    }

    pub fn draw_polygon(&mut self, polygon: &Polygon) -> Result<&mut Self> {
        for ring in &polygon.rings {
            if ring.points.is_empty() {
                continue;
            }
            emit_point_path(self, &ring.points, true);
        }
        match (polygon.mode, polygon.winding_order) {
            (PaintMode::Fill, WindingOrder::NonZero) => {
                self.fill();
            }
            (PaintMode::Fill, WindingOrder::EvenOdd) => {
                self.fill_even_odd();
            }
            (PaintMode::Stroke, _) => {
                self.stroke();
            }
            (PaintMode::FillStroke, WindingOrder::NonZero) => {
                self.fill_stroke();
            }
            (PaintMode::FillStroke, WindingOrder::EvenOdd) => {
                self.fill_stroke_even_odd();
            }
            (PaintMode::Clip, WindingOrder::NonZero) => {
                self.clip();
                self.end_path();
            }
            (PaintMode::Clip, WindingOrder::EvenOdd) => {
                self.clip_even_odd();
                self.end_path();
            }
        }
        Ok(self)
    }

    // --- serialization -------------------------------------------------------

    /// Walks the accumulated operations into a raw content-stream body,
    /// resolving glyph subsets for any text spans against `generator`'s
    /// font registry. Fails if `q`/`Q`, `BT`/`ET` or `BMC`/`EMC` are left
    /// unbalanced.
    pub fn serialize(&self, generator: &mut Generator) -> Result<String> {
        let mut content = ContentStreamFormatter::new();
        for op in &self.ops {
            emit_op(&mut content, generator, op)?;
        }
        content.steal()
    }

    pub fn resource_font_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.resources.fonts.iter().copied()
    }

    pub fn resource_image_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.resources.images.iter().copied()
    }

    pub fn resource_graphics_state_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.resources.graphics_states.iter().copied()
    }

    pub fn resource_pattern_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.resources.patterns.iter().copied()
    }

    pub fn resource_shading_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.resources.shadings.iter().copied()
    }

    pub fn resource_form_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.resources.forms.iter().copied()
    }

    pub fn resource_transparency_group_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.resources.transparency_groups.iter().copied()
    }

    pub fn resource_lab_colorspace_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.resources.lab_colorspaces.iter().copied()
    }

    pub fn resource_icc_colorspace_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.resources.icc_colorspaces.iter().copied()
    }

    pub fn resource_separations(&self) -> impl Iterator<Item = (&str, DeviceFallback)> + '_ {
        self.resources.separations.iter().map(|(name, fallback)| (name.as_str(), *fallback))
    }
}

fn emit_point_path(ctx: &mut DrawContext, points: &[crate::graphics::LinePoint], closed: bool) {
    let mut iter = points.iter();
    let Some(first) = iter.next() else { return };
    ctx.m(first.p.x.0, first.p.y.0);
    let mut pending: Vec<(f32, f32)> = Vec::new();
    for point in iter {
        if point.bezier {
            pending.push((point.p.x.0, point.p.y.0));
            continue;
        }
        match pending.len() {
            0 => {
                ctx.l(point.p.x.0, point.p.y.0);
            }
            1 => {
                let (x2, y2) = pending[0];
                ctx.v(x2, y2, point.p.x.0, point.p.y.0);
            }
            _ => {
                let (x1, y1) = pending[0];
                let (x2, y2) = pending[1];
                ctx.c(x1, y1, x2, y2, point.p.x.0, point.p.y.0);
            }
        }
        pending.clear();
    }
    if closed {
        ctx.h();
    }
}

fn emit_op(content: &mut ContentStreamFormatter, generator: &mut Generator, op: &DrawOp) -> Result<()> {
    match op {
        DrawOp::MoveTo(x, y) => content.append(&format!("{} {} m", f(*x), f(*y))),
        DrawOp::LineTo(x, y) => content.append(&format!("{} {} l", f(*x), f(*y))),
        DrawOp::CurveTo(x1, y1, x2, y2, x3, y3) => {
            content.append(&format!("{} {} {} {} {} {} c", f(*x1), f(*y1), f(*x2), f(*y2), f(*x3), f(*y3)))
        }
        DrawOp::CurveToV(x2, y2, x3, y3) => {
            content.append(&format!("{} {} {} {} v", f(*x2), f(*y2), f(*x3), f(*y3)))
        }
        DrawOp::CurveToY(x1, y1, x3, y3) => {
            content.append(&format!("{} {} {} {} y", f(*x1), f(*y1), f(*x3), f(*y3)))
        }
        DrawOp::Rect(x, y, w, h) => content.append(&format!("{} {} {} {} re", f(*x), f(*y), f(*w), f(*h))),
        DrawOp::ClosePath => content.append("h"),
        DrawOp::Transform(m) => content.append(&format!(
            "{} {} {} {} {} {} cm",
            f(m[0]), f(m[1]), f(m[2]), f(m[3]), f(m[4]), f(m[5])
        )),

        DrawOp::Stroke => content.append("S"),
        DrawOp::CloseStroke => content.append("s"),
        DrawOp::Fill => content.append("f"),
        DrawOp::FillEvenOdd => content.append("f*"),
        DrawOp::FillStroke => content.append("B"),
        DrawOp::FillStrokeEvenOdd => content.append("B*"),
        DrawOp::CloseFillStroke => content.append("b"),
        DrawOp::CloseFillStrokeEvenOdd => content.append("b*"),
        DrawOp::EndPath => content.append("n"),

        DrawOp::Clip => content.append("W"),
        DrawOp::ClipEvenOdd => content.append("W*"),

        DrawOp::SaveState => content.save_state()?,
        DrawOp::RestoreState => content.restore_state()?,
        DrawOp::SetLineWidth(w) => content.append(&format!("{} w", f(*w))),
        DrawOp::SetMiterLimit(m) => content.append(&format!("{} M", f(*m))),
        DrawOp::SetLineJoin(join) => content.append(&format!("{} j", line_join_code(*join))),
        DrawOp::SetLineCap(cap) => content.append(&format!("{} J", line_cap_code(*cap))),
        DrawOp::SetDash(pattern, phase) => {
            let entries: Vec<String> = pattern.iter().map(|v| f(*v)).collect();
            content.append(&format!("[{}] {} d", entries.join(" "), f(*phase)))
        }
        DrawOp::SetFlatness(flatness) => content.append(&format!("{} i", f(*flatness))),
        DrawOp::ApplyExtGState(state) => content.append(&format!("/GS{} gs", state.index())),

        DrawOp::SetFillColor(color) => emit_color(content, color, false),
        DrawOp::SetStrokeColor(color) => emit_color(content, color, true),

        DrawOp::PaintShading(id) => content.append(&format!("/Sh{} sh", id.index())),
        DrawOp::PaintXObject(xobj) => {
            let name = match xobj {
                XObjectRef::Image(id) => format!("/Image{}", id.index()),
                XObjectRef::Form(id) => format!("/Form{}", id.index()),
                XObjectRef::TransparencyGroup(id) => format!("/Group{}", id.index()),
            };
            content.append(&format!("{} Do", name))
        }

        DrawOp::Text(font_id, builder) => {
            let font = generator.font_mut(*font_id)?;
            content.begin_text()?;
            builder.render(content, font)?;
            content.end_text()?;
        }

        DrawOp::BeginMarkedContent(tag) => {
            let line = match tag {
                MarkedContentTag::Tag(name) => format!("/{name} BMC"),
                MarkedContentTag::StructureItem(item) => {
                    let entry = generator.structure_item(*item)?;
                    format!("/{} <</MCID {}>> BDC", entry.type_or_role, item.index())
                }
            };
            content.begin_marked_content(&line)?
        }
        DrawOp::EndMarkedContent => content.end_marked_content()?,
    }
    Ok(())
}

fn line_join_code(join: LineJoinStyle) -> u8 {
    match join {
        LineJoinStyle::Miter => 0,
        LineJoinStyle::Round => 1,
        LineJoinStyle::Bevel => 2,
    }
}

fn line_cap_code(cap: LineCapStyle) -> u8 {
    match cap {
        LineCapStyle::Butt => 0,
        LineCapStyle::Round => 1,
        LineCapStyle::ProjectingSquare => 2,
    }
}

fn emit_color(content: &mut ContentStreamFormatter, color: &Color, stroke: bool) {
    match color {
        Color::DeviceGray(g) => {
            content.append(&format!("{} {}", f(*g), if stroke { "G" } else { "g" }))
        }
        Color::DeviceRgb(r, g, b) => content.append(&format!(
            "{} {} {} {}",
            f(*r), f(*g), f(*b),
            if stroke { "RG" } else { "rg" }
        )),
        Color::DeviceCmyk(c, m, y, k) => content.append(&format!(
            "{} {} {} {} {}",
            f(*c), f(*m), f(*y), f(*k),
            if stroke { "K" } else { "k" }
        )),
        Color::Lab(id, l, a, b) => {
            let cs = format!("/CSLab{}", id.index());
            content.append(&format!("{} {}", cs, if stroke { "CS" } else { "cs" }));
            content.append(&format!(
                "{} {} {} {}",
                f(*l), f(*a), f(*b),
                if stroke { "SCN" } else { "scn" }
            ))
        }
        Color::Icc(id, components, n) => {
            let cs = format!("/CSIcc{}", id.index());
            content.append(&format!("{} {}", cs, if stroke { "CS" } else { "cs" }));
            let values: Vec<String> = components.iter().take(*n as usize).map(|v| f(*v)).collect();
            content.append(&format!("{} {}", values.join(" "), if stroke { "SCN" } else { "scn" }))
        }
        Color::Separation(sep) => {
            let cs = format!("/SepCS_{}", sanitize_separation_name(&sep.name));
            content.append(&format!("{} {}", cs, if stroke { "CS" } else { "cs" }));
            content.append(&format!("{} {}", f(sep.tint), if stroke { "SCN" } else { "scn" }))
        }
        Color::Pattern(id) => {
            content.append(&format!("/Pattern {}", if stroke { "CS" } else { "cs" }));
            content.append(&format!("/P{} {}", id.index(), if stroke { "SCN" } else { "scn" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentProperties, Generator};

    fn generator() -> Generator {
        Generator::new(DocumentProperties::default()).unwrap()
    }

    #[test]
    fn simple_path_round_trips_through_serialize() {
        let mut gen = generator();
        let mut ctx = DrawContext::new(DrawContextKind::Page, true);
        ctx.save_state();
        ctx.set_fill_color(Color::rgb(1.0, 0.0, 0.0)).unwrap();
        ctx.m(0.0, 0.0).l(10.0, 0.0).l(10.0, 10.0).h();
        ctx.fill();
        ctx.restore_state();
        let body = ctx.serialize(&mut gen).unwrap();
        assert!(body.contains("rg"));
        assert!(body.contains("m"));
        assert!(body.contains("f"));
    }

    #[test]
    fn unclosed_save_state_is_rejected() {
        let mut gen = generator();
        let mut ctx = DrawContext::new(DrawContextKind::Page, true);
        ctx.save_state();
        assert!(ctx.serialize(&mut gen).is_err());
    }

    #[test]
    fn negative_line_width_is_rejected() {
        let mut ctx = DrawContext::new(DrawContextKind::Page, true);
        assert!(ctx.set_line_width(-1.0).is_err());
    }

    #[test]
    fn flatness_out_of_range_is_rejected() {
        let mut ctx = DrawContext::new(DrawContextKind::Page, true);
        assert!(ctx.set_flatness(150.0).is_err());
        assert!(ctx.set_flatness(-1.0).is_err());
        assert!(ctx.set_flatness(50.0).is_ok());
    }

    #[test]
    fn negative_dash_entry_is_rejected() {
        let mut ctx = DrawContext::new(DrawContextKind::Page, true);
        assert!(ctx.set_dash(vec![1.0, -2.0], 0.0).is_err());
        assert!(ctx.set_dash(vec![], 0.0).is_ok());
    }

    #[test]
    fn cmyk_without_profile_is_rejected() {
        let mut ctx = DrawContext::new(DrawContextKind::Page, false);
        assert!(ctx.set_fill_color(Color::cmyk(0.1, 0.1, 0.1, 0.1)).is_err());
    }

    #[test]
    fn cmyk_with_profile_is_accepted() {
        let mut ctx = DrawContext::new(DrawContextKind::Page, true);
        assert!(ctx.set_fill_color(Color::cmyk(0.1, 0.1, 0.1, 0.1)).is_ok());
    }

    #[test]
    fn use_xobject_saves_and_restores_state() {
        let mut gen = generator();
        let mut ctx = DrawContext::new(DrawContextKind::Page, true);
        let bbox = crate::graphics::Rect {
            x: crate::units::Pt(0.0),
            y: crate::units::Pt(0.0),
            width: crate::units::Pt(10.0),
            height: crate::units::Pt(10.0),
            mode: None,
            winding_order: None,
        };
        let form_id = gen.add_form_xobject(String::new(), bbox, [1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        ctx.use_xobject(XObjectRef::Form(form_id), CurTransMat::Identity);
        let body = ctx.serialize(&mut gen).unwrap();
        assert!(body.contains("Do"));
        assert!(ctx.resource_form_ids().any(|i| i == form_id.index()));
    }
}
