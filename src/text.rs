//! Text objects: a small EDSL for the sequence of operators between `BT`
//! and `ET`. A [`TextBuilder`] records typed [`TextEvent`]s;
//! rendering walks that list, feeding codepoints/glyph ids to the font
//! subsetter and encoding show-strings as hexstrings over subset indices.

use crate::bytes::format_real;
use crate::color::Color;
use crate::content_stream::ContentStreamFormatter;
use crate::document::{FontId, GraphicsStateId};
use crate::errors::{Error, Result};
use crate::font::ParsedFont;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRenderMode {
    Fill,
    Stroke,
    FillStroke,
    Invisible,
    FillClip,
    StrokeClip,
    FillStrokeClip,
    Clip,
}

impl TextRenderMode {
    fn operand(self) -> u8 {
        match self {
            TextRenderMode::Fill => 0,
            TextRenderMode::Stroke => 1,
            TextRenderMode::FillStroke => 2,
            TextRenderMode::Invisible => 3,
            TextRenderMode::FillClip => 4,
            TextRenderMode::StrokeClip => 5,
            TextRenderMode::FillStrokeClip => 6,
            TextRenderMode::Clip => 7,
        }
    }
}

/// One atom of a `TJ` positioned-show payload.
#[derive(Debug, Clone)]
pub enum TjAtom {
    /// A raw Unicode codepoint, resolved against the font's `cmap`.
    Codepoint(u32),
    /// A caller-supplied glyph id paired with the codepoint it represents.
    GlyphCodepoint { glyph_id: u16, codepoint: u32 },
    /// A caller-supplied glyph id standing in for a run of source text
    /// that collapsed to one glyph (a ligature).
    Ligature { glyph_id: u16, text: String },
    /// A kerning adjustment, in thousandths of an em.
    Kerning(f32),
    /// Opens an `/ActualText` marked-content span around subsequent atoms.
    ActualTextStart(String),
    /// Closes the span opened by the matching `ActualTextStart`.
    ActualTextEnd,
}

#[derive(Debug, Clone)]
pub enum TextEvent {
    SetFont(FontId, f32),
    MoveTd(f32, f32),
    MoveTD(f32, f32),
    SetMatrix([f32; 6]),
    SetLeading(f32),
    NextLine,
    SetRenderMode(TextRenderMode),
    SetRise(f32),
    SetHorizontalScaling(f32),
    SetCharSpacing(f32),
    SetWordSpacing(f32),
    ShowText(String),
    ShowPositioned(Vec<TjAtom>),
    SetStrokeColor(Color),
    SetNonStrokeColor(Color),
    SetLineWidth(f32),
    SetDash(Vec<f32>, f32),
    ApplyGraphicsState(GraphicsStateId),
    BeginMarkedContent(String),
    EndMarkedContent,
}

/// Records the event sequence of one `BT` … `ET` text object.
#[derive(Debug, Clone, Default)]
pub struct TextBuilder {
    events: Vec<TextEvent>,
}

impl TextBuilder {
    pub fn new() -> Self {
        TextBuilder { events: Vec::new() }
    }

    pub fn set_font(&mut self, font: FontId, size: f32) -> &mut Self {
        self.events.push(TextEvent::SetFont(font, size));
        self
    }

    pub fn move_td(&mut self, x: f32, y: f32) -> &mut Self {
        self.events.push(TextEvent::MoveTd(x, y));
        self
    }

    pub fn move_td_set_leading(&mut self, x: f32, y: f32) -> &mut Self {
        self.events.push(TextEvent::MoveTD(x, y));
        self
    }

    pub fn set_matrix(&mut self, matrix: [f32; 6]) -> &mut Self {
        self.events.push(TextEvent::SetMatrix(matrix));
        self
    }

    pub fn set_leading(&mut self, leading: f32) -> &mut Self {
        self.events.push(TextEvent::SetLeading(leading));
        self
    }

    pub fn next_line(&mut self) -> &mut Self {
        self.events.push(TextEvent::NextLine);
        self
    }

    pub fn set_render_mode(&mut self, mode: TextRenderMode) -> &mut Self {
        self.events.push(TextEvent::SetRenderMode(mode));
        self
    }

    pub fn set_rise(&mut self, rise: f32) -> &mut Self {
        self.events.push(TextEvent::SetRise(rise));
        self
    }

    pub fn set_horizontal_scaling(&mut self, scale: f32) -> &mut Self {
        self.events.push(TextEvent::SetHorizontalScaling(scale));
        self
    }

    pub fn set_char_spacing(&mut self, spacing: f32) -> &mut Self {
        self.events.push(TextEvent::SetCharSpacing(spacing));
        self
    }

    pub fn set_word_spacing(&mut self, spacing: f32) -> &mut Self {
        self.events.push(TextEvent::SetWordSpacing(spacing));
        self
    }

    pub fn show_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.events.push(TextEvent::ShowText(text.into()));
        self
    }

    pub fn show_positioned(&mut self, atoms: Vec<TjAtom>) -> &mut Self {
        self.events.push(TextEvent::ShowPositioned(atoms));
        self
    }

    pub fn set_stroke_color(&mut self, color: Color) -> &mut Self {
        self.events.push(TextEvent::SetStrokeColor(color));
        self
    }

    pub fn set_nonstroke_color(&mut self, color: Color) -> &mut Self {
        self.events.push(TextEvent::SetNonStrokeColor(color));
        self
    }

    pub fn set_line_width(&mut self, width: f32) -> &mut Self {
        self.events.push(TextEvent::SetLineWidth(width));
        self
    }

    pub fn set_dash(&mut self, pattern: Vec<f32>, phase: f32) -> &mut Self {
        self.events.push(TextEvent::SetDash(pattern, phase));
        self
    }

    pub fn apply_graphics_state(&mut self, state: GraphicsStateId) -> &mut Self {
        self.events.push(TextEvent::ApplyGraphicsState(state));
        self
    }

    pub fn begin_marked_content(&mut self, tag: impl Into<String>) -> &mut Self {
        self.events.push(TextEvent::BeginMarkedContent(tag.into()));
        self
    }

    pub fn end_marked_content(&mut self) -> &mut Self {
        self.events.push(TextEvent::EndMarkedContent);
        self
    }

    pub fn events(&self) -> &[TextEvent] {
        &self.events
    }

    /// Walks the event list, emitting operators into `content` and
    /// resolving codepoints/glyph ids against `font`'s subset.
    pub fn render(&self, content: &mut ContentStreamFormatter, font: &mut ParsedFont) -> Result<()> {
        content.begin_text()?;
        for event in &self.events {
            self.render_event(content, font, event)?;
        }
        content.end_text()
    }

    fn render_event(
        &self,
        content: &mut ContentStreamFormatter,
        font: &mut ParsedFont,
        event: &TextEvent,
    ) -> Result<()> {
        match event {
            TextEvent::SetFont(font_id, size) => {
                content.append(&format!("/F{} {} Tf", font_id.index(), format_real(*size as f64)));
            }
            TextEvent::MoveTd(x, y) => {
                content.append(&format!("{} {} Td", format_real(*x as f64), format_real(*y as f64)));
            }
            TextEvent::MoveTD(x, y) => {
                content.append(&format!("{} {} TD", format_real(*x as f64), format_real(*y as f64)));
            }
            TextEvent::SetMatrix(m) => {
                let parts: Vec<String> = m.iter().map(|v| format_real(*v as f64)).collect();
                content.append(&format!("{} Tm", parts.join(" ")));
            }
            TextEvent::SetLeading(l) => content.append(&format!("{} TL", format_real(*l as f64))),
            TextEvent::NextLine => content.append("T*"),
            TextEvent::SetRenderMode(mode) => content.append(&format!("{} Tr", mode.operand())),
            TextEvent::SetRise(rise) => content.append(&format!("{} Ts", format_real(*rise as f64))),
            TextEvent::SetHorizontalScaling(scale) => {
                content.append(&format!("{} Tz", format_real(*scale as f64)))
            }
            TextEvent::SetCharSpacing(spacing) => {
                content.append(&format!("{} Tc", format_real(*spacing as f64)))
            }
            TextEvent::SetWordSpacing(spacing) => {
                content.append(&format!("{} Tw", format_real(*spacing as f64)))
            }
            TextEvent::ShowText(text) => {
                let hex = encode_show_string(font, text)?;
                content.append(&format!("{hex} Tj"));
            }
            TextEvent::ShowPositioned(atoms) => render_show_positioned(content, font, atoms)?,
            TextEvent::SetStrokeColor(color) => emit_color(content, color, true),
            TextEvent::SetNonStrokeColor(color) => emit_color(content, color, false),
            TextEvent::SetLineWidth(width) => content.append(&format!("{} w", format_real(*width as f64))),
            TextEvent::SetDash(pattern, phase) => {
                let parts: Vec<String> = pattern.iter().map(|v| format_real(*v as f64)).collect();
                content.append(&format!("[{}] {} d", parts.join(" "), format_real(*phase as f64)));
            }
            TextEvent::ApplyGraphicsState(state) => content.append(&format!("/GS{} gs", state.index())),
            TextEvent::BeginMarkedContent(tag) => content.begin_marked_content(tag)?,
            TextEvent::EndMarkedContent => content.end_marked_content()?,
        }
        Ok(())
    }
}

fn encode_show_string(font: &mut ParsedFont, text: &str) -> Result<String> {
    let mut hex = String::from("<");
    for ch in text.chars() {
        let index = font.get_glyph_subset(ch as u32, None)?;
        hex.push_str(&format!("{index:04X}"));
    }
    hex.push('>');
    Ok(hex)
}

fn render_show_positioned(
    content: &mut ContentStreamFormatter,
    font: &mut ParsedFont,
    atoms: &[TjAtom],
) -> Result<()> {
    let mut current: Vec<String> = Vec::new();
    let mut bracket_open = false;

    for atom in atoms {
        match atom {
            TjAtom::Kerning(k) => current.push(format_real(*k as f64)),
            TjAtom::Codepoint(cp) => {
                let index = font.get_glyph_subset(*cp, None)?;
                push_hex_run(&mut current, index);
            }
            TjAtom::GlyphCodepoint { glyph_id, codepoint } => {
                let index = font.get_glyph_subset(*codepoint, Some(*glyph_id))?;
                push_hex_run(&mut current, index);
            }
            TjAtom::Ligature { glyph_id, text } => {
                let index = font.get_ligature_subset(text, *glyph_id)?;
                push_hex_run(&mut current, index);
            }
            TjAtom::ActualTextStart(text) => {
                flush_tj_array(content, &mut current);
                if bracket_open {
                    return Err(Error::DrawStateEndMismatch { expected: "EMC", found: "BDC" });
                }
                content.begin_marked_content(&format!(
                    "/Span << /ActualText {} >> BDC",
                    crate::bytes::quote_pdf_literal_string(text.as_bytes())
                ))?;
                bracket_open = true;
            }
            TjAtom::ActualTextEnd => {
                flush_tj_array(content, &mut current);
                if !bracket_open {
                    return Err(Error::DrawStateEndMismatch { expected: "BDC", found: "EMC" });
                }
                content.end_marked_content()?;
                bracket_open = false;
            }
        }
    }

    if bracket_open {
        return Err(Error::UnclosedMarkedContent);
    }
    flush_tj_array(content, &mut current);
    Ok(())
}

fn push_hex_run(current: &mut Vec<String>, subset_index: u16) {
    match current.last_mut() {
        Some(last) if last.starts_with('<') && !last.ends_with('>') => {
            last.push_str(&format!("{subset_index:04X}"));
        }
        _ => current.push(format!("<{subset_index:04X}")),
    }
}

fn flush_tj_array(content: &mut ContentStreamFormatter, current: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let closed: Vec<String> = current
        .drain(..)
        .map(|item| if item.starts_with('<') && !item.ends_with('>') { format!("{item}>") } else { item })
        .collect();
    content.append(&format!("[{}] TJ", closed.join(" ")));
}

fn emit_color(content: &mut ContentStreamFormatter, color: &Color, stroke: bool) {
    let parts: Vec<String> = color.components().iter().map(|c| format_real(*c as f64)).collect();
    // Lab/ICC/Separation/Pattern select their color space via `cs`/`CS`
    // on the enclosing resource dictionary (draw context's concern) and
    // paint with `scn`/`SCN`; device spaces use their dedicated operator.
    let op = match (color, stroke) {
        (Color::DeviceGray(_), false) => "g",
        (Color::DeviceGray(_), true) => "G",
        (Color::DeviceRgb(..), false) => "rg",
        (Color::DeviceRgb(..), true) => "RG",
        (Color::DeviceCmyk(..), false) => "k",
        (Color::DeviceCmyk(..), true) => "K",
        (_, false) => "scn",
        (_, true) => "SCN",
    };
    if parts.is_empty() {
        content.append(op);
    } else {
        content.append(&format!("{} {op}", parts.join(" ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FontId;

    #[test]
    fn builder_records_events_in_order() {
        let mut b = TextBuilder::new();
        b.set_font(FontId::from_index(0), 12.0).move_td(10.0, 20.0).show_text("Hi");
        assert_eq!(b.events().len(), 3);
    }
}
