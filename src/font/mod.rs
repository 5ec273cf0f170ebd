//! TrueType/OTF/TTC/CFF parsing, subsetting, and ToUnicode CMap generation.
//! [`ParsedFont`] is the entry the document object model's font registry
//! points `font_data_index` at: the parsed container tables plus the
//! incremental subsetter state.

pub mod cff;
pub mod cmap;
pub mod subset;
pub mod truetype;

use crate::errors::Result;
use subset::{FontBackend, GlyphEntry, Subset};
use truetype::FontMetrics;

/// A loaded font file plus its in-progress subset. One instance per font
/// a document references, regardless of how many pages use it.
pub struct ParsedFont {
    backend: FontBackend,
    subset: Subset,
}

impl ParsedFont {
    /// Parses `bytes` as a TrueType/OTF/TTC/CFF-flavored container.
    /// `font_index` selects the subfont within a TTC; 0 for any other
    /// container kind.
    pub fn parse(bytes: &[u8], font_index: usize) -> Result<Self> {
        let backend = FontBackend::parse(bytes, font_index)?;
        Ok(ParsedFont { backend, subset: Subset::new() })
    }

    pub fn metrics(&self) -> &FontMetrics {
        self.backend.metrics()
    }

    pub fn is_cff(&self) -> bool {
        matches!(self.backend, FontBackend::Cff(_))
    }

    pub fn subset_glyph_count(&self) -> usize {
        self.subset.len()
    }

    /// Resolves a codepoint (optionally a caller-supplied original glyph
    /// id) to its index within this font's subset, adding it — and its
    /// composite closure — if not already present.
    pub fn get_glyph_subset(&mut self, codepoint: u32, glyph_id: Option<u16>) -> Result<u16> {
        self.backend.get_glyph_subset(&mut self.subset, codepoint, glyph_id)
    }

    /// Resolves a ligature (a source text run collapsing to a single
    /// glyph, e.g. "ffi") to its subset index.
    pub fn get_ligature_subset(&mut self, text: &str, glyph_id: u16) -> Result<u16> {
        self.backend.get_ligature_subset(&mut self.subset, text, glyph_id)
    }

    /// The advance width (font units) of the glyph at the given original
    /// glyph id, independent of whether it has been subset yet.
    pub fn advance_for_original_glyph(&self, glyph_id: u16) -> u16 {
        self.backend.advance(glyph_id)
    }

    pub fn advance_for_subset_index(&self, subset_index: u16) -> u16 {
        match self.subset.glyphs.get(subset_index as usize) {
            Some(GlyphEntry::Regular { glyph_id, .. })
            | Some(GlyphEntry::Composite { glyph_id })
            | Some(GlyphEntry::Ligature { glyph_id, .. }) => self.backend.advance(*glyph_id),
            _ => 0,
        }
    }

    pub fn to_unicode_cmap(&self) -> String {
        cmap::build_tounicode_cmap(&self.subset)
    }

    /// Emits the standalone subset font file to embed as `FontFile2`
    /// (TrueType) or `FontFile3` (CFF/OpenType).
    pub fn emit_subset(&self) -> Result<Vec<u8>> {
        self.backend.emit(&self.subset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_subset_holds_only_notdef() {
        let subset = Subset::new();
        assert_eq!(subset.len(), 1);
    }
}
