//! ToUnicode CMap generation, mapping subset glyph indices back to the
//! Unicode text they represent for copy-paste and text extraction.

use crate::bytes::utf16be_hex;
use crate::font::subset::{GlyphEntry, Subset};

const CMAP_HEADER: &str = "\
/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo
<< /Registry (Adobe)
/Ordering (UCS)
/Supplement 0
>> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
";

const CMAP_FOOTER: &str = "\
endcmap
CMapName currentdict /CMap defineresource pop
end
end
";

/// Emits a PDF CMap stream mapping subset glyph index -> Unicode
/// codepoint (or Unicode string, for ligatures), as bfchar entries and
/// consecutive-run bfrange entries.
pub fn build_tounicode_cmap(subset: &Subset) -> String {
    let mut bfchar: Vec<(u16, String)> = Vec::new();
    let mut run_start: Option<(u16, u32)> = None;
    let mut ranges: Vec<(u16, u16, u32)> = Vec::new();

    let mut flush_run = |run_start: &mut Option<(u16, u32)>, end_index: u16| {
        if let Some((start_index, start_cp)) = run_start.take() {
            if end_index > start_index {
                ranges.push((start_index, end_index - 1, start_cp));
            }
        }
    };

    for (i, entry) in subset.glyphs.iter().enumerate() {
        let index = i as u16;
        match entry {
            GlyphEntry::Regular { codepoint, .. } => {
                match run_start {
                    Some((start_index, start_cp))
                        if index == start_index + (index - start_index)
                            && *codepoint == start_cp + (index - start_index) as u32 => {}
                    _ => {
                        flush_run(&mut run_start, index);
                        run_start = Some((index, *codepoint));
                    }
                }
            }
            GlyphEntry::Ligature { text, .. } => {
                flush_run(&mut run_start, index);
                bfchar.push((index, utf16be_hex(text)));
            }
            GlyphEntry::Composite { .. } | GlyphEntry::NotDef => {
                flush_run(&mut run_start, index);
            }
        }
    }
    flush_run(&mut run_start, subset.glyphs.len() as u16);

    let mut out = String::new();
    out.push_str(CMAP_HEADER);

    for chunk in ranges.chunks(100) {
        out.push_str(&format!("{} beginbfrange\n", chunk.len()));
        for &(start, end, start_cp) in chunk {
            out.push_str(&format!(
                "<{:04X}> <{:04X}> <{}>\n",
                start,
                end,
                utf16be_hex(&char_from_cp(start_cp))
            ));
        }
        out.push_str("endbfrange\n");
    }

    for chunk in bfchar.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (index, hex) in chunk {
            out.push_str(&format!("<{index:04X}> <{hex}>\n"));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str(CMAP_FOOTER);
    out
}

fn char_from_cp(cp: u32) -> String {
    char::from_u32(cp).map(|c| c.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::subset::Subset;

    #[test]
    fn single_glyph_maps_codepoint() {
        let mut subset = Subset::new();
        subset.glyphs.push(GlyphEntry::NotDef);
        subset.glyphs.push(GlyphEntry::Regular { glyph_id: 5, codepoint: 0x48 });
        let cmap = build_tounicode_cmap(&subset);
        assert!(cmap.contains("beginbfchar") || cmap.contains("beginbfrange"));
    }
}
