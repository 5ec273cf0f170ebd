//! Font subsetting.
//!
//! Maintains one in-progress subset per original font and, on request,
//! rewrites a new TrueType or CFF-flavored OpenType file containing only
//! the glyphs actually used.

use std::collections::HashMap;

use log::warn;

use crate::bytes::{pad_to_4, push_i16_be, push_u16_be, push_u32_be, sfnt_checksum};
use crate::errors::{Error, Result};
use crate::font::cff::{self, CffIndex, CffTable};
use crate::font::truetype::{
    self, CmapSubtable, FontMetrics, HeadTable, HheaTable, HmtxTable, LocaTable, MaxpTable,
    TableDirectory, TAG_CFF, TAG_CVT, TAG_FPGM, TAG_GLYF, TAG_HEAD, TAG_HHEA, TAG_HMTX, TAG_LOCA,
    TAG_MAXP, TAG_OS2, TAG_PREP,
};

pub const NOTDEF_INDEX: u16 = 0;
pub const MAX_SUBSET_GLYPHS: usize = 65_000;

/// One entry in a font's subset glyph list, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum GlyphEntry {
    NotDef,
    Regular { glyph_id: u16, codepoint: u32 },
    Composite { glyph_id: u16 },
    Ligature { glyph_id: u16, text: String },
}

/// Per-font incremental subsetter state.
#[derive(Debug, Clone, Default)]
pub struct Subset {
    pub glyphs: Vec<GlyphEntry>,
    /// original glyph id -> subset index
    original_to_subset: HashMap<u16, u16>,
    /// codepoint -> subset index, for regular glyphs only
    codepoint_to_subset: HashMap<u32, u16>,
}

impl Subset {
    pub fn new() -> Self {
        let mut s = Subset::default();
        s.glyphs.push(GlyphEntry::NotDef);
        s.original_to_subset.insert(0, NOTDEF_INDEX);
        s
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

/// Owns the original parsed font and drives subsetting against it.
pub enum FontBackend {
    TrueType(TrueTypeSource),
    Cff(CffSource),
}

pub struct TrueTypeSource {
    pub bytes: Vec<u8>,
    pub directory: TableDirectory,
    pub head: HeadTable,
    pub hhea: HheaTable,
    pub maxp: MaxpTable,
    pub hmtx: HmtxTable,
    pub loca: LocaTable,
    pub cmap: CmapSubtable,
    pub metrics: FontMetrics,
}

pub struct CffSource {
    pub bytes: Vec<u8>,
    pub directory: TableDirectory,
    pub head: HeadTable,
    pub hhea: HheaTable,
    pub maxp: MaxpTable,
    pub hmtx: HmtxTable,
    pub cmap: CmapSubtable,
    pub metrics: FontMetrics,
}

impl FontBackend {
    pub fn parse(font_bytes: &[u8], font_index: usize) -> Result<Self> {
        let directory = TableDirectory::parse(font_bytes, font_index)?;
        let head_table = directory.table(font_bytes, TAG_HEAD)?;
        let head = HeadTable::parse(head_table)?;
        let hhea_table = directory.table(font_bytes, TAG_HHEA)?;
        let hhea = HheaTable::parse(hhea_table)?;
        let maxp_table = directory.table(font_bytes, TAG_MAXP)?;
        let maxp = MaxpTable::parse(maxp_table)?;
        let os2 = directory.table(font_bytes, TAG_OS2).ok();
        let metrics = FontMetrics::from_tables(&head, &hhea, os2)?;
        let hmtx_table = directory.table(font_bytes, TAG_HMTX)?;
        let hmtx = HmtxTable::parse(hmtx_table, hhea.num_h_metrics, maxp.num_glyphs)?;
        let cmap_table = directory.table(font_bytes, truetype::TAG_CMAP)?;
        let cmap = truetype::parse_cmap(cmap_table)?;

        if directory.is_cff() {
            Ok(FontBackend::Cff(CffSource {
                bytes: font_bytes.to_vec(),
                directory,
                head,
                hhea,
                maxp,
                hmtx,
                cmap,
                metrics,
            }))
        } else {
            let loca_table = directory.table(font_bytes, TAG_LOCA)?;
            let loca = LocaTable::parse(loca_table, maxp.num_glyphs, head.index_to_loc_format == 1)?;
            Ok(FontBackend::TrueType(TrueTypeSource {
                bytes: font_bytes.to_vec(),
                directory,
                head,
                hhea,
                maxp,
                hmtx,
                loca,
                cmap,
                metrics,
            }))
        }
    }

    pub fn metrics(&self) -> &FontMetrics {
        match self {
            FontBackend::TrueType(t) => &t.metrics,
            FontBackend::Cff(c) => &c.metrics,
        }
    }

    pub fn lookup_glyph_index(&self, codepoint: u32) -> Option<u16> {
        let cmap = match self {
            FontBackend::TrueType(t) => &t.cmap,
            FontBackend::Cff(c) => &c.cmap,
        };
        cmap.map_glyph(codepoint)
    }

    pub fn advance(&self, glyph_id: u16) -> u16 {
        match self {
            FontBackend::TrueType(t) => t.hmtx.advance(glyph_id),
            FontBackend::Cff(c) => c.hmtx.advance(glyph_id),
        }
    }

    fn composite_components(&self, glyph_id: u16) -> Result<Vec<u16>> {
        match self {
            FontBackend::TrueType(t) => {
                let record = truetype::parse_glyph(
                    t.directory.table(&t.bytes, TAG_GLYF)?,
                    &t.loca,
                    glyph_id,
                )?;
                Ok(record.component_glyph_ids)
            }
            FontBackend::Cff(_) => Ok(Vec::new()),
        }
    }

    /// Resolves a codepoint to its subset index: look up an existing
    /// mapping, else append a new glyph (and, for composite glyphs,
    /// its component closure) and cache the mapping.
    pub fn get_glyph_subset(
        &self,
        subset: &mut Subset,
        codepoint: u32,
        glyph_id: Option<u16>,
    ) -> Result<u16> {
        // step 1
        if let Some(gid) = glyph_id {
            if let Some(&index) = subset.original_to_subset.get(&gid) {
                if let Some(GlyphEntry::Regular { codepoint: existing_cp, .. }) =
                    subset.glyphs.get(index as usize)
                {
                    if *existing_cp != codepoint {
                        warn!(
                            "glyph {gid} already mapped to U+{existing_cp:04X}; keeping first mapping over U+{codepoint:04X}"
                        );
                    }
                }
                return Ok(index);
            }
        }

        // step 2
        if let Some(&index) = subset.codepoint_to_subset.get(&codepoint) {
            return Ok(index);
        }

        // step 3
        if subset.len() >= MAX_SUBSET_GLYPHS {
            return Err(Error::TooManyGlyphsUsed);
        }

        // step 4
        let gid = match glyph_id {
            Some(g) => g,
            None => self
                .lookup_glyph_index(codepoint)
                .ok_or(Error::MissingGlyph(codepoint))?,
        };

        let index = subset.len() as u16;
        subset.glyphs.push(GlyphEntry::Regular { glyph_id: gid, codepoint });
        subset.original_to_subset.insert(gid, index);
        subset.codepoint_to_subset.insert(codepoint, index);

        self.append_composite_closure(subset, gid)?;
        Ok(index)
    }

    pub fn get_ligature_subset(&self, subset: &mut Subset, text: &str, glyph_id: u16) -> Result<u16> {
        if let Some(&index) = subset.original_to_subset.get(&glyph_id) {
            return Ok(index);
        }
        if subset.len() >= MAX_SUBSET_GLYPHS {
            return Err(Error::TooManyGlyphsUsed);
        }
        let index = subset.len() as u16;
        subset.glyphs.push(GlyphEntry::Ligature { glyph_id, text: text.to_string() });
        subset.original_to_subset.insert(glyph_id, index);
        self.append_composite_closure(subset, glyph_id)?;
        Ok(index)
    }

    /// Transitively adds all referenced sub-glyphs of a composite glyph.
    fn append_composite_closure(&self, subset: &mut Subset, glyph_id: u16) -> Result<()> {
        let components = self.composite_components(glyph_id)?;
        for component in components {
            if subset.original_to_subset.contains_key(&component) {
                continue;
            }
            if subset.len() >= MAX_SUBSET_GLYPHS {
                return Err(Error::TooManyGlyphsUsed);
            }
            let index = subset.len() as u16;
            subset.glyphs.push(GlyphEntry::Composite { glyph_id: component });
            subset.original_to_subset.insert(component, index);
            self.append_composite_closure(subset, component)?;
        }
        Ok(())
    }

    fn original_glyph_id(entry: &GlyphEntry) -> Option<u16> {
        match entry {
            GlyphEntry::NotDef => Some(0),
            GlyphEntry::Regular { glyph_id, .. } => Some(*glyph_id),
            GlyphEntry::Composite { glyph_id } => Some(*glyph_id),
            GlyphEntry::Ligature { glyph_id, .. } => Some(*glyph_id),
        }
    }

    /// Emits a standalone subset font file: for TrueType sources, a new
    /// sfnt with renumbered `glyf`/`loca`/`hmtx`/`maxp`/`head`; for CFF
    /// sources, a complete rewrite — CharStrings, charset and (for
    /// CID-keyed fonts) FDSelect/FDArray renumbered to the subset, TopDict
    /// offsets patched to match — ready to embed as `FontFile3` as-is.
    pub fn emit(&self, subset: &Subset) -> Result<Vec<u8>> {
        match self {
            FontBackend::TrueType(t) => emit_truetype_subset(t, subset),
            FontBackend::Cff(c) => emit_cff_subset(c, subset),
        }
    }
}

fn emit_truetype_subset(source: &TrueTypeSource, subset: &Subset) -> Result<Vec<u8>> {
    let glyf_table = source.directory.table(&source.bytes, TAG_GLYF)?;
    let num_glyphs = subset.len() as u16;

    // build an original-id -> subset-id lookup for composite reference patching
    let mut new_glyf = Vec::new();
    let mut loca_offsets: Vec<u32> = Vec::with_capacity(subset.len() + 1);
    loca_offsets.push(0);

    for entry in &subset.glyphs {
        let original_id = FontBackend::original_glyph_id(entry).unwrap_or(0);
        let record = truetype::parse_glyph(glyf_table, &source.loca, original_id)?;
        let mut glyph_bytes = record.raw.to_vec();

        if record.is_composite {
            for (&component_original, &patch_offset) in record
                .component_glyph_ids
                .iter()
                .zip(record.component_glyph_id_offsets.iter())
            {
                let new_id = source_lookup(subset, component_original);
                glyph_bytes[patch_offset] = (new_id >> 8) as u8;
                glyph_bytes[patch_offset + 1] = (new_id & 0xff) as u8;
            }
        }

        pad_to_4(&mut glyph_bytes);
        new_glyf.extend_from_slice(&glyph_bytes);
        loca_offsets.push(new_glyf.len() as u32);
    }

    let mut new_loca = Vec::new();
    for &offset in &loca_offsets {
        push_u32_be(&mut new_loca, offset);
    }

    let mut new_hmtx = Vec::new();
    for entry in &subset.glyphs {
        let original_id = FontBackend::original_glyph_id(entry).unwrap_or(0);
        let metric = source
            .hmtx
            .metrics
            .get(original_id as usize)
            .copied()
            .unwrap_or(truetype::LongHorMetric { advance_width: 0, left_side_bearing: 0 });
        push_u16_be(&mut new_hmtx, metric.advance_width);
        push_i16_be(&mut new_hmtx, metric.left_side_bearing);
    }

    let mut new_maxp = Vec::new();
    push_u32_be(&mut new_maxp, 0x00010000);
    push_u16_be(&mut new_maxp, num_glyphs);
    // remaining maxp 1.0 fields: copy sane conservative defaults
    for _ in 0..13 {
        push_u16_be(&mut new_maxp, 0);
    }

    let mut new_head = source.directory.table(&source.bytes, TAG_HEAD)?.to_vec();
    // index_to_loc_format = long (1)
    new_head[50] = 0;
    new_head[51] = 1;
    new_head[8] = 0;
    new_head[9] = 0;
    new_head[10] = 0;
    new_head[11] = 0;

    let mut new_hhea = source.directory.table(&source.bytes, TAG_HHEA)?.to_vec();
    let new_hhea_len = new_hhea.len();
    new_hhea[new_hhea_len - 2] = (num_glyphs >> 8) as u8;
    new_hhea[new_hhea_len - 1] = (num_glyphs & 0xff) as u8;

    let mut tables: Vec<([u8; 4], Vec<u8>)> = Vec::new();
    tables.push((TAG_HEAD, new_head));
    tables.push((TAG_HHEA, new_hhea));
    tables.push((TAG_MAXP, new_maxp));
    tables.push((TAG_HMTX, new_hmtx));
    tables.push((TAG_LOCA, new_loca));
    tables.push((TAG_GLYF, new_glyf));
    tables.push((truetype::TAG_CMAP, identity_cmap(num_glyphs)));
    for optional in [TAG_CVT, TAG_FPGM, TAG_PREP] {
        if let Ok(bytes) = source.directory.table(&source.bytes, optional) {
            tables.push((optional, bytes.to_vec()));
        }
    }

    assemble_sfnt(0x00010000, tables)
}

fn source_lookup(subset: &Subset, original_id: u16) -> u16 {
    for (i, entry) in subset.glyphs.iter().enumerate() {
        if FontBackend::original_glyph_id(entry) == Some(original_id) {
            return i as u16;
        }
    }
    0
}

/// Identity cmap over subset indices: since the PDF references glyphs
/// directly (Identity-H encoding), the embedded cmap only needs to be
/// internally consistent.
fn identity_cmap(num_glyphs: u16) -> Vec<u8> {
    let mut out = Vec::new();
    push_u16_be(&mut out, 0); // version
    push_u16_be(&mut out, 1); // numTables
    push_u16_be(&mut out, 3); // platformID
    push_u16_be(&mut out, 1); // encodingID
    push_u32_be(&mut out, 12); // offset to subtable

    // format 6, trimmed table mapping: glyph i -> glyph i
    push_u16_be(&mut out, 6);
    push_u16_be(&mut out, (10 + num_glyphs as usize * 2) as u16);
    push_u16_be(&mut out, 0);
    push_u16_be(&mut out, 0); // firstCode
    push_u16_be(&mut out, num_glyphs);
    for i in 0..num_glyphs {
        push_u16_be(&mut out, i);
    }
    out
}

/// Lays out the sfnt table directory, pads each table to a 4-byte
/// boundary, computes per-table checksums, and writes the font-wide
/// `head.checksum_adjustment` as `0xB1B0AFBA - sum_of_all_longs` (§4.5).
fn assemble_sfnt(sfnt_version: u32, mut tables: Vec<([u8; 4], Vec<u8>)>) -> Result<Vec<u8>> {
    tables.sort_by_key(|(tag, _)| *tag);
    let num_tables = tables.len() as u16;
    let entry_selector = (num_tables as f32).log2().floor() as u16;
    let search_range = (1u16 << entry_selector) * 16;
    let range_shift = num_tables * 16 - search_range;

    let header_len = 12 + tables.len() * 16;
    let mut offsets = Vec::with_capacity(tables.len());
    let mut body = Vec::new();
    let mut head_table_index = None;
    for (i, (tag, bytes)) in tables.iter().enumerate() {
        if *tag == TAG_HEAD {
            head_table_index = Some(i);
        }
        let offset = header_len + body.len();
        offsets.push(offset as u32);
        let mut padded = bytes.clone();
        pad_to_4(&mut padded);
        body.extend_from_slice(&padded);
    }

    let mut out = Vec::with_capacity(header_len + body.len());
    push_u32_be(&mut out, sfnt_version);
    push_u16_be(&mut out, num_tables);
    push_u16_be(&mut out, search_range);
    push_u16_be(&mut out, entry_selector);
    push_u16_be(&mut out, range_shift);

    for (i, (tag, bytes)) in tables.iter().enumerate() {
        out.extend_from_slice(tag);
        push_u32_be(&mut out, sfnt_checksum(bytes));
        push_u32_be(&mut out, offsets[i]);
        push_u32_be(&mut out, bytes.len() as u32);
    }
    out.extend_from_slice(&body);

    let total_checksum = sfnt_checksum(&out);
    let checksum_adjustment = 0xB1B0AFBAu32.wrapping_sub(total_checksum);
    if let Some(head_index) = head_table_index {
        let head_offset = header_len
            + tables[..head_index].iter().map(|(_, b)| {
                let mut len = b.len();
                while len % 4 != 0 {
                    len += 1;
                }
                len
            }).sum::<usize>();
        let adj_offset = head_offset + 8;
        let bytes = checksum_adjustment.to_be_bytes();
        out[adj_offset..adj_offset + 4].copy_from_slice(&bytes);
    }

    Ok(out)
}

// CFF DICT operator codes used when rebuilding the subset's TopDict/FD dicts.
// Mirrors `font::cff`'s private constants of the same name (kept local here
// since this is the only place outside `font::cff` that re-serializes DICTs).
const CFF_OP_CHARSET: u16 = 15;
const CFF_OP_PRIVATE: u16 = 18;
const CFF_OP_CHARSTRINGS: u16 = 17;
const CFF_OP_ROS: u16 = 0x0c1e;
const CFF_OP_CID_COUNT: u16 = 0x0c22;
const CFF_OP_FDARRAY: u16 = 0x0c24;
const CFF_OP_FDSELECT: u16 = 0x0c25;
const CFF_OP_FONT_MATRIX: u16 = 0x0c07;

/// Rewrites a CFF/OpenType-CFF font down to the glyphs in `subset`:
/// a new CharStrings INDEX (subset glyph order), a new charset and (for
/// CID-keyed fonts) a new FDSelect mapping old glyph ids to the subset's,
/// and a from-scratch TopDict/FDArray with every offset operand patched to
/// the rewritten layout. Name/String/GlobalSubr INDEXes and each
/// referenced Private DICT + Local Subrs block are carried through
/// byte-for-byte, since none of their content depends on the glyph subset.
fn emit_cff_subset(source: &CffSource, subset: &Subset) -> Result<Vec<u8>> {
    let cff_table = source.directory.table(&source.bytes, TAG_CFF)?;
    let cff = CffTable::parse(cff_table)?;
    let data = cff.data;
    let num_original_glyphs = cff.charstrings.len();

    let mut original_gids = Vec::with_capacity(subset.len());
    let mut new_charstrings_data = Vec::new();
    let mut entry_lengths = Vec::with_capacity(subset.len());
    for entry in &subset.glyphs {
        let original_id = FontBackend::original_glyph_id(entry).unwrap_or(0);
        original_gids.push(original_id);
        let bytes = cff.charstrings.get(data, original_id as usize).unwrap_or(&[]);
        entry_lengths.push(bytes.len());
        new_charstrings_data.extend_from_slice(bytes);
    }
    let new_charstrings_index = build_cff_index(&entry_lengths, &new_charstrings_data);

    let charset_map: Vec<u16> = match cff.top_dict.charset_offset {
        // ISOAdobe: predefined, SID == GID for the first 229 glyphs.
        None | Some(0) => (0..num_original_glyphs as u16).collect(),
        Some(1) | Some(2) => {
            return Err(Error::UnsupportedFormat(
                "CFF predefined Expert/ExpertSubset charset".into(),
            ))
        }
        Some(off) => cff::parse_charset(data, off, num_original_glyphs)?,
    };
    let mut new_charset_bytes = vec![0u8]; // format 0
    for &gid in &original_gids[1..] {
        let sid = charset_map.get(gid as usize).copied().unwrap_or(0);
        push_u16_be(&mut new_charset_bytes, sid);
    }

    let mut topdict_bytes = Vec::new();
    if let Some(matrix) = cff.top_dict.font_matrix {
        for v in matrix {
            cff::encode_real(&mut topdict_bytes, v);
        }
        dict_push_operator(&mut topdict_bytes, CFF_OP_FONT_MATRIX);
    }
    if cff.top_dict.is_cid_keyed {
        let (registry, order, supplement) = cff.top_dict.ros.unwrap_or((0.0, 0.0, 0.0));
        dict_push_int(&mut topdict_bytes, registry as i64);
        dict_push_int(&mut topdict_bytes, order as i64);
        dict_push_int(&mut topdict_bytes, supplement as i64);
        dict_push_operator(&mut topdict_bytes, CFF_OP_ROS);
        if let Some(count) = cff.top_dict.cid_count {
            dict_push_int(&mut topdict_bytes, count as i64);
            dict_push_operator(&mut topdict_bytes, CFF_OP_CID_COUNT);
        }
    }
    let charset_patch_at = dict_push_placeholder(&mut topdict_bytes);
    dict_push_operator(&mut topdict_bytes, CFF_OP_CHARSET);
    let charstrings_patch_at = dict_push_placeholder(&mut topdict_bytes);
    dict_push_operator(&mut topdict_bytes, CFF_OP_CHARSTRINGS);

    let private_patch_at;
    let fdarray_patch_at;
    let fdselect_patch_at;
    if cff.top_dict.is_cid_keyed {
        private_patch_at = None;
        let at = dict_push_placeholder(&mut topdict_bytes);
        dict_push_operator(&mut topdict_bytes, CFF_OP_FDARRAY);
        fdarray_patch_at = Some(at);
        let at = dict_push_placeholder(&mut topdict_bytes);
        dict_push_operator(&mut topdict_bytes, CFF_OP_FDSELECT);
        fdselect_patch_at = Some(at);
    } else if let Some((size, _)) = cff.top_dict.private {
        dict_push_int(&mut topdict_bytes, size as i64);
        let at = dict_push_placeholder(&mut topdict_bytes);
        dict_push_operator(&mut topdict_bytes, CFF_OP_PRIVATE);
        private_patch_at = Some(at);
        fdarray_patch_at = None;
        fdselect_patch_at = None;
    } else {
        private_patch_at = None;
        fdarray_patch_at = None;
        fdselect_patch_at = None;
    }

    let mut topdict_index_bytes = build_cff_index(&[topdict_bytes.len()], &topdict_bytes);
    let topdict_header_len = topdict_index_bytes.len() - topdict_bytes.len();

    let header_bytes = data
        .get(..cff.hdr_size)
        .ok_or_else(|| Error::MalformedFontFile("CFF header out of bounds".into()))?;
    let name_bytes = slice_range(data, cff.name_range)?;
    let string_bytes = slice_range(data, cff.string_range)?;
    let global_subrs_bytes = slice_range(data, cff.global_subrs_range)?;

    let base = cff.hdr_size
        + name_bytes.len()
        + topdict_index_bytes.len()
        + string_bytes.len()
        + global_subrs_bytes.len();
    let charset_start = base;
    let charstrings_start = charset_start + new_charset_bytes.len();
    let tail_start = charstrings_start + new_charstrings_index.len();

    patch_placeholder(&mut topdict_index_bytes, topdict_header_len + charset_patch_at, charset_start as u32);
    patch_placeholder(&mut topdict_index_bytes, topdict_header_len + charstrings_patch_at, charstrings_start as u32);

    let mut out = Vec::new();
    out.extend_from_slice(header_bytes);
    out.extend_from_slice(name_bytes);
    out.extend_from_slice(&topdict_index_bytes);
    out.extend_from_slice(string_bytes);
    out.extend_from_slice(global_subrs_bytes);
    out.extend_from_slice(&new_charset_bytes);
    out.extend_from_slice(&new_charstrings_index);

    if cff.top_dict.is_cid_keyed {
        let fdselect = cff
            .fdselect
            .as_ref()
            .ok_or_else(|| Error::MalformedFontFile("CID-keyed CFF missing FDSelect".into()))?;
        let fdarray_offset = cff
            .top_dict
            .fdarray_offset
            .ok_or_else(|| Error::MalformedFontFile("CID-keyed CFF missing FDArray".into()))?;
        let fdarray_index = CffIndex::parse(data, fdarray_offset)?;

        let mut new_fdselect_bytes = vec![0u8]; // format 0
        for &gid in &original_gids {
            new_fdselect_bytes.push(fdselect.fd_for_glyph(gid));
        }

        let mut running = tail_start;
        let mut fd_dict_lengths = Vec::with_capacity(fdarray_index.len());
        let mut fd_dict_data = Vec::new();
        let mut private_blocks = Vec::new();
        for i in 0..fdarray_index.len() {
            let fd_bytes = fdarray_index.get(data, i)?;
            let fd_dict = cff::parse_top_dict(fd_bytes)?;
            let (size, offset) = fd_dict
                .private
                .ok_or_else(|| Error::MalformedFontFile("CFF FDArray entry missing Private".into()))?;
            let block = copy_private_block(data, size, offset)?;
            let new_offset = running;
            running += block.len();
            private_blocks.push(block);

            let mut new_fd_dict = Vec::new();
            dict_push_int(&mut new_fd_dict, size as i64);
            dict_push_int(&mut new_fd_dict, new_offset as i64);
            dict_push_operator(&mut new_fd_dict, CFF_OP_PRIVATE);
            fd_dict_lengths.push(new_fd_dict.len());
            fd_dict_data.extend_from_slice(&new_fd_dict);
        }
        let fdarray_start = running;
        let fdarray_bytes = build_cff_index(&fd_dict_lengths, &fd_dict_data);
        let fdselect_start = fdarray_start + fdarray_bytes.len();

        patch_placeholder(
            &mut out[name_bytes.len() + cff.hdr_size..],
            topdict_header_len + fdarray_patch_at.unwrap(),
            fdarray_start as u32,
        );
        patch_placeholder(
            &mut out[name_bytes.len() + cff.hdr_size..],
            topdict_header_len + fdselect_patch_at.unwrap(),
            fdselect_start as u32,
        );

        for block in &private_blocks {
            out.extend_from_slice(block);
        }
        out.extend_from_slice(&fdarray_bytes);
        out.extend_from_slice(&new_fdselect_bytes);
    } else {
        let private_start = tail_start;
        if let Some((size, offset)) = cff.top_dict.private {
            patch_placeholder(
                &mut out[name_bytes.len() + cff.hdr_size..],
                topdict_header_len + private_patch_at.unwrap(),
                private_start as u32,
            );
            let block = copy_private_block(data, size, offset)?;
            out.extend_from_slice(&block);
        }
    }

    Ok(out)
}

fn slice_range(data: &[u8], range: (usize, usize)) -> Result<&[u8]> {
    data.get(range.0..range.1)
        .ok_or_else(|| Error::MalformedFontFile("CFF INDEX out of bounds".into()))
}

/// Copies a Private DICT's bytes plus, if it declares a `Subrs` operator,
/// the Local Subrs INDEX that follows it — together, since the `Subrs`
/// operand is an offset relative to the start of the Private DICT and
/// stays valid as long as the two are moved as one contiguous unit.
fn copy_private_block(data: &[u8], size: usize, offset: usize) -> Result<Vec<u8>> {
    let dict_bytes = data
        .get(offset..offset + size)
        .ok_or_else(|| Error::MalformedFontFile("CFF Private DICT out of bounds".into()))?;
    let mut end = offset + size;
    if let Some(relative) = cff::parse_private_subrs_offset(dict_bytes)? {
        let subrs_index = CffIndex::parse(data, offset + relative)?;
        end = end.max(subrs_index.end_offset);
    }
    data.get(offset..end)
        .map(|s| s.to_vec())
        .ok_or_else(|| Error::MalformedFontFile("CFF Local Subrs out of bounds".into()))
}

/// Pushes a CFF DICT operator (single byte for 0-21, `12 <n>` escape form
/// for anything higher, matching how `font::cff::parse_top_dict` decodes it).
fn dict_push_operator(out: &mut Vec<u8>, op: u16) {
    if op > 21 {
        out.push(12);
        out.push((op & 0xff) as u8);
    } else {
        out.push(op as u8);
    }
}

/// Pushes a DICT integer operand using the fixed 5-byte form (`29` plus a
/// big-endian `i32`), always legal regardless of magnitude, so patching a
/// value later never changes the DICT's length.
fn dict_push_int(out: &mut Vec<u8>, value: i64) {
    out.push(29);
    push_u32_be(out, (value as i32) as u32);
}

/// Pushes a placeholder integer operand and returns the byte offset of its
/// 4-byte value field within `out`, for [`patch_placeholder`] to fill in
/// once the rewritten file's layout is known.
fn dict_push_placeholder(out: &mut Vec<u8>) -> usize {
    out.push(29);
    let at = out.len();
    out.extend_from_slice(&[0, 0, 0, 0]);
    at
}

fn patch_placeholder(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

fn build_cff_index(lengths: &[usize], data: &[u8]) -> Vec<u8> {
    let count = lengths.len() as u16;
    let mut out = Vec::new();
    push_u16_be(&mut out, count);
    if count == 0 {
        return out;
    }
    let total = data.len();
    let off_size: u8 = if total < 0xff {
        1
    } else if total < 0xffff {
        2
    } else {
        4
    };
    out.push(off_size);
    let mut offset = 1u32;
    let push_offset = |out: &mut Vec<u8>, value: u32, size: u8| match size {
        1 => out.push(value as u8),
        2 => push_u16_be(out, value as u16),
        _ => push_u32_be(out, value),
    };
    push_offset(&mut out, offset, off_size);
    for &len in lengths {
        offset += len as u32;
        push_offset(&mut out, offset, off_size);
    }
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notdef_is_always_index_zero() {
        let subset = Subset::new();
        assert_eq!(subset.glyphs[0], GlyphEntry::NotDef);
        assert_eq!(subset.len(), 1);
    }
}
