//! Hand-rolled TrueType/OpenType container parsing.
//!
//! Reads the sfnt table directory and the tables the subsetter and writer
//! need: `head`, `hhea`, `maxp`, `hmtx`, `loca`, `glyf`, `cmap`, plus the
//! optional `cvt `, `fpgm`, `prep`, `OS/2` tables carried through verbatim
//! or used for metrics.

use std::collections::BTreeMap;

use crate::bytes::{bounded_slice, read_i16_be, read_u16_be, read_u32_be};
use crate::errors::{Error, Result};

pub const TAG_HEAD: [u8; 4] = *b"head";
pub const TAG_HHEA: [u8; 4] = *b"hhea";
pub const TAG_MAXP: [u8; 4] = *b"maxp";
pub const TAG_HMTX: [u8; 4] = *b"hmtx";
pub const TAG_LOCA: [u8; 4] = *b"loca";
pub const TAG_GLYF: [u8; 4] = *b"glyf";
pub const TAG_CMAP: [u8; 4] = *b"cmap";
pub const TAG_CVT: [u8; 4] = *b"cvt ";
pub const TAG_FPGM: [u8; 4] = *b"fpgm";
pub const TAG_PREP: [u8; 4] = *b"prep";
pub const TAG_OS2: [u8; 4] = *b"OS/2";
pub const TAG_CFF: [u8; 4] = *b"CFF ";
pub const TAG_NAME: [u8; 4] = *b"name";

#[derive(Debug, Clone, Copy)]
pub struct TableEntry {
    pub checksum: u32,
    pub offset: u32,
    pub length: u32,
}

/// The sfnt table directory: a tag to (offset, length) map, resolved
/// against the TTC header's subfont table when the container is a
/// collection.
#[derive(Debug, Clone)]
pub struct TableDirectory {
    pub sfnt_version: u32,
    pub tables: BTreeMap<[u8; 4], TableEntry>,
}

impl TableDirectory {
    pub fn parse(data: &[u8], font_index: usize) -> Result<Self> {
        let tag = read_u32_be(data, 0)?;
        let directory_offset = if tag == 0x74746366 {
            // 'ttcf' - TrueType collection
            let num_fonts = read_u32_be(data, 8)? as usize;
            if font_index >= num_fonts {
                return Err(Error::IndexOutOfBounds {
                    index: font_index,
                    len: num_fonts,
                });
            }
            read_u32_be(data, 12 + font_index * 4)? as usize
        } else {
            0
        };

        let sfnt_version = read_u32_be(data, directory_offset)?;
        if sfnt_version != 0x00010000 && sfnt_version != 0x4F54544F && sfnt_version != 0x74727565 {
            return Err(Error::UnsupportedFormat(format!(
                "unrecognized sfnt version 0x{sfnt_version:08X}"
            )));
        }
        let num_tables = read_u16_be(data, directory_offset + 4)? as usize;

        let mut tables = BTreeMap::new();
        for i in 0..num_tables {
            let rec_offset = directory_offset + 12 + i * 16;
            let tag_bytes = bounded_slice(data, rec_offset, 4)?;
            let mut tag = [0u8; 4];
            tag.copy_from_slice(tag_bytes);
            let checksum = read_u32_be(data, rec_offset + 4)?;
            let offset = read_u32_be(data, rec_offset + 8)?;
            let length = read_u32_be(data, rec_offset + 12)?;
            tables.insert(tag, TableEntry { checksum, offset, length });
        }

        Ok(TableDirectory { sfnt_version, tables })
    }

    pub fn table<'a>(&self, data: &'a [u8], tag: [u8; 4]) -> Result<&'a [u8]> {
        let entry = self
            .tables
            .get(&tag)
            .ok_or_else(|| Error::MalformedFontFile(format!("missing required table {:?}", String::from_utf8_lossy(&tag))))?;
        bounded_slice(data, entry.offset as usize, entry.length as usize)
    }

    pub fn has_table(&self, tag: [u8; 4]) -> bool {
        self.tables.contains_key(&tag)
    }

    pub fn is_cff(&self) -> bool {
        self.has_table(TAG_CFF)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadTable {
    pub units_per_em: u16,
    pub flags: u16,
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
    pub index_to_loc_format: i16,
    pub checksum_adjustment_offset: usize,
}

impl HeadTable {
    pub fn parse(table: &[u8]) -> Result<Self> {
        let magic = read_u32_be(table, 12)?;
        if magic != 0x5F0F3CF5 {
            return Err(Error::MalformedFontFile("head.magicNumber mismatch".into()));
        }
        Ok(HeadTable {
            units_per_em: match read_u16_be(table, 18)? {
                0 => 1000,
                other => other,
            },
            flags: read_u16_be(table, 16)?,
            x_min: read_i16_be(table, 36)?,
            y_min: read_i16_be(table, 38)?,
            x_max: read_i16_be(table, 40)?,
            y_max: read_i16_be(table, 42)?,
            index_to_loc_format: read_i16_be(table, 50)?,
            checksum_adjustment_offset: 8,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HheaTable {
    pub ascender: i16,
    pub descender: i16,
    pub line_gap: i16,
    pub advance_width_max: u16,
    pub min_left_side_bearing: i16,
    pub min_right_side_bearing: i16,
    pub x_max_extent: i16,
    pub caret_slope_rise: i16,
    pub caret_slope_run: i16,
    pub caret_offset: i16,
    pub num_h_metrics: u16,
}

impl HheaTable {
    pub fn parse(table: &[u8]) -> Result<Self> {
        Ok(HheaTable {
            ascender: read_i16_be(table, 4)?,
            descender: read_i16_be(table, 6)?,
            line_gap: read_i16_be(table, 8)?,
            advance_width_max: read_u16_be(table, 10)?,
            min_left_side_bearing: read_i16_be(table, 12)?,
            min_right_side_bearing: read_i16_be(table, 14)?,
            x_max_extent: read_i16_be(table, 16)?,
            caret_slope_rise: read_i16_be(table, 18)?,
            caret_slope_run: read_i16_be(table, 20)?,
            caret_offset: read_i16_be(table, 22)?,
            num_h_metrics: read_u16_be(table, 34)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaxpTable {
    pub version: u32,
    pub num_glyphs: u16,
}

impl MaxpTable {
    pub fn parse(table: &[u8]) -> Result<Self> {
        Ok(MaxpTable {
            version: read_u32_be(table, 0)?,
            num_glyphs: read_u16_be(table, 4)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LongHorMetric {
    pub advance_width: u16,
    pub left_side_bearing: i16,
}

#[derive(Debug, Clone)]
pub struct HmtxTable {
    pub metrics: Vec<LongHorMetric>,
}

impl HmtxTable {
    pub fn parse(table: &[u8], num_h_metrics: u16, num_glyphs: u16) -> Result<Self> {
        let num_h_metrics = num_h_metrics as usize;
        let mut metrics = Vec::with_capacity(num_glyphs as usize);
        let mut last_advance = 0u16;
        for i in 0..num_h_metrics {
            let off = i * 4;
            let advance_width = read_u16_be(table, off)?;
            let left_side_bearing = read_i16_be(table, off + 2)?;
            last_advance = advance_width;
            metrics.push(LongHorMetric { advance_width, left_side_bearing });
        }
        let remaining = num_glyphs as usize - num_h_metrics.min(num_glyphs as usize);
        for i in 0..remaining {
            let off = num_h_metrics * 4 + i * 2;
            let left_side_bearing = read_i16_be(table, off)?;
            metrics.push(LongHorMetric { advance_width: last_advance, left_side_bearing });
        }
        Ok(HmtxTable { metrics })
    }

    pub fn advance(&self, glyph_id: u16) -> u16 {
        self.metrics
            .get(glyph_id as usize)
            .map(|m| m.advance_width)
            .unwrap_or(0)
    }
}

/// Offsets into `glyf`, one past the last for `loca[numGlyphs]`.
#[derive(Debug, Clone)]
pub struct LocaTable {
    pub offsets: Vec<u32>,
}

impl LocaTable {
    pub fn parse(table: &[u8], num_glyphs: u16, long_format: bool) -> Result<Self> {
        let count = num_glyphs as usize + 1;
        let mut offsets = Vec::with_capacity(count);
        if long_format {
            for i in 0..count {
                offsets.push(read_u32_be(table, i * 4)?);
            }
        } else {
            for i in 0..count {
                offsets.push(read_u16_be(table, i * 2)? as u32 * 2);
            }
        }
        Ok(LocaTable { offsets })
    }

    pub fn glyph_range(&self, glyph_id: u16) -> Option<(u32, u32)> {
        let i = glyph_id as usize;
        let start = *self.offsets.get(i)?;
        let end = *self.offsets.get(i + 1)?;
        Some((start, end))
    }
}

/// A parsed glyph: whether it is composite, and if so which glyph indices
/// it references (needed for the subsetter's transitive closure).
#[derive(Debug, Clone)]
pub struct GlyfRecord<'a> {
    pub raw: &'a [u8],
    pub is_composite: bool,
    pub component_glyph_ids: Vec<u16>,
    /// Byte offsets (relative to `raw`) of each component's glyph-index
    /// field, so the subsetter can patch them in place when renumbering.
    pub component_glyph_id_offsets: Vec<usize>,
    pub bbox: Option<GlyphBoundingBox>,
}

#[derive(Debug, Clone, Copy)]
pub struct GlyphBoundingBox {
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
}

const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

pub fn parse_glyph<'a>(glyf: &'a [u8], loca: &LocaTable, glyph_id: u16) -> Result<GlyfRecord<'a>> {
    let (start, end) = loca.glyph_range(glyph_id).ok_or(Error::IndexOutOfBounds {
        index: glyph_id as usize,
        len: loca.offsets.len().saturating_sub(1),
    })?;
    if end <= start {
        // empty glyph (e.g. space)
        return Ok(GlyfRecord {
            raw: &[],
            is_composite: false,
            component_glyph_ids: Vec::new(),
            component_glyph_id_offsets: Vec::new(),
            bbox: None,
        });
    }
    let raw = bounded_slice(glyf, start as usize, (end - start) as usize)?;
    let number_of_contours = read_i16_be(raw, 0)?;
    let bbox = Some(GlyphBoundingBox {
        x_min: read_i16_be(raw, 2)?,
        y_min: read_i16_be(raw, 4)?,
        x_max: read_i16_be(raw, 6)?,
        y_max: read_i16_be(raw, 8)?,
    });

    if number_of_contours >= 0 {
        return Ok(GlyfRecord {
            raw,
            is_composite: false,
            component_glyph_ids: Vec::new(),
            component_glyph_id_offsets: Vec::new(),
            bbox,
        });
    }

    // composite glyph: walk the component records
    let mut offset = 10usize;
    let mut component_glyph_ids = Vec::new();
    let mut component_glyph_id_offsets = Vec::new();
    loop {
        let flags = read_u16_be(raw, offset)?;
        let glyph_index = read_u16_be(raw, offset + 2)?;
        component_glyph_ids.push(glyph_index);
        component_glyph_id_offsets.push(offset + 2);

        let mut cursor = offset + 4;
        cursor += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            cursor += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            cursor += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            cursor += 8;
        }

        if flags & MORE_COMPONENTS == 0 {
            break;
        }
        offset = cursor;
    }

    Ok(GlyfRecord {
        raw,
        is_composite: true,
        component_glyph_ids,
        component_glyph_id_offsets,
        bbox,
    })
}

/// Minimal cmap reader: supports format 4 (BMP, segment-mapped) and
/// format 12 (full Unicode, group-mapped), the two encodings real-world
/// fonts overwhelmingly use for a Unicode platform/encoding pair.
#[derive(Debug, Clone)]
pub enum CmapSubtable {
    Format4 {
        end_codes: Vec<u16>,
        start_codes: Vec<u16>,
        id_deltas: Vec<i16>,
        id_range_offsets: Vec<u16>,
        glyph_id_array_offset: usize,
        table: Vec<u8>,
    },
    Format12 {
        groups: Vec<(u32, u32, u32)>, // (start_char, end_char, start_glyph_id)
    },
}

impl CmapSubtable {
    pub fn map_glyph(&self, codepoint: u32) -> Option<u16> {
        match self {
            CmapSubtable::Format4 {
                end_codes,
                start_codes,
                id_deltas,
                id_range_offsets,
                glyph_id_array_offset,
                table,
            } => {
                if codepoint > 0xFFFF {
                    return None;
                }
                let cp = codepoint as u16;
                let seg = end_codes.iter().position(|&end| cp <= end)?;
                if cp < start_codes[seg] {
                    return None;
                }
                if id_range_offsets[seg] == 0 {
                    let gid = (cp as i32 + id_deltas[seg] as i32) as u16;
                    return if gid == 0 { None } else { Some(gid) };
                }
                let glyph_index_address = *glyph_id_array_offset
                    + seg * 2
                    + id_range_offsets[seg] as usize
                    + (cp - start_codes[seg]) as usize * 2;
                let raw = read_u16_be(table, glyph_index_address).ok()?;
                if raw == 0 {
                    None
                } else {
                    Some((raw as i32 + id_deltas[seg] as i32) as u16)
                }
            }
            CmapSubtable::Format12 { groups } => {
                for &(start, end, start_gid) in groups {
                    if codepoint >= start && codepoint <= end {
                        return Some((start_gid + (codepoint - start)) as u16);
                    }
                }
                None
            }
        }
    }
}

pub fn parse_cmap(table: &[u8]) -> Result<CmapSubtable> {
    let num_tables = read_u16_be(table, 2)? as usize;
    let mut best: Option<(u16, u16, usize)> = None;
    for i in 0..num_tables {
        let rec = 4 + i * 8;
        let platform_id = read_u16_be(table, rec)?;
        let encoding_id = read_u16_be(table, rec + 2)?;
        let offset = read_u32_be(table, rec + 4)? as usize;
        let rank = match (platform_id, encoding_id) {
            (3, 10) => 4,
            (0, 4) | (0, 6) => 4,
            (3, 1) => 3,
            (0, 3) => 3,
            (0, _) => 2,
            _ => 1,
        };
        if best.map(|(_, _, _)| true).unwrap_or(true) {
            let replace = match best {
                None => true,
                Some((_, best_rank, _)) => rank as u16 > best_rank,
            };
            if replace {
                best = Some((platform_id, rank as u16, offset));
            }
        }
    }
    let (_, _, subtable_offset) = best.ok_or(Error::MalformedFontFile("cmap has no usable subtable".into()))?;
    let sub = &table[subtable_offset..];
    let format = read_u16_be(sub, 0)?;
    match format {
        4 => {
            let seg_count_x2 = read_u16_be(sub, 6)? as usize;
            let seg_count = seg_count_x2 / 2;
            let end_codes_off = 14;
            let start_codes_off = end_codes_off + seg_count_x2 + 2;
            let id_delta_off = start_codes_off + seg_count_x2;
            let id_range_off = id_delta_off + seg_count_x2;
            let mut end_codes = Vec::with_capacity(seg_count);
            let mut start_codes = Vec::with_capacity(seg_count);
            let mut id_deltas = Vec::with_capacity(seg_count);
            let mut id_range_offsets = Vec::with_capacity(seg_count);
            for s in 0..seg_count {
                end_codes.push(read_u16_be(sub, end_codes_off + s * 2)?);
                start_codes.push(read_u16_be(sub, start_codes_off + s * 2)?);
                id_deltas.push(read_i16_be(sub, id_delta_off + s * 2)?);
                id_range_offsets.push(read_u16_be(sub, id_range_off + s * 2)?);
            }
            Ok(CmapSubtable::Format4 {
                end_codes,
                start_codes,
                id_deltas,
                id_range_offsets,
                glyph_id_array_offset: id_range_off,
                table: sub.to_vec(),
            })
        }
        12 => {
            let num_groups = read_u32_be(sub, 12)? as usize;
            let mut groups = Vec::with_capacity(num_groups);
            for g in 0..num_groups {
                let off = 16 + g * 12;
                let start_char = read_u32_be(sub, off)?;
                let end_char = read_u32_be(sub, off + 4)?;
                let start_gid = read_u32_be(sub, off + 8)?;
                groups.push((start_char, end_char, start_gid));
            }
            Ok(CmapSubtable::Format12 { groups })
        }
        other => Err(Error::UnsupportedFormat(format!("cmap subtable format {other}"))),
    }
}

/// All the fields from `head`/`hhea`/`OS/2` a layout caller cares about,
/// pre-scaled per-point-size by the `get_*` accessors.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FontMetrics {
    pub units_per_em: u16,
    pub font_flags: u16,
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,

    pub ascender: i16,
    pub descender: i16,
    pub line_gap: i16,
    pub advance_width_max: u16,
    pub min_left_side_bearing: i16,
    pub min_right_side_bearing: i16,
    pub x_max_extent: i16,
    pub caret_slope_rise: i16,
    pub caret_slope_run: i16,
    pub caret_offset: i16,
    pub num_h_metrics: u16,

    pub x_avg_char_width: i16,
    pub us_weight_class: u16,
    pub us_width_class: u16,
    pub fs_type: u16,
    pub fs_selection: u16,
    pub s_family_class: i16,
    pub panose: [u8; 10],

    pub s_typo_ascender: Option<i16>,
    pub s_typo_descender: Option<i16>,
    pub s_typo_line_gap: Option<i16>,
    pub us_win_ascent: Option<u16>,
    pub us_win_descent: Option<u16>,
    pub sx_height: Option<i16>,
    pub s_cap_height: Option<i16>,
}

impl Default for FontMetrics {
    fn default() -> Self {
        FontMetrics::zero()
    }
}

impl FontMetrics {
    /// Zero-sized font, for tests that don't load a real face.
    pub const fn zero() -> Self {
        FontMetrics {
            units_per_em: 1000,
            font_flags: 0,
            x_min: 0,
            y_min: 0,
            x_max: 0,
            y_max: 0,
            ascender: 0,
            descender: 0,
            line_gap: 0,
            advance_width_max: 0,
            min_left_side_bearing: 0,
            min_right_side_bearing: 0,
            x_max_extent: 0,
            caret_slope_rise: 0,
            caret_slope_run: 0,
            caret_offset: 0,
            num_h_metrics: 0,
            x_avg_char_width: 0,
            us_weight_class: 0,
            us_width_class: 0,
            fs_type: 0,
            fs_selection: 0,
            s_family_class: 0,
            panose: [0; 10],
            s_typo_ascender: None,
            s_typo_descender: None,
            s_typo_line_gap: None,
            us_win_ascent: None,
            us_win_descent: None,
            sx_height: None,
            s_cap_height: None,
        }
    }

    pub fn from_tables(head: &HeadTable, hhea: &HheaTable, os2: Option<&[u8]>) -> Result<Self> {
        let mut m = FontMetrics {
            units_per_em: head.units_per_em,
            font_flags: head.flags,
            x_min: head.x_min,
            y_min: head.y_min,
            x_max: head.x_max,
            y_max: head.y_max,
            ascender: hhea.ascender,
            descender: hhea.descender,
            line_gap: hhea.line_gap,
            advance_width_max: hhea.advance_width_max,
            min_left_side_bearing: hhea.min_left_side_bearing,
            min_right_side_bearing: hhea.min_right_side_bearing,
            x_max_extent: hhea.x_max_extent,
            caret_slope_rise: hhea.caret_slope_rise,
            caret_slope_run: hhea.caret_slope_run,
            caret_offset: hhea.caret_offset,
            num_h_metrics: hhea.num_h_metrics,
            ..FontMetrics::zero()
        };

        if let Some(os2) = os2 {
            let version = read_u16_be(os2, 0)?;
            m.x_avg_char_width = read_i16_be(os2, 2)?;
            m.us_weight_class = read_u16_be(os2, 4)?;
            m.us_width_class = read_u16_be(os2, 6)?;
            m.fs_type = read_u16_be(os2, 8)?;
            m.s_family_class = read_i16_be(os2, 30)?;
            let mut panose = [0u8; 10];
            panose.copy_from_slice(bounded_slice(os2, 32, 10)?);
            m.panose = panose;
            m.fs_selection = read_u16_be(os2, 62)?;
            if version >= 0 {
                m.s_typo_ascender = read_i16_be(os2, 68).ok();
                m.s_typo_descender = read_i16_be(os2, 70).ok();
                m.s_typo_line_gap = read_i16_be(os2, 72).ok();
                m.us_win_ascent = read_u16_be(os2, 74).ok();
                m.us_win_descent = read_u16_be(os2, 76).ok();
            }
            if version >= 2 {
                m.sx_height = read_i16_be(os2, 86).ok();
                m.s_cap_height = read_i16_be(os2, 88).ok();
            }
        }

        Ok(m)
    }

    pub fn use_typo_metrics(&self) -> bool {
        self.fs_selection & (1 << 7) != 0
    }

    pub fn get_ascender_unscaled(&self) -> i16 {
        if self.use_typo_metrics() {
            self.s_typo_ascender.unwrap_or(self.ascender)
        } else {
            self.ascender
        }
    }

    pub fn get_descender_unscaled(&self) -> i16 {
        if self.use_typo_metrics() {
            self.s_typo_descender.unwrap_or(self.descender)
        } else {
            self.descender
        }
    }

    pub fn get_line_gap_unscaled(&self) -> i16 {
        if self.use_typo_metrics() {
            self.s_typo_line_gap.unwrap_or(self.line_gap)
        } else {
            self.line_gap
        }
    }

    fn scale(&self, unscaled: i16, target_font_size: f32) -> f32 {
        unscaled as f32 / self.units_per_em as f32 * target_font_size
    }

    pub fn get_ascender(&self, target_font_size: f32) -> f32 {
        self.scale(self.get_ascender_unscaled(), target_font_size)
    }
    pub fn get_descender(&self, target_font_size: f32) -> f32 {
        self.scale(self.get_descender_unscaled(), target_font_size)
    }
    pub fn get_line_gap(&self, target_font_size: f32) -> f32 {
        self.scale(self.get_line_gap_unscaled(), target_font_size)
    }
    pub fn get_x_max_extent(&self, target_font_size: f32) -> f32 {
        self.scale(self.x_max_extent, target_font_size)
    }
    pub fn get_cap_height(&self, target_font_size: f32) -> Option<f32> {
        self.s_cap_height.map(|v| self.scale(v, target_font_size))
    }
    pub fn get_x_height(&self, target_font_size: f32) -> Option<f32> {
        self.sx_height.map(|v| self.scale(v, target_font_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_metrics_has_sane_units_per_em() {
        assert_eq!(FontMetrics::zero().units_per_em, 1000);
    }
}
