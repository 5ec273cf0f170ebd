//! Compact Font Format parsing: CFF header, name/top-dict/string/
//! global-subr/char-strings INDEXes, per-font private-dict and
//! local-subrs, FDArray/FDSelect for CID-keyed fonts, and charset.

use crate::bytes::{bounded_slice, read_u16_be, read_u32_be, read_u8};
use crate::errors::{Error, Result};

/// A CFF INDEX: count-prefixed, offset-size-prefixed table of byte strings.
#[derive(Debug, Clone)]
pub struct CffIndex {
    /// Byte ranges into the original CFF blob, `(start, end)`.
    pub entries: Vec<(usize, usize)>,
    /// Offset just past the end of this INDEX structure in the CFF blob.
    pub end_offset: usize,
}

impl CffIndex {
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let count = read_u16_be(data, offset)? as usize;
        if count == 0 {
            return Ok(CffIndex { entries: Vec::new(), end_offset: offset + 2 });
        }
        let off_size = read_u8(data, offset + 2)? as usize;
        let offsets_start = offset + 3;
        let mut offsets = Vec::with_capacity(count + 1);
        for i in 0..=count {
            let pos = offsets_start + i * off_size;
            let value = read_offset(data, pos, off_size)?;
            offsets.push(value);
        }
        let data_start = offsets_start + (count + 1) * off_size - 1;
        let mut entries = Vec::with_capacity(count);
        for w in offsets.windows(2) {
            entries.push((data_start + w[0], data_start + w[1]));
        }
        let end_offset = data_start + offsets[count];
        Ok(CffIndex { entries, end_offset })
    }

    pub fn get<'a>(&self, data: &'a [u8], index: usize) -> Result<&'a [u8]> {
        let (start, end) = *self
            .entries
            .get(index)
            .ok_or(Error::IndexOutOfBounds { index, len: self.entries.len() })?;
        bounded_slice(data, start, end - start)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_offset(data: &[u8], pos: usize, size: usize) -> Result<usize> {
    let mut value = 0usize;
    for i in 0..size {
        value = (value << 8) | read_u8(data, pos + i)? as usize;
    }
    Ok(value)
}

/// A CFF DICT is a sequence of (operands, operator) pairs. This parses
/// just enough of the key/value space the subsetter and writer need:
/// CharStrings offset, charset offset, Private dict (size, offset),
/// ROS/CIDCount (CID-keyed fonts), FDArray / FDSelect offsets, and the
/// font matrix (only non-default matrices are round-tripped by name).
#[derive(Debug, Clone, Default)]
pub struct TopDict {
    pub charstrings_offset: Option<usize>,
    pub charset_offset: Option<usize>,
    pub private: Option<(usize, usize)>, // (size, offset)
    pub is_cid_keyed: bool,
    pub ros: Option<(f64, f64, f64)>, // (registry SID, order SID, supplement)
    pub cid_count: Option<f64>,
    pub fdarray_offset: Option<usize>,
    pub fdselect_offset: Option<usize>,
    pub font_matrix: Option<[f64; 6]>,
}

const OP_CHARSTRINGS: u16 = 17;
const OP_CHARSET: u16 = 15;
const OP_PRIVATE: u16 = 18;
const OP_ROS: u16 = 0x0c1e; // 12 30
const OP_CID_COUNT: u16 = 0x0c22; // 12 34
const OP_FDARRAY: u16 = 0x0c24; // 12 36
const OP_FDSELECT: u16 = 0x0c25; // 12 37
const OP_FONT_MATRIX: u16 = 0x0c07; // 12 7

/// Walks a CFF DICT's (operands, operator) entries, calling `on_entry`
/// with the operator code and the operand stack accumulated before it.
/// Shared by [`parse_top_dict`] and [`parse_private_subrs_offset`] — both
/// a TopDict and a Private DICT use the exact same operand/operator byte
/// grammar, just a different set of keys.
fn walk_dict(data: &[u8], mut on_entry: impl FnMut(u16, &[f64])) -> Result<()> {
    let mut operands: Vec<f64> = Vec::new();
    let mut i = 0usize;
    while i < data.len() {
        let b0 = data[i];
        if b0 <= 21 {
            let operator = if b0 == 12 {
                let b1 = *data.get(i + 1).unwrap_or(&0);
                i += 2;
                0x0c00 | b1 as u16
            } else {
                i += 1;
                b0 as u16
            };
            on_entry(operator, &operands);
            operands.clear();
        } else if b0 == 28 {
            let v = read_u16_be(data, i + 1)? as i16;
            operands.push(v as f64);
            i += 3;
        } else if b0 == 29 {
            let v = read_u32_be(data, i + 1)? as i32;
            operands.push(v as f64);
            i += 5;
        } else if (32..=246).contains(&b0) {
            operands.push(b0 as f64 - 139.0);
            i += 1;
        } else if (247..=250).contains(&b0) {
            let b1 = *data.get(i + 1).unwrap_or(&0);
            operands.push((b0 as f64 - 247.0) * 256.0 + b1 as f64 + 108.0);
            i += 2;
        } else if (251..=254).contains(&b0) {
            let b1 = *data.get(i + 1).unwrap_or(&0);
            operands.push(-(b0 as f64 - 251.0) * 256.0 - b1 as f64 - 108.0);
            i += 2;
        } else if b0 == 30 {
            let (value, next) = decode_real(data, i + 1)?;
            operands.push(value);
            i = next;
        } else {
            i += 1;
        }
    }
    Ok(())
}

pub fn parse_top_dict(data: &[u8]) -> Result<TopDict> {
    let mut dict = TopDict::default();
    walk_dict(data, |operator, operands| match operator {
        OP_CHARSTRINGS => dict.charstrings_offset = operands.last().map(|v| *v as usize),
        OP_CHARSET => dict.charset_offset = operands.last().map(|v| *v as usize),
        OP_PRIVATE => {
            if operands.len() >= 2 {
                dict.private = Some((operands[0] as usize, operands[1] as usize));
            }
        }
        OP_ROS => {
            if operands.len() >= 3 {
                dict.ros = Some((operands[0], operands[1], operands[2]));
            }
            dict.is_cid_keyed = true;
        }
        OP_CID_COUNT => dict.cid_count = operands.last().copied(),
        OP_FDARRAY => dict.fdarray_offset = operands.last().map(|v| *v as usize),
        OP_FDSELECT => dict.fdselect_offset = operands.last().map(|v| *v as usize),
        OP_FONT_MATRIX => {
            if operands.len() >= 6 {
                let mut m = [0.0; 6];
                m.copy_from_slice(&operands[operands.len() - 6..]);
                dict.font_matrix = Some(m);
            }
        }
        _ => {}
    })?;
    Ok(dict)
}

const OP_PRIVATE_SUBRS: u16 = 19;

/// Parses a Private DICT's `Subrs` operator: the offset of its local
/// subroutine INDEX, relative to the start of the Private DICT itself.
pub fn parse_private_subrs_offset(data: &[u8]) -> Result<Option<usize>> {
    let mut subrs = None;
    walk_dict(data, |operator, operands| {
        if operator == OP_PRIVATE_SUBRS {
            subrs = operands.last().map(|v| *v as usize);
        }
    })?;
    Ok(subrs)
}

/// Decodes a CFF nibble-encoded real number starting just past the `30`
/// lead byte. Returns the value and the index just past its terminator.
fn decode_real(data: &[u8], start: usize) -> Result<(f64, usize)> {
    let mut s = String::new();
    let mut pos = start;
    'outer: loop {
        let byte = read_u8(data, pos)?;
        pos += 1;
        for nibble in [byte >> 4, byte & 0x0f] {
            match nibble {
                0..=9 => s.push((b'0' + nibble) as char),
                0xa => s.push('.'),
                0xb => s.push('E'),
                0xc => s.push_str("E-"),
                0xe => s.push('-'),
                0xf => break 'outer,
                _ => {}
            }
        }
    }
    Ok((s.parse::<f64>().unwrap_or(0.0), pos))
}

/// Encodes a real number in CFF nibble form (operator `30` plus packed
/// digit/`.`/`E`/`-`/terminator nibbles), the inverse of [`decode_real`].
pub fn encode_real(out: &mut Vec<u8>, value: f64) {
    let text = format!("{value}");
    let chars: Vec<char> = text.chars().collect();
    let mut nibbles: Vec<u8> = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            c @ '0'..='9' => {
                nibbles.push(c as u8 - b'0');
                i += 1;
            }
            '.' => {
                nibbles.push(0xa);
                i += 1;
            }
            '-' => {
                nibbles.push(0xe);
                i += 1;
            }
            'e' | 'E' => {
                if chars.get(i + 1) == Some(&'-') {
                    nibbles.push(0xc);
                    i += 2;
                } else {
                    nibbles.push(0xb);
                    i += 1;
                    if chars.get(i) == Some(&'+') {
                        i += 1;
                    }
                }
            }
            _ => i += 1,
        }
    }
    nibbles.push(0xf);
    if nibbles.len() % 2 != 0 {
        nibbles.push(0xf);
    }
    out.push(30);
    for pair in nibbles.chunks(2) {
        out.push((pair[0] << 4) | pair[1]);
    }
}

/// Parses a CFF charset (format 0, 1 or 2) into a `gid -> SID`/`gid -> CID`
/// table (the two share a byte layout, differing only in how the readers
/// interpret the numbers). `gid` 0 (`.notdef`) always maps to 0 and carries
/// no charset entry of its own.
pub fn parse_charset(data: &[u8], offset: usize, num_glyphs: usize) -> Result<Vec<u16>> {
    let mut table = vec![0u16; num_glyphs];
    if num_glyphs <= 1 {
        return Ok(table);
    }
    let format = read_u8(data, offset)?;
    match format {
        0 => {
            let mut pos = offset + 1;
            for slot in table.iter_mut().take(num_glyphs).skip(1) {
                *slot = read_u16_be(data, pos)?;
                pos += 2;
            }
        }
        1 => {
            let mut pos = offset + 1;
            let mut gid = 1usize;
            while gid < num_glyphs {
                let first_sid = read_u16_be(data, pos)?;
                let n_left = read_u8(data, pos + 2)? as usize;
                pos += 3;
                for i in 0..=n_left {
                    if gid >= num_glyphs {
                        break;
                    }
                    table[gid] = first_sid + i as u16;
                    gid += 1;
                }
            }
        }
        2 => {
            let mut pos = offset + 1;
            let mut gid = 1usize;
            while gid < num_glyphs {
                let first_sid = read_u16_be(data, pos)?;
                let n_left = read_u16_be(data, pos + 2)? as usize;
                pos += 4;
                for i in 0..=n_left {
                    if gid >= num_glyphs {
                        break;
                    }
                    table[gid] = first_sid + i as u16;
                    gid += 1;
                }
            }
        }
        other => return Err(Error::UnsupportedFormat(format!("CFF charset format {other}"))),
    }
    Ok(table)
}

/// FDSelect maps each glyph id to an FD (font dict) index, format 0
/// (array) or format 3 (ranges).
#[derive(Debug, Clone)]
pub enum FdSelect {
    Format0(Vec<u8>),
    Format3 { ranges: Vec<(u16, u8)>, sentinel: u16 },
}

impl FdSelect {
    pub fn parse(data: &[u8], offset: usize, num_glyphs: u16) -> Result<Self> {
        let format = read_u8(data, offset)?;
        match format {
            0 => {
                let fds = bounded_slice(data, offset + 1, num_glyphs as usize)?.to_vec();
                Ok(FdSelect::Format0(fds))
            }
            3 => {
                let n_ranges = read_u16_be(data, offset + 1)? as usize;
                let mut ranges = Vec::with_capacity(n_ranges);
                for i in 0..n_ranges {
                    let pos = offset + 3 + i * 3;
                    let first = read_u16_be(data, pos)?;
                    let fd = read_u8(data, pos + 2)?;
                    ranges.push((first, fd));
                }
                let sentinel = read_u16_be(data, offset + 3 + n_ranges * 3)?;
                Ok(FdSelect::Format3 { ranges, sentinel })
            }
            other => Err(Error::UnsupportedFormat(format!("FDSelect format {other}"))),
        }
    }

    pub fn fd_for_glyph(&self, glyph_id: u16) -> u8 {
        match self {
            FdSelect::Format0(fds) => fds.get(glyph_id as usize).copied().unwrap_or(0),
            FdSelect::Format3 { ranges, .. } => {
                let mut fd = 0;
                for &(first, value) in ranges {
                    if glyph_id >= first {
                        fd = value;
                    } else {
                        break;
                    }
                }
                fd
            }
        }
    }
}

/// Parsed CFF table: the pieces the subsetter rewrites, plus the raw byte
/// ranges of the leading INDEXes the subsetter carries through verbatim
/// (Name, String, Global Subrs — none of their *content* depends on which
/// glyphs end up in the subset).
pub struct CffTable<'a> {
    pub data: &'a [u8],
    pub hdr_size: usize,
    pub top_dict: TopDict,
    pub name_range: (usize, usize),
    pub string_range: (usize, usize),
    pub global_subrs_range: (usize, usize),
    pub charstrings: CffIndex,
    pub global_subrs: CffIndex,
    pub fdselect: Option<FdSelect>,
}

impl<'a> CffTable<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let hdr_size = read_u8(data, 2)? as usize;
        let name_index = CffIndex::parse(data, hdr_size)?;
        let top_dict_index = CffIndex::parse(data, name_index.end_offset)?;
        let string_index = CffIndex::parse(data, top_dict_index.end_offset)?;
        let global_subrs = CffIndex::parse(data, string_index.end_offset)?;

        let top_dict_bytes = top_dict_index.get(data, 0)?;
        let top_dict = parse_top_dict(top_dict_bytes)?;

        let charstrings_offset = top_dict
            .charstrings_offset
            .ok_or(Error::MalformedFontFile("CFF TopDict missing CharStrings".into()))?;
        let charstrings = CffIndex::parse(data, charstrings_offset)?;

        let fdselect = match top_dict.fdselect_offset {
            Some(off) => Some(FdSelect::parse(data, off, charstrings.len() as u16)?),
            None => None,
        };

        Ok(CffTable {
            data,
            hdr_size,
            top_dict,
            name_range: (hdr_size, name_index.end_offset),
            string_range: (top_dict_index.end_offset, string_index.end_offset),
            global_subrs_range: (string_index.end_offset, global_subrs.end_offset),
            charstrings,
            global_subrs,
            fdselect,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_index() {
        let data = [0u8, 0];
        let idx = CffIndex::parse(&data, 0).unwrap();
        assert!(idx.is_empty());
        assert_eq!(idx.end_offset, 2);
    }

    #[test]
    fn top_dict_charstrings_operand() {
        // operand 100 (encoded as 32..246 range: byte = value + 139), operator 17
        let dict = [100u8 + 139, 17];
        let parsed = parse_top_dict(&dict).unwrap();
        assert_eq!(parsed.charstrings_offset, Some(100));
    }
}
