//! Endianness, bounded reads, compression and PDF text-quoting primitives
//! shared by the font subsetter, object formatter and writer.

use crate::errors::{Error, Result};
use std::io::Write as _;

pub fn read_u8(buf: &[u8], offset: usize) -> Result<u8> {
    buf.get(offset)
        .copied()
        .ok_or(Error::IndexOutOfBounds { index: offset, len: buf.len() })
}

pub fn read_u16_be(buf: &[u8], offset: usize) -> Result<u16> {
    let end = offset + 2;
    let slice = buf
        .get(offset..end)
        .ok_or(Error::IndexOutOfBounds { index: end, len: buf.len() })?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

pub fn read_i16_be(buf: &[u8], offset: usize) -> Result<i16> {
    Ok(read_u16_be(buf, offset)? as i16)
}

pub fn read_u32_be(buf: &[u8], offset: usize) -> Result<u32> {
    let end = offset + 4;
    let slice = buf
        .get(offset..end)
        .ok_or(Error::IndexOutOfBounds { index: end, len: buf.len() })?;
    Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

pub fn read_i32_be(buf: &[u8], offset: usize) -> Result<i32> {
    Ok(read_u32_be(buf, offset)? as i32)
}

pub fn read_u64_be(buf: &[u8], offset: usize) -> Result<u64> {
    let end = offset + 8;
    let slice = buf
        .get(offset..end)
        .ok_or(Error::IndexOutOfBounds { index: end, len: buf.len() })?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(slice);
    Ok(u64::from_be_bytes(arr))
}

/// Bounded substring extraction: returns a slice or an out-of-bounds error,
/// never panics on malformed table offsets.
pub fn bounded_slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    buf.get(offset..offset + len)
        .ok_or(Error::IndexOutOfBounds { index: offset + len, len: buf.len() })
}

pub fn push_u16_be(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn push_i16_be(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn push_u32_be(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn push_i32_be(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Pads `buf` with zero bytes up to the next 4-byte boundary.
pub fn pad_to_4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Sum of 32-bit big-endian words, wrapping, as required for sfnt table
/// checksums. The table is logically zero-padded to a 4-byte boundary.
pub fn sfnt_checksum(table: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    let mut chunks = table.chunks(4);
    for chunk in &mut chunks {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum = sum.wrapping_add(u32::from_be_bytes(word));
    }
    sum
}

pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| Error::CompressionFailure(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| Error::CompressionFailure(e.to_string()))
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::CompressionFailure(e.to_string()))?;
    Ok(out)
}

pub fn validate_utf8(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data).map_err(|_| Error::BadUtf8)
}

/// UTF-8 to UTF-16BE encoding, one or two 16-bit code units per codepoint
/// (surrogate pairs for astral codepoints), as required by ToUnicode CMaps.
pub fn utf16be_code_units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

pub fn utf16be_hex(s: &str) -> String {
    let mut out = String::new();
    for unit in utf16be_code_units(s) {
        out.push_str(&format!("{:04X}", unit));
    }
    out
}

/// Quotes a PDF literal string: escapes `(`, `)`, `\`, and control bytes
/// using octal escapes, matching `object_formatter`'s string tokens.
pub fn quote_pdf_literal_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('(');
    for &b in bytes {
        match b {
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            other => out.push_str(&format!("\\{:03o}", other)),
        }
    }
    out.push(')');
    out
}

/// Quotes a PDF name: `/` prefix, `#xx` escape for any byte outside
/// `[!-~]` minus the PDF delimiter set.
pub fn quote_pdf_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    out.push('/');
    for b in name.bytes() {
        match b {
            b'!'..=b'~'
                if !matches!(
                    b,
                    b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
                ) =>
            {
                out.push(b as char)
            }
            _ => out.push_str(&format!("#{:02X}", b)),
        }
    }
    out
}

pub fn hexstring(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 2);
    out.push('<');
    for &b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out.push('>');
    out
}

/// Canonical fixed-point formatting for PDF reals: no exponent, trailing
/// zeros (and a trailing dot) trimmed.
pub fn format_real(value: f64) -> String {
    let mut s = format!("{:.6}", value);
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_empty_padded_table() {
        assert_eq!(sfnt_checksum(&[0, 0, 0, 0]), 0);
    }

    #[test]
    fn checksum_matches_known_value() {
        // "true" as 4 ASCII bytes -> big-endian u32 0x74727565
        assert_eq!(sfnt_checksum(b"true"), 0x74727565);
    }

    #[test]
    fn real_formatting_trims_zeros() {
        assert_eq!(format_real(1.0), "1");
        assert_eq!(format_real(0.300), "0.3");
        assert_eq!(format_real(-0.0), "0");
    }

    #[test]
    fn literal_string_escapes_parens() {
        assert_eq!(quote_pdf_literal_string(b"a(b)c"), "(a\\(b\\)c)");
    }

    #[test]
    fn deflate_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let compressed = deflate(&data).unwrap();
        let restored = inflate(&compressed).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn utf16_hex_ascii() {
        assert_eq!(utf16be_hex("Hi"), "00480069");
    }
}
