//! Small stateless helpers: PRNG for trailer `/ID` blobs, date formatting
//! for the Info dictionary and XMP metadata.

use crate::date::OffsetDateTime;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Since the random number generator doesn't have to be cryptographically
/// secure it doesn't make sense to import the entire rand crate, so this is
/// just a xorshift pseudo-random function, same approach the rest of the
/// ecosystem uses for non-adversarial identifiers.
static RAND_SEED: AtomicUsize = AtomicUsize::new(2100);

pub(crate) fn random_number() -> usize {
    let mut x = RAND_SEED.fetch_add(21, Ordering::SeqCst);
    #[cfg(target_pointer_width = "64")]
    {
        x ^= x << 21;
        x ^= x >> 35;
        x ^= x << 4;
        x
    }

    #[cfg(target_pointer_width = "32")]
    {
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        x
    }
}

/// Returns a string with 32 random hex-ish characters, used to build the
/// two trailer `/ID` blobs when the build is not seeded for reproducibility.
pub(crate) fn random_character_string_32() -> String {
    const MAX_CHARS: usize = 32;
    let mut final_string = String::with_capacity(MAX_CHARS);
    let mut char_pos = 0;

    'outer: while char_pos < MAX_CHARS {
        let rand = format!("{}", random_number());
        for ch in rand.chars() {
            if char_pos < MAX_CHARS {
                final_string.push(u8_to_char(ch.to_digit(10).unwrap() as u8));
                char_pos += 1;
            } else {
                break 'outer;
            }
        }
    }

    final_string
}

/// Deterministic 16-byte hex blob derived from the document's timestamp,
/// used for the trailer `/ID` when `SOURCE_DATE_EPOCH` requests
/// reproducible output instead of a random identifier.
pub(crate) fn deterministic_id_string(seed: &OffsetDateTime) -> String {
    format!("{:032X}", seed.unix_timestamp().unsigned_abs() as u128)
}

// D:20170505150224+02'00'
pub(crate) fn to_pdf_time_stamp_metadata(date: &OffsetDateTime) -> String {
    let offset = date.offset();
    let offset_sign = if offset.is_negative() { '-' } else { '+' };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}{offset_sign}{:02}'{:02}'",
        date.year(),
        u8::from(date.month()),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
        offset.whole_hours().abs(),
        offset.minutes_past_hour().abs(),
    )
}

// D:2018-09-19T10:05:05+00'00'
pub(crate) fn to_pdf_xmp_date(date: &OffsetDateTime) -> String {
    format!(
        "D:{:04}-{:02}-{:02}T{:02}:{:02}:{:02}+00'00'",
        date.year(),
        u8::from(date.month()),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
    )
}

/// `0 => A`, `1 => B`, and so on
#[inline(always)]
fn u8_to_char(input: u8) -> char {
    (b'A' + input) as char
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_string_is_32_chars() {
        assert_eq!(random_character_string_32().len(), 32);
    }
}
