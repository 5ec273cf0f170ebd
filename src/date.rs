//! Timestamp acquisition. The only place the crate touches the system
//! clock or environment, so that `SOURCE_DATE_EPOCH` reproducibility
//! has a single chokepoint.

pub use time::OffsetDateTime;

/// Returns the timestamp to embed in `CreationDate`/`ModDate` and, when
/// deterministic output is requested, the trailer `/ID`. Honors
/// `SOURCE_DATE_EPOCH` (seconds since the Unix epoch) if set and parseable;
/// falls back to the current wall-clock time otherwise.
pub fn generation_timestamp() -> OffsetDateTime {
    if let Ok(raw) = std::env::var("SOURCE_DATE_EPOCH") {
        if let Ok(secs) = raw.trim().parse::<i64>() {
            if let Ok(dt) = OffsetDateTime::from_unix_timestamp(secs) {
                return dt;
            }
        }
    }
    OffsetDateTime::now_utc()
}

/// True when `SOURCE_DATE_EPOCH` is set, used to decide whether the
/// trailer `/ID` should also be made deterministic.
pub fn reproducible_build_requested() -> bool {
    std::env::var("SOURCE_DATE_EPOCH").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_date_epoch_overrides_clock() {
        std::env::set_var("SOURCE_DATE_EPOCH", "1700000000");
        let dt = generation_timestamp();
        assert_eq!(dt.unix_timestamp(), 1700000000);
        std::env::remove_var("SOURCE_DATE_EPOCH");
    }
}
