use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Attach a zone to a wall-clock time. Ambiguous times (DST fall-back) take the
/// earlier instant; times inside a spring-forward gap shift one hour later.
pub fn localize(naive: NaiveDateTime, zone: Tz) -> Option<DateTime<FixedOffset>> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.fixed_offset()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.fixed_offset()),
        LocalResult::None => zone
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.fixed_offset()),
    }
}

pub fn local_midnight(date: NaiveDate, zone: Tz) -> Option<DateTime<FixedOffset>> {
    localize(date.and_time(NaiveTime::MIN), zone)
}

/// Re-express an instant in `zone`.
pub fn in_zone<O: TimeZone>(dt: &DateTime<O>, zone: Tz) -> DateTime<FixedOffset> {
    dt.with_timezone(&zone).fixed_offset()
}

pub fn utc_in_zone(naive_utc: NaiveDateTime, zone: Tz) -> DateTime<FixedOffset> {
    in_zone(&Utc.from_utc_datetime(&naive_utc), zone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::America::Chicago;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_localize_regular() {
        let dt = localize(naive(2025, 7, 4, 9, 0), Chicago).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), -5 * 3600);
        assert_eq!(dt.hour(), 9);
    }

    #[test]
    fn test_localize_fall_back_takes_earliest() {
        let dt = localize(naive(2025, 11, 2, 1, 30), Chicago).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_localize_spring_gap_shifts_forward() {
        let dt = localize(naive(2025, 3, 9, 2, 30), Chicago).unwrap();
        assert_eq!(dt.hour(), 3);
        assert_eq!(dt.minute(), 30);
    }
}
