//! MS-DOS packed date/time fields.
//!
//! ZIP headers store the modification time as two 16-bit words:
//!
//! ```text
//! date: bits 15-9 year-1980 | bits 8-5 month (1-12) | bits 4-0 day (1-31)
//! time: bits 15-11 hour     | bits 10-5 minute      | bits 4-0 seconds/2
//! ```
//!
//! The format has no time zone and only 2-second resolution, so a round
//! trip through [`DosDateTime`] can lose up to one second.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Packed DOS timestamp as stored in local and central headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    pub date: u16,
    pub time: u16,
}

const MIN_YEAR: i32 = 1980;
const MAX_YEAR: i32 = 2107;

impl DosDateTime {
    pub fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Pack a calendar timestamp. Years outside 1980..=2107 saturate.
    pub fn encode(datetime: &NaiveDateTime) -> Self {
        if datetime.year() < MIN_YEAR {
            return Self::new(1 << 5 | 1, 0);
        }
        if datetime.year() > MAX_YEAR {
            // 2107-12-31 23:59:58
            return Self::new(
                ((MAX_YEAR - MIN_YEAR) as u16) << 9 | 12 << 5 | 31,
                23 << 11 | 59 << 5 | 29,
            );
        }

        let date = ((datetime.year() - MIN_YEAR) as u16) << 9
            | (datetime.month() as u16) << 5
            | datetime.day() as u16;
        // A leap second shows up as second 59 with extra nanoseconds, so
        // seconds never exceed 59 here.
        let time = (datetime.hour() as u16) << 11
            | (datetime.minute() as u16) << 5
            | (datetime.second() as u16) >> 1;

        Self::new(date, time)
    }

    pub fn year(&self) -> i32 {
        ((self.date >> 9) & 0x7f) as i32 + MIN_YEAR
    }

    pub fn month(&self) -> u32 {
        ((self.date >> 5) & 0x0f) as u32
    }

    pub fn day(&self) -> u32 {
        (self.date & 0x1f) as u32
    }

    pub fn hour(&self) -> u32 {
        ((self.time >> 11) & 0x1f) as u32
    }

    pub fn minute(&self) -> u32 {
        ((self.time >> 5) & 0x3f) as u32
    }

    pub fn second(&self) -> u32 {
        ((self.time & 0x1f) * 2) as u32
    }

    /// Unpack into a calendar timestamp.
    ///
    /// Foreign archives sometimes carry zeroed or out-of-range fields, so each
    /// component is clamped into its valid range instead of failing.
    pub fn decode(&self) -> NaiveDateTime {
        let year = self.year();
        let month = self.month().clamp(1, 12);
        let day = self.day().clamp(1, days_in_month(year, month));

        // Every component is in range after clamping, so both constructors succeed.
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| {
                date.and_hms_opt(
                    self.hour().min(23),
                    self.minute().min(59),
                    self.second().min(58),
                )
            })
            .unwrap_or_default()
    }
}

impl From<&NaiveDateTime> for DosDateTime {
    fn from(datetime: &NaiveDateTime) -> Self {
        Self::encode(datetime)
    }
}

impl From<DosDateTime> for NaiveDateTime {
    fn from(dos: DosDateTime) -> Self {
        dos.decode()
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if NaiveDate::from_ymd_opt(year, 2, 29).is_some() => 29,
        2 => 28,
        _ => 31,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn datetime(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_encode_bit_layout() {
        let dos = DosDateTime::encode(&datetime(2023, 6, 15, 14, 30, 45));
        assert_eq!(dos.date, (43 << 9) | (6 << 5) | 15);
        assert_eq!(dos.time, (14 << 11) | (30 << 5) | 22);
    }

    #[test]
    fn test_decode_truncates_to_even_seconds() {
        let original = datetime(2023, 6, 15, 14, 30, 45);
        let decoded = DosDateTime::encode(&original).decode();
        assert_eq!(decoded, datetime(2023, 6, 15, 14, 30, 44));
    }

    #[test]
    fn test_epoch() {
        let dos = DosDateTime::encode(&datetime(1980, 1, 1, 0, 0, 0));
        assert_eq!(dos, DosDateTime::new(0x0021, 0));
        assert_eq!(dos.decode(), datetime(1980, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_year_saturation() {
        let before = DosDateTime::encode(&datetime(1970, 5, 5, 5, 5, 5));
        assert_eq!(before.decode(), datetime(1980, 1, 1, 0, 0, 0));

        let after = DosDateTime::encode(&datetime(2200, 5, 5, 5, 5, 5));
        assert_eq!(after.decode(), datetime(2107, 12, 31, 23, 59, 58));
    }

    #[test]
    fn test_decode_zeroed_fields() {
        // Month and day of zero are common in archives written by old tools.
        assert_eq!(
            DosDateTime::new(0, 0).decode(),
            datetime(1980, 1, 1, 0, 0, 0)
        );
    }

    #[test]
    fn test_decode_day_past_month_end() {
        // 2023-02-31 25:63:62
        let dos = DosDateTime::new((43 << 9) | (2 << 5) | 31, 0xffff);
        assert_eq!(dos.decode(), datetime(2023, 2, 28, 23, 59, 58));
    }

    #[quickcheck]
    fn prop_roundtrip_within_two_seconds(secs: u32) -> bool {
        // ~95 years past 1980 keeps the value inside the DOS range.
        let base = datetime(1980, 1, 1, 0, 0, 0);
        let original = base + chrono::Duration::seconds(i64::from(secs % 3_000_000_000));
        let decoded = DosDateTime::encode(&original).decode();
        let delta = (original - decoded).num_seconds();
        (0..=1).contains(&delta)
    }

    #[quickcheck]
    fn prop_decode_is_total(date: u16, time: u16) -> bool {
        let decoded = DosDateTime::new(date, time).decode();
        (MIN_YEAR..=MAX_YEAR).contains(&decoded.year())
    }
}
