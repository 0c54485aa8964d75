//! PDF date strings (`D:YYYYMMDDHHmmSSOHH'mm'`).
//!
//! Everything after the year is optional, but fields can only be dropped from
//! the right. A missing UT relationship is read as GMT. Errors carry the byte
//! offset of the first offending character so callers can log it.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use std::fmt::Write;
use thiserror::Error;

/// Fallback when a catalog pattern cannot be rendered.
const FALLBACK_PATTERN: &str = "%Y-%m-%d %H:%M:%S %:z";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct DateParseError {
    pub reason: &'static str,
    pub offset: usize,
}

impl DateParseError {
    fn at(reason: &'static str, offset: usize) -> Self {
        Self { reason, offset }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            bytes: raw.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn digits(&mut self, count: usize, reason: &'static str) -> Result<u32, DateParseError> {
        let start = self.pos;
        let mut value = 0u32;
        for _ in 0..count {
            match self.peek() {
                Some(b) if b.is_ascii_digit() => {
                    value = value * 10 + u32::from(b - b'0');
                    self.pos += 1;
                }
                _ => return Err(DateParseError::at(reason, start)),
            }
        }
        Ok(value)
    }

    /// Two-digit field that may be omitted when no digit follows.
    fn optional_field(
        &mut self,
        range: std::ops::RangeInclusive<u32>,
        reason: &'static str,
    ) -> Result<Option<u32>, DateParseError> {
        if !matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            return Ok(None);
        }
        let start = self.pos;
        let value = self.digits(2, reason)?;
        if !range.contains(&value) {
            return Err(DateParseError::at(reason, start));
        }
        Ok(Some(value))
    }
}

pub fn parse_pdf_date(raw: &str) -> Result<DateTime<FixedOffset>, DateParseError> {
    let mut cursor = Cursor::new(raw);
    if cursor.bytes.starts_with(b"D:") {
        cursor.pos = 2;
    }

    let year = cursor.digits(4, "Invalid year")?;

    // Dropping a field also drops everything to its right.
    let day_offset = cursor.pos + 2;
    let month = cursor.optional_field(1..=12, "Invalid month")?;
    let day = match month {
        Some(_) => cursor.optional_field(1..=31, "Invalid day")?,
        None => None,
    };
    let hour = match day {
        Some(_) => cursor.optional_field(0..=23, "Invalid hours")?,
        None => None,
    };
    let minute = match hour {
        Some(_) => cursor.optional_field(0..=59, "Invalid minutes")?,
        None => None,
    };
    let second = match minute {
        Some(_) => cursor.optional_field(0..=59, "Invalid seconds")?,
        None => None,
    };

    let offset = parse_utc_offset(&mut cursor)?;
    if !cursor.at_end() {
        return Err(DateParseError::at("Unexpected trailing characters", cursor.pos));
    }

    let date = NaiveDate::from_ymd_opt(year as i32, month.unwrap_or(1), day.unwrap_or(1))
        .ok_or_else(|| DateParseError::at("Invalid day", day_offset))?;
    let time = NaiveTime::from_hms_opt(hour.unwrap_or(0), minute.unwrap_or(0), second.unwrap_or(0))
        .ok_or_else(|| DateParseError::at("Invalid time", day_offset + 2))?;

    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .ok_or_else(|| DateParseError::at("Invalid date", 0))
}

fn parse_utc_offset(cursor: &mut Cursor<'_>) -> Result<FixedOffset, DateParseError> {
    let start = cursor.pos;
    let sign = match cursor.peek() {
        None => return utc(start),
        Some(b'Z') => {
            cursor.pos += 1;
            // Some producers still append "00'00'" after the Z.
            if !cursor.at_end() {
                skip_offset_digits(cursor)?;
            }
            return utc(start);
        }
        Some(b'+') => 1,
        Some(b'-') => -1,
        Some(_) => return Err(DateParseError::at("Invalid UTC offset", start)),
    };
    cursor.pos += 1;
    let (hours, minutes) = skip_offset_digits(cursor)?;
    FixedOffset::east_opt(sign * (hours as i32 * 3600 + minutes as i32 * 60))
        .ok_or_else(|| DateParseError::at("Invalid UTC offset", start))
}

fn skip_offset_digits(cursor: &mut Cursor<'_>) -> Result<(u32, u32), DateParseError> {
    let hours_at = cursor.pos;
    let hours = cursor.digits(2, "Invalid UTC offset hours")?;
    if hours > 23 {
        return Err(DateParseError::at("Invalid UTC offset hours", hours_at));
    }
    cursor.eat(b'\'');
    let mut minutes = 0;
    if matches!(cursor.peek(), Some(b) if b.is_ascii_digit()) {
        let minutes_at = cursor.pos;
        minutes = cursor.digits(2, "Invalid UTC offset minutes")?;
        if minutes > 59 {
            return Err(DateParseError::at("Invalid UTC offset minutes", minutes_at));
        }
        cursor.eat(b'\'');
    }
    Ok((hours, minutes))
}

fn utc(offset: usize) -> Result<FixedOffset, DateParseError> {
    FixedOffset::east_opt(0).ok_or_else(|| DateParseError::at("Invalid UTC offset", offset))
}

/// Parse `raw` and render it with a strftime `pattern` in the document's own offset.
pub fn format_pdf_date(raw: &str, pattern: &str) -> Result<String, DateParseError> {
    let date = parse_pdf_date(raw)?;
    let mut out = String::new();
    if write!(out, "{}", date.format(pattern)).is_err() {
        log::warn!("unusable date pattern {pattern:?}, falling back to {FALLBACK_PATTERN}");
        out.clear();
        let _ = write!(out, "{}", date.format(FALLBACK_PATTERN));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_full_date_with_offset() {
        let date = parse_pdf_date("D:20230401133015+02'00'").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2023, 4, 1));
        assert_eq!((date.hour(), date.minute(), date.second()), (13, 30, 15));
        assert_eq!(date.offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn accepts_truncated_dates_and_missing_prefix() {
        let year_only = parse_pdf_date("D:2021").unwrap();
        assert_eq!((year_only.year(), year_only.month(), year_only.day()), (2021, 1, 1));
        assert_eq!(year_only.offset().local_minus_utc(), 0);

        let no_prefix = parse_pdf_date("199912312359").unwrap();
        assert_eq!((no_prefix.hour(), no_prefix.minute()), (23, 59));
    }

    #[test]
    fn handles_zulu_and_negative_offsets() {
        assert_eq!(
            parse_pdf_date("D:20200101000000Z").unwrap().offset().local_minus_utc(),
            0
        );
        assert_eq!(
            parse_pdf_date("D:20200101000000Z00'00'").unwrap().offset().local_minus_utc(),
            0
        );
        let west = parse_pdf_date("D:20200101000000-05'30").unwrap();
        assert_eq!(west.offset().local_minus_utc(), -(5 * 3600 + 30 * 60));
    }

    #[test]
    fn reports_offset_of_first_bad_field() {
        let err = parse_pdf_date("D:20231301").unwrap_err();
        assert_eq!(err, DateParseError::at("Invalid month", 6));

        let err = parse_pdf_date("yesterday").unwrap_err();
        assert_eq!(err.reason, "Invalid year");
        assert_eq!(err.offset, 0);

        let err = parse_pdf_date("D:20230230").unwrap_err();
        assert_eq!(err, DateParseError::at("Invalid day", 8));

        let err = parse_pdf_date("D:20230101120000+02'00'junk").unwrap_err();
        assert_eq!(err.reason, "Unexpected trailing characters");
        assert_eq!(err.offset, 23);
    }

    #[test]
    fn formats_in_document_offset() {
        let text = format_pdf_date("D:20230401133015+02'00'", "%Y-%m-%d %H:%M").unwrap();
        assert_eq!(text, "2023-04-01 13:30");
        let english = format_pdf_date("D:20230401133015Z", "%b %-d, %Y, %-I:%M:%S %p").unwrap();
        assert_eq!(english, "Apr 1, 2023, 1:30:15 PM");
    }
}
