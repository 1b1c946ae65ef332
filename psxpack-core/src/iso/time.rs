//! The two ISO 9660 timestamp encodings.
//!
//! Volume descriptors use the 17-byte long form (16 ASCII digits plus a
//! signed GMT offset in quarter hours); directory records use a 7-byte
//! binary form. Both are preserved field-for-field so that broken dates on
//! mastered discs survive a round trip untouched.

use chrono::{Datelike, NaiveDate, TimeDelta, Timelike};

use crate::error::DiscError;

/// 17-byte long-format timestamp: `YYYYMMDDhhmmssxx` as ASCII digits plus
/// a GMT offset in quarter hours (-48..=+52).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongTime {
    /// The sixteen digit characters, stored raw. Mastered discs sometimes
    /// carry a zero century here, which must survive unchanged.
    pub digits: [u8; 16],
    pub gmt_offset: i8,
}

impl LongTime {
    /// The all-zeroes value used for unset dates.
    pub fn zero() -> Self {
        Self {
            digits: [b'0'; 16],
            gmt_offset: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut digits = [b'0'; 16];
        digits.copy_from_slice(&bytes[..16]);
        Self {
            digits,
            gmt_offset: bytes[16] as i8,
        }
    }

    pub fn to_bytes(self) -> [u8; 17] {
        let mut out = [0u8; 17];
        out[..16].copy_from_slice(&self.digits);
        out[16] = self.gmt_offset as u8;
        out
    }

    /// Parse the catalog form `YYYY-MM-DD hh:mm:ss.xx ofs`.
    pub fn parse(s: &str) -> Result<Self, DiscError> {
        let bad = || DiscError::invalid_format(format!("'{s}' is not a valid date/time specification"));

        let mut parts = s.split_whitespace();
        let date = parts.next().ok_or_else(bad)?;
        let time = parts.next().ok_or_else(bad)?;
        let offset = parts.next().ok_or_else(bad)?;
        if parts.next().is_some() {
            return Err(bad());
        }

        let date_digits: Vec<&str> = date.split('-').collect();
        let [year, month, day] = date_digits[..] else {
            return Err(bad());
        };
        let (hms, hsec) = time.split_once('.').ok_or_else(bad)?;
        let time_digits: Vec<&str> = hms.split(':').collect();
        let [hour, minute, second] = time_digits[..] else {
            return Err(bad());
        };

        let fields = [year, month, day, hour, minute, second, hsec];
        let widths = [4usize, 2, 2, 2, 2, 2, 2];
        let mut digits = [b'0'; 16];
        let mut pos = 0;
        for (field, width) in fields.iter().zip(widths) {
            if field.len() != width || !field.bytes().all(|c| c.is_ascii_digit()) {
                return Err(bad());
            }
            digits[pos..pos + width].copy_from_slice(field.as_bytes());
            pos += width;
        }

        let gmt_offset: i8 = offset
            .parse()
            .map_err(|_| DiscError::invalid_format(format!("'{offset}' is not a valid GMT offset")))?;

        Ok(Self { digits, gmt_offset })
    }

    /// Format as the catalog form `YYYY-MM-DD hh:mm:ss.xx ofs`.
    pub fn format_catalog(&self) -> String {
        let d = |range: std::ops::Range<usize>| String::from_utf8_lossy(&self.digits[range]).into_owned();
        format!(
            "{}-{}-{} {}:{}:{}.{} {}",
            d(0..4),
            d(4..6),
            d(6..8),
            d(8..10),
            d(10..12),
            d(12..14),
            d(14..16),
            self.gmt_offset
        )
    }

    fn field(&self, range: std::ops::Range<usize>) -> u32 {
        self.digits[range]
            .iter()
            .fold(0, |acc, &c| acc * 10 + u32::from(c.wrapping_sub(b'0')))
    }

    /// True when the century digits read "00", the signature of the
    /// mastering bug that zeroes the year's high half.
    pub fn century_is_zero(&self) -> bool {
        &self.digits[..2] == b"00"
    }

    /// Rewrite the century per the repair policy: "00" or "19" with a
    /// two-digit year of 70 or above becomes "19", anything else "20".
    pub fn repair_century(&mut self) {
        let century = &self.digits[..2];
        if (century == b"00" || century == b"19") && self.field(2..4) >= 70 {
            self.digits[..2].copy_from_slice(b"19");
        } else {
            self.digits[..2].copy_from_slice(b"20");
        }
    }

    /// The recording-time equivalent of this date's local fields, taken
    /// verbatim.
    pub fn to_recorded_local(&self) -> RecordedTime {
        RecordedTime {
            year: self.field(0..4).saturating_sub(1900).min(255) as u8,
            month: self.field(4..6) as u8,
            day: self.field(6..8) as u8,
            hour: self.field(8..10) as u8,
            minute: self.field(10..12) as u8,
            second: self.field(12..14) as u8,
            gmt_offset: self.gmt_offset,
        }
    }

    /// The recording-time equivalent of this date, normalised to GMT by
    /// subtracting the quarter-hour offset. Used for the PVD's root
    /// directory record. A date whose fields make no calendar sense is
    /// passed through unshifted.
    pub fn to_recorded_gmt(&self) -> RecordedTime {
        let moment = NaiveDate::from_ymd_opt(
            self.field(0..4) as i32,
            self.field(4..6),
            self.field(6..8),
        )
        .and_then(|date| {
            date.and_hms_opt(self.field(8..10), self.field(10..12), self.field(12..14))
        });
        let Some(moment) = moment else {
            return self.to_recorded_local();
        };

        let shifted = moment - TimeDelta::minutes(i64::from(self.gmt_offset) * 15);
        RecordedTime {
            year: (shifted.year() - 1900).clamp(0, 255) as u8,
            month: shifted.month() as u8,
            day: shifted.day() as u8,
            hour: shifted.hour() as u8,
            minute: shifted.minute() as u8,
            second: shifted.second() as u8,
            gmt_offset: self.gmt_offset,
        }
    }
}

/// 7-byte binary recording time of a directory record: years since 1900,
/// month, day, hour, minute, second, GMT offset in quarter hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordedTime {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub gmt_offset: i8,
}

impl RecordedTime {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            year: bytes[0],
            month: bytes[1],
            day: bytes[2],
            hour: bytes[3],
            minute: bytes[4],
            second: bytes[5],
            gmt_offset: bytes[6] as i8,
        }
    }

    pub fn to_bytes(self) -> [u8; 7] {
        [
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.gmt_offset as u8,
        ]
    }

    /// The 14-digit `YYYYMMDDhhmmss` string stored in catalog files.
    pub fn to_digits(self) -> String {
        format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}",
            1900 + u32::from(self.year),
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second
        )
    }

    /// Parse a 14-digit catalog date plus offset back into the binary
    /// form. An empty string yields the zero time.
    pub fn from_digits(digits: &str, gmt_offset: i8) -> Result<Self, DiscError> {
        if digits.is_empty() {
            return Ok(Self {
                gmt_offset,
                ..Self::default()
            });
        }
        if digits.len() != 14 || !digits.bytes().all(|c| c.is_ascii_digit()) {
            return Err(DiscError::invalid_format(format!("invalid date '{digits}'")));
        }

        let num = |range: std::ops::Range<usize>| -> u32 {
            digits[range].parse().unwrap_or(0)
        };
        let year = num(0..4);
        Ok(Self {
            year: year.saturating_sub(1900).min(255) as u8,
            month: num(4..6) as u8,
            day: num(6..8) as u8,
            hour: num(8..10) as u8,
            minute: num(10..12) as u8,
            second: num(12..14) as u8,
            gmt_offset,
        })
    }

    /// True for the broken years produced by the mastering bug: the year
    /// byte reads below 70, i.e. before 1970.
    pub fn year_is_broken(self) -> bool {
        self.year < 70
    }
}

#[cfg(test)]
#[path = "tests/time_tests.rs"]
mod tests;
