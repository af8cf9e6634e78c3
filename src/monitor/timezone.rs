// SPDX-License-Identifier: MPL-2.0

//! Local time for a resolved location.
//!
//! Offsets come from a static table keyed by IANA identifier or common
//! abbreviation, with daylight-saving rules for the regions that observe it.
//! Literal offsets such as `UTC+8`, `GMT-05:30` or `+0800` are accepted too.
//! Anything else falls back to the configured default timezone, then UTC.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc, Weekday};

use crate::error::TimezoneUnresolved;

const HOUR: i32 = 3600;

/// Daylight-saving schemes, each shifting the standard offset by one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstRule {
    None,
    /// Second Sunday of March 02:00 to first Sunday of November 02:00 local.
    NorthAmerica,
    /// Last Sunday of March to last Sunday of October, 01:00 UTC.
    Europe,
    /// First Sunday of October to first Sunday of April, 02:00 standard time.
    SouthEastAustralia,
    /// Last Sunday of September to first Sunday of April, 02:00 standard time.
    NewZealand,
}

#[derive(Debug)]
pub struct ZoneRule {
    pub names: &'static [&'static str],
    /// Standard offset east of UTC, in seconds.
    pub standard: i32,
    pub dst: DstRule,
}

static ZONES: &[ZoneRule] = &[
    ZoneRule { names: &["UTC", "GMT", "Etc/UTC", "Etc/GMT", "Z"], standard: 0, dst: DstRule::None },
    ZoneRule {
        names: &["Asia/Shanghai", "Asia/Chongqing", "Asia/Harbin", "Asia/Urumqi", "PRC"],
        standard: 8 * HOUR,
        dst: DstRule::None,
    },
    ZoneRule { names: &["Asia/Hong_Kong", "HKT"], standard: 8 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["Asia/Macau"], standard: 8 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["Asia/Taipei"], standard: 8 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["Asia/Singapore", "Asia/Kuala_Lumpur", "SGT"], standard: 8 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["Asia/Manila", "PHT"], standard: 8 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["Australia/Perth", "AWST"], standard: 8 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["Asia/Tokyo", "JST"], standard: 9 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["Asia/Seoul", "KST"], standard: 9 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["Asia/Kolkata", "Asia/Calcutta", "IST"], standard: 5 * HOUR + 1800, dst: DstRule::None },
    ZoneRule { names: &["Asia/Dubai"], standard: 4 * HOUR, dst: DstRule::None },
    ZoneRule {
        names: &["Asia/Bangkok", "Asia/Jakarta", "Asia/Ho_Chi_Minh", "Asia/Saigon", "ICT", "WIB"],
        standard: 7 * HOUR,
        dst: DstRule::None,
    },
    ZoneRule { names: &["Europe/Moscow", "MSK"], standard: 3 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["Europe/Istanbul"], standard: 3 * HOUR, dst: DstRule::None },
    ZoneRule {
        names: &["Europe/London", "Europe/Dublin", "Europe/Lisbon", "WET"],
        standard: 0,
        dst: DstRule::Europe,
    },
    ZoneRule { names: &["BST", "WEST"], standard: HOUR, dst: DstRule::None },
    ZoneRule {
        names: &[
            "Europe/Paris", "Europe/Berlin", "Europe/Madrid", "Europe/Rome", "Europe/Amsterdam",
            "Europe/Brussels", "Europe/Vienna", "Europe/Stockholm", "Europe/Oslo",
            "Europe/Copenhagen", "Europe/Warsaw", "Europe/Prague", "Europe/Zurich",
            "Europe/Budapest", "CET",
        ],
        standard: HOUR,
        dst: DstRule::Europe,
    },
    ZoneRule { names: &["CEST"], standard: 2 * HOUR, dst: DstRule::None },
    ZoneRule {
        names: &["Europe/Athens", "Europe/Helsinki", "Europe/Kyiv", "Europe/Kiev", "Europe/Bucharest", "EET"],
        standard: 2 * HOUR,
        dst: DstRule::Europe,
    },
    ZoneRule { names: &["EEST"], standard: 3 * HOUR, dst: DstRule::None },
    ZoneRule {
        names: &["America/New_York", "America/Toronto", "America/Detroit", "US/Eastern"],
        standard: -5 * HOUR,
        dst: DstRule::NorthAmerica,
    },
    ZoneRule { names: &["EST"], standard: -5 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["EDT"], standard: -4 * HOUR, dst: DstRule::None },
    ZoneRule {
        names: &["America/Chicago", "America/Winnipeg", "US/Central"],
        standard: -6 * HOUR,
        dst: DstRule::NorthAmerica,
    },
    ZoneRule { names: &["America/Mexico_City", "CST"], standard: -6 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["CDT"], standard: -5 * HOUR, dst: DstRule::None },
    ZoneRule {
        names: &["America/Denver", "America/Edmonton", "US/Mountain"],
        standard: -7 * HOUR,
        dst: DstRule::NorthAmerica,
    },
    ZoneRule { names: &["America/Phoenix", "MST"], standard: -7 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["MDT"], standard: -6 * HOUR, dst: DstRule::None },
    ZoneRule {
        names: &["America/Los_Angeles", "America/Vancouver", "America/Tijuana", "US/Pacific"],
        standard: -8 * HOUR,
        dst: DstRule::NorthAmerica,
    },
    ZoneRule { names: &["PST"], standard: -8 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["PDT"], standard: -7 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["America/Anchorage"], standard: -9 * HOUR, dst: DstRule::NorthAmerica },
    ZoneRule { names: &["Pacific/Honolulu", "HST"], standard: -10 * HOUR, dst: DstRule::None },
    ZoneRule {
        names: &["America/Sao_Paulo", "America/Argentina/Buenos_Aires", "America/Buenos_Aires"],
        standard: -3 * HOUR,
        dst: DstRule::None,
    },
    ZoneRule {
        names: &["Australia/Sydney", "Australia/Melbourne", "Australia/Canberra", "Australia/Hobart"],
        standard: 10 * HOUR,
        dst: DstRule::SouthEastAustralia,
    },
    ZoneRule { names: &["Australia/Brisbane", "AEST"], standard: 10 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["AEDT"], standard: 11 * HOUR, dst: DstRule::None },
    ZoneRule { names: &["Pacific/Auckland", "NZ"], standard: 12 * HOUR, dst: DstRule::NewZealand },
];

/// Find the table entry for an identifier or abbreviation.
pub fn lookup(timezone: &str) -> Option<&'static ZoneRule> {
    let timezone = timezone.trim();
    if timezone.is_empty() {
        return None;
    }
    ZONES
        .iter()
        .find(|zone| zone.names.iter().any(|name| name.eq_ignore_ascii_case(timezone)))
}

impl ZoneRule {
    pub fn offset_at(&self, now: DateTime<Utc>) -> FixedOffset {
        let seconds = if self.in_dst(now) {
            self.standard + HOUR
        } else {
            self.standard
        };
        FixedOffset::east_opt(seconds).unwrap_or(utc_offset())
    }

    fn in_dst(&self, now: DateTime<Utc>) -> bool {
        let year = now.year();
        // Local transition times expressed in UTC.
        let standard_to_utc = |date: NaiveDate, local_hour: u32| {
            at_hour(date, local_hour).map(|t| t - chrono::Duration::seconds(i64::from(self.standard)))
        };
        let range = match self.dst {
            DstRule::None => return false,
            DstRule::NorthAmerica => {
                let start = nth_weekday(year, 3, Weekday::Sun, 2).and_then(|d| standard_to_utc(d, 2));
                // 02:00 daylight time is 01:00 standard time.
                let end = nth_weekday(year, 11, Weekday::Sun, 1).and_then(|d| standard_to_utc(d, 1));
                start.zip(end).map(|(s, e)| now >= s && now < e)
            }
            DstRule::Europe => {
                let start = last_weekday(year, 3, Weekday::Sun).and_then(|d| at_hour(d, 1));
                let end = last_weekday(year, 10, Weekday::Sun).and_then(|d| at_hour(d, 1));
                start.zip(end).map(|(s, e)| now >= s && now < e)
            }
            DstRule::SouthEastAustralia => {
                let start = nth_weekday(year, 10, Weekday::Sun, 1).and_then(|d| standard_to_utc(d, 2));
                let end = nth_weekday(year, 4, Weekday::Sun, 1).and_then(|d| standard_to_utc(d, 2));
                start.zip(end).map(|(s, e)| now >= s || now < e)
            }
            DstRule::NewZealand => {
                let start = last_weekday(year, 9, Weekday::Sun).and_then(|d| standard_to_utc(d, 2));
                let end = nth_weekday(year, 4, Weekday::Sun, 1).and_then(|d| standard_to_utc(d, 2));
                start.zip(end).map(|(s, e)| now >= s || now < e)
            }
        };
        range.unwrap_or(false)
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

fn at_hour(date: NaiveDate, hour: u32) -> Option<DateTime<Utc>> {
    date.and_hms_opt(hour, 0, 0).map(|t| t.and_utc())
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let mut day = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    while day.weekday() != weekday {
        day = day.pred_opt()?;
    }
    Some(day)
}

/// Parse literal offsets: `UTC+8`, `GMT-05:30`, `+0800`, `-3`.
fn parse_literal_offset(timezone: &str) -> Option<FixedOffset> {
    let mut rest = timezone.trim();
    for prefix in ["UTC", "GMT"] {
        if let Some(head) = rest.get(..prefix.len()) {
            if head.eq_ignore_ascii_case(prefix) && rest.len() > prefix.len() {
                rest = &rest[prefix.len()..];
                break;
            }
        }
    }
    let sign = match rest.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let digits = &rest[1..];
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if digits.len() == 4 => (digits.get(..2)?.parse().ok()?, digits.get(2..)?.parse().ok()?),
        None => (digits.parse().ok()?, 0),
    };
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * HOUR + minutes * 60))
}

/// Offset of `timezone` at `now`.
pub fn offset_for(timezone: &str, now: DateTime<Utc>) -> Result<FixedOffset, TimezoneUnresolved> {
    if let Some(zone) = lookup(timezone) {
        return Ok(zone.offset_at(now));
    }
    parse_literal_offset(timezone).ok_or_else(|| TimezoneUnresolved(timezone.to_owned()))
}

/// Wall-clock time at a location.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalTime {
    pub time: DateTime<FixedOffset>,
    /// The timezone the offset actually came from.
    pub timezone: String,
    /// False when the requested timezone was unknown and a default was used.
    pub resolved: bool,
}

impl LocalTime {
    pub fn format(&self, use_24hour_time: bool) -> String {
        if use_24hour_time {
            self.time.format("%H:%M").to_string()
        } else {
            self.time.format("%-I:%M %p").to_string()
        }
    }

    pub fn is_daytime(&self) -> bool {
        let hour = chrono::Timelike::hour(&self.time);
        (6..18).contains(&hour)
    }
}

/// Local time at `timezone`, falling back to `default_timezone`, then UTC.
pub fn local_time(timezone: &str, default_timezone: &str, now: DateTime<Utc>) -> LocalTime {
    let (offset, used, resolved) = match offset_for(timezone, now) {
        Ok(offset) => (offset, timezone, true),
        Err(e) => {
            log::debug!("{e}, using default {default_timezone}");
            match offset_for(default_timezone, now) {
                Ok(offset) => (offset, default_timezone, false),
                Err(e) => {
                    log::warn!("default timezone: {e}, using UTC");
                    (utc_offset(), "UTC", false)
                }
            }
        }
    };
    LocalTime {
        time: now.with_timezone(&offset),
        timezone: used.to_owned(),
        resolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn hours(offset: FixedOffset) -> f64 {
        f64::from(offset.local_minus_utc()) / 3600.0
    }

    #[test]
    fn fixed_zones() {
        let now = utc(2025, 7, 1, 12, 0);
        assert_eq!(hours(offset_for("Asia/Shanghai", now).unwrap()), 8.0);
        assert_eq!(hours(offset_for("asia/kolkata", now).unwrap()), 5.5);
        assert_eq!(hours(offset_for("JST", now).unwrap()), 9.0);
        assert_eq!(hours(offset_for("America/Phoenix", now).unwrap()), -7.0);
    }

    #[test]
    fn north_american_dst() {
        let la = lookup("America/Los_Angeles").unwrap();
        assert_eq!(hours(la.offset_at(utc(2025, 1, 15, 12, 0))), -8.0);
        assert_eq!(hours(la.offset_at(utc(2025, 7, 15, 12, 0))), -7.0);
        // 2025-03-09 02:00 PST is 10:00 UTC.
        assert_eq!(hours(la.offset_at(utc(2025, 3, 9, 9, 59))), -8.0);
        assert_eq!(hours(la.offset_at(utc(2025, 3, 9, 10, 0))), -7.0);
        // 2025-11-02 02:00 PDT is 09:00 UTC.
        assert_eq!(hours(la.offset_at(utc(2025, 11, 2, 8, 59))), -7.0);
        assert_eq!(hours(la.offset_at(utc(2025, 11, 2, 9, 0))), -8.0);
    }

    #[test]
    fn european_dst() {
        let berlin = lookup("Europe/Berlin").unwrap();
        assert_eq!(hours(berlin.offset_at(utc(2025, 3, 30, 0, 59))), 1.0);
        assert_eq!(hours(berlin.offset_at(utc(2025, 3, 30, 1, 0))), 2.0);
        assert_eq!(hours(berlin.offset_at(utc(2025, 10, 26, 0, 59))), 2.0);
        assert_eq!(hours(berlin.offset_at(utc(2025, 10, 26, 1, 0))), 1.0);
    }

    #[test]
    fn southern_hemisphere_dst_wraps_the_year() {
        let sydney = lookup("Australia/Sydney").unwrap();
        assert_eq!(hours(sydney.offset_at(utc(2025, 1, 10, 0, 0))), 11.0);
        assert_eq!(hours(sydney.offset_at(utc(2025, 6, 10, 0, 0))), 10.0);
        assert_eq!(hours(sydney.offset_at(utc(2025, 12, 10, 0, 0))), 11.0);
    }

    #[test]
    fn literal_offsets() {
        let now = utc(2025, 1, 1, 0, 0);
        assert_eq!(hours(offset_for("UTC+8", now).unwrap()), 8.0);
        assert_eq!(hours(offset_for("GMT-05:30", now).unwrap()), -5.5);
        assert_eq!(hours(offset_for("+0800", now).unwrap()), 8.0);
        assert!(offset_for("+99", now).is_err());
        assert!(offset_for("Mars/Olympus_Mons", now).is_err());
    }

    #[test]
    fn unknown_timezone_uses_default_region() {
        let now = utc(2025, 7, 1, 4, 30);
        let local = local_time("Mars/Olympus_Mons", "Asia/Shanghai", now);
        assert!(!local.resolved);
        assert_eq!(local.timezone, "Asia/Shanghai");
        assert_eq!(local.format(true), "12:30");
    }

    #[test]
    fn empty_timezone_uses_default_region() {
        let now = utc(2025, 7, 1, 4, 30);
        let local = local_time("", "Europe/London", now);
        assert!(!local.resolved);
        assert_eq!(local.format(true), "05:30");
    }

    #[test]
    fn unknown_default_falls_back_to_utc() {
        let now = utc(2025, 7, 1, 16, 5);
        let local = local_time("nowhere", "also-nowhere", now);
        assert_eq!(local.timezone, "UTC");
        assert_eq!(local.format(false), "4:05 PM");
    }

    #[test]
    fn resolved_timezone_is_reported() {
        let now = utc(2025, 7, 1, 19, 0);
        let local = local_time("America/Los_Angeles", "Asia/Shanghai", now);
        assert!(local.resolved);
        assert_eq!(local.format(true), "12:00");
        assert!(local.is_daytime());
    }
}
