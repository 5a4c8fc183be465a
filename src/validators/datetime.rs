//! Date, time and duration values
//!
//! The eight date/time primitives share one value struct; missing fields
//! are filled from fixed reference values when placing a value on the
//! timeline. Ordering follows the XSD 1.0 partial-order rules:
//!
//! - values with and without a timezone are only ordered when they are more
//!   than 14 hours apart;
//! - durations are ordered by adding them to four reference dateTimes and
//!   comparing the results.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::builtins::XsdOrdering;

const SECONDS_PER_DAY: i64 = 86_400;
const FOURTEEN_HOURS: i64 = 14 * 3_600;

static YEAR: &str = r"(-?(?:[1-9]\d{4,}|\d{4}))";
static TZ: &str = r"(Z|[+-]\d{2}:\d{2})?";

static DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^{YEAR}-(\d{{2}})-(\d{{2}})T(\d{{2}}):(\d{{2}}):(\d{{2}}(?:\.\d+)?){TZ}$"
    ))
    .unwrap()
});
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^{YEAR}-(\d{{2}})-(\d{{2}}){TZ}$")).unwrap());
static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^(\d{{2}}):(\d{{2}}):(\d{{2}}(?:\.\d+)?){TZ}$")).unwrap()
});
static GYEARMONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^{YEAR}-(\d{{2}}){TZ}$")).unwrap());
static GYEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!(r"^{YEAR}{TZ}$")).unwrap());
static GMONTHDAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^--(\d{{2}})-(\d{{2}}){TZ}$")).unwrap());
static GDAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!(r"^---(\d{{2}}){TZ}$")).unwrap());
static GMONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^--(\d{{2}}){TZ}$")).unwrap());
static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(-)?P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .unwrap()
});

/// Which of the date/time primitives a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateTimeKind {
    /// xs:dateTime
    DateTime,
    /// xs:date
    Date,
    /// xs:time
    Time,
    /// xs:gYearMonth
    GYearMonth,
    /// xs:gYear
    GYear,
    /// xs:gMonthDay
    GMonthDay,
    /// xs:gDay
    GDay,
    /// xs:gMonth
    GMonth,
}

/// A date/time value of any of the eight date/time primitives
#[derive(Debug, Clone, PartialEq)]
pub struct XsdDateTime {
    /// Primitive this value belongs to
    pub kind: DateTimeKind,
    /// Year as written (no year zero); reference year when absent
    pub year: i64,
    /// Month 1-12
    pub month: u32,
    /// Day 1-31
    pub day: u32,
    /// Hour 0-24 (24 only as 24:00:00)
    pub hour: u32,
    /// Minute 0-59
    pub minute: u32,
    /// Seconds including the fractional part
    pub second: Decimal,
    /// Timezone offset in minutes, if present
    pub timezone: Option<i32>,
}

fn field<'t>(caps: &Captures<'t>, i: usize) -> Option<&'t str> {
    caps.get(i).map(|m| m.as_str())
}

fn num(caps: &Captures<'_>, i: usize) -> Result<u32, String> {
    field(caps, i)
        .ok_or_else(|| "missing field".to_string())?
        .parse()
        .map_err(|_| "field out of range".to_string())
}

fn parse_year(text: &str) -> Result<i64, String> {
    let year: i64 = text.parse().map_err(|_| "year out of range".to_string())?;
    if year == 0 {
        return Err("year 0000 is not allowed".to_string());
    }
    Ok(year)
}

fn parse_timezone(text: Option<&str>) -> Result<Option<i32>, String> {
    match text {
        None => Ok(None),
        Some("Z") => Ok(Some(0)),
        Some(tz) => {
            let sign = if tz.starts_with('-') { -1 } else { 1 };
            let hours: i32 = tz[1..3].parse().map_err(|_| "bad timezone".to_string())?;
            let minutes: i32 = tz[4..6].parse().map_err(|_| "bad timezone".to_string())?;
            if minutes > 59 || hours > 14 || (hours == 14 && minutes != 0) {
                return Err(format!("timezone '{}' out of range", tz));
            }
            Ok(Some(sign * (hours * 60 + minutes)))
        }
    }
}

fn is_leap(year: i64) -> bool {
    // years before 1 CE are shifted by one: -0001 is a leap year
    let y = if year < 0 { year + 1 } else { year };
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

/// Number of days in the given month of the given XSD year
pub fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap(year) => 29,
        _ => 28,
    }
}

impl XsdDateTime {
    fn blank(kind: DateTimeKind) -> Self {
        Self {
            kind,
            year: 1972,
            month: 12,
            day: 31,
            hour: 0,
            minute: 0,
            second: Decimal::ZERO,
            timezone: None,
        }
    }

    /// Parse a lexical value of the given kind (whitespace already collapsed)
    pub fn parse(kind: DateTimeKind, text: &str) -> Result<Self, String> {
        let mut value = Self::blank(kind);
        let bad = || format!("'{}' is not a valid {}", text, kind);
        let tz_group;
        match kind {
            DateTimeKind::DateTime => {
                let caps = DATETIME_RE.captures(text).ok_or_else(bad)?;
                value.year = parse_year(&caps[1])?;
                value.month = num(&caps, 2)?;
                value.day = num(&caps, 3)?;
                value.hour = num(&caps, 4)?;
                value.minute = num(&caps, 5)?;
                value.second = Decimal::from_str(&caps[6]).map_err(|_| bad())?;
                tz_group = field(&caps, 7).map(str::to_string);
            }
            DateTimeKind::Date => {
                let caps = DATE_RE.captures(text).ok_or_else(bad)?;
                value.year = parse_year(&caps[1])?;
                value.month = num(&caps, 2)?;
                value.day = num(&caps, 3)?;
                tz_group = field(&caps, 4).map(str::to_string);
            }
            DateTimeKind::Time => {
                let caps = TIME_RE.captures(text).ok_or_else(bad)?;
                value.hour = num(&caps, 1)?;
                value.minute = num(&caps, 2)?;
                value.second = Decimal::from_str(&caps[3]).map_err(|_| bad())?;
                tz_group = field(&caps, 4).map(str::to_string);
            }
            DateTimeKind::GYearMonth => {
                let caps = GYEARMONTH_RE.captures(text).ok_or_else(bad)?;
                value.year = parse_year(&caps[1])?;
                value.month = num(&caps, 2)?;
                value.day = 1;
                tz_group = field(&caps, 3).map(str::to_string);
            }
            DateTimeKind::GYear => {
                let caps = GYEAR_RE.captures(text).ok_or_else(bad)?;
                value.year = parse_year(&caps[1])?;
                value.month = 1;
                value.day = 1;
                tz_group = field(&caps, 2).map(str::to_string);
            }
            DateTimeKind::GMonthDay => {
                let caps = GMONTHDAY_RE.captures(text).ok_or_else(bad)?;
                value.month = num(&caps, 1)?;
                value.day = num(&caps, 2)?;
                tz_group = field(&caps, 3).map(str::to_string);
            }
            DateTimeKind::GDay => {
                let caps = GDAY_RE.captures(text).ok_or_else(bad)?;
                value.day = num(&caps, 1)?;
                tz_group = field(&caps, 2).map(str::to_string);
            }
            DateTimeKind::GMonth => {
                let caps = GMONTH_RE.captures(text).ok_or_else(bad)?;
                value.month = num(&caps, 1)?;
                value.day = 1;
                tz_group = field(&caps, 2).map(str::to_string);
            }
        }
        value.timezone = parse_timezone(tz_group.as_deref())?;
        value.check_ranges().map_err(|reason| format!("{}: {}", bad(), reason))?;
        Ok(value)
    }

    fn check_ranges(&self) -> Result<(), String> {
        if !(1..=12).contains(&self.month) {
            return Err("month out of range".to_string());
        }
        if self.day < 1 || self.day > days_in_month(self.year, self.month) {
            return Err("day out of range".to_string());
        }
        if self.minute > 59 {
            return Err("minute out of range".to_string());
        }
        if self.second >= Decimal::from(60) {
            return Err("second out of range".to_string());
        }
        if self.hour > 24 || (self.hour == 24 && (self.minute != 0 || !self.second.is_zero())) {
            return Err("hour out of range".to_string());
        }
        Ok(())
    }

    /// Seconds on the timeline, normalized to UTC when a timezone is present
    pub fn timeline(&self) -> Option<Decimal> {
        // chrono has year zero; XSD 1.0 does not
        let year = if self.year < 0 { self.year + 1 } else { self.year };
        let year = i32::try_from(year).ok()?;
        let first = NaiveDate::from_ymd_opt(year, self.month, 1)?;
        let days = i64::from(first.num_days_from_ce()) + i64::from(self.day) - 1;
        let mut seconds = Decimal::from(days) * Decimal::from(SECONDS_PER_DAY)
            + Decimal::from(self.hour * 3_600 + self.minute * 60)
            + self.second;
        if let Some(tz) = self.timezone {
            seconds -= Decimal::from(i64::from(tz) * 60);
        }
        Some(seconds)
    }

    /// Compare two values of the same kind
    pub fn compare(&self, other: &Self) -> XsdOrdering {
        if self.kind != other.kind {
            return XsdOrdering::Indeterminate;
        }
        let (Some(a), Some(b)) = (self.timeline(), other.timeline()) else {
            return XsdOrdering::Indeterminate;
        };
        let band = Decimal::from(FOURTEEN_HOURS);
        match (self.timezone.is_some(), other.timezone.is_some()) {
            (true, true) | (false, false) => XsdOrdering::from(a.cmp(&b)),
            (true, false) => {
                if a < b - band {
                    XsdOrdering::Less
                } else if a > b + band {
                    XsdOrdering::Greater
                } else {
                    XsdOrdering::Indeterminate
                }
            }
            (false, true) => other.compare(self).reverse(),
        }
    }

    /// Canonical form used for identity comparisons; timezoned values are
    /// normalized to UTC
    pub fn identity_key(&self) -> String {
        match (self.timezone, self.timeline()) {
            (Some(_), Some(t)) => format!("{:?}@{}Z", self.kind, t.normalize()),
            _ => format!("{:?}@{}", self.kind, self),
        }
    }
}

impl fmt::Display for DateTimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DateTimeKind::DateTime => "xs:dateTime",
            DateTimeKind::Date => "xs:date",
            DateTimeKind::Time => "xs:time",
            DateTimeKind::GYearMonth => "xs:gYearMonth",
            DateTimeKind::GYear => "xs:gYear",
            DateTimeKind::GMonthDay => "xs:gMonthDay",
            DateTimeKind::GDay => "xs:gDay",
            DateTimeKind::GMonth => "xs:gMonth",
        };
        f.write_str(name)
    }
}

impl fmt::Display for XsdDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let year = if self.year < 0 {
            format!("-{:04}", -self.year)
        } else {
            format!("{:04}", self.year)
        };
        let seconds = self.second.normalize();
        let seconds = if seconds < Decimal::TEN {
            format!("0{}", seconds)
        } else {
            seconds.to_string()
        };
        match self.kind {
            DateTimeKind::DateTime => write!(
                f,
                "{}-{:02}-{:02}T{:02}:{:02}:{}",
                year, self.month, self.day, self.hour, self.minute, seconds
            )?,
            DateTimeKind::Date => write!(f, "{}-{:02}-{:02}", year, self.month, self.day)?,
            DateTimeKind::Time => {
                write!(f, "{:02}:{:02}:{}", self.hour, self.minute, seconds)?
            }
            DateTimeKind::GYearMonth => write!(f, "{}-{:02}", year, self.month)?,
            DateTimeKind::GYear => write!(f, "{}", year)?,
            DateTimeKind::GMonthDay => write!(f, "--{:02}-{:02}", self.month, self.day)?,
            DateTimeKind::GDay => write!(f, "---{:02}", self.day)?,
            DateTimeKind::GMonth => write!(f, "--{:02}", self.month)?,
        }
        match self.timezone {
            None => Ok(()),
            Some(0) => f.write_str("Z"),
            Some(tz) => {
                let sign = if tz < 0 { '-' } else { '+' };
                write!(f, "{}{:02}:{:02}", sign, tz.abs() / 60, tz.abs() % 60)
            }
        }
    }
}

/// An xs:duration value as a (months, seconds) pair sharing one sign
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XsdDuration {
    /// Signed number of months
    pub months: i64,
    /// Signed number of seconds
    pub seconds: Decimal,
}

impl XsdDuration {
    /// Parse a lexical duration such as `-P1Y2M3DT4H5M6.7S`
    pub fn parse(text: &str) -> Result<Self, String> {
        let bad = || format!("'{}' is not a valid xs:duration", text);
        let caps = DURATION_RE.captures(text).ok_or_else(bad)?;
        if (2..=7).all(|i| caps.get(i).is_none()) || text.ends_with('T') {
            return Err(bad());
        }
        let int = |i: usize| -> Result<i64, String> {
            field(&caps, i)
                .map(|s| s.parse::<i64>().map_err(|_| bad()))
                .unwrap_or(Ok(0))
        };
        let (years, months, days) = (int(2)?, int(3)?, int(4)?);
        let (hours, minutes) = (int(5)?, int(6)?);
        let months = years
            .checked_mul(12)
            .and_then(|m| m.checked_add(months))
            .ok_or_else(bad)?;
        let seconds = match field(&caps, 7) {
            Some(s) => Decimal::from_str(s).map_err(|_| bad())?,
            None => Decimal::ZERO,
        };
        let seconds = Decimal::from(days)
            .checked_mul(Decimal::from(SECONDS_PER_DAY))
            .and_then(|d| d.checked_add(Decimal::from(hours) * Decimal::from(3_600)))
            .and_then(|d| d.checked_add(Decimal::from(minutes) * Decimal::from(60)))
            .and_then(|d| d.checked_add(seconds))
            .ok_or_else(bad)?;
        let sign = if caps.get(1).is_some() { -1 } else { 1 };
        Ok(Self {
            months: sign * months,
            seconds: Decimal::from(sign) * seconds,
        })
    }

    fn add_to(&self, start: NaiveDateTime) -> Option<NaiveDateTime> {
        let date = if self.months >= 0 {
            start
                .date()
                .checked_add_months(Months::new(u32::try_from(self.months).ok()?))?
        } else {
            start
                .date()
                .checked_sub_months(Months::new(u32::try_from(-self.months).ok()?))?
        };
        let whole = self.seconds.trunc().to_i64()?;
        let nanos = ((self.seconds - self.seconds.trunc()) * Decimal::from(1_000_000_000))
            .trunc()
            .to_i64()?;
        let delta = chrono::Duration::try_seconds(whole)?
            .checked_add(&chrono::Duration::nanoseconds(nanos))?;
        date.and_time(start.time()).checked_add_signed(delta)
    }

    /// Partial-order comparison against the four reference dateTimes
    pub fn compare(&self, other: &Self) -> XsdOrdering {
        if self == other {
            return XsdOrdering::Equal;
        }
        let references = [(1696, 9), (1697, 2), (1903, 3), (1903, 7)];
        let mut result = None;
        for (year, month) in references {
            let Some(start) = NaiveDate::from_ymd_opt(year, month, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
            else {
                return XsdOrdering::Indeterminate;
            };
            let (Some(a), Some(b)) = (self.add_to(start), other.add_to(start)) else {
                return XsdOrdering::Indeterminate;
            };
            let ordering = XsdOrdering::from(a.cmp(&b));
            match result {
                None => result = Some(ordering),
                Some(previous) if previous != ordering => return XsdOrdering::Indeterminate,
                Some(_) => {}
            }
        }
        result.unwrap_or(XsdOrdering::Indeterminate)
    }
}

impl fmt::Display for XsdDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.months < 0 || (self.seconds.is_sign_negative() && !self.seconds.is_zero());
        let months = self.months.abs();
        let seconds = self.seconds.abs();
        let days = (seconds / Decimal::from(SECONDS_PER_DAY)).trunc();
        let rest = seconds - days * Decimal::from(SECONDS_PER_DAY);
        let hours = (rest / Decimal::from(3_600)).trunc();
        let rest = rest - hours * Decimal::from(3_600);
        let minutes = (rest / Decimal::from(60)).trunc();
        let rest = (rest - minutes * Decimal::from(60)).normalize();
        if negative {
            f.write_str("-")?;
        }
        write!(
            f,
            "P{}Y{}M{}DT{}H{}M{}S",
            months / 12,
            months % 12,
            days,
            hours,
            minutes,
            rest
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(kind: DateTimeKind, s: &str) -> XsdDateTime {
        XsdDateTime::parse(kind, s).unwrap()
    }

    #[test]
    fn test_parse_date_time_kinds() {
        let v = dt(DateTimeKind::DateTime, "2024-02-29T13:45:30.5+02:00");
        assert_eq!((v.year, v.month, v.day), (2024, 2, 29));
        assert_eq!(v.timezone, Some(120));
        assert_eq!(v.to_string(), "2024-02-29T13:45:30.5+02:00");

        assert!(XsdDateTime::parse(DateTimeKind::Date, "2023-02-29").is_err());
        assert!(XsdDateTime::parse(DateTimeKind::Date, "0000-01-01").is_err());
        assert!(XsdDateTime::parse(DateTimeKind::Time, "24:00:00").is_ok());
        assert!(XsdDateTime::parse(DateTimeKind::Time, "24:00:01").is_err());
        assert!(XsdDateTime::parse(DateTimeKind::Time, "12:00:00+15:00").is_err());
        assert!(XsdDateTime::parse(DateTimeKind::GMonthDay, "--02-29").is_ok());
        assert_eq!(dt(DateTimeKind::GDay, "---05Z").to_string(), "---05Z");
        assert_eq!(dt(DateTimeKind::GYear, "-0044").to_string(), "-0044");
    }

    #[test]
    fn test_timezone_comparison() {
        let utc = dt(DateTimeKind::DateTime, "2000-01-01T12:00:00Z");
        let plus = dt(DateTimeKind::DateTime, "2000-01-01T13:00:00+01:00");
        assert_eq!(utc.compare(&plus), XsdOrdering::Equal);

        let local = dt(DateTimeKind::DateTime, "2000-01-01T12:00:00");
        assert_eq!(utc.compare(&local), XsdOrdering::Indeterminate);

        let far = dt(DateTimeKind::DateTime, "2000-01-03T12:00:00");
        assert_eq!(utc.compare(&far), XsdOrdering::Less);
        assert_eq!(far.compare(&utc), XsdOrdering::Greater);
    }

    #[test]
    fn test_midnight_24_equals_next_day() {
        let a = dt(DateTimeKind::DateTime, "1999-12-31T24:00:00Z");
        let b = dt(DateTimeKind::DateTime, "2000-01-01T00:00:00Z");
        assert_eq!(a.compare(&b), XsdOrdering::Equal);
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn test_parse_duration() {
        let d = XsdDuration::parse("-P1Y2M3DT4H5M6.5S").unwrap();
        assert_eq!(d.months, -14);
        assert_eq!(d.seconds, Decimal::from_str("-273906.5").unwrap());

        assert!(XsdDuration::parse("P").is_err());
        assert!(XsdDuration::parse("P1DT").is_err());
        assert!(XsdDuration::parse("PT1.5M").is_err());
        assert!(XsdDuration::parse("P1D").is_ok());
    }

    #[test]
    fn test_duration_partial_order() {
        let d = |s: &str| XsdDuration::parse(s).unwrap();
        assert_eq!(d("P1D").compare(&d("PT24H")), XsdOrdering::Equal);
        assert_eq!(d("P1M").compare(&d("P30D")), XsdOrdering::Indeterminate);
        assert_eq!(d("P1Y").compare(&d("P365D")), XsdOrdering::Indeterminate);
        assert_eq!(d("P1Y").compare(&d("P367D")), XsdOrdering::Less);
        assert_eq!(d("P1M").compare(&d("P27D")), XsdOrdering::Greater);
        assert_eq!(d("-P1D").compare(&d("P1D")), XsdOrdering::Less);
    }

    #[test]
    fn test_duration_display_reparses() {
        let d = XsdDuration::parse("P1Y2M3DT4H5M6.5S").unwrap();
        let again = XsdDuration::parse(&d.to_string()).unwrap();
        assert_eq!(d.compare(&again), XsdOrdering::Equal);
    }
}
