//! Core types for logdrop
//!
//! Every token that ends up in a file name (timestamp, day, level, facility)
//! renders at a fixed width so that lexicographic order of names matches
//! chronological order.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::DEFAULT_FACILITY;
use crate::error::{Error, Result};

/// Facility names: alphanumeric and underscore only (no separators, no spaces)
static FACILITY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("Invalid facility regex"));

/// Parse a run of ASCII digits, rejecting signs and whitespace
fn digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// UTC calendar day, rendered as `YYYYMMDD`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Day(NaiveDate);

impl Day {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Current UTC day
    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }

    /// The day `n` days before this one, or `None` before the start of the calendar
    pub fn minus_days(&self, n: u32) -> Option<Self> {
        self.0
            .checked_sub_signed(Duration::days(i64::from(n)))
            .map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}",
            self.0.year(),
            self.0.month(),
            self.0.day()
        )
    }
}

impl FromStr for Day {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 8 {
            return Err(Error::InvalidDay(s.to_string()));
        }
        let (y, m, d) = (digits(&s[0..4]), digits(&s[4..6]), digits(&s[6..8]));
        match (y, m, d) {
            (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y as i32, m, d)
                .map(Day)
                .ok_or_else(|| Error::InvalidDay(s.to_string())),
            _ => Err(Error::InvalidDay(s.to_string())),
        }
    }
}

/// UTC receive instant with microsecond precision, rendered as `YYYYMMDD-HHMMSS.uuuuuu`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReceivedAt(DateTime<Utc>);

impl ReceivedAt {
    /// Width of the rendered form
    pub const WIDTH: usize = 22;

    /// Last year that renders in four digits
    pub const MAX_YEAR: i32 = 9999;

    /// Current UTC time truncated to microseconds
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Truncate an arbitrary instant to microsecond precision
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let micros = dt.timestamp_subsec_micros();
        let truncated = dt.with_nanosecond(micros * 1_000).unwrap_or(dt);
        Self(truncated)
    }

    /// Convert seconds since the epoch (as sent by Python's `logging` records)
    pub fn from_epoch_secs(secs: f64) -> Result<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(Error::InvalidTimestamp(secs.to_string()));
        }
        let micros = (secs * 1_000_000.0).round() as i64;
        Utc.timestamp_micros(micros)
            .single()
            .filter(|dt| dt.year() <= Self::MAX_YEAR)
            .map(Self)
            .ok_or_else(|| Error::InvalidTimestamp(secs.to_string()))
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// The UTC day this instant falls on
    pub fn day(&self) -> Day {
        Day(self.0.date_naive())
    }
}

impl fmt::Display for ReceivedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:02}{:02}{:02}.{:06}",
            self.day(),
            self.0.hour(),
            self.0.minute(),
            self.0.second(),
            self.0.timestamp_subsec_micros()
        )
    }
}

impl FromStr for ReceivedAt {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidTimestamp(s.to_string());
        if s.len() != Self::WIDTH || !s.is_ascii() {
            return Err(invalid());
        }
        let bytes = s.as_bytes();
        if bytes[8] != b'-' || bytes[15] != b'.' {
            return Err(invalid());
        }

        let day: Day = s[0..8].parse().map_err(|_| invalid())?;
        let hour = digits(&s[9..11]).ok_or_else(invalid)?;
        let minute = digits(&s[11..13]).ok_or_else(invalid)?;
        let second = digits(&s[13..15]).ok_or_else(invalid)?;
        let micro = digits(&s[16..22]).ok_or_else(invalid)?;

        let naive: NaiveDateTime = day
            .date()
            .and_hms_micro_opt(hour, minute, second, micro)
            .ok_or_else(invalid)?;
        Ok(Self(Utc.from_utc_datetime(&naive)))
    }
}

/// Two-digit severity code, higher is more severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(u8);

impl Level {
    pub const UNSPECIFIED: Level = Level(0);
    pub const DEBUG: Level = Level(10);
    pub const INFO: Level = Level(20);
    pub const NOTICE: Level = Level(25);
    pub const WARN: Level = Level(30);
    pub const ERROR: Level = Level(40);
    pub const CRIT: Level = Level(50);
    pub const ALERT: Level = Level(60);
    pub const EMERG: Level = Level(70);

    pub const MIN: Level = Level(0);
    pub const MAX: Level = Level(99);

    pub fn new(code: u8) -> Result<Self> {
        if code > 99 {
            return Err(Error::InvalidLevel(code.to_string()));
        }
        Ok(Self(code))
    }

    pub fn code(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 2 {
            return Err(Error::InvalidLevel(s.to_string()));
        }
        digits(s)
            .map(|code| Level(code as u8))
            .ok_or_else(|| Error::InvalidLevel(s.to_string()))
    }
}

/// Producer-assigned source identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Facility(String);

impl Facility {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if validate_facility(&name) {
            Ok(Self(name))
        } else {
            Err(Error::InvalidFacility(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Facility {
    fn default() -> Self {
        Self(DEFAULT_FACILITY.to_string())
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Facility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Check a facility name: non-empty, alphanumeric and underscore only
pub fn validate_facility(name: &str) -> bool {
    FACILITY_REGEX.is_match(name)
}

/// Producer-supplied pairs keyed by name; repeated keys keep every value in arrival order
pub type Fields = BTreeMap<String, Vec<String>>;

/// One structured log message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub received_at: ReceivedAt,
    pub level: Level,
    pub facility: Facility,
    /// Static description of the event
    pub message: Option<String>,
    /// Additional producer-supplied pairs, persisted verbatim
    pub fields: Fields,
}

impl MessageRecord {
    pub fn new(received_at: ReceivedAt, level: Level, facility: Facility) -> Self {
        Self {
            received_at,
            level,
            facility,
            message: None,
            fields: Fields::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Canonical cache entry name for this record
    pub fn entry_name(&self) -> CacheEntryName {
        CacheEntryName {
            received_at: self.received_at,
            level: self.level,
            facility: self.facility.clone(),
            seq: 0,
        }
    }

    /// Destination log file for this record
    pub fn log_name(&self) -> LogFileName {
        self.entry_name().log_name()
    }
}

/// Name of one pending message file: `YYYYMMDD-HHMMSS.uuuuuu-LL-facility[-NNNN]`
///
/// The optional trailing `-NNNN` only appears when two messages collided on the
/// same timestamp, level and facility. It is zero-padded so that it sorts after
/// the bare name and in collision order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheEntryName {
    pub received_at: ReceivedAt,
    pub level: Level,
    pub facility: Facility,
    pub seq: u32,
}

impl CacheEntryName {
    /// Highest collision disambiguator
    pub const MAX_SEQ: u32 = 9999;

    const SEQ_WIDTH: usize = 4;

    /// Same name with a collision disambiguator
    pub fn with_seq(&self, seq: u32) -> Self {
        Self {
            seq,
            ..self.clone()
        }
    }

    /// Destination log file, keyed on the day the message was received
    pub fn log_name(&self) -> LogFileName {
        LogFileName {
            day: self.received_at.day(),
            level: self.level,
            facility: self.facility.clone(),
        }
    }
}

impl fmt::Display for CacheEntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.received_at, self.level, self.facility)?;
        if self.seq > 0 {
            write!(f, "-{:0width$}", self.seq, width = Self::SEQ_WIDTH)?;
        }
        Ok(())
    }
}

impl FromStr for CacheEntryName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidEntryName(s.to_string());
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 4 && parts.len() != 5 {
            return Err(invalid());
        }

        let received_at: ReceivedAt = s
            .get(..ReceivedAt::WIDTH)
            .ok_or_else(invalid)?
            .parse()
            .map_err(|_| invalid())?;
        let level: Level = parts[2].parse().map_err(|_| invalid())?;
        let facility = Facility::new(parts[3]).map_err(|_| invalid())?;
        let seq = match parts.get(4) {
            Some(n) if n.len() == Self::SEQ_WIDTH => match digits(n) {
                Some(seq) if seq > 0 => seq,
                _ => return Err(invalid()),
            },
            Some(_) => return Err(invalid()),
            None => 0,
        };

        Ok(Self {
            received_at,
            level,
            facility,
            seq,
        })
    }
}

/// Name of an aggregated log file: `YYYYMMDD-LL-facility`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogFileName {
    pub day: Day,
    pub level: Level,
    pub facility: Facility,
}

impl fmt::Display for LogFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.day, self.level, self.facility)
    }
}

impl FromStr for LogFileName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidLogName(s.to_string());
        let mut parts = s.split('-');
        let (Some(day), Some(level), Some(facility), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        Ok(Self {
            day: day.parse().map_err(|_| invalid())?,
            level: level.parse().map_err(|_| invalid())?,
            facility: Facility::new(facility).map_err(|_| invalid())?,
        })
    }
}

/// Identity of one aggregation worker: process id plus an in-process index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId {
    pub pid: u32,
    pub index: usize,
}

impl WorkerId {
    pub fn new(pid: u32, index: usize) -> Self {
        Self { pid, index }
    }

    /// Worker `index` of the current process
    pub fn current(index: usize) -> Self {
        Self::new(std::process::id(), index)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.pid, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(s: &str) -> ReceivedAt {
        s.parse().unwrap()
    }

    #[test]
    fn test_received_at_round_trip() {
        let at = stamp("20240101-120000.000000");
        assert_eq!(at.to_string(), "20240101-120000.000000");
        assert_eq!(at.day().to_string(), "20240101");

        let at = stamp("19991231-235959.999999");
        assert_eq!(at.to_string(), "19991231-235959.999999");
    }

    #[test]
    fn test_received_at_rejects_variable_width() {
        assert!("20240101-120000.00000".parse::<ReceivedAt>().is_err());
        assert!("20240101-120000".parse::<ReceivedAt>().is_err());
        assert!("2024-01-01T12:00:00Z".parse::<ReceivedAt>().is_err());
        assert!("20241301-120000.000000".parse::<ReceivedAt>().is_err());
        assert!("20240101-250000.000000".parse::<ReceivedAt>().is_err());
        assert!("20240101+120000.000000".parse::<ReceivedAt>().is_err());
    }

    #[test]
    fn test_received_at_now_is_fixed_width() {
        let now = ReceivedAt::now();
        let text = now.to_string();
        assert_eq!(text.len(), ReceivedAt::WIDTH);
        assert_eq!(text.parse::<ReceivedAt>().unwrap(), now);
    }

    #[test]
    fn test_received_at_from_epoch() {
        let at = ReceivedAt::from_epoch_secs(1512203982.239825).unwrap();
        assert_eq!(at.to_string(), "20171202-083942.239825");
        assert!(ReceivedAt::from_epoch_secs(f64::NAN).is_err());
        assert!(ReceivedAt::from_epoch_secs(-1.0).is_err());
    }

    #[test]
    fn test_received_at_from_epoch_keeps_four_digit_years() {
        let last = ReceivedAt::from_epoch_secs(253402300799.0).unwrap();
        assert_eq!(last.to_string(), "99991231-235959.000000");
        assert_eq!(last.to_string().len(), ReceivedAt::WIDTH);

        assert!(ReceivedAt::from_epoch_secs(253402300800.0).is_err());
        assert!(ReceivedAt::from_epoch_secs(1e12).is_err());
        assert!(ReceivedAt::from_epoch_secs(1e300).is_err());
    }

    #[test]
    fn test_level_two_digits() {
        assert_eq!("40".parse::<Level>().unwrap(), Level::ERROR);
        assert_eq!("05".parse::<Level>().unwrap().to_string(), "05");
        assert!("4".parse::<Level>().is_err());
        assert!("400".parse::<Level>().is_err());
        assert!("+4".parse::<Level>().is_err());
        assert!("ab".parse::<Level>().is_err());
        assert_eq!(Level::UNSPECIFIED.to_string(), "00");
        assert!(Level::new(100).is_err());
    }

    #[test]
    fn test_level_order_matches_string_order() {
        let a = Level::new(9).unwrap();
        let b = Level::new(10).unwrap();
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn test_facility_validation() {
        assert!(Facility::new("facility_one").is_ok());
        assert!(Facility::new("Auth2").is_ok());
        assert!(Facility::new("").is_err());
        assert!(Facility::new("has space").is_err());
        assert!(Facility::new("has-dash").is_err());
        assert!(Facility::new("../etc").is_err());
        assert_eq!(Facility::default().as_str(), "unspecified");
    }

    #[test]
    fn test_entry_name_round_trip() {
        let name: CacheEntryName = "20240101-120000.000000-40-auth".parse().unwrap();
        assert_eq!(name.level, Level::ERROR);
        assert_eq!(name.facility.as_str(), "auth");
        assert_eq!(name.seq, 0);
        assert_eq!(name.to_string(), "20240101-120000.000000-40-auth");

        let dup = name.with_seq(3);
        assert_eq!(dup.to_string(), "20240101-120000.000000-40-auth-0003");
        assert_eq!(dup.to_string().parse::<CacheEntryName>().unwrap(), dup);
    }

    #[test]
    fn test_entry_name_rejects_garbage() {
        assert!("".parse::<CacheEntryName>().is_err());
        assert!(".tmp-1234".parse::<CacheEntryName>().is_err());
        assert!("20240101-120000.000000-4-auth".parse::<CacheEntryName>().is_err());
        assert!("20240101-120000.000000-40".parse::<CacheEntryName>().is_err());
        assert!("20240101-120000.000000-40-auth-0000".parse::<CacheEntryName>().is_err());
        assert!("20240101-120000.000000-40-auth-x".parse::<CacheEntryName>().is_err());
        assert!("20240101-120000.000000-40-auth-1".parse::<CacheEntryName>().is_err());
        assert!("20240101-120000.000000-40-auth-00001".parse::<CacheEntryName>().is_err());
        assert!("20240101-120000.000000-40-auth-+001".parse::<CacheEntryName>().is_err());
    }

    #[test]
    fn test_entry_names_sort_chronologically() {
        let mut names = vec![
            "20240102-000000.000000-10-b",
            "20240101-235959.999999-70-a",
            "20240101-120000.000001-40-auth",
            "20240101-120000.000000-40-auth-0001",
            "20240101-120000.000000-40-auth",
        ];
        names.sort();
        let parsed: Vec<ReceivedAt> = names
            .iter()
            .map(|n| n.parse::<CacheEntryName>().unwrap().received_at)
            .collect();
        let mut sorted = parsed.clone();
        sorted.sort();
        assert_eq!(parsed, sorted);
        assert_eq!(names[0], "20240101-120000.000000-40-auth");
        assert_eq!(names[1], "20240101-120000.000000-40-auth-0001");
    }

    #[test]
    fn test_collision_suffixes_sort_in_collision_order() {
        let base: CacheEntryName = "20240101-120000.000000-40-auth".parse().unwrap();
        let mut names: Vec<String> = [10, 2, 0, 1, 9999, 100]
            .iter()
            .map(|&seq| base.with_seq(seq).to_string())
            .collect();
        names.sort();
        let seqs: Vec<u32> = names
            .iter()
            .map(|n| n.parse::<CacheEntryName>().unwrap().seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 10, 100, 9999]);
    }

    #[test]
    fn test_log_name_from_entry() {
        let name: CacheEntryName = "20240101-235959.999999-40-auth-0002".parse().unwrap();
        let log = name.log_name();
        assert_eq!(log.to_string(), "20240101-40-auth");
        assert_eq!("20240101-40-auth".parse::<LogFileName>().unwrap(), log);
        assert!("20240101-40".parse::<LogFileName>().is_err());
        assert!("20240101-40-auth-x".parse::<LogFileName>().is_err());
    }

    #[test]
    fn test_day_arithmetic() {
        let day: Day = "20240301".parse().unwrap();
        assert_eq!(day.minus_days(1).unwrap().to_string(), "20240229");
        assert_eq!(day.minus_days(2).unwrap().to_string(), "20240228");
        assert!(day.minus_days(u32::MAX).is_none());
        assert!("2024030".parse::<Day>().is_err());
        assert!("20240230".parse::<Day>().is_err());
    }

    #[test]
    fn test_worker_id_display() {
        assert_eq!(WorkerId::new(4242, 1).to_string(), "4242-1");
    }
}
