//! Read-side filtering over finished log files

use logdrop_core::codec::line_timestamp;
use logdrop_core::{Day, Error, Facility, Level, LogFileName, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::debug;

use crate::list_file_names;

/// A day-time range, level range and facility set to match log lines against
///
/// Bounds are `YYYYMMDD-HHMMSS` and inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    since: String,
    until: String,
    levels: RangeInclusive<Level>,
    /// Empty matches every facility
    facilities: Vec<Facility>,
}

impl LogQuery {
    /// Range between two `YYYYMMDD[-HH[MM[SS]]]` bounds; `until` covers its whole last unit
    pub fn new(since: &str, until: &str) -> Result<Self> {
        let since = parse_bound(since, '0')?;
        let until = parse_bound(until, '9')?;
        if since > until {
            return Err(Error::query(format!("since {} is after until {}", since, until)));
        }
        Ok(Self {
            since,
            until,
            levels: Level::MIN..=Level::MAX,
            facilities: Vec::new(),
        })
    }

    pub fn with_levels(mut self, levels: RangeInclusive<Level>) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_facilities(mut self, facilities: Vec<Facility>) -> Self {
        self.facilities = facilities;
        self
    }

    /// Parse `since[/until[/LL[-LL][/facility...]]]`
    ///
    /// Missing trailing segments take their defaults: `until` is the end of
    /// `since`'s last unit, levels cover `00-99`, no facility means all.
    pub fn from_path(path: &str) -> Result<Self> {
        let mut segments = path.trim_start_matches('/').split('/');
        let since = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::query("missing since"))?;
        let until = segments.next().filter(|s| !s.is_empty()).unwrap_or(since);
        let levels = match segments.next().filter(|s| !s.is_empty()) {
            Some(levels) => parse_levels(levels)?,
            None => Level::MIN..=Level::MAX,
        };
        let facilities = segments
            .filter(|s| !s.is_empty())
            .map(|s| Facility::new(s).map_err(|_| Error::query(format!("bad facility {}", s))))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(since, until)?
            .with_levels(levels)
            .with_facilities(facilities))
    }

    /// Whether a log file can hold matching lines
    pub fn matches_file(&self, name: &LogFileName) -> bool {
        let day = name.day.to_string();
        day.as_str() >= &self.since[..8]
            && day.as_str() <= &self.until[..8]
            && self.levels.contains(&name.level)
            && (self.facilities.is_empty() || self.facilities.contains(&name.facility))
    }

    /// Whether a line's leading timestamp falls in range
    pub fn matches_line(&self, line: &str) -> bool {
        match line_timestamp(line) {
            Some(stamp) => stamp >= self.since.as_str() && stamp <= self.until.as_str(),
            None => false,
        }
    }

    /// All matching lines, in file name order and then file order
    pub fn lines(&self, log_dir: &Path) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        self.scan(log_dir, |line| lines.push(line))?;
        Ok(lines)
    }

    /// Number of matching lines
    pub fn count(&self, log_dir: &Path) -> Result<usize> {
        let mut count = 0;
        self.scan(log_dir, |_| count += 1)?;
        Ok(count)
    }

    fn scan(&self, log_dir: &Path, mut on_match: impl FnMut(String)) -> Result<()> {
        let names = list_file_names(log_dir).map_err(|e| Error::unreachable(log_dir, e))?;
        for file_name in names {
            let Ok(name) = file_name.parse::<LogFileName>() else {
                continue;
            };
            if !self.matches_file(&name) {
                continue;
            }
            debug!("Reading {}", file_name);
            let reader = BufReader::new(File::open(log_dir.join(&file_name))?);
            for line in reader.lines() {
                let line = line?;
                if self.matches_line(&line) {
                    on_match(line);
                }
            }
        }
        Ok(())
    }
}

/// Normalize `YYYYMMDD[-HH[MM[SS]]]` to `YYYYMMDD-HHMMSS`, filling missing digits with `pad`
fn parse_bound(bound: &str, pad: char) -> Result<String> {
    let (day, time) = match bound.split_once('-') {
        Some((day, time)) => (day, time),
        None => (bound, ""),
    };
    day.parse::<Day>()
        .map_err(|_| Error::query(format!("bad day in {}", bound)))?;
    if time.len() > 6 || time.len() % 2 != 0 || !time.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::query(format!("bad time in {}", bound)));
    }

    let mut normalized = format!("{}-{}", day, time);
    while normalized.len() < 15 {
        normalized.push(pad);
    }
    Ok(normalized)
}

/// `LL` or `LL-LL`
fn parse_levels(levels: &str) -> Result<RangeInclusive<Level>> {
    let bad = || Error::query(format!("bad level range {}", levels));
    let (low, high) = levels.split_once('-').unwrap_or((levels, levels));
    let low: Level = low.parse().map_err(|_| bad())?;
    let high: Level = high.parse().map_err(|_| bad())?;
    if low > high {
        return Err(bad());
    }
    Ok(low..=high)
}
