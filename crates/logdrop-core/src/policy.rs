//! Validation and defaulting of ingested form fields
//!
//! The policy is a table of [`FieldRule`]s, one per record field, saying
//! whether an absent field is rejected or defaulted. Anything not consumed by
//! a rule is kept verbatim in [`MessageRecord::fields`], including repeated
//! occurrences of a dedicated key after the first.

use crate::error::{Error, Result};
use crate::types::{Facility, Fields, Level, MessageRecord, ReceivedAt};

/// Record fields with a dedicated meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    ReceivedAt,
    Level,
    Facility,
    Message,
}

impl RecordField {
    pub const ALL: [RecordField; 4] = [
        RecordField::ReceivedAt,
        RecordField::Level,
        RecordField::Facility,
        RecordField::Message,
    ];

    /// Form key producers are expected to use
    pub fn key(&self) -> &'static str {
        match self {
            RecordField::ReceivedAt => "receivedAt",
            RecordField::Level => "level",
            RecordField::Facility => "facility",
            RecordField::Message => "message",
        }
    }

    /// Keys sent by Python's `logging.handlers.HTTPHandler` and older clients
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            RecordField::ReceivedAt => &["created", "datestamp"],
            RecordField::Level => &["levelno"],
            RecordField::Facility => &["name"],
            RecordField::Message => &["msg"],
        }
    }
}

/// What to do when a field is absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// Reject the message as a client error
    Reject,
    /// Substitute the field's default
    Default,
}

/// One row of the policy table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub field: RecordField,
    pub missing: Missing,
}

/// Validation and defaulting policy applied to every ingested message
#[derive(Debug, Clone)]
pub struct IngestPolicy {
    pub rules: Vec<FieldRule>,
    pub default_facility: Facility,
    pub accept_aliases: bool,
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self {
            rules: RecordField::ALL
                .iter()
                .map(|&field| FieldRule {
                    field,
                    missing: Missing::Default,
                })
                .collect(),
            default_facility: Facility::default(),
            accept_aliases: true,
        }
    }
}

impl IngestPolicy {
    /// Change how an absent field is handled
    pub fn set_missing(&mut self, field: RecordField, missing: Missing) {
        match self.rules.iter_mut().find(|r| r.field == field) {
            Some(rule) => rule.missing = missing,
            None => self.rules.push(FieldRule { field, missing }),
        }
    }

    fn missing(&self, field: RecordField) -> Missing {
        self.rules
            .iter()
            .find(|r| r.field == field)
            .map(|r| r.missing)
            .unwrap_or(Missing::Default)
    }

    /// Validate form pairs and build a record, using `now` for a missing timestamp
    pub fn apply(&self, pairs: Vec<(String, String)>, now: ReceivedAt) -> Result<MessageRecord> {
        let mut fields = Fields::new();
        for (key, value) in pairs {
            fields.entry(key).or_default().push(value);
        }

        let received_at = match self.take(&mut fields, RecordField::ReceivedAt)? {
            Some((key, value)) if key == "created" => parse_epoch(&value)?,
            Some((_, value)) => value.parse()?,
            None => now,
        };

        let level = match self.take(&mut fields, RecordField::Level)? {
            Some((key, value)) if key == "levelno" => parse_levelno(&value)?,
            Some((_, value)) => value.parse()?,
            None => Level::UNSPECIFIED,
        };

        let facility = match self.take(&mut fields, RecordField::Facility)? {
            Some((_, value)) => Facility::new(value)?,
            None => self.default_facility.clone(),
        };

        let message = self
            .take(&mut fields, RecordField::Message)?
            .map(|(_, value)| value);

        Ok(MessageRecord {
            received_at,
            level,
            facility,
            message,
            fields,
        })
    }

    /// Remove the first value of a field (or of its first present alias) from the pairs
    fn take(&self, fields: &mut Fields, field: RecordField) -> Result<Option<(String, String)>> {
        if let Some(value) = take_first(fields, field.key()) {
            return Ok(Some((field.key().to_string(), value)));
        }
        if self.accept_aliases {
            for alias in field.aliases() {
                if let Some(value) = take_first(fields, alias) {
                    return Ok(Some((alias.to_string(), value)));
                }
            }
        }
        match self.missing(field) {
            Missing::Default => Ok(None),
            Missing::Reject => Err(Error::MissingField(field.key().to_string())),
        }
    }
}

fn take_first(fields: &mut Fields, key: &str) -> Option<String> {
    let values = fields.get_mut(key)?;
    if values.is_empty() {
        return None;
    }
    let first = values.remove(0);
    if values.is_empty() {
        fields.remove(key);
    }
    Some(first)
}

fn parse_epoch(value: &str) -> Result<ReceivedAt> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidTimestamp(value.to_string()))?;
    ReceivedAt::from_epoch_secs(secs)
}

/// `levelno` is an integer in Python records, so it is zero-padded rather than length-checked
fn parse_levelno(value: &str) -> Result<Level> {
    let code: u8 = value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidLevel(value.to_string()))?;
    Level::new(code)
}
