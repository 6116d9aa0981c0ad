//! Message encoding
//!
//! Two representations exist for a [`MessageRecord`]:
//! - the transport body, `application/x-www-form-urlencoded` pairs as POSTed by producers
//! - the canonical line stored in cache entries and log files:
//!   `YYYYMMDD-HHMMSS.uuuuuu LL facility {"message":...,"fields":{...}}\n`
//!
//! A field sent once is a JSON string; a repeated field is an array of its
//! values in arrival order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::policy::RecordField;
use crate::types::{Fields, MessageRecord};

/// JSON tail of a canonical line
#[derive(Debug, Default, Serialize, Deserialize)]
struct LineBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum FieldValue {
    One(String),
    Many(Vec<String>),
}

impl From<&Vec<String>> for FieldValue {
    fn from(values: &Vec<String>) -> Self {
        match values.as_slice() {
            [one] => FieldValue::One(one.clone()),
            many => FieldValue::Many(many.to_vec()),
        }
    }
}

impl From<FieldValue> for Vec<String> {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::One(one) => vec![one],
            FieldValue::Many(many) => many,
        }
    }
}

impl MessageRecord {
    /// Render the canonical, newline-terminated line
    pub fn to_line(&self) -> Result<String> {
        let body = LineBody {
            message: self.message.clone(),
            fields: self
                .fields
                .iter()
                .map(|(key, values)| (key.clone(), FieldValue::from(values)))
                .collect(),
        };
        Ok(format!(
            "{} {} {} {}\n",
            self.received_at,
            self.level,
            self.facility,
            serde_json::to_string(&body)?
        ))
    }

    /// Parse a canonical line (with or without its trailing newline)
    pub fn from_line(line: &str) -> Result<Self> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let mut parts = line.splitn(4, ' ');
        let (Some(received_at), Some(level), Some(facility), Some(json)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidLine(line.to_string()));
        };

        let body: LineBody = serde_json::from_str(json)?;
        Ok(MessageRecord {
            received_at: received_at.parse()?,
            level: level.parse()?,
            facility: facility.parse()?,
            message: body.message,
            fields: body
                .fields
                .into_iter()
                .map(|(key, value)| (key, value.into()))
                .collect::<Fields>(),
        })
    }
}

/// The `YYYYMMDD-HHMMSS` prefix of a canonical line, if it has one
pub fn line_timestamp(line: &str) -> Option<&str> {
    let stamp = line.get(..15)?;
    let bytes = stamp.as_bytes();
    let shaped = bytes[8] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || b.is_ascii_digit());
    shaped.then_some(stamp)
}

/// Encode a record as a form body, the way a producer would send it
pub fn encode_form(record: &MessageRecord) -> Result<String> {
    let received_at = record.received_at.to_string();
    let level = record.level.to_string();

    let mut pairs: Vec<(&str, &str)> = vec![
        (RecordField::ReceivedAt.key(), received_at.as_str()),
        (RecordField::Level.key(), level.as_str()),
        (RecordField::Facility.key(), record.facility.as_str()),
    ];
    if let Some(message) = &record.message {
        pairs.push((RecordField::Message.key(), message.as_str()));
    }
    pairs.extend(
        record
            .fields
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str()))),
    );

    Ok(serde_urlencoded::to_string(pairs)?)
}

/// Decode a form body into its ordered name/value pairs
pub fn decode_form(body: &[u8]) -> Result<Vec<(String, String)>> {
    Ok(serde_urlencoded::from_bytes(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::IngestPolicy;
    use crate::types::{Facility, Level, ReceivedAt};

    fn sample() -> MessageRecord {
        MessageRecord::new(
            "20240101-120000.000000".parse().unwrap(),
            Level::ERROR,
            Facility::new("auth").unwrap(),
        )
        .with_message("login failed")
        .with_field("userid", "person2")
        .with_field("email", "p2@example.com")
    }

    #[test]
    fn test_line_layout() {
        let line = sample().to_line().unwrap();
        assert!(line.starts_with("20240101-120000.000000 40 auth {"));
        assert!(line.ends_with("}\n"));
        assert!(line.contains("login failed"));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_line_round_trip() {
        let record = sample();
        let decoded = MessageRecord::from_line(&record.to_line().unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_line_escapes_newlines() {
        let record = sample().with_field("trace", "line one\nline two");
        let line = record.to_line().unwrap();
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(MessageRecord::from_line(&line).unwrap(), record);
    }

    #[test]
    fn test_line_without_message() {
        let record = MessageRecord::new(ReceivedAt::now(), Level::INFO, Facility::default());
        let line = record.to_line().unwrap();
        assert!(line.ends_with(" {}\n"));
        assert_eq!(MessageRecord::from_line(&line).unwrap(), record);
    }

    #[test]
    fn test_from_line_rejects_garbage() {
        assert!(MessageRecord::from_line("").is_err());
        assert!(MessageRecord::from_line("20240101-120000.000000 40 auth").is_err());
        assert!(MessageRecord::from_line("20240101-120000.000000 4 auth {}").is_err());
        assert!(MessageRecord::from_line("20240101-120000.000000 40 auth not-json").is_err());
    }

    #[test]
    fn test_line_timestamp() {
        let line = sample().to_line().unwrap();
        assert_eq!(line_timestamp(&line), Some("20240101-120000"));
        assert_eq!(line_timestamp("short"), None);
        assert_eq!(line_timestamp("2024010x-120000.000000 40 a {}"), None);
    }

    #[test]
    fn test_form_round_trip() {
        let record = sample().with_field("tag", "a").with_field("tag", "b");
        let body = encode_form(&record).unwrap();
        assert!(body.contains("receivedAt=20240101-120000.000000"));
        assert!(body.contains("message=login+failed"));
        assert!(body.contains("tag=a&tag=b"));

        let pairs = decode_form(body.as_bytes()).unwrap();
        let decoded = IngestPolicy::default().apply(pairs, ReceivedAt::now()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_repeated_fields_persist_as_arrays() {
        let pairs = decode_form(b"level=40&facility=auth&tag=a&tag=b&userid=person2").unwrap();
        let record = IngestPolicy::default().apply(pairs, ReceivedAt::now()).unwrap();

        let line = record.to_line().unwrap();
        assert!(line.contains(r#""tag":["a","b"]"#));
        assert!(line.contains(r#""userid":"person2""#));
        assert_eq!(MessageRecord::from_line(&line).unwrap(), record);
    }

    #[test]
    fn test_decode_form_keeps_order_and_escapes() {
        let pairs = decode_form(b"facility=logger&message=Broken%20pipe&email=p2%40example.com").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("facility".to_string(), "logger".to_string()),
                ("message".to_string(), "Broken pipe".to_string()),
                ("email".to_string(), "p2@example.com".to_string()),
            ]
        );
    }
}
