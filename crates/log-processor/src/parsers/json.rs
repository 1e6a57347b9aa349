// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::Utc;
use serde_json::Value;

use super::{timestamp_from_value, LogParser, ParseError};
use crate::event::ParsedEvent;

/// Parses one JSON object per line, taking the event time from `time_field`.
///
/// Lines missing the time field are stamped with the parse time unless `require_time` is set.
#[derive(Debug, Clone)]
pub struct JsonParser {
    log_type: String,
    time_field: String,
    require_time: bool,
}

impl JsonParser {
    #[must_use]
    pub fn new(log_type: &str, time_field: &str) -> Self {
        JsonParser {
            log_type: log_type.to_string(),
            time_field: time_field.to_string(),
            require_time: false,
        }
    }

    #[must_use]
    pub fn require_time(mut self) -> Self {
        self.require_time = true;
        self
    }
}

impl LogParser for JsonParser {
    fn log_type(&self) -> &str {
        &self.log_type
    }

    fn parse(&mut self, line: &str) -> Result<Vec<ParsedEvent>, ParseError> {
        if !line.starts_with('{') {
            return Err(ParseError::NoMatch(self.log_type.clone()));
        }
        let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(line) else {
            return Err(ParseError::NoMatch(self.log_type.clone()));
        };

        let event_time = match fields.get(&self.time_field) {
            Some(value) => {
                timestamp_from_value(value).ok_or_else(|| ParseError::InvalidField {
                    field: self.time_field.clone(),
                    message: format!("unrecognised timestamp {value}"),
                })?
            }
            None if self.require_time => {
                return Err(ParseError::InvalidField {
                    field: self.time_field.clone(),
                    message: "missing".to_string(),
                })
            }
            None => Utc::now(),
        };

        Ok(vec![ParsedEvent::new(&self.log_type, event_time, fields)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_parses_object_with_time() {
        let mut parser = JsonParser::new("Custom.Json", "ts");
        let events = parser
            .parse(r#"{"ts":"2024-05-01T10:00:00Z","msg":"hello"}"#)
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].log_type, "Custom.Json");
        assert_eq!(
            events[0].event_time,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(events[0].fields["msg"], "hello");
    }

    #[test]
    fn test_rejects_non_objects() {
        let mut parser = JsonParser::new("Custom.Json", "ts");
        assert!(matches!(
            parser.parse("[1,2,3]"),
            Err(ParseError::NoMatch(_))
        ));
        assert!(matches!(
            parser.parse("{not json"),
            Err(ParseError::NoMatch(_))
        ));
        assert!(matches!(
            parser.parse("plain text"),
            Err(ParseError::NoMatch(_))
        ));
    }

    #[test]
    fn test_bad_timestamp_is_invalid_field() {
        let mut parser = JsonParser::new("Custom.Json", "ts");
        let err = parser.parse(r#"{"ts":"soon"}"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field, .. } if field == "ts"));
    }

    #[test]
    fn test_missing_time_uses_parse_time_unless_required() {
        let mut parser = JsonParser::new("Custom.Json", "ts");
        let before = Utc::now();
        let events = parser.parse(r#"{"msg":"no time"}"#).unwrap();
        assert!(events[0].event_time >= before);

        let mut strict = JsonParser::new("Custom.Json", "ts").require_time();
        assert!(strict.parse(r#"{"msg":"no time"}"#).is_err());
    }
}
