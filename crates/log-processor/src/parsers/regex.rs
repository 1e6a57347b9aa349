// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use super::{LogParser, ParseError};
use crate::error::ProcessingError;
use crate::event::ParsedEvent;

/// Parses lines matching a regular expression; every named capture becomes a field.
///
/// The capture named by `time_capture` is parsed with `time_format` (a `chrono` format string).
/// Formats without an offset are read as UTC.
#[derive(Debug, Clone)]
pub struct RegexParser {
    log_type: String,
    pattern: Regex,
    time_capture: String,
    time_format: String,
}

impl RegexParser {
    pub fn new(
        log_type: &str,
        pattern: &str,
        time_capture: &str,
        time_format: &str,
    ) -> Result<Self, ProcessingError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| ProcessingError::InvalidConfig(format!("{log_type}: {e}")))?;
        if !pattern.capture_names().flatten().any(|n| n == time_capture) {
            return Err(ProcessingError::InvalidConfig(format!(
                "{log_type}: pattern has no capture named {time_capture}"
            )));
        }
        Ok(RegexParser {
            log_type: log_type.to_string(),
            pattern,
            time_capture: time_capture.to_string(),
            time_format: time_format.to_string(),
        })
    }

    fn parse_time(&self, raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(t) = DateTime::parse_from_str(raw, &self.time_format) {
            return Some(t.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, &self.time_format)
            .ok()
            .map(|t| t.and_utc())
    }
}

impl LogParser for RegexParser {
    fn log_type(&self) -> &str {
        &self.log_type
    }

    fn parse(&mut self, line: &str) -> Result<Vec<ParsedEvent>, ParseError> {
        let captures = self
            .pattern
            .captures(line)
            .ok_or_else(|| ParseError::NoMatch(self.log_type.clone()))?;

        let mut fields = Map::new();
        for name in self.pattern.capture_names().flatten() {
            if let Some(m) = captures.name(name) {
                fields.insert(name.to_string(), Value::String(m.as_str().to_string()));
            }
        }

        let raw_time = captures
            .name(&self.time_capture)
            .map(|m| m.as_str())
            .unwrap_or_default();
        let event_time = self
            .parse_time(raw_time)
            .ok_or_else(|| ParseError::InvalidField {
                field: self.time_capture.clone(),
                message: format!("{raw_time:?} does not match {}", self.time_format),
            })?;

        Ok(vec![ParsedEvent::new(&self.log_type, event_time, fields)])
    }
}
