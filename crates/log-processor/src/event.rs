// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// Timestamp layout used for the `p_*` time fields of serialized events.
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Keys the pipeline adds to every serialized event.
pub const RESERVED_FIELDS: [&str; 5] = [
    "p_log_type",
    "p_event_time",
    "p_parse_time",
    "p_source_id",
    "p_source_label",
];

/// A structured record produced by a successful parser.
///
/// The parser owns `fields`; the pipeline only relies on `log_type` and `event_time` for
/// bucketing and adds the `p_*` metadata when the event is serialized. Parser fields named like
/// a reserved key are dropped from the output.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub fields: Map<String, Value>,
    pub log_type: String,
    pub event_time: DateTime<Utc>,
    pub parse_time: DateTime<Utc>,
    pub source_id: Option<String>,
    pub source_label: Option<String>,
}

impl Serialize for ParsedEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in &self.fields {
            if !RESERVED_FIELDS.contains(&key.as_str()) {
                map.serialize_entry(key, value)?;
            }
        }
        map.serialize_entry("p_log_type", &self.log_type)?;
        map.serialize_entry("p_event_time", &format_time(self.event_time))?;
        map.serialize_entry("p_parse_time", &format_time(self.parse_time))?;
        if let Some(source_id) = &self.source_id {
            map.serialize_entry("p_source_id", source_id)?;
        }
        if let Some(source_label) = &self.source_label {
            map.serialize_entry("p_source_label", source_label)?;
        }
        map.end()
    }
}

impl ParsedEvent {
    #[must_use]
    pub fn new(log_type: &str, event_time: DateTime<Utc>, fields: Map<String, Value>) -> Self {
        ParsedEvent {
            fields,
            log_type: log_type.to_string(),
            event_time,
            parse_time: Utc::now(),
            source_id: None,
            source_label: None,
        }
    }

    /// The hour this event is bucketed into.
    #[must_use]
    pub fn hour_bucket(&self) -> DateTime<Utc> {
        truncate_to_hour(self.event_time)
    }
}

#[must_use]
pub fn truncate_to_hour(time: DateTime<Utc>) -> DateTime<Utc> {
    // Only fails for timestamps near the representable limits.
    time.duration_trunc(TimeDelta::hours(1)).unwrap_or(time)
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format(EVENT_TIME_FORMAT).to_string()
}
