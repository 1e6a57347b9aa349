// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::io::Read;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use flate2::read::MultiGzDecoder;
use log_processor::clients::QueueMessage;
use log_processor::config::Config;
use log_processor::parsers::json::JsonParser;
use log_processor::parsers::ParserRegistry;
use log_processor::ParsedEvent;
use serde_json::{json, Map, Value};

/// Registry with JSON parsers for `App.Json` (time in `ts`) and `Audit.Json` (time in `when`)
pub fn test_registry() -> ParserRegistry {
    let mut registry = ParserRegistry::new();
    registry.register("App.Json", || {
        Box::new(JsonParser::new("App.Json", "ts").require_time())
    });
    registry.register("Audit.Json", || {
        Box::new(JsonParser::new("Audit.Json", "when").require_time())
    });
    registry
}

#[allow(dead_code)]
pub fn test_config() -> Config {
    Config {
        processed_data_bucket: "processed-data".to_string(),
        notifications_topic: "arn:aws:sns:us-east-1:123:notifications".to_string(),
        queue_url: "https://sqs.us-east-1.amazonaws.com/123/input".to_string(),
        max_buffer_age: Duration::from_secs(60),
        low_queue_threshold: 10,
        ..Default::default()
    }
}

/// An event of `log_type` at 2024-06-01 `hour`:`minute` UTC
#[allow(dead_code)]
pub fn test_event(log_type: &str, hour: u32, minute: u32) -> ParsedEvent {
    let mut fields = Map::new();
    fields.insert("message".to_string(), json!(format!("event at {hour}:{minute}")));
    ParsedEvent::new(
        log_type,
        Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap(),
        fields,
    )
}

#[allow(dead_code)]
pub fn message(id: &str, body: &str) -> QueueMessage {
    QueueMessage {
        body: body.to_string(),
        receipt_handle: id.to_string(),
    }
}

/// Decompresses an uploaded object into its JSON records
#[allow(dead_code)]
pub fn records(body: &[u8]) -> Vec<Value> {
    let mut text = String::new();
    MultiGzDecoder::new(body).read_to_string(&mut text).unwrap();
    text.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
