// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory, gzip-compressed accumulation of events per `(log type, hour)`.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::ProcessingError;
use crate::event::ParsedEvent;

/// Prefix of every object written to the processed-data bucket.
pub const LOGS_PREFIX: &str = "logs";

const OBJECT_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub struct EventBuffer {
    log_type: String,
    hour: DateTime<Utc>,
    bytes: u64,
    events: u64,
    encoder: GzEncoder<Vec<u8>>,
    created_at: Instant,
}

impl EventBuffer {
    #[must_use]
    pub fn new(log_type: &str, hour: DateTime<Utc>) -> Self {
        EventBuffer {
            log_type: log_type.to_string(),
            hour,
            bytes: 0,
            events: 0,
            encoder: GzEncoder::new(Vec::new(), Compression::default()),
            created_at: Instant::now(),
        }
    }

    /// Appends one newline-terminated JSON record.
    pub fn add(&mut self, event: &ParsedEvent) -> Result<(), ProcessingError> {
        let serialization_error = |message: String| ProcessingError::Serialization {
            event_type: event.log_type.clone(),
            message,
        };
        let mut record = serde_json::to_vec(event).map_err(|e| serialization_error(e.to_string()))?;
        record.push(b'\n');
        self.encoder
            .write_all(&record)
            .map_err(|e| serialization_error(e.to_string()))?;
        self.bytes += record.len() as u64;
        self.events += 1;
        Ok(())
    }

    /// Closes the gzip stream and returns the compressed object body.
    pub fn finish(self) -> Result<Vec<u8>, ProcessingError> {
        let log_type = self.log_type;
        self.encoder
            .finish()
            .map_err(|e| ProcessingError::Serialization {
                event_type: log_type,
                message: e.to_string(),
            })
    }

    #[must_use]
    pub fn log_type(&self) -> &str {
        &self.log_type
    }

    #[must_use]
    pub fn hour(&self) -> DateTime<Utc> {
        self.hour
    }

    /// Uncompressed size of the records written so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    #[must_use]
    pub fn events(&self) -> u64 {
        self.events
    }

    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// `logs/{table}/year=YYYY/month=MM/day=DD/hour=HH/{flush time}-{uuid}.json.gz`
    #[must_use]
    pub fn object_key(&self, flushed_at: DateTime<Utc>) -> String {
        format!(
            "{}{}-{}.json.gz",
            partition_prefix(&self.log_type, self.hour),
            flushed_at.format(OBJECT_TIME_FORMAT),
            Uuid::new_v4()
        )
    }
}

impl std::fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuffer")
            .field("log_type", &self.log_type)
            .field("hour", &self.hour)
            .field("bytes", &self.bytes)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Table name for a log type: `AWS.CloudTrail` becomes `aws_cloudtrail`.
#[must_use]
pub fn table_name(log_type: &str) -> String {
    log_type.to_lowercase().replace('.', "_")
}

#[must_use]
pub fn partition_prefix(log_type: &str, hour: DateTime<Utc>) -> String {
    format!(
        "{LOGS_PREFIX}/{}/{}",
        table_name(log_type),
        hour.format("year=%Y/month=%m/day=%d/hour=%H/")
    )
}

/// The open buffers of one destination, at most one per `(log type, hour)`.
#[derive(Debug)]
pub struct BufferSet {
    buffers: HashMap<(String, DateTime<Utc>), EventBuffer>,
    max_bytes: u64,
    max_age: Duration,
}

impl BufferSet {
    #[must_use]
    pub fn new(max_bytes: u64, max_age: Duration) -> Self {
        BufferSet {
            buffers: HashMap::new(),
            max_bytes,
            max_age,
        }
    }

    /// Adds the event to its buffer, creating the buffer if needed.
    ///
    /// Returns the buffer, removed from the set, once it has reached the size limit.
    pub fn add(&mut self, event: &ParsedEvent) -> Result<Option<EventBuffer>, ProcessingError> {
        let key = (event.log_type.clone(), event.hour_bucket());
        let buffer = self
            .buffers
            .entry(key.clone())
            .or_insert_with(|| EventBuffer::new(&key.0, key.1));
        buffer.add(event)?;
        if buffer.bytes() >= self.max_bytes {
            return Ok(self.buffers.remove(&key));
        }
        Ok(None)
    }

    /// Removes every buffer that has been open for at least the maximum age.
    pub fn take_expired(&mut self, now: Instant) -> Vec<EventBuffer> {
        let expired: Vec<_> = self
            .buffers
            .iter()
            .filter(|(_, buffer)| buffer.age(now) >= self.max_age)
            .map(|(key, _)| key.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|key| self.buffers.remove(&key))
            .collect()
    }

    /// Removes every buffer holding at least one event.
    pub fn drain(&mut self) -> Vec<EventBuffer> {
        self.buffers
            .drain()
            .map(|(_, buffer)| buffer)
            .filter(|buffer| buffer.events() > 0)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
