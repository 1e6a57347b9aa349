// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Object-store destination: buffers events per `(log type, hour)` and uploads each buffer as a
//! gzip-compressed, newline-delimited JSON object, announcing it on the notification topic.
//!
//! ```text
//!   events ──> BufferSet ──(size reached / age reached / channel closed)──> flush
//!                                                                            │
//!                          put_object(bucket, key) <─────────────────────────┤
//!                          publish(topic, LogData) <─────────────────────────┘
//! ```
//!
//! The destination is the only owner of its buffers, so no locking is involved. A failed
//! upload or publish stops all writing: the remaining input is received and discarded so the
//! producer can finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::{Receiver, UnboundedSender};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use super::buffer::{BufferSet, EventBuffer};
use super::notification::LogDataNotification;
use super::Destination;
use crate::clients::{Notifier, ObjectStore};
use crate::config::Config;
use crate::error::ProcessingError;
use crate::event::ParsedEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3DestinationConfig {
    pub bucket: String,
    pub topic: String,
    /// Uncompressed size at which a buffer is flushed.
    pub max_file_size: u64,
    /// Age at which a buffer is flushed; also the period of the expiry check.
    pub max_buffer_age: Duration,
    /// Whether failed flushes on shutdown fail the run or are only logged.
    pub surface_final_flush_errors: bool,
}

impl From<&Config> for S3DestinationConfig {
    fn from(config: &Config) -> Self {
        S3DestinationConfig {
            bucket: config.processed_data_bucket.clone(),
            topic: config.notifications_topic.clone(),
            max_file_size: config.max_file_size_bytes,
            max_buffer_age: config.max_buffer_age,
            surface_final_flush_errors: config.surface_final_flush_errors,
        }
    }
}

pub struct S3Destination {
    config: S3DestinationConfig,
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
}

impl S3Destination {
    #[must_use]
    pub fn new(
        config: S3DestinationConfig,
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        S3Destination {
            config,
            store,
            notifier,
        }
    }

    /// Runs until the channel closes or a write fails. Returns the first write failure.
    async fn consume(
        &self,
        events: &mut Receiver<ParsedEvent>,
        buffers: &mut BufferSet,
    ) -> Result<(), ProcessingError> {
        let period = self.config.max_buffer_age;
        let mut expiry = interval_at(Instant::now() + period, period);
        expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // The expiry tick is only ready once per period, so checking it first never
                // holds back events.
                biased;
                _ = expiry.tick() => {
                    for buffer in buffers.take_expired(Instant::now()) {
                        debug!(
                            "Flushing {} events of {} after {:?}",
                            buffer.events(),
                            buffer.log_type(),
                            buffer.age(Instant::now())
                        );
                        self.flush(buffer).await?;
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        return Ok(());
                    };
                    if let Some(full) = buffers.add(&event)? {
                        self.flush(full).await?;
                    }
                }
            }
        }
    }

    /// Compresses, uploads and announces one buffer.
    async fn flush(&self, buffer: EventBuffer) -> Result<(), ProcessingError> {
        let key = buffer.object_key(Utc::now());
        let log_type = buffer.log_type().to_string();
        let event_count = buffer.events();
        let byte_count = buffer.bytes();
        let body = buffer.finish()?;

        self.store
            .put_object(&self.config.bucket, &key, body)
            .await
            .map_err(|e| ProcessingError::Upload {
                bucket: self.config.bucket.clone(),
                key: key.clone(),
                message: e.to_string(),
            })?;

        let notification = LogDataNotification::new(
            &self.config.bucket,
            &key,
            &log_type,
            event_count,
            byte_count,
        );
        let message =
            serde_json::to_string(&notification).map_err(|e| ProcessingError::Serialization {
                event_type: log_type.clone(),
                message: e.to_string(),
            })?;
        self.notifier
            .publish(&self.config.topic, message, notification.attributes())
            .await
            .map_err(|e| ProcessingError::Notification {
                bucket: self.config.bucket.clone(),
                key: key.clone(),
                message: e.to_string(),
            })?;

        debug!("Wrote {event_count} {log_type} events ({byte_count} bytes) to {key}");
        Ok(())
    }

    /// Flushes every open buffer; a failure does not stop the remaining flushes.
    async fn flush_all(&self, buffers: &mut BufferSet, errors: &UnboundedSender<ProcessingError>) {
        for buffer in buffers.drain() {
            if let Err(e) = self.flush(buffer).await {
                if self.config.surface_final_flush_errors {
                    report(errors, e);
                } else {
                    error!("Final flush failed: {e}");
                }
            }
        }
    }
}

#[async_trait]
impl Destination for S3Destination {
    async fn send_events(
        &self,
        mut events: Receiver<ParsedEvent>,
        errors: UnboundedSender<ProcessingError>,
    ) {
        let mut buffers = BufferSet::new(self.config.max_file_size, self.config.max_buffer_age);

        if let Err(e) = self.consume(&mut events, &mut buffers).await {
            report(&errors, e);
            let mut discarded: u64 = 0;
            while events.recv().await.is_some() {
                discarded += 1;
            }
            warn!("Discarded {discarded} events after a write failure");
            return;
        }

        self.flush_all(&mut buffers, &errors).await;
    }
}

fn report(errors: &UnboundedSender<ProcessingError>, e: ProcessingError) {
    error!("{e}");
    if errors.send(e).is_err() {
        error!("Error channel closed, dropping destination error");
    }
}
