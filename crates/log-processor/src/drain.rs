// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Backlog draining for one invocation.
//!
//! The batch delivered with the invocation is always processed. While there is time left and
//! the queue is still backed up, more messages are pulled from the queue and fed into the same
//! pipeline. Pulled messages are deleted only once the whole pipeline has finished
//! successfully; if anything fails they become visible again and are reprocessed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, Sender};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clients::{Queue, QueueMessage, StreamSource};
use crate::config::Config;
use crate::destination::Destination;
use crate::error::ProcessingError;
use crate::pipeline;
use crate::processor::ProcessorFactory;
use crate::stream::DataStream;

#[derive(Debug, Clone, PartialEq)]
pub struct DrainSettings {
    pub low_queue_threshold: u64,
    pub receive_max_messages: usize,
    pub receive_wait: Duration,
    pub deadline_scalar: f64,
    pub event_channel_capacity: usize,
    pub stream_channel_capacity: usize,
}

impl From<&Config> for DrainSettings {
    fn from(config: &Config) -> Self {
        DrainSettings {
            low_queue_threshold: config.low_queue_threshold,
            receive_max_messages: config.receive_max_messages,
            receive_wait: config.receive_wait,
            deadline_scalar: config.deadline_scalar,
            event_channel_capacity: config.event_channel_capacity,
            stream_channel_capacity: config.stream_channel_capacity,
        }
    }
}

/// What the feeding side produced before the streams channel was closed.
struct Fed {
    polled: usize,
    receipts: Vec<String>,
}

pub struct DrainController {
    settings: DrainSettings,
    queue: Arc<dyn Queue>,
    source: Arc<dyn StreamSource>,
    destination: Arc<dyn Destination>,
    factory: Arc<ProcessorFactory>,
}

impl DrainController {
    #[must_use]
    pub fn new(
        settings: DrainSettings,
        queue: Arc<dyn Queue>,
        source: Arc<dyn StreamSource>,
        destination: Arc<dyn Destination>,
        factory: Arc<ProcessorFactory>,
    ) -> Self {
        DrainController {
            settings,
            queue,
            source,
            destination,
            factory,
        }
    }

    /// Processes `initial_batch`, then keeps pulling from the queue until it runs low or the
    /// discounted `deadline` passes. Returns the number of messages processed.
    pub async fn stream_events(
        &self,
        deadline: Instant,
        initial_batch: Vec<QueueMessage>,
    ) -> Result<usize, ProcessingError> {
        let initial = initial_batch.len();
        let polling_deadline =
            discounted_deadline(Instant::now(), deadline, self.settings.deadline_scalar);
        let (streams_tx, streams_rx) = mpsc::channel(self.settings.stream_channel_capacity);
        let pipeline_handle = tokio::spawn(pipeline::process(
            streams_rx,
            self.destination.clone(),
            self.factory.clone(),
            self.settings.event_channel_capacity,
        ));

        let fed = self.feed(&streams_tx, polling_deadline, initial_batch).await;
        drop(streams_tx);

        let pipeline_result = match pipeline_handle.await {
            Ok(result) => result,
            Err(e) => Err(ProcessingError::TaskFailed(format!("pipeline: {e}"))),
        };
        // A pipeline failure explains any read failure it caused, so it wins.
        pipeline_result?;
        let fed = fed?;

        self.delete(&fed.receipts).await;
        let processed = initial + fed.polled;
        info!("Processed {processed} messages ({initial} delivered, {} polled)", fed.polled);
        Ok(processed)
    }

    async fn feed(
        &self,
        streams: &Sender<DataStream>,
        polling_deadline: Instant,
        initial_batch: Vec<QueueMessage>,
    ) -> Result<Fed, ProcessingError> {
        for message in &initial_batch {
            self.feed_message(streams, message).await?;
        }

        let mut fed = Fed {
            polled: 0,
            receipts: Vec::new(),
        };
        while Instant::now() < polling_deadline {
            let depth = self
                .queue
                .approximate_depth()
                .await
                .map_err(|e| ProcessingError::QueueDepth(e.to_string()))?;
            if depth < self.settings.low_queue_threshold {
                debug!("Queue depth {depth} below threshold, stop polling");
                break;
            }

            let messages = self
                .queue
                .receive(
                    self.settings.receive_max_messages,
                    self.settings.receive_wait.as_secs(),
                )
                .await
                .map_err(|e| ProcessingError::QueueReceive(e.to_string()))?;
            if messages.is_empty() {
                debug!("Queue depth {depth} but nothing received, stop polling");
                break;
            }

            fed.polled += messages.len();
            for message in messages {
                self.feed_message(streams, &message).await?;
                fed.receipts.push(message.receipt_handle);
            }
        }
        Ok(fed)
    }

    async fn feed_message(
        &self,
        streams: &Sender<DataStream>,
        message: &QueueMessage,
    ) -> Result<(), ProcessingError> {
        let data_streams = self
            .source
            .data_streams(message)
            .await
            .map_err(|e| ProcessingError::SourceRead(e.to_string()))?;
        for stream in data_streams {
            streams
                .send(stream)
                .await
                .map_err(|_| ProcessingError::ChannelClosed("streams"))?;
        }
        Ok(())
    }

    /// Best effort: undeleted messages are simply processed again.
    async fn delete(&self, receipts: &[String]) {
        if receipts.is_empty() {
            return;
        }
        match self.queue.delete_batch(receipts).await {
            Ok(outcome) if outcome.failed > 0 => warn!(
                "Failed to delete {} of {} messages ({} succeeded)",
                outcome.failed,
                receipts.len(),
                outcome.succeeded
            ),
            Ok(outcome) => debug!("Deleted {} messages", outcome.succeeded),
            Err(e) => error!("Failed to delete {} messages: {e}", receipts.len()),
        }
    }
}

/// `now + (deadline - now) * scalar`, leaving the rest of the time for flushing.
#[must_use]
pub fn discounted_deadline(now: Instant, deadline: Instant, scalar: f64) -> Instant {
    let remaining = deadline.saturating_duration_since(now);
    now + remaining.mul_f64(scalar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discounted_deadline() {
        let now = Instant::now();
        let deadline = now + Duration::from_secs(100);
        assert_eq!(
            discounted_deadline(now, deadline, 0.8),
            now + Duration::from_secs(80)
        );
        assert_eq!(discounted_deadline(now, deadline, 1.0), deadline);
    }

    #[test]
    fn test_discounted_deadline_in_the_past() {
        let now = Instant::now();
        let deadline = now.checked_sub(Duration::from_secs(5)).unwrap_or(now);
        assert_eq!(discounted_deadline(now, deadline, 0.8), now);
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config {
            low_queue_threshold: 3,
            receive_wait: Duration::from_secs(5),
            ..Default::default()
        };
        let settings = DrainSettings::from(&config);
        assert_eq!(settings.low_queue_threshold, 3);
        assert_eq!(settings.receive_wait, Duration::from_secs(5));
        assert_eq!(settings.receive_max_messages, config.receive_max_messages);
    }
}
