// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Contracts for the cloud services the pipeline talks to.
//!
//! The pipeline never depends on a concrete SDK: the host wires in implementations of these
//! traits (object store, topic, queue, function runtime), and tests use in-memory mocks.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::stream::DataStream;

/// Durable object storage. A put either fully succeeds or fails.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> anyhow::Result<()>;
}

/// Publish/subscribe topic used to announce new objects.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        message: String,
        attributes: HashMap<String, String>,
    ) -> anyhow::Result<()>;
}

/// A message pulled from the work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub body: String,
    /// Opaque handle required to delete the message once processed.
    pub receipt_handle: String,
}

/// Result of a batch delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

/// The work queue the drain controller and the scale-out loop read from.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Approximate number of visible messages.
    async fn approximate_depth(&self) -> anyhow::Result<u64>;

    /// Long-polls for at most `max_messages`, waiting up to `wait_secs`.
    async fn receive(&self, max_messages: usize, wait_secs: u64)
        -> anyhow::Result<Vec<QueueMessage>>;

    async fn delete_batch(&self, receipt_handles: &[String]) -> anyhow::Result<DeleteOutcome>;
}

/// Asynchronous (fire and forget) invocation of another worker instance.
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke_async(&self, function_name: &str, payload: Vec<u8>) -> anyhow::Result<()>;
}

/// Turns a queue message (for instance an object-created notification) into readable streams.
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn data_streams(&self, message: &QueueMessage) -> anyhow::Result<Vec<DataStream>>;
}
