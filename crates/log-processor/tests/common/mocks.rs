// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Recording mock implementations of the service clients

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log_processor::clients::{
    DeleteOutcome, FunctionInvoker, Notifier, ObjectStore, Queue, QueueMessage, StreamSource,
};
use log_processor::stream::{DataStream, SourceMetadata};

/// Object store keeping every put in memory
#[derive(Default)]
pub struct MockObjectStore {
    pub puts: Mutex<Vec<(String, String, Vec<u8>)>>,
    /// Every put fails when set
    pub fail: bool,
}

#[allow(dead_code)]
impl MockObjectStore {
    pub fn failing() -> Self {
        MockObjectStore {
            fail: true,
            ..Default::default()
        }
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, key, _)| key.clone())
            .collect()
    }

    pub fn bodies(&self) -> Vec<Vec<u8>> {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> anyhow::Result<()> {
        self.puts
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string(), body));
        if self.fail {
            anyhow::bail!("mock put failure for {key}");
        }
        Ok(())
    }
}

/// Notifier keeping every published message
#[derive(Default)]
pub struct MockNotifier {
    pub published: Mutex<Vec<(String, String, HashMap<String, String>)>>,
}

#[allow(dead_code)]
impl MockNotifier {
    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    /// Published messages, parsed as JSON
    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message, _)| serde_json::from_str(message).unwrap())
            .collect()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn publish(
        &self,
        topic: &str,
        message: String,
        attributes: HashMap<String, String>,
    ) -> anyhow::Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), message, attributes));
        Ok(())
    }
}

/// Queue answering from scripted depths and batches
///
/// Once the scripted depths run out the queue reports a depth of zero.
#[derive(Default)]
pub struct MockQueue {
    pub depths: Mutex<VecDeque<u64>>,
    pub batches: Mutex<VecDeque<Vec<QueueMessage>>>,
    pub depth_calls: Mutex<usize>,
    pub receive_calls: Mutex<usize>,
    pub deleted: Mutex<Vec<Vec<String>>>,
    pub fail_receive: bool,
    pub fail_delete: bool,
}

#[allow(dead_code)]
impl MockQueue {
    pub fn new(depths: &[u64], batches: Vec<Vec<QueueMessage>>) -> Self {
        MockQueue {
            depths: Mutex::new(depths.iter().copied().collect()),
            batches: Mutex::new(batches.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn receive_calls(&self) -> usize {
        *self.receive_calls.lock().unwrap()
    }

    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Queue for MockQueue {
    async fn approximate_depth(&self) -> anyhow::Result<u64> {
        *self.depth_calls.lock().unwrap() += 1;
        Ok(self.depths.lock().unwrap().pop_front().unwrap_or(0))
    }

    async fn receive(
        &self,
        _max_messages: usize,
        _wait_secs: u64,
    ) -> anyhow::Result<Vec<QueueMessage>> {
        *self.receive_calls.lock().unwrap() += 1;
        if self.fail_receive {
            anyhow::bail!("mock receive failure");
        }
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn delete_batch(&self, receipt_handles: &[String]) -> anyhow::Result<DeleteOutcome> {
        self.deleted.lock().unwrap().push(receipt_handles.to_vec());
        if self.fail_delete {
            anyhow::bail!("mock delete failure");
        }
        Ok(DeleteOutcome {
            succeeded: receipt_handles.len(),
            failed: 0,
        })
    }
}

/// Invoker counting invocations
#[derive(Default)]
pub struct MockInvoker {
    pub invocations: Mutex<Vec<(String, Vec<u8>)>>,
}

#[allow(dead_code)]
impl MockInvoker {
    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }
}

#[async_trait]
impl FunctionInvoker for MockInvoker {
    async fn invoke_async(&self, function_name: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        self.invocations
            .lock()
            .unwrap()
            .push((function_name.to_string(), payload));
        Ok(())
    }
}

/// Treats the message body as the raw content of a single stream
pub struct MockStreamSource {
    pub log_types: Vec<String>,
    /// Bodies for which reading fails
    pub unreadable: HashSet<String>,
    /// Time each message takes to open
    pub delay: Duration,
}

#[allow(dead_code)]
impl MockStreamSource {
    pub fn new(log_types: &[&str]) -> Self {
        MockStreamSource {
            log_types: log_types.iter().map(ToString::to_string).collect(),
            unreadable: HashSet::new(),
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl StreamSource for MockStreamSource {
    async fn data_streams(&self, message: &QueueMessage) -> anyhow::Result<Vec<DataStream>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unreadable.contains(&message.body) {
            anyhow::bail!("mock read failure for {}", message.receipt_handle);
        }
        let source = SourceMetadata {
            source_id: "source-1".to_string(),
            source_label: "test source".to_string(),
            integration_type: "aws-s3".to_string(),
            bucket: Some("raw-logs".to_string()),
            key: Some(format!("{}.log", message.receipt_handle)),
            log_types: self.log_types.clone(),
        };
        Ok(vec![DataStream::from_bytes(
            message.body.clone().into_bytes(),
            source,
        )?])
    }
}
