// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Errors that can occur while classifying, buffering and draining logs
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read line {line} of {location}: {message}")]
    StreamRead {
        location: String,
        line: u64,
        message: String,
    },

    #[error("failed to classify log line: {0}")]
    Classification(String),

    #[error("failed to serialize event of type {event_type}: {message}")]
    Serialization { event_type: String, message: String },

    #[error("failed to upload s3://{bucket}/{key}: {message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("failed to publish notification for s3://{bucket}/{key}: {message}")]
    Notification {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("failed to read queue depth: {0}")]
    QueueDepth(String),

    #[error("failed to receive messages from queue: {0}")]
    QueueReceive(String),

    #[error("failed to read data streams from message: {0}")]
    SourceRead(String),

    #[error("{0} channel closed unexpectedly")]
    ChannelClosed(&'static str),

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("{}", MultipleDisplay(.0))]
    Multiple(Vec<ProcessingError>),
}

impl ProcessingError {
    /// Folds a list of errors into a single value: `None` when empty, the error itself when
    /// alone, `Multiple` otherwise.
    #[must_use]
    pub fn combine(mut errors: Vec<ProcessingError>) -> Option<ProcessingError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ProcessingError::Multiple(errors)),
        }
    }

    /// Number of leaf errors carried by this value.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            ProcessingError::Multiple(errors) => errors.iter().map(ProcessingError::count).sum(),
            _ => 1,
        }
    }
}

struct MultipleDisplay<'a>(&'a [ProcessingError]);

impl fmt::Display for MultipleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred: ", self.0.len())?;
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}
