// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, UnboundedSender};

use crate::error::ProcessingError;
use crate::event::ParsedEvent;

pub mod buffer;
pub mod notification;
pub mod s3;

pub use s3::S3Destination;

/// Consumer side of the pipeline.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Consumes `events` until the channel is closed, reporting failures on `errors`.
    ///
    /// Must keep receiving until the channel closes, even after a failure, so the producer is
    /// never left blocked on a full channel.
    async fn send_events(
        &self,
        events: Receiver<ParsedEvent>,
        errors: UnboundedSender<ProcessingError>,
    );
}
