// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clients::{FunctionInvoker, Notifier, ObjectStore, Queue, QueueMessage, StreamSource};
use crate::config::Config;
use crate::destination::s3::{S3Destination, S3DestinationConfig};
use crate::drain::{DrainController, DrainSettings};
use crate::error::ProcessingError;
use crate::parsers::ParserRegistry;
use crate::processor::ProcessorFactory;
use crate::scaler::{ScaleOutLoop, ScaleSettings};

/// The service implementations a [`LogProcessor`] runs against.
#[derive(Clone)]
pub struct Clients {
    pub object_store: Arc<dyn ObjectStore>,
    pub notifier: Arc<dyn Notifier>,
    pub queue: Arc<dyn Queue>,
    pub invoker: Arc<dyn FunctionInvoker>,
    pub stream_source: Arc<dyn StreamSource>,
}

/// Entry point of one worker: drains the backlog while scaling out in the background.
pub struct LogProcessor {
    config: Config,
    drain: DrainController,
    queue: Arc<dyn Queue>,
    invoker: Arc<dyn FunctionInvoker>,
}

impl LogProcessor {
    pub fn new(
        config: Config,
        registry: ParserRegistry,
        clients: Clients,
    ) -> Result<Self, ProcessingError> {
        config.validate()?;
        if registry.is_empty() {
            return Err(ProcessingError::InvalidConfig(
                "no parsers registered".to_string(),
            ));
        }

        let destination = Arc::new(S3Destination::new(
            S3DestinationConfig::from(&config),
            clients.object_store,
            clients.notifier,
        ));
        let drain = DrainController::new(
            DrainSettings::from(&config),
            clients.queue.clone(),
            clients.stream_source,
            destination,
            Arc::new(ProcessorFactory::new(registry)),
        );
        Ok(LogProcessor {
            config,
            drain,
            queue: clients.queue,
            invoker: clients.invoker,
        })
    }

    /// Handles one invocation. Returns the number of queue messages processed.
    pub async fn handle(
        &self,
        deadline: Instant,
        initial_batch: Vec<QueueMessage>,
    ) -> Result<usize, ProcessingError> {
        let cancel_token = CancellationToken::new();
        let scaler = if self.config.scaling_enabled() {
            let scaler = ScaleOutLoop::new(
                ScaleSettings::from(&self.config),
                self.queue.clone(),
                self.invoker.clone(),
            );
            Some(scaler.spawn(cancel_token.clone()))
        } else {
            debug!("No worker function configured, scale-out disabled");
            None
        };

        let result = self.drain.stream_events(deadline, initial_batch).await;

        cancel_token.cancel();
        if let Some(handle) = scaler {
            if let Err(e) = handle.await {
                warn!("Scale-out loop failed: {e}");
            }
        }
        result
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}
