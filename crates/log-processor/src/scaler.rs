// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic scale-out: invokes extra workers in proportion to the queue backlog.
//!
//! Every worker runs its own loop, so the number of workers invoked per tick is capped to keep
//! the fan-out from compounding.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::clients::{FunctionInvoker, Queue};
use crate::config::Config;

/// Payload a worker receives when invoked by the scale-out loop.
pub const TRIGGER_PAYLOAD: &[u8] = br#"{"tick":true}"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleSettings {
    pub function_name: String,
    pub interval: Duration,
    pub batch_size_per_worker: u64,
    pub max_scale_up: u64,
}

impl From<&Config> for ScaleSettings {
    fn from(config: &Config) -> Self {
        ScaleSettings {
            function_name: config.worker_function_name.clone(),
            interval: config.scale_interval,
            batch_size_per_worker: config.batch_size_per_worker,
            max_scale_up: config.max_scale_up,
        }
    }
}

/// One tick's observation and decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScalingSample {
    pub queue_depth: u64,
    pub invoked_count: u64,
}

/// Workers needed for `depth` messages, capped at `max_scale_up`.
#[must_use]
pub fn desired_workers(depth: u64, batch_size_per_worker: u64, max_scale_up: u64) -> u64 {
    if batch_size_per_worker == 0 {
        return 0;
    }
    (depth / batch_size_per_worker).min(max_scale_up)
}

pub struct ScaleOutLoop {
    settings: ScaleSettings,
    queue: Arc<dyn Queue>,
    invoker: Arc<dyn FunctionInvoker>,
}

impl ScaleOutLoop {
    #[must_use]
    pub fn new(
        settings: ScaleSettings,
        queue: Arc<dyn Queue>,
        invoker: Arc<dyn FunctionInvoker>,
    ) -> Self {
        ScaleOutLoop {
            settings,
            queue,
            invoker,
        }
    }

    /// Starts the loop in the background. It runs until `cancel_token` is cancelled.
    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel_token).await })
    }

    async fn run(&self, cancel_token: CancellationToken) {
        let period = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel_token.cancelled() => {
                    debug!("Scale-out loop cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        () = cancel_token.cancelled() => {
                            debug!("Scale-out loop cancelled during a tick");
                            return;
                        }
                        sample = self.scale_once() => {
                            if let Some(sample) = sample {
                                debug!(
                                    "Queue depth {}, invoked {} workers",
                                    sample.queue_depth, sample.invoked_count
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    /// Samples the queue and starts the desired number of workers without waiting for them.
    pub async fn scale_once(&self) -> Option<ScalingSample> {
        let queue_depth = match self.queue.approximate_depth().await {
            Ok(depth) => depth,
            Err(e) => {
                warn!("Failed to read queue depth for scaling: {e}");
                return None;
            }
        };

        let invoked_count = desired_workers(
            queue_depth,
            self.settings.batch_size_per_worker,
            self.settings.max_scale_up,
        );
        for _ in 0..invoked_count {
            let invoker = self.invoker.clone();
            let function_name = self.settings.function_name.clone();
            tokio::spawn(async move {
                if let Err(e) = invoker
                    .invoke_async(&function_name, TRIGGER_PAYLOAD.to_vec())
                    .await
                {
                    error!("Failed to invoke {function_name}: {e}");
                }
            });
        }

        Some(ScalingSample {
            queue_depth,
            invoked_count,
        })
    }
}
