// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wires streams, processors and the destination together for one run.
//!
//! ```text
//!   streams ──> producer task ──(events, bounded)──> consumer task (Destination)
//!                    │                                   │
//!                    └──────────(errors, unbounded)──────┴──> process() result
//! ```
//!
//! Streams are processed one after the other, so only one stream at a time feeds the events
//! channel and memory stays bounded by the channel capacity.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::classification::stats::merge_parser_stats;
use crate::classification::ClassifierStats;
use crate::destination::Destination;
use crate::error::ProcessingError;
use crate::event::ParsedEvent;
use crate::logger::METRICS_TARGET;
use crate::processor::ProcessorFactory;
use crate::stream::DataStream;

/// Processes every stream received on `streams` until the channel closes.
///
/// Succeeds only if neither the stream processing nor the destination reported an error;
/// otherwise every reported error is returned, combined.
pub async fn process(
    streams: Receiver<DataStream>,
    destination: Arc<dyn Destination>,
    factory: Arc<ProcessorFactory>,
    event_channel_capacity: usize,
) -> Result<(), ProcessingError> {
    let (events_tx, events_rx) = mpsc::channel(event_channel_capacity);
    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();

    let producer_errors = errors_tx.clone();
    let producer: JoinHandle<()> = tokio::spawn(async move {
        run_streams(streams, &events_tx, &factory, &producer_errors).await;
        // events_tx drops here, which lets the destination finish
    });

    let consumer_errors = errors_tx.clone();
    let consumer: JoinHandle<()> =
        tokio::spawn(async move { destination.send_events(events_rx, consumer_errors).await });

    drop(errors_tx);
    let mut errors = Vec::new();
    while let Some(e) = errors_rx.recv().await {
        errors.push(e);
    }
    for (name, handle) in [("stream processing", producer), ("destination", consumer)] {
        if let Err(e) = handle.await {
            error!("{name} task failed: {e}");
            errors.push(ProcessingError::TaskFailed(format!("{name}: {e}")));
        }
    }

    match ProcessingError::combine(errors) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn run_streams(
    mut streams: Receiver<DataStream>,
    events: &Sender<ParsedEvent>,
    factory: &ProcessorFactory,
    errors: &UnboundedSender<ProcessingError>,
) {
    let mut totals = ClassifierStats::default();
    let mut parser_totals = BTreeMap::new();
    let mut stream_count: u64 = 0;

    while let Some(stream) = streams.recv().await {
        let mut processor = match factory.build(stream) {
            Ok(processor) => processor,
            Err(e) => {
                report(errors, e);
                break;
            }
        };
        stream_count += 1;
        let result = processor.run(events).await;
        totals += *processor.stats();
        merge_parser_stats(&mut parser_totals, processor.parser_stats());
        if let Err(e) = result {
            report(errors, e);
            break;
        }
    }

    debug!("Processed {stream_count} streams");
    let summary = json!({
        "streams": stream_count,
        "stats": totals,
        "parserStats": parser_totals,
    });
    info!(target: METRICS_TARGET, "run classification totals: {summary}");
}

fn report(errors: &UnboundedSender<ProcessingError>, e: ProcessingError) {
    error!("{e}");
    if errors.send(e).is_err() {
        error!("Error channel closed, dropping stream processing error");
    }
}
