// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use crate::classification::{Classifier, ClassifierStats, ParserStats};
use crate::error::ProcessingError;
use crate::event::ParsedEvent;
use crate::logger::METRICS_TARGET;
use crate::parsers::ParserRegistry;
use crate::stream::DataStream;

/// Builds a [`Processor`] for each incoming stream from the parsers registered for its log types.
#[derive(Debug, Clone, Default)]
pub struct ProcessorFactory {
    registry: ParserRegistry,
}

impl ProcessorFactory {
    #[must_use]
    pub fn new(registry: ParserRegistry) -> Self {
        ProcessorFactory { registry }
    }

    pub fn build(&self, stream: DataStream) -> Result<Processor, ProcessingError> {
        let mut parsers = Vec::with_capacity(stream.source.log_types.len());
        for log_type in &stream.source.log_types {
            match self.registry.build(log_type) {
                Some(parser) => parsers.push(parser),
                None => warn!(
                    "No parser registered for log type {log_type} of source {}",
                    stream.source.source_id
                ),
            }
        }
        if parsers.is_empty() {
            return Err(ProcessingError::InvalidConfig(format!(
                "no parsers available for {} (log types: {:?})",
                stream.source.location(),
                stream.source.log_types
            )));
        }
        Ok(Processor {
            stream,
            classifier: Classifier::with_parsers(parsers),
        })
    }
}

/// Classifies the lines of one stream and forwards the events.
#[derive(Debug)]
pub struct Processor {
    stream: DataStream,
    classifier: Classifier,
}

impl Processor {
    /// Reads the stream to the end, sending every parsed event to `events`.
    ///
    /// Lines no parser understands are logged and skipped. A read error aborts the stream.
    /// The channel is left open: it is shared with the streams processed after this one.
    pub async fn run(&mut self, events: &Sender<ParsedEvent>) -> Result<(), ProcessingError> {
        let result = self.read_lines(events).await;
        self.log_summary(result.is_ok());
        result
    }

    async fn read_lines(&mut self, events: &Sender<ParsedEvent>) -> Result<(), ProcessingError> {
        let source = &self.stream.source;
        let mut buf = Vec::new();
        let mut line_number: u64 = 0;

        loop {
            buf.clear();
            let read = self
                .stream
                .reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| ProcessingError::StreamRead {
                    location: source.location(),
                    line: line_number + 1,
                    message: e.to_string(),
                })?;
            if read == 0 {
                return Ok(());
            }
            line_number += 1;

            // Undecodable bytes are replaced so the line can still be classified.
            let line = String::from_utf8_lossy(&buf);
            if matches!(line, Cow::Owned(_)) {
                debug!("Line {line_number} of {} is not valid UTF-8", source.location());
            }

            match self.classifier.classify(&line) {
                Ok(result) => {
                    for mut event in result.events {
                        event.source_id = Some(source.source_id.clone());
                        event.source_label = Some(source.source_label.clone());
                        events
                            .send(event)
                            .await
                            .map_err(|_| ProcessingError::ChannelClosed("events"))?;
                    }
                }
                Err(e) => warn!(
                    "Skipping line {line_number} of {} (source id {}, label {}): {e}",
                    source.location(),
                    source.source_id,
                    source.source_label
                ),
            }
        }
    }

    fn log_summary(&self, success: bool) {
        let source = &self.stream.source;
        let summary = json!({
            "sourceId": source.source_id,
            "sourceLabel": source.source_label,
            "integrationType": source.integration_type,
            "location": source.location(),
            "success": success,
            "stats": self.classifier.stats(),
            "parserStats": self.classifier.parser_stats(),
        });
        info!(target: METRICS_TARGET, "stream classification summary: {summary}");

        for stats in self
            .classifier
            .parser_stats()
            .values()
            .filter(|s| s.log_line_count > 0)
        {
            let record = json!({
                "metric": "BytesProcessed",
                "logType": stats.log_type,
                "sourceId": source.source_id,
                "value": stats.bytes_processed_count,
                "events": stats.event_count,
            });
            info!(target: METRICS_TARGET, "{record}");
        }
        debug!("Finished {} ({} lines)", source.location(), self.stats().log_line_count);
    }

    #[must_use]
    pub fn source(&self) -> &crate::stream::SourceMetadata {
        &self.stream.source
    }

    #[must_use]
    pub fn stats(&self) -> &ClassifierStats {
        self.classifier.stats()
    }

    #[must_use]
    pub fn parser_stats(&self) -> &BTreeMap<String, ParserStats> {
        self.classifier.parser_stats()
    }
}
