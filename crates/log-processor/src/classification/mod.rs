// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Picks the right parser for an unknown log line.
//!
//! Each input stream gets its own [`Classifier`], holding one instance of every parser that
//! may apply to the stream in a [`ParserPriorityQueue`]. For each line the classifier walks the
//! queue from the lowest penalty upwards:
//!
//! ```text
//!   line ──> peek top ──> parse ──ok──> penalty = 0, done
//!               ^           │
//!               │          err / panic / no events
//!               │           v
//!               └──── pop, penalty += 1, set aside
//! ```
//!
//! Candidates set aside during a call are pushed back before returning, so a parser that
//! missed one line is still tried (later) for the next. Because a match resets the winner's
//! penalty to zero, a homogeneous stream converges on a single parse attempt per line.

use std::collections::binary_heap::PeekMut;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::ProcessingError;
use crate::event::ParsedEvent;
use crate::parsers::{LogParser, ParseError};

pub mod queue;
pub mod stats;

pub use queue::{ParserCandidate, ParserPriorityQueue};
pub use stats::{ClassifierStats, ParserStats};

/// Outcome of classifying one line.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClassifierResult {
    pub matched: bool,
    pub events: Vec<ParsedEvent>,
    /// Number of parsers that were tried and failed before the match (or in total).
    pub miss_count: usize,
}

#[derive(Debug, Default)]
pub struct Classifier {
    parsers: ParserPriorityQueue,
    stats: ClassifierStats,
    parser_stats: BTreeMap<String, ParserStats>,
}

impl Classifier {
    #[must_use]
    pub fn new(parsers: ParserPriorityQueue) -> Self {
        Classifier {
            parsers,
            stats: ClassifierStats::default(),
            parser_stats: BTreeMap::new(),
        }
    }

    /// Builds a classifier trying `parsers` in the given order until penalties kick in.
    #[must_use]
    pub fn with_parsers(parsers: Vec<Box<dyn LogParser>>) -> Self {
        let mut queue = ParserPriorityQueue::new();
        for parser in parsers {
            queue.add(parser);
        }
        Self::new(queue)
    }

    /// Classifies one raw line.
    ///
    /// The empty string is a no-op that touches no statistic. A whitespace-only line counts as
    /// a line but adds no bytes and neither a success nor a failure. Any other line that no
    /// parser accepts returns [`ProcessingError::Classification`].
    pub fn classify(&mut self, line: &str) -> Result<ClassifierResult, ProcessingError> {
        if line.is_empty() {
            return Ok(ClassifierResult::default());
        }

        let started = Instant::now();
        let line = line.trim();
        let result = if line.is_empty() {
            ClassifierResult::default()
        } else {
            self.try_parsers(line)
        };

        self.stats.classify_time_microseconds += micros(started.elapsed());
        self.stats.log_line_count += 1;
        self.stats.bytes_processed_count += line.len() as u64;
        self.stats.event_count += result.events.len() as u64;
        if !line.is_empty() {
            if result.matched {
                self.stats.successfully_classified_count += 1;
            } else {
                self.stats.classification_failure_count += 1;
            }
        }

        if !line.is_empty() && !result.matched {
            return Err(ProcessingError::Classification(format!(
                "no parser matched after {} attempts",
                result.miss_count
            )));
        }
        Ok(result)
    }

    fn try_parsers(&mut self, line: &str) -> ClassifierResult {
        let mut result = ClassifierResult::default();
        let mut popped = Vec::new();

        loop {
            let Some(mut top) = self.parsers.peek_mut() else {
                break;
            };
            let started = Instant::now();
            let parsed = safe_parse(top.parser_mut(), line);
            let elapsed = micros(started.elapsed());

            let log_type = top.log_type().to_string();
            let stats = self
                .parser_stats
                .entry(log_type.clone())
                .or_insert_with(|| ParserStats::new(&log_type));
            stats.parser_time_microseconds += elapsed;

            match parsed {
                Ok(events) if !events.is_empty() => {
                    stats.bytes_processed_count += line.len() as u64;
                    stats.log_line_count += 1;
                    stats.event_count += events.len() as u64;
                    result.matched = true;
                    result.events = events;
                    drop(top);
                    self.parsers.reward_top();
                    break;
                }
                outcome => {
                    if let Err(e) = outcome {
                        trace!("{log_type} rejected line: {e}");
                    }
                    stats.miss_count += 1;
                    result.miss_count += 1;
                    let mut candidate = PeekMut::pop(top);
                    candidate.penalize();
                    popped.push(candidate);
                }
            }
        }

        for candidate in popped {
            self.parsers.push(candidate);
        }
        result
    }

    #[must_use]
    pub fn stats(&self) -> &ClassifierStats {
        &self.stats
    }

    #[must_use]
    pub fn parser_stats(&self) -> &BTreeMap<String, ParserStats> {
        &self.parser_stats
    }

    #[must_use]
    pub fn parsers(&self) -> &ParserPriorityQueue {
        &self.parsers
    }
}

/// Runs a parser, turning a panic into [`ParseError::Panicked`].
fn safe_parse(parser: &mut dyn LogParser, line: &str) -> Result<Vec<ParsedEvent>, ParseError> {
    match panic::catch_unwind(AssertUnwindSafe(|| parser.parse(line))) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(ParseError::Panicked(message))
        }
    }
}

fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}
