// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Penalty-ordered collection of candidate parsers.
//!
//! The queue is a binary heap keyed on `(penalty, insertion sequence)`: the candidate with the
//! lowest penalty is on top, and equal penalties fall back to registration order. Penalties are
//! driven by the classifier: a miss adds one, a match resets to zero, so the parser that matched
//! the previous line is tried first for the next one.

use std::cmp::Ordering;
use std::collections::binary_heap::PeekMut;
use std::collections::BinaryHeap;
use std::fmt;

use crate::parsers::LogParser;

/// A parser plus its current penalty.
pub struct ParserCandidate {
    parser: Box<dyn LogParser>,
    penalty: u64,
    sequence: usize,
}

impl ParserCandidate {
    #[must_use]
    pub fn penalty(&self) -> u64 {
        self.penalty
    }

    #[must_use]
    pub fn log_type(&self) -> &str {
        self.parser.log_type()
    }

    pub(crate) fn parser_mut(&mut self) -> &mut dyn LogParser {
        self.parser.as_mut()
    }

    pub(crate) fn penalize(&mut self) {
        self.penalty = self.penalty.saturating_add(1);
    }

    pub(crate) fn reset_penalty(&mut self) {
        self.penalty = 0;
    }
}

impl fmt::Debug for ParserCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserCandidate")
            .field("log_type", &self.log_type())
            .field("penalty", &self.penalty)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl PartialEq for ParserCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ParserCandidate {}

impl PartialOrd for ParserCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ParserCandidate {
    // BinaryHeap is a max-heap, so the comparison is reversed: lower penalty, then earlier
    // registration, ranks higher.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .penalty
            .cmp(&self.penalty)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Default)]
pub struct ParserPriorityQueue {
    heap: BinaryHeap<ParserCandidate>,
    next_sequence: usize,
}

impl ParserPriorityQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new parser with zero penalty.
    pub fn add(&mut self, parser: Box<dyn LogParser>) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ParserCandidate {
            parser,
            penalty: 0,
            sequence,
        });
    }

    #[must_use]
    pub fn peek(&self) -> Option<&ParserCandidate> {
        self.heap.peek()
    }

    /// Mutable access to the top candidate; the heap re-sorts when the guard drops.
    pub fn peek_mut(&mut self) -> Option<PeekMut<'_, ParserCandidate>> {
        self.heap.peek_mut()
    }

    pub fn pop(&mut self) -> Option<ParserCandidate> {
        self.heap.pop()
    }

    /// Returns a previously popped candidate, keeping its penalty and registration order.
    pub fn push(&mut self, candidate: ParserCandidate) {
        self.heap.push(candidate);
    }

    /// Resets the top candidate's penalty after it matched.
    pub fn reward_top(&mut self) {
        if let Some(mut top) = self.heap.peek_mut() {
            top.reset_penalty();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// `(log_type, penalty)` pairs in priority order.
    #[must_use]
    pub fn penalties(&self) -> Vec<(String, u64)> {
        let mut candidates: Vec<&ParserCandidate> = self.heap.iter().collect();
        candidates.sort_by(|a, b| b.cmp(a));
        candidates
            .into_iter()
            .map(|c| (c.log_type().to_string(), c.penalty))
            .collect()
    }
}
