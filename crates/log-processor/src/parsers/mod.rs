// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parser capability contract and the registry the processor builds classifiers from.
//!
//! Parsers are pluggable: anything implementing [`LogParser`] can be registered under a log
//! type name. The registry is passed explicitly to the [`crate::processor::ProcessorFactory`],
//! so two pipelines in the same process can run with different parser sets.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::event::ParsedEvent;

pub mod json;
pub mod regex;

/// Why a parser rejected a line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The line is not in this parser's format.
    #[error("line does not match {0}")]
    NoMatch(String),

    /// The line looked right but a field could not be decoded.
    #[error("invalid field {field}: {message}")]
    InvalidField { field: String, message: String },

    /// The parser panicked; the classifier recovered and treats it as a miss.
    #[error("parser panicked: {0}")]
    Panicked(String),
}

/// A parser for one log type.
pub trait LogParser: Send {
    /// Log type name stamped on every event this parser produces.
    fn log_type(&self) -> &str;

    /// Parses one non-blank, trimmed line. Returning an empty vector counts as a miss.
    fn parse(&mut self, line: &str) -> Result<Vec<ParsedEvent>, ParseError>;
}

type ParserConstructor = dyn Fn() -> Box<dyn LogParser> + Send + Sync;

/// Maps log type names to parser constructors.
///
/// Every classifier gets its own parser instances, so parsers may keep per-stream state.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    constructors: BTreeMap<String, Arc<ParserConstructor>>,
}

impl ParserRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, log_type: &str, constructor: F)
    where
        F: Fn() -> Box<dyn LogParser> + Send + Sync + 'static,
    {
        self.constructors
            .insert(log_type.to_string(), Arc::new(constructor));
    }

    #[must_use]
    pub fn contains(&self, log_type: &str) -> bool {
        self.constructors.contains_key(log_type)
    }

    /// Builds a fresh parser for `log_type`, if one is registered.
    #[must_use]
    pub fn build(&self, log_type: &str) -> Option<Box<dyn LogParser>> {
        self.constructors.get(log_type).map(|constructor| constructor())
    }

    pub fn log_types(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("log_types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Interprets a JSON value as a timestamp: RFC 3339 strings, or epoch seconds / milliseconds.
pub(crate) fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                // Anything past year 2286 in seconds is assumed to be milliseconds.
                if secs.abs() >= 10_000_000_000 {
                    Utc.timestamp_millis_opt(secs).single()
                } else {
                    Utc.timestamp_opt(secs, 0).single()
                }
            } else {
                let secs = n.as_f64()?;
                #[allow(clippy::cast_possible_truncation)]
                let millis = (secs * 1000.0).round() as i64;
                Utc.timestamp_millis_opt(millis).single()
            }
        }
        _ => None,
    }
}
