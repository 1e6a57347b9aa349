// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log classification and buffering pipeline.
//!
//! Raw log lines arrive as [`stream::DataStream`]s (usually one per object referenced by a
//! queue message). Each stream gets a [`classification::Classifier`] that picks the right
//! [`parsers::LogParser`] for every line, and the resulting events are buffered per log type and
//! hour by a [`destination::Destination`] before being written out as gzip-compressed
//! newline-delimited JSON objects.
//!
//! [`drain::DrainController`] keeps feeding the pipeline from the work queue while the backlog
//! lasts, and [`scaler::ScaleOutLoop`] invokes extra workers when it grows.
//! [`handler::LogProcessor`] ties both together for one invocation.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![deny(clippy::all)]
#![deny(unused_extern_crates)]
#![allow(clippy::module_name_repetitions)]

pub mod classification;
pub mod clients;
pub mod config;
pub mod destination;
pub mod drain;
pub mod error;
pub mod event;
pub mod handler;
pub mod logger;
pub mod parsers;
pub mod pipeline;
pub mod processor;
pub mod scaler;
pub mod stream;

pub use classification::{Classifier, ClassifierResult};
pub use config::Config;
pub use error::ProcessingError;
pub use event::ParsedEvent;
pub use handler::{Clients, LogProcessor};
