// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line formatting for the processor.
//!
//! Every line is prefixed so processor output can be told apart from other output of the same
//! host:
//!
//! ```text
//! LOG_PROCESSOR | INFO | stream classification summary: {...}
//! LOG_PROCESSOR | WARN | drain{deadline_ms=840}: Failed to delete 2 of 10 messages
//! ```
//!
//! Statistics are logged at `INFO` on the [`METRICS_TARGET`] target as JSON, so they can be
//! filtered (`log_processor::metrics=off`) independently of the operational logs.

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::error::ProcessingError;

/// Target of the structured statistics records.
pub const METRICS_TARGET: &str = "log_processor::metrics";

const LOG_PREFIX: &str = "LOG_PROCESSOR";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "{LOG_PREFIX} | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Builds the filter for `log_level`, silencing the noisy dependency targets.
pub fn env_filter(log_level: &str) -> Result<EnvFilter, ProcessingError> {
    EnvFilter::try_new(format!("h2=off,hyper=off,rustls=off,{log_level}"))
        .map_err(|e| ProcessingError::InvalidConfig(format!("invalid log level {log_level}: {e}")))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_subscriber(log_level: &str) -> Result<(), ProcessingError> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(log_level)?)
        .with_ansi(false)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ProcessingError::InvalidConfig(format!("failed to install logger: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_env_filter(env_filter("debug").unwrap())
            .with_ansi(false)
            .event_format(Formatter)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_prefix_and_level() {
        let output = capture(|| tracing::info!("stream finished"));
        assert_eq!(output, "LOG_PROCESSOR | INFO | stream finished\n");
    }

    #[test]
    fn test_span_context_is_included() {
        let output = capture(|| {
            let span = tracing::info_span!("drain", batch = 3);
            let _guard = span.enter();
            tracing::warn!(failed = 1, "delete incomplete");
        });
        assert_eq!(
            output,
            "LOG_PROCESSOR | WARN | drain{batch=3}: delete incomplete failed=1\n"
        );
    }

    #[test]
    fn test_filter_respects_level() {
        let output = capture(|| tracing::trace!("hidden"));
        assert!(output.is_empty());
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        assert!(matches!(
            env_filter("log_processor=loud"),
            Err(ProcessingError::InvalidConfig(_))
        ));
    }
}
