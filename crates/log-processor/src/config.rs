// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ProcessingError;

const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024;
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Runtime configuration of the log processor
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Bucket the processed objects are written to
    pub processed_data_bucket: String,
    /// Topic announcing every new object
    pub notifications_topic: String,
    /// Queue holding the pending input notifications
    pub queue_url: String,
    /// Function invoked to scale out; scale-out is disabled when empty
    pub worker_function_name: String,
    pub log_level: String,
    /// Uncompressed size at which a buffer is flushed
    pub max_file_size_bytes: u64,
    pub max_buffer_age: Duration,
    pub event_channel_capacity: usize,
    pub stream_channel_capacity: usize,
    /// Queue depth under which the drain controller stops polling
    pub low_queue_threshold: u64,
    pub receive_max_messages: usize,
    pub receive_wait: Duration,
    /// Share of the remaining invocation time spent polling for more work
    pub deadline_scalar: f64,
    pub scale_interval: Duration,
    pub batch_size_per_worker: u64,
    pub max_scale_up: u64,
    pub surface_final_flush_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            processed_data_bucket: String::new(),
            notifications_topic: String::new(),
            queue_url: String::new(),
            worker_function_name: String::new(),
            log_level: "info".to_string(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            max_buffer_age: Duration::from_secs(60),
            event_channel_capacity: 1000,
            stream_channel_capacity: 20,
            low_queue_threshold: 10,
            receive_max_messages: 10,
            receive_wait: Duration::from_secs(1),
            deadline_scalar: 0.8,
            scale_interval: Duration::from_secs(30),
            batch_size_per_worker: 100,
            max_scale_up: 10,
            surface_final_flush_errors: true,
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ProcessingError> {
        let defaults = Self::default();
        let config = Self {
            processed_data_bucket: env::var("PROCESSED_DATA_BUCKET").unwrap_or_default(),
            notifications_topic: env::var("NOTIFICATIONS_TOPIC").unwrap_or_default(),
            queue_url: env::var("SOURCE_QUEUE_URL").unwrap_or_default(),
            worker_function_name: env::var("WORKER_FUNCTION_NAME").unwrap_or_default(),
            log_level: env::var("LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
            max_file_size_bytes: parse_var("MAX_FILE_SIZE_BYTES", defaults.max_file_size_bytes)?,
            max_buffer_age: secs_var("MAX_BUFFER_AGE_SECS", defaults.max_buffer_age)?,
            event_channel_capacity: parse_var(
                "EVENT_CHANNEL_CAPACITY",
                defaults.event_channel_capacity,
            )?,
            stream_channel_capacity: parse_var(
                "STREAM_CHANNEL_CAPACITY",
                defaults.stream_channel_capacity,
            )?,
            low_queue_threshold: parse_var("LOW_QUEUE_THRESHOLD", defaults.low_queue_threshold)?,
            receive_max_messages: parse_var(
                "RECEIVE_MAX_MESSAGES",
                defaults.receive_max_messages,
            )?,
            receive_wait: secs_var("RECEIVE_WAIT_SECS", defaults.receive_wait)?,
            deadline_scalar: parse_var("DEADLINE_SCALAR", defaults.deadline_scalar)?,
            scale_interval: secs_var("SCALE_INTERVAL_SECS", defaults.scale_interval)?,
            batch_size_per_worker: parse_var(
                "BATCH_SIZE_PER_WORKER",
                defaults.batch_size_per_worker,
            )?,
            max_scale_up: parse_var("MAX_SCALE_UP", defaults.max_scale_up)?,
            surface_final_flush_errors: env::var("SURFACE_FINAL_FLUSH_ERRORS")
                .map(|val| val.to_lowercase() != "false")
                .unwrap_or(defaults.surface_final_flush_errors),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ProcessingError> {
        for (name, value) in [
            ("PROCESSED_DATA_BUCKET", &self.processed_data_bucket),
            ("NOTIFICATIONS_TOPIC", &self.notifications_topic),
            ("SOURCE_QUEUE_URL", &self.queue_url),
        ] {
            if value.trim().is_empty() {
                return Err(ProcessingError::InvalidConfig(format!(
                    "{name} cannot be empty"
                )));
            }
        }

        let zero = [
            ("MAX_FILE_SIZE_BYTES", self.max_file_size_bytes == 0),
            ("MAX_BUFFER_AGE_SECS", self.max_buffer_age.is_zero()),
            ("EVENT_CHANNEL_CAPACITY", self.event_channel_capacity == 0),
            ("STREAM_CHANNEL_CAPACITY", self.stream_channel_capacity == 0),
            ("RECEIVE_MAX_MESSAGES", self.receive_max_messages == 0),
            ("SCALE_INTERVAL_SECS", self.scale_interval.is_zero()),
            ("BATCH_SIZE_PER_WORKER", self.batch_size_per_worker == 0),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ProcessingError::InvalidConfig(format!(
                "{name} must be greater than 0"
            )));
        }

        if !(self.deadline_scalar > 0.0 && self.deadline_scalar <= 1.0) {
            return Err(ProcessingError::InvalidConfig(format!(
                "DEADLINE_SCALAR must be in (0, 1], got {}",
                self.deadline_scalar
            )));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ProcessingError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Whether the scale-out loop should run.
    #[must_use]
    pub fn scaling_enabled(&self) -> bool {
        !self.worker_function_name.is_empty()
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ProcessingError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.trim().parse::<T>().map_err(|e| {
            ProcessingError::InvalidConfig(format!("{name}: cannot parse {val:?}: {e}"))
        }),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &str, default: Duration) -> Result<Duration, ProcessingError> {
    parse_var(name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 8] = [
        "PROCESSED_DATA_BUCKET",
        "NOTIFICATIONS_TOPIC",
        "SOURCE_QUEUE_URL",
        "WORKER_FUNCTION_NAME",
        "LOG_LEVEL",
        "MAX_FILE_SIZE_BYTES",
        "DEADLINE_SCALAR",
        "SURFACE_FINAL_FLUSH_ERRORS",
    ];

    fn valid() -> Config {
        Config {
            processed_data_bucket: "processed".to_string(),
            notifications_topic: "arn:topic".to_string(),
            queue_url: "https://queue".to_string(),
            ..Default::default()
        }
    }

    fn set_required() {
        env::set_var("PROCESSED_DATA_BUCKET", "processed");
        env::set_var("NOTIFICATIONS_TOPIC", "arn:topic");
        env::set_var("SOURCE_QUEUE_URL", "https://queue");
    }

    fn clear() {
        for name in VARS {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_default_config_lacks_required_fields() {
        let err = Config::default().validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: PROCESSED_DATA_BUCKET cannot be empty"
        );
    }

    #[test]
    fn test_validate_zero_values() {
        let config = Config {
            max_file_size_bytes: 0,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = Config {
            scale_interval: Duration::ZERO,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_deadline_scalar() {
        for scalar in [0.0, -0.5, 1.5, f64::NAN] {
            let config = Config {
                deadline_scalar: scalar,
                ..valid()
            };
            assert!(config.validate().is_err(), "{scalar} accepted");
        }
        let config = Config {
            deadline_scalar: 1.0,
            ..valid()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "verbose".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear();
        set_required();

        let config = Config::from_env().unwrap();
        assert_eq!(config.processed_data_bucket, "processed");
        assert_eq!(config.max_file_size_bytes, DEFAULT_MAX_FILE_SIZE_BYTES);
        assert_eq!(config.max_buffer_age, Duration::from_secs(60));
        assert!(!config.scaling_enabled());
        assert!(config.surface_final_flush_errors);
        clear();
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear();
        set_required();
        env::set_var("WORKER_FUNCTION_NAME", "log-processor");
        env::set_var("LOG_LEVEL", "DEBUG");
        env::set_var("MAX_FILE_SIZE_BYTES", "1024");
        env::set_var("DEADLINE_SCALAR", "0.5");
        env::set_var("SURFACE_FINAL_FLUSH_ERRORS", "FALSE");

        let config = Config::from_env().unwrap();
        assert!(config.scaling_enabled());
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_file_size_bytes, 1024);
        assert!((config.deadline_scalar - 0.5).abs() < f64::EPSILON);
        assert!(!config.surface_final_flush_errors);
        clear();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unparseable_numbers() {
        clear();
        set_required();
        env::set_var("MAX_FILE_SIZE_BYTES", "lots");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("MAX_FILE_SIZE_BYTES"));
        clear();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_bucket() {
        clear();
        assert!(matches!(
            Config::from_env(),
            Err(ProcessingError::InvalidConfig(_))
        ));
    }
}
