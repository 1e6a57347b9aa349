// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::ops::AddAssign;

use serde::Serialize;

/// Aggregate counters for one classifier. Only ever increase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierStats {
    pub classify_time_microseconds: u64,
    pub bytes_processed_count: u64,
    pub log_line_count: u64,
    pub event_count: u64,
    pub successfully_classified_count: u64,
    pub classification_failure_count: u64,
}

impl AddAssign for ClassifierStats {
    fn add_assign(&mut self, other: Self) {
        self.classify_time_microseconds += other.classify_time_microseconds;
        self.bytes_processed_count += other.bytes_processed_count;
        self.log_line_count += other.log_line_count;
        self.event_count += other.event_count;
        self.successfully_classified_count += other.successfully_classified_count;
        self.classification_failure_count += other.classification_failure_count;
    }
}

/// Counters for one parser inside a classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserStats {
    pub log_type: String,
    pub parser_time_microseconds: u64,
    pub bytes_processed_count: u64,
    pub log_line_count: u64,
    pub event_count: u64,
    pub miss_count: u64,
}

impl ParserStats {
    #[must_use]
    pub fn new(log_type: &str) -> Self {
        ParserStats {
            log_type: log_type.to_string(),
            ..Default::default()
        }
    }
}

impl AddAssign<&ParserStats> for ParserStats {
    fn add_assign(&mut self, other: &ParserStats) {
        self.parser_time_microseconds += other.parser_time_microseconds;
        self.bytes_processed_count += other.bytes_processed_count;
        self.log_line_count += other.log_line_count;
        self.event_count += other.event_count;
        self.miss_count += other.miss_count;
    }
}

/// Adds every entry of `other` into `into`, creating missing log types.
pub fn merge_parser_stats(
    into: &mut BTreeMap<String, ParserStats>,
    other: &BTreeMap<String, ParserStats>,
) {
    for (log_type, stats) in other {
        *into
            .entry(log_type.clone())
            .or_insert_with(|| ParserStats::new(log_type)) += stats;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_stats_add_assign() {
        let mut a = ClassifierStats {
            log_line_count: 2,
            event_count: 3,
            ..Default::default()
        };
        a += ClassifierStats {
            log_line_count: 1,
            bytes_processed_count: 10,
            classification_failure_count: 1,
            ..Default::default()
        };
        assert_eq!(a.log_line_count, 3);
        assert_eq!(a.event_count, 3);
        assert_eq!(a.bytes_processed_count, 10);
        assert_eq!(a.classification_failure_count, 1);
    }

    #[test]
    fn test_merge_parser_stats() {
        let mut totals = BTreeMap::new();
        let mut stream = BTreeMap::new();
        stream.insert(
            "A".to_string(),
            ParserStats {
                log_type: "A".to_string(),
                event_count: 4,
                ..Default::default()
            },
        );

        merge_parser_stats(&mut totals, &stream);
        merge_parser_stats(&mut totals, &stream);

        assert_eq!(totals["A"].event_count, 8);
        assert_eq!(totals["A"].log_type, "A");
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let value = serde_json::to_value(ClassifierStats::default()).unwrap();
        assert!(value.get("logLineCount").is_some());
        assert!(value.get("successfullyClassifiedCount").is_some());
    }
}
