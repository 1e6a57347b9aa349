// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use serde::Serialize;

/// Notification type announcing a new processed-data object.
pub const LOG_DATA_TYPE: &str = "LogData";

/// Message published after every successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDataNotification {
    pub bucket: String,
    pub object_key: String,
    pub event_count: u64,
    pub byte_count: u64,
    #[serde(rename = "type")]
    pub data_type: String,
    /// The log type stored in the object.
    pub id: String,
}

impl LogDataNotification {
    #[must_use]
    pub fn new(
        bucket: &str,
        object_key: &str,
        log_type: &str,
        event_count: u64,
        byte_count: u64,
    ) -> Self {
        LogDataNotification {
            bucket: bucket.to_string(),
            object_key: object_key.to_string(),
            event_count,
            byte_count,
            data_type: LOG_DATA_TYPE.to_string(),
            id: log_type.to_string(),
        }
    }

    /// Message attributes used by subscribers to filter on type and id.
    #[must_use]
    pub fn attributes(&self) -> HashMap<String, String> {
        HashMap::from([
            ("type".to_string(), self.data_type.clone()),
            ("id".to_string(), self.id.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_shape() {
        let notification =
            LogDataNotification::new("processed", "logs/a.json.gz", "AWS.CloudTrail", 2, 512);

        assert_eq!(
            serde_json::to_value(&notification).unwrap(),
            json!({
                "bucket": "processed",
                "objectKey": "logs/a.json.gz",
                "eventCount": 2,
                "byteCount": 512,
                "type": "LogData",
                "id": "AWS.CloudTrail",
            })
        );
    }

    #[test]
    fn test_attributes() {
        let notification = LogDataNotification::new("b", "k", "AWS.CloudTrail", 1, 1);
        let attributes = notification.attributes();
        assert_eq!(attributes["type"], "LogData");
        assert_eq!(attributes["id"], "AWS.CloudTrail");
        assert_eq!(attributes.len(), 2);
    }
}
