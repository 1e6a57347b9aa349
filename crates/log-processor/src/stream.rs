// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::io::{Cursor, Read};

use flate2::read::MultiGzDecoder;
use tokio::io::AsyncBufRead;

use crate::error::ProcessingError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Identity of the source a stream was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMetadata {
    pub source_id: String,
    pub source_label: String,
    pub integration_type: String,
    pub bucket: Option<String>,
    pub key: Option<String>,
    /// Log types that may appear in this stream; one parser is built for each.
    pub log_types: Vec<String>,
}

impl SourceMetadata {
    /// Human readable location of the stream, used in error messages.
    #[must_use]
    pub fn location(&self) -> String {
        match (&self.bucket, &self.key) {
            (Some(bucket), Some(key)) => format!("s3://{bucket}/{key}"),
            (None, Some(key)) => key.clone(),
            _ => format!("source {}", self.source_id),
        }
    }
}

/// A line source plus the metadata of where it came from.
pub struct DataStream {
    pub reader: Box<dyn AsyncBufRead + Send + Unpin>,
    pub source: SourceMetadata,
}

impl DataStream {
    #[must_use]
    pub fn new(reader: Box<dyn AsyncBufRead + Send + Unpin>, source: SourceMetadata) -> Self {
        DataStream { reader, source }
    }

    /// Wraps an in-memory payload, transparently decompressing gzip content.
    pub fn from_bytes(data: Vec<u8>, source: SourceMetadata) -> Result<Self, ProcessingError> {
        let data = if data.starts_with(&GZIP_MAGIC) {
            let mut decompressed = Vec::new();
            MultiGzDecoder::new(data.as_slice())
                .read_to_end(&mut decompressed)
                .map_err(|e| {
                    ProcessingError::SourceRead(format!(
                        "failed to decompress {}: {e}",
                        source.location()
                    ))
                })?;
            decompressed
        } else {
            data
        };
        Ok(DataStream::new(Box::new(Cursor::new(data)), source))
    }
}

impl fmt::Debug for DataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStream")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
