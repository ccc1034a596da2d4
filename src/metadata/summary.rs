//! Lightweight summary decode.
//!
//! Runs the full framing in summary mode while teeing the consumed bytes
//! into a side buffer, then optionally scans that buffer for printable
//! strings and state file paths.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use super::operator::OperatorId;
use super::parse::parse;
use super::properties::CheckpointProperties;
use super::scan::{extract_state_file_paths, scan_inline_strings};
use super::{DecodeMode, MetadataError, MetadataResult, ParseOptions};

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OperatorSummary {
    pub name: Option<String>,
    pub uid: Option<String>,
    pub operator_id: OperatorId,
    pub parallelism: i32,
    pub max_parallelism: i32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CheckpointSummary {
    pub version: i32,
    pub checkpoint_id: i64,
    pub num_operators: usize,
    pub operators: Vec<OperatorSummary>,
    /// Populated when `include_inline_strings` is set.
    pub state_file_paths: Option<Vec<String>>,
    /// Populated when `include_inline_strings` is set.
    pub inline_strings: Option<Vec<String>>,
    pub properties: Option<CheckpointProperties>,
    pub properties_raw: Bytes,
}

/// Copies every byte the decoder consumes into a side buffer.
struct TeeReader<R> {
    inner: R,
    captured: Vec<u8>,
}

impl<R: Read> Read for TeeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.captured.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// Decodes a `_metadata` stream into a summary, always in summary mode.
pub fn parse_summary<R: Read>(
    source: R,
    options: &ParseOptions,
) -> MetadataResult<CheckpointSummary> {
    let mut tee = TeeReader {
        inner: source,
        captured: Vec::new(),
    };
    let metadata = parse(
        &mut tee,
        &ParseOptions {
            mode: DecodeMode::Summary,
            include_inline_strings: options.include_inline_strings,
        },
    )?;

    let operators = metadata
        .operator_states
        .iter()
        .map(|operator| OperatorSummary {
            name: operator.name.clone(),
            uid: operator.uid.clone(),
            operator_id: operator.operator_id,
            parallelism: operator.parallelism,
            max_parallelism: operator.max_parallelism,
        })
        .collect::<Vec<_>>();

    let (inline_strings, state_file_paths) = if options.include_inline_strings {
        (
            Some(scan_inline_strings(&tee.captured)),
            Some(extract_state_file_paths(&tee.captured)),
        )
    } else {
        (None, None)
    };

    debug!(
        version = metadata.version,
        checkpoint_id = metadata.checkpoint_id,
        operators = operators.len(),
        scanned = options.include_inline_strings,
        "summarized checkpoint metadata"
    );

    Ok(CheckpointSummary {
        version: metadata.version,
        checkpoint_id: metadata.checkpoint_id,
        num_operators: operators.len(),
        operators,
        state_file_paths,
        inline_strings,
        properties: metadata.properties,
        properties_raw: metadata.properties_raw,
    })
}

/// Opens `path` and summarizes it. The file is closed on every exit path.
pub fn parse_file_summary(
    path: impl AsRef<Path>,
    options: &ParseOptions,
) -> MetadataResult<CheckpointSummary> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| MetadataError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_summary(BufReader::new(file), options)
}
