//! Top-level `_metadata` framing.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use super::master::{MasterState, read_master_states};
use super::operator::{OperatorState, read_operator_states};
use super::properties::{CheckpointProperties, probe_properties};
use super::reader::ByteReader;
use super::{MetadataError, MetadataResult, ParseOptions};

pub(crate) const METADATA_MAGIC: u32 = 0x4960_672D;

/// A fully decoded `_metadata` stream.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CheckpointMetadata {
    pub magic: u32,
    pub version: i32,
    pub checkpoint_id: i64,
    pub master_states: Vec<MasterState>,
    pub operator_states: Vec<OperatorState>,
    /// Token probe over `properties_raw`, attempted for version >= 4.
    pub properties: Option<CheckpointProperties>,
    /// Everything after the last operator state, through end of stream.
    pub properties_raw: Bytes,
}

/// Decodes a checkpoint `_metadata` stream.
///
/// The stream is consumed to EOF. `options.mode` selects how much of the
/// tree is materialized; the bytes consumed are identical either way.
pub fn parse<R: Read>(source: R, options: &ParseOptions) -> MetadataResult<CheckpointMetadata> {
    let mut r = ByteReader::new(source);

    let magic = r.read_u32("metadata magic")?;
    if magic != METADATA_MAGIC {
        return Err(MetadataError::BadMagic { got: magic });
    }
    let version = r.read_i32("metadata version")?;
    if version < 1 {
        return Err(MetadataError::UnsupportedVersion { got: version });
    }
    let checkpoint_id = r.read_i64("checkpoint id")?;

    let master_states = read_master_states(&mut r)?;
    let operator_states = read_operator_states(&mut r, version, options.mode)?;
    let properties_raw = r.read_to_end("properties raw")?;

    let properties = if version >= 4 && !properties_raw.is_empty() {
        probe_properties(&properties_raw)
    } else {
        None
    };

    debug!(
        version,
        checkpoint_id,
        operators = operator_states.len(),
        master_states = master_states.len(),
        properties_raw_len = properties_raw.len(),
        has_properties = properties.is_some(),
        "decoded checkpoint metadata"
    );

    Ok(CheckpointMetadata {
        magic,
        version,
        checkpoint_id,
        master_states,
        operator_states,
        properties,
        properties_raw: Bytes::from(properties_raw),
    })
}

/// Opens `path` and decodes it as `_metadata`. The file is closed on every
/// exit path.
pub fn parse_file(
    path: impl AsRef<Path>,
    options: &ParseOptions,
) -> MetadataResult<CheckpointMetadata> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| MetadataError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse(BufReader::new(file), options)
}
