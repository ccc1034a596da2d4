//! Master state: checkpoint-coordinator blobs ahead of the operator list.

use std::io::Read;

use bytes::Bytes;
use serde::Serialize;

use super::reader::ByteReader;
use super::{MetadataError, MetadataResult};

const MASTER_STATE_MAGIC: u32 = 0xC96B_1696;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MasterState {
    pub version: i32,
    pub name: String,
    pub payload: Bytes,
}

/// Each entry is a magic-guarded, size-prefixed blob. The declared size is
/// authoritative: the nested fields must land exactly on its end.
pub(crate) fn read_master_states<R: Read>(
    r: &mut ByteReader<R>,
) -> MetadataResult<Vec<MasterState>> {
    let count = r.read_count("master state count")?;
    let mut states = Vec::with_capacity(count);
    for _ in 0..count {
        let magic = r.read_u32("master state magic")?;
        if magic != MASTER_STATE_MAGIC {
            return Err(MetadataError::BadMasterStateMagic { got: magic });
        }

        let payload_size = r.read_count("master state payload size")?;
        let payload = r.read_bytes(payload_size, "master state payload")?;

        let mut inner = ByteReader::new(&payload[..]);
        let version = inner.read_i32("master state version")?;
        let name = inner.read_utf("master state name")?;
        let data_length = inner.read_count("master state data length")?;
        let data = inner.read_bytes(data_length, "master state data")?;
        inner.expect_end("master state payload")?;

        states.push(MasterState {
            version,
            name,
            payload: Bytes::from(data),
        });
    }
    Ok(states)
}
