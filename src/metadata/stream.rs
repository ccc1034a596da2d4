//! Stream state handles: where a blob of persisted state lives.

use std::io::Read;

use bytes::Bytes;
use serde::Serialize;

use super::reader::ByteReader;
use super::{DecodeMode, MetadataError, MetadataResult};

const TAG_NULL: u8 = 0;
const TAG_BYTE_STREAM: u8 = 1;
const TAG_FILE: u8 = 2;
const TAG_RELATIVE: u8 = 6;
const TAG_SEGMENT_FILE: u8 = 15;
const TAG_EMPTY_SEGMENT: u8 = 16;

/// A locator for persisted state: inline bytes, a file, or a file segment.
///
/// The wire tag `0` (absent) is modelled as `Option::None` by the decoder;
/// `EmptySegment` is a real handle and stays distinct from absence.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum StreamStateHandle {
    ByteStream {
        name: String,
        size: i64,
        data: Bytes,
    },
    File {
        size: i64,
        path: String,
    },
    Relative {
        path: String,
        size: i64,
    },
    SegmentFile {
        start: i64,
        size: i64,
        scope: i32,
        path: String,
        logical_id: String,
    },
    EmptySegment,
}

impl StreamStateHandle {
    pub fn size(&self) -> i64 {
        match self {
            StreamStateHandle::ByteStream { size, .. }
            | StreamStateHandle::File { size, .. }
            | StreamStateHandle::Relative { size, .. }
            | StreamStateHandle::SegmentFile { size, .. } => *size,
            StreamStateHandle::EmptySegment => 0,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            StreamStateHandle::File { path, .. }
            | StreamStateHandle::Relative { path, .. }
            | StreamStateHandle::SegmentFile { path, .. } => Some(path),
            _ => None,
        }
    }
}

pub(crate) fn read_stream_state_handle<R: Read>(
    r: &mut ByteReader<R>,
    mode: DecodeMode,
) -> MetadataResult<Option<StreamStateHandle>> {
    let tag = r.read_u8("stream state handle type")?;
    match tag {
        TAG_NULL => Ok(None),
        TAG_BYTE_STREAM => {
            let name = r.read_utf("byte stream handle name")?;
            let length = r.read_count("byte stream handle length")?;
            let data = r.read_bytes(length, "byte stream handle data")?;
            Ok(Some(StreamStateHandle::ByteStream {
                name,
                size: length as i64,
                data: if mode.retain() {
                    Bytes::from(data)
                } else {
                    Bytes::new()
                },
            }))
        }
        TAG_FILE => {
            let size = r.read_i64("file handle size")?;
            let path = r.read_utf("file handle path")?;
            Ok(Some(StreamStateHandle::File { size, path }))
        }
        TAG_RELATIVE => {
            let path = r.read_utf("relative handle path")?;
            let size = r.read_i64("relative handle size")?;
            Ok(Some(StreamStateHandle::Relative { path, size }))
        }
        TAG_SEGMENT_FILE => {
            let start = r.read_i64("segment handle start")?;
            let size = r.read_i64("segment handle size")?;
            let scope = r.read_i32("segment handle scope")?;
            let path = r.read_utf("segment handle path")?;
            let logical_id = r.read_utf("segment handle logical id")?;
            Ok(Some(StreamStateHandle::SegmentFile {
                start,
                size,
                scope,
                path,
                logical_id,
            }))
        }
        TAG_EMPTY_SEGMENT => Ok(Some(StreamStateHandle::EmptySegment)),
        other => Err(MetadataError::UnknownStreamHandleType { got: other }),
    }
}
