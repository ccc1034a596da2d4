//! Unaligned-checkpoint channel state.
//!
//! Metadata v3–v5 writes input and output lists with no per-entry type
//! byte; which layout applies is implicit in which list is being read.
//! v6 prefixes every entry with a type byte and adds the merged shapes.

use std::io::Read;

use bytes::Bytes;
use serde::Serialize;

use super::reader::ByteReader;
use super::stream::{StreamStateHandle, read_stream_state_handle};
use super::{DecodeMode, MetadataError, MetadataResult};

const TYPE_INPUT_CHANNEL: u8 = 1;
const TYPE_RESULT_SUBPARTITION: u8 = 2;
const TYPE_MERGED_INPUT_CHANNEL: u8 = 3;
const TYPE_MERGED_RESULT_SUBPARTITION: u8 = 4;

/// Which subtask list an implicitly-typed (v3–v5) entry came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ChannelDirection {
    Input,
    Output,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum ChannelStateHandle {
    InputChannel(UnmergedChannelInfo),
    ResultSubpartition(UnmergedChannelInfo),
    MergedInputChannel(MergedChannelInfo),
    MergedResultSubpartition(MergedChannelInfo),
}

/// Types 1 and 2: one handle per channel, offsets into the delegate.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct UnmergedChannelInfo {
    pub subtask_index: i32,
    pub gate_or_partition: i32,
    pub channel_or_subpartition: i32,
    pub offsets: Vec<i64>,
    pub state_size: i64,
    pub delegate: Option<StreamStateHandle>,
}

/// Types 3 and 4: one handle per subtask, offsets kept as an opaque blob.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MergedChannelInfo {
    pub subtask_index: i32,
    pub state_size: i64,
    pub delegate: Option<StreamStateHandle>,
    pub raw_offsets: Bytes,
}

pub(crate) fn read_channel_state_handles<R: Read>(
    r: &mut ByteReader<R>,
    version: i32,
    direction: ChannelDirection,
    mode: DecodeMode,
) -> MetadataResult<Vec<ChannelStateHandle>> {
    if version < 3 {
        return Ok(Vec::new());
    }

    let count = r.read_count("channel state count")?;
    let mut handles = Vec::with_capacity(count);
    for _ in 0..count {
        let handle = if version >= 6 {
            let state_type = r.read_u8("channel state type")?;
            match state_type {
                TYPE_INPUT_CHANNEL => ChannelStateHandle::InputChannel(read_unmerged(r, mode)?),
                TYPE_RESULT_SUBPARTITION => {
                    ChannelStateHandle::ResultSubpartition(read_unmerged(r, mode)?)
                }
                TYPE_MERGED_INPUT_CHANNEL => {
                    ChannelStateHandle::MergedInputChannel(read_merged(r, mode)?)
                }
                TYPE_MERGED_RESULT_SUBPARTITION => {
                    ChannelStateHandle::MergedResultSubpartition(read_merged(r, mode)?)
                }
                got => return Err(MetadataError::UnknownChannelStateType { got }),
            }
        } else {
            match direction {
                ChannelDirection::Input => {
                    ChannelStateHandle::InputChannel(read_unmerged(r, mode)?)
                }
                ChannelDirection::Output => {
                    ChannelStateHandle::ResultSubpartition(read_unmerged(r, mode)?)
                }
            }
        };
        handles.push(handle);
    }
    Ok(handles)
}

fn read_unmerged<R: Read>(
    r: &mut ByteReader<R>,
    mode: DecodeMode,
) -> MetadataResult<UnmergedChannelInfo> {
    let subtask_index = r.read_i32("channel state subtask")?;
    let gate_or_partition = r.read_i32("channel state gate index")?;
    let channel_or_subpartition = r.read_i32("channel state channel index")?;
    let offsets = r.read_i64_array(
        "channel state offset count",
        "channel state offset",
        mode.retain(),
    )?;
    let state_size = r.read_i64("channel state size")?;
    let delegate = read_stream_state_handle(r, mode)?;
    Ok(UnmergedChannelInfo {
        subtask_index,
        gate_or_partition,
        channel_or_subpartition,
        offsets,
        state_size,
        delegate,
    })
}

fn read_merged<R: Read>(
    r: &mut ByteReader<R>,
    mode: DecodeMode,
) -> MetadataResult<MergedChannelInfo> {
    let subtask_index = r.read_i32("merged channel state subtask")?;
    let state_size = r.read_i64("merged channel state size")?;
    let delegate = read_stream_state_handle(r, mode)?;
    let length = r.read_count("merged channel offsets length")?;
    let raw = r.read_bytes(length, "merged channel offsets")?;
    Ok(MergedChannelInfo {
        subtask_index,
        state_size,
        delegate,
        raw_offsets: if mode.retain() {
            Bytes::from(raw)
        } else {
            Bytes::new()
        },
    })
}
