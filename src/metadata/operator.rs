//! Operator state framing: per-operator header, subtasks, and the
//! partitionable operator-state handle.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use serde::{Serialize, Serializer};

use super::channel::{ChannelDirection, ChannelStateHandle, read_channel_state_handles};
use super::keyed::{KeyedStateHandle, read_keyed_state_handle};
use super::reader::ByteReader;
use super::stream::{StreamStateHandle, read_stream_state_handle};
use super::{DecodeMode, MetadataError, MetadataResult};

const TAG_ABSENT: u8 = 0;
const TAG_PARTITIONABLE: u8 = 4;
const TAG_FILE_MERGING: u8 = 17;

/// 128-bit operator id, high half first.
#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub struct OperatorId([u8; 16]);

impl OperatorId {
    /// Packs the two serialized halves: high occupies bytes 0–7, low 8–15.
    pub fn from_parts(high: i64, low: i64) -> Self {
        let mut id = [0u8; 16];
        id[..8].copy_from_slice(&high.to_be_bytes());
        id[8..].copy_from_slice(&low.to_be_bytes());
        Self(id)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperatorId({self})")
    }
}

impl Serialize for OperatorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OperatorState {
    /// Present for metadata version >= 5.
    pub name: Option<String>,
    /// Present for metadata version >= 5.
    pub uid: Option<String>,
    pub operator_id: OperatorId,
    pub parallelism: i32,
    pub max_parallelism: i32,
    /// Present for metadata version >= 3.
    pub coordinator_state: Option<StreamStateHandle>,
    pub subtasks: Vec<SubtaskState>,
    /// A wire subtask count of -1: the operator finished and carries no
    /// subtask records.
    pub finished: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SubtaskState {
    pub index: i32,
    /// A negative wire index marks a finished subtask; no further fields
    /// follow it in the stream.
    pub finished: bool,
    pub managed_operator_state: Option<OperatorStateHandle>,
    pub raw_operator_state: Option<OperatorStateHandle>,
    pub managed_keyed_state: Option<KeyedStateHandle>,
    pub raw_keyed_state: Option<KeyedStateHandle>,
    pub input_channel_states: Vec<ChannelStateHandle>,
    pub output_channel_states: Vec<ChannelStateHandle>,
}

impl SubtaskState {
    fn finished(index: i32) -> Self {
        Self {
            index,
            finished: true,
            managed_operator_state: None,
            raw_operator_state: None,
            managed_keyed_state: None,
            raw_keyed_state: None,
            input_channel_states: Vec::new(),
            output_channel_states: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum OperatorBackend {
    Partitionable,
    FileMerging,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum DistributionMode {
    SplitDistribute,
    Union,
    Broadcast,
    Unknown(u8),
}

impl DistributionMode {
    fn from_ordinal(ordinal: u8) -> Self {
        match ordinal {
            0 => DistributionMode::SplitDistribute,
            1 => DistributionMode::Union,
            2 => DistributionMode::Broadcast,
            other => DistributionMode::Unknown(other),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StatePartition {
    pub mode: DistributionMode,
    pub offsets: Vec<i64>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FileMergingInfo {
    pub task_owned_directory: String,
    pub shared_directory: String,
    pub empty: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OperatorStateHandle {
    pub backend: OperatorBackend,
    pub partitions: BTreeMap<String, StatePartition>,
    pub file_merging: Option<FileMergingInfo>,
    pub delegate: Option<StreamStateHandle>,
}

pub(crate) fn read_operator_states<R: Read>(
    r: &mut ByteReader<R>,
    version: i32,
    mode: DecodeMode,
) -> MetadataResult<Vec<OperatorState>> {
    let count = r.read_count("operator state count")?;
    let mut states = Vec::with_capacity(count);
    for _ in 0..count {
        states.push(read_operator_state(r, version, mode)?);
    }
    Ok(states)
}

fn read_operator_state<R: Read>(
    r: &mut ByteReader<R>,
    version: i32,
    mode: DecodeMode,
) -> MetadataResult<OperatorState> {
    let (name, uid) = if version >= 5 {
        (
            Some(r.read_utf("operator name")?),
            Some(r.read_utf("operator uid")?),
        )
    } else {
        (None, None)
    };

    let high = r.read_i64("operator id high")?;
    let low = r.read_i64("operator id low")?;
    let operator_id = OperatorId::from_parts(high, low);

    let parallelism = r.read_i32("operator parallelism")?;
    let max_parallelism = r.read_i32("operator max parallelism")?;

    let coordinator_state = if version >= 3 {
        read_stream_state_handle(r, mode)?
    } else {
        None
    };

    let subtask_count = r.read_i32("operator subtask count")?;
    if subtask_count < -1 {
        return Err(MetadataError::BadSubtaskCount { got: subtask_count });
    }
    let finished = subtask_count == -1;

    let mut subtasks = Vec::new();
    if !finished {
        subtasks.reserve(subtask_count as usize);
        for _ in 0..subtask_count {
            subtasks.push(read_subtask_state(r, version, mode)?);
        }
    }

    Ok(OperatorState {
        name,
        uid,
        operator_id,
        parallelism,
        max_parallelism,
        coordinator_state,
        subtasks,
        finished,
    })
}

fn read_subtask_state<R: Read>(
    r: &mut ByteReader<R>,
    version: i32,
    mode: DecodeMode,
) -> MetadataResult<SubtaskState> {
    let index = r.read_i32("subtask index")?;
    if index < 0 {
        return Ok(SubtaskState::finished(-(index + 1)));
    }

    let managed_operator_state = read_optional_operator_state_handle(r, mode)?;
    let raw_operator_state = read_optional_operator_state_handle(r, mode)?;
    let managed_keyed_state = read_keyed_state_handle(r, mode)?;
    let raw_keyed_state = read_keyed_state_handle(r, mode)?;
    let input_channel_states =
        read_channel_state_handles(r, version, ChannelDirection::Input, mode)?;
    let output_channel_states =
        read_channel_state_handles(r, version, ChannelDirection::Output, mode)?;

    Ok(SubtaskState {
        index,
        finished: false,
        managed_operator_state,
        raw_operator_state,
        managed_keyed_state,
        raw_keyed_state,
        input_channel_states,
        output_channel_states,
    })
}

/// Operator-state handles inside a subtask sit behind an i32 marker:
/// 0 = absent, 1 = present, anything else is corrupt.
fn read_optional_operator_state_handle<R: Read>(
    r: &mut ByteReader<R>,
    mode: DecodeMode,
) -> MetadataResult<Option<OperatorStateHandle>> {
    let marker = r.read_i32("operator state marker")?;
    match marker {
        0 => Ok(None),
        1 => read_operator_state_handle(r, mode),
        got => Err(MetadataError::BadOperatorStateMarker { got }),
    }
}

fn read_operator_state_handle<R: Read>(
    r: &mut ByteReader<R>,
    mode: DecodeMode,
) -> MetadataResult<Option<OperatorStateHandle>> {
    let tag = r.read_u8("operator state handle type")?;
    let backend = match tag {
        TAG_ABSENT => return Ok(None),
        TAG_PARTITIONABLE => OperatorBackend::Partitionable,
        TAG_FILE_MERGING => OperatorBackend::FileMerging,
        got => return Err(MetadataError::UnknownOperatorHandleType { got }),
    };

    let map_size = r.read_count("operator state handle map size")?;
    let mut partitions = BTreeMap::new();
    for _ in 0..map_size {
        let name = r.read_utf("operator state name")?;
        let ordinal = r.read_u8("operator state mode")?;
        let offsets =
            r.read_i64_array("operator state offset count", "operator state offset", mode.retain())?;
        if mode.retain() {
            partitions.insert(
                name,
                StatePartition {
                    mode: DistributionMode::from_ordinal(ordinal),
                    offsets,
                },
            );
        }
    }

    let mut file_merging = None;
    if backend == OperatorBackend::FileMerging {
        let task_owned_directory = r.read_utf("operator state task owned dir")?;
        let shared_directory = r.read_utf("operator state shared dir")?;
        let empty = r.read_bool("operator state empty flag")?;
        if mode.retain() {
            file_merging = Some(FileMergingInfo {
                task_owned_directory,
                shared_directory,
                empty,
            });
        }
    }

    let delegate = read_stream_state_handle(r, mode)?;

    Ok(Some(OperatorStateHandle {
        backend,
        partitions,
        file_merging,
        delegate,
    }))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn utf(s: &str) -> Vec<u8> {
        let mut out = (s.len() as u16).to_be_bytes().to_vec();
        out.extend(s.as_bytes());
        out
    }

    fn reader(bytes: Vec<u8>) -> ByteReader<Cursor<Vec<u8>>> {
        ByteReader::new(Cursor::new(bytes))
    }

    #[test]
    fn operator_id_packs_high_then_low() {
        let id = OperatorId::from_parts(1, 2);
        assert_eq!(
            id.as_bytes(),
            &[0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 2]
        );
        assert_eq!(id.to_string(), "00000000000000010000000000000002");
    }

    #[test]
    fn optional_handle_marker_zero_is_absent() {
        let mut r = reader(0i32.to_be_bytes().to_vec());
        assert_eq!(
            read_optional_operator_state_handle(&mut r, DecodeMode::Full).unwrap(),
            None
        );
    }

    #[test]
    fn optional_handle_marker_other_is_fatal() {
        let mut r = reader(2i32.to_be_bytes().to_vec());
        let err = read_optional_operator_state_handle(&mut r, DecodeMode::Full).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::BadOperatorStateMarker { got: 2 }
        ));
    }

    fn partitionable_handle_bytes() -> Vec<u8> {
        let mut bytes = vec![4]; // partitionable
        bytes.extend(1i32.to_be_bytes()); // one map entry
        bytes.extend(utf("bufferState"));
        bytes.push(1); // UNION
        bytes.extend(2i32.to_be_bytes());
        bytes.extend(10i64.to_be_bytes());
        bytes.extend(20i64.to_be_bytes());
        bytes.push(0); // null delegate
        bytes
    }

    #[test]
    fn partitionable_handle_full_decode() {
        let mut r = reader(partitionable_handle_bytes());
        let handle = read_operator_state_handle(&mut r, DecodeMode::Full)
            .unwrap()
            .unwrap();
        assert_eq!(handle.backend, OperatorBackend::Partitionable);
        assert_eq!(handle.delegate, None);
        let partition = &handle.partitions["bufferState"];
        assert_eq!(partition.mode, DistributionMode::Union);
        assert_eq!(partition.offsets, vec![10, 20]);
    }

    #[test]
    fn partitionable_handle_summary_consumes_same_bytes() {
        let mut bytes = partitionable_handle_bytes();
        bytes.push(0x77);
        let mut r = reader(bytes);
        let handle = read_operator_state_handle(&mut r, DecodeMode::Summary)
            .unwrap()
            .unwrap();
        assert!(handle.partitions.is_empty());
        assert_eq!(r.read_u8("tail").unwrap(), 0x77);
    }

    #[test]
    fn file_merging_handle_reads_directories() {
        let mut bytes = vec![17];
        bytes.extend(0i32.to_be_bytes()); // empty map
        bytes.extend(utf("/tmp/task-owned"));
        bytes.extend(utf("/tmp/shared"));
        bytes.push(1);
        bytes.push(16); // empty-segment delegate
        let mut r = reader(bytes);
        let handle = read_operator_state_handle(&mut r, DecodeMode::Full)
            .unwrap()
            .unwrap();
        assert_eq!(handle.backend, OperatorBackend::FileMerging);
        assert_eq!(
            handle.file_merging,
            Some(FileMergingInfo {
                task_owned_directory: "/tmp/task-owned".into(),
                shared_directory: "/tmp/shared".into(),
                empty: true,
            })
        );
        assert_eq!(handle.delegate, Some(StreamStateHandle::EmptySegment));
    }

    #[test]
    fn unknown_handle_type_is_fatal() {
        let mut r = reader(vec![5]);
        let err = read_operator_state_handle(&mut r, DecodeMode::Full).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::UnknownOperatorHandleType { got: 5 }
        ));
    }

    #[test]
    fn unknown_distribution_mode_is_preserved() {
        assert_eq!(
            DistributionMode::from_ordinal(9),
            DistributionMode::Unknown(9)
        );
    }

    #[test]
    fn finished_subtask_maps_negative_index() {
        let mut r = reader((-4i32).to_be_bytes().to_vec());
        let subtask = read_subtask_state(&mut r, 6, DecodeMode::Full).unwrap();
        assert!(subtask.finished);
        assert_eq!(subtask.index, 3);
        assert_eq!(subtask.managed_operator_state, None);
        assert!(subtask.input_channel_states.is_empty());
    }

    #[test]
    fn finished_operator_has_no_subtasks() {
        // v2 operator: id, parallelism, max-parallelism, subtask count -1.
        let mut bytes = Vec::new();
        bytes.extend(1i64.to_be_bytes());
        bytes.extend(2i64.to_be_bytes());
        bytes.extend(4i32.to_be_bytes());
        bytes.extend(128i32.to_be_bytes());
        bytes.extend((-1i32).to_be_bytes());
        let mut r = reader(bytes);
        let operator = read_operator_state(&mut r, 2, DecodeMode::Full).unwrap();
        assert!(operator.finished);
        assert!(operator.subtasks.is_empty());
        assert_eq!(operator.name, None);
        assert_eq!(operator.coordinator_state, None);
    }

    #[test]
    fn subtask_count_below_minus_one_is_fatal() {
        let mut bytes = Vec::new();
        bytes.extend(1i64.to_be_bytes());
        bytes.extend(2i64.to_be_bytes());
        bytes.extend(1i32.to_be_bytes());
        bytes.extend(1i32.to_be_bytes());
        bytes.extend((-2i32).to_be_bytes());
        let mut r = reader(bytes);
        let err = read_operator_state(&mut r, 2, DecodeMode::Full).unwrap_err();
        assert!(matches!(err, MetadataError::BadSubtaskCount { got: -2 }));
    }

    #[test]
    fn zero_subtasks_is_empty_but_not_finished() {
        let mut bytes = Vec::new();
        bytes.extend(9i64.to_be_bytes());
        bytes.extend(9i64.to_be_bytes());
        bytes.extend(1i32.to_be_bytes());
        bytes.extend(1i32.to_be_bytes());
        bytes.extend(0i32.to_be_bytes());
        let mut r = reader(bytes);
        let operator = read_operator_state(&mut r, 2, DecodeMode::Full).unwrap();
        assert!(!operator.finished);
        assert!(operator.subtasks.is_empty());
    }
}
