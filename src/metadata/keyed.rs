//! Keyed state handles: the six shapes a key-group range's state can take.

use std::io::Read;

use bytes::Bytes;
use serde::Serialize;

use super::reader::ByteReader;
use super::stream::{StreamStateHandle, read_stream_state_handle};
use super::{DecodeMode, MetadataError, MetadataResult};

const TAG_ABSENT: u8 = 0;
const TAG_KEY_GROUPS: u8 = 3;
const TAG_INCREMENTAL: u8 = 5;
const TAG_SAVEPOINT_KEY_GROUPS: u8 = 7;
const TAG_CHANGELOG: u8 = 8;
const TAG_CHANGELOG_BYTE_INCREMENT: u8 = 9;
const TAG_CHANGELOG_FILE_INCREMENT: u8 = 10;
const TAG_INCREMENTAL_WITH_ID: u8 = 11;
const TAG_KEY_GROUPS_WITH_ID: u8 = 12;
const TAG_CHANGELOG_FILE_INCREMENT_WITH_STORAGE: u8 = 13;
const TAG_CHANGELOG_WITH_CHECKPOINT_ID: u8 = 14;

/// Marker for a checkpointed size that was not recorded on the wire.
pub const UNKNOWN_CHECKPOINTED_SIZE: i64 = -1;

/// Default storage identifier for file increments written before the
/// identifier existed on the wire.
pub const DEFAULT_CHANGELOG_STORAGE: &str = "filesystem";

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum KeyedStateHandle {
    KeyGroups(KeyGroupsHandle),
    IncrementalKeyGroups(IncrementalKeyGroupsHandle),
    Changelog(ChangelogStateHandle),
    ChangelogByteIncrement(ChangelogByteIncrementHandle),
    ChangelogFileIncrement(ChangelogFileIncrementHandle),
}

/// Tags 3 and 7; tag 12 adds the handle id.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct KeyGroupsHandle {
    pub tag: u8,
    pub start_key_group: i32,
    pub num_key_groups: i32,
    pub offsets: Vec<i64>,
    pub delegate: Option<StreamStateHandle>,
    pub handle_id: Option<String>,
}

/// Tag 5; tag 11 adds the checkpointed size and handle id.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct IncrementalKeyGroupsHandle {
    pub tag: u8,
    pub checkpoint_id: i64,
    pub backend_id: String,
    pub start_key_group: i32,
    pub num_key_groups: i32,
    pub checkpointed_size: i64,
    pub meta_handle: Option<StreamStateHandle>,
    pub shared_files: Vec<HandleAndLocalPath>,
    pub private_files: Vec<HandleAndLocalPath>,
    pub handle_id: Option<String>,
}

/// Tag 8; tag 14 adds a checkpoint id distinct from the materialization id.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChangelogStateHandle {
    pub tag: u8,
    pub start_key_group: i32,
    pub num_key_groups: i32,
    pub checkpointed_size: i64,
    pub materialized: Vec<KeyedStateHandle>,
    pub non_materialized: Vec<KeyedStateHandle>,
    pub materialization_id: i64,
    pub checkpoint_id: i64,
    pub handle_id: String,
}

/// Tag 9: changelog increments held inline.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChangelogByteIncrementHandle {
    pub tag: u8,
    pub start_key_group: i32,
    pub num_key_groups: i32,
    pub from_seq: i64,
    pub to_seq: i64,
    pub changes: Vec<ChangelogStateChange>,
    pub handle_id: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChangelogStateChange {
    pub key_group: i32,
    pub data: Bytes,
}

/// Tag 10; tag 13 adds the storage identifier.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChangelogFileIncrementHandle {
    pub tag: u8,
    pub start_key_group: i32,
    pub num_key_groups: i32,
    pub offsets: Vec<ChangelogStreamOffset>,
    pub state_size: i64,
    pub checkpointed_size: i64,
    pub handle_id: String,
    pub storage_id: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChangelogStreamOffset {
    pub offset: i64,
    pub handle: Option<StreamStateHandle>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct HandleAndLocalPath {
    pub local_path: String,
    pub handle: Option<StreamStateHandle>,
}

pub(crate) fn read_keyed_state_handle<R: Read>(
    r: &mut ByteReader<R>,
    mode: DecodeMode,
) -> MetadataResult<Option<KeyedStateHandle>> {
    let tag = r.read_u8("keyed state handle type")?;
    match tag {
        TAG_ABSENT => Ok(None),
        TAG_KEY_GROUPS | TAG_SAVEPOINT_KEY_GROUPS | TAG_KEY_GROUPS_WITH_ID => {
            read_key_groups(r, tag, mode).map(Some)
        }
        TAG_INCREMENTAL | TAG_INCREMENTAL_WITH_ID => read_incremental(r, tag, mode).map(Some),
        TAG_CHANGELOG | TAG_CHANGELOG_WITH_CHECKPOINT_ID => {
            read_changelog(r, tag, mode).map(Some)
        }
        TAG_CHANGELOG_BYTE_INCREMENT => read_changelog_byte_increment(r, tag, mode).map(Some),
        TAG_CHANGELOG_FILE_INCREMENT | TAG_CHANGELOG_FILE_INCREMENT_WITH_STORAGE => {
            read_changelog_file_increment(r, tag, mode).map(Some)
        }
        got => Err(MetadataError::UnknownKeyedHandleType { got }),
    }
}

fn read_key_groups<R: Read>(
    r: &mut ByteReader<R>,
    tag: u8,
    mode: DecodeMode,
) -> MetadataResult<KeyedStateHandle> {
    let start_key_group = r.read_i32("key groups start")?;
    let num_key_groups = r.read_i32("key groups count")?;
    if num_key_groups < 0 {
        return Err(MetadataError::NegativeCount {
            field: "key groups count",
            got: num_key_groups,
        });
    }
    // One offset per key group.
    let mut offsets = Vec::with_capacity(if mode.retain() {
        num_key_groups as usize
    } else {
        0
    });
    for _ in 0..num_key_groups {
        let offset = r.read_i64("key groups offset")?;
        if mode.retain() {
            offsets.push(offset);
        }
    }
    let delegate = read_stream_state_handle(r, mode)?;
    let handle_id = if tag == TAG_KEY_GROUPS_WITH_ID {
        Some(r.read_utf("key groups handle id")?)
    } else {
        None
    };
    Ok(KeyedStateHandle::KeyGroups(KeyGroupsHandle {
        tag,
        start_key_group,
        num_key_groups,
        offsets,
        delegate,
        handle_id,
    }))
}

fn read_incremental<R: Read>(
    r: &mut ByteReader<R>,
    tag: u8,
    mode: DecodeMode,
) -> MetadataResult<KeyedStateHandle> {
    let with_id = tag == TAG_INCREMENTAL_WITH_ID;
    let checkpoint_id = r.read_i64("incremental checkpoint id")?;
    let backend_id = r.read_utf("incremental backend id")?;
    let start_key_group = r.read_i32("incremental start key group")?;
    let num_key_groups = r.read_i32("incremental key group count")?;
    let checkpointed_size = if with_id {
        r.read_i64("incremental checkpointed size")?
    } else {
        UNKNOWN_CHECKPOINTED_SIZE
    };
    let meta_handle = read_stream_state_handle(r, mode)?;
    let shared_files = read_handle_and_local_path_list(
        r,
        "incremental shared files count",
        "incremental shared file path",
        mode,
    )?;
    let private_files = read_handle_and_local_path_list(
        r,
        "incremental private files count",
        "incremental private file path",
        mode,
    )?;
    let handle_id = if with_id {
        Some(r.read_utf("incremental handle id")?)
    } else {
        None
    };
    Ok(KeyedStateHandle::IncrementalKeyGroups(
        IncrementalKeyGroupsHandle {
            tag,
            checkpoint_id,
            backend_id,
            start_key_group,
            num_key_groups,
            checkpointed_size,
            meta_handle,
            shared_files,
            private_files,
            handle_id,
        },
    ))
}

fn read_handle_and_local_path_list<R: Read>(
    r: &mut ByteReader<R>,
    count_field: &'static str,
    path_field: &'static str,
    mode: DecodeMode,
) -> MetadataResult<Vec<HandleAndLocalPath>> {
    let count = r.read_count(count_field)?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let local_path = r.read_utf(path_field)?;
        let handle = read_stream_state_handle(r, mode)?;
        entries.push(HandleAndLocalPath { local_path, handle });
    }
    Ok(entries)
}

fn read_changelog<R: Read>(
    r: &mut ByteReader<R>,
    tag: u8,
    mode: DecodeMode,
) -> MetadataResult<KeyedStateHandle> {
    let start_key_group = r.read_i32("changelog start key group")?;
    let num_key_groups = r.read_i32("changelog key group count")?;
    let checkpointed_size = r.read_i64("changelog checkpointed size")?;

    let materialized =
        read_nested_keyed_handles(r, "changelog materialized count", mode)?;
    let non_materialized =
        read_nested_keyed_handles(r, "changelog non materialized count", mode)?;

    let materialization_id = r.read_i64("changelog materialization id")?;
    let checkpoint_id = if tag == TAG_CHANGELOG_WITH_CHECKPOINT_ID {
        r.read_i64("changelog checkpoint id")?
    } else {
        materialization_id
    };
    let handle_id = r.read_utf("changelog handle id")?;

    Ok(KeyedStateHandle::Changelog(ChangelogStateHandle {
        tag,
        start_key_group,
        num_key_groups,
        checkpointed_size,
        materialized,
        non_materialized,
        materialization_id,
        checkpoint_id,
        handle_id,
    }))
}

/// Nested changelog lists recurse into the full keyed dispatch; a null
/// entry is dropped rather than kept as a hole.
fn read_nested_keyed_handles<R: Read>(
    r: &mut ByteReader<R>,
    count_field: &'static str,
    mode: DecodeMode,
) -> MetadataResult<Vec<KeyedStateHandle>> {
    let count = r.read_count(count_field)?;
    let mut handles = Vec::with_capacity(count);
    for _ in 0..count {
        if let Some(handle) = read_keyed_state_handle(r, mode)? {
            handles.push(handle);
        }
    }
    Ok(handles)
}

fn read_changelog_byte_increment<R: Read>(
    r: &mut ByteReader<R>,
    tag: u8,
    mode: DecodeMode,
) -> MetadataResult<KeyedStateHandle> {
    let start_key_group = r.read_i32("changelog byte start key group")?;
    let num_key_groups = r.read_i32("changelog byte key group count")?;
    let from_seq = r.read_i64("changelog byte from seq")?;
    let to_seq = r.read_i64("changelog byte to seq")?;
    let changes_count = r.read_count("changelog byte changes count")?;
    let mut changes = Vec::with_capacity(if mode.retain() { changes_count } else { 0 });
    for _ in 0..changes_count {
        let key_group = r.read_i32("changelog byte key group")?;
        let length = r.read_count("changelog byte length")?;
        let data = r.read_bytes(length, "changelog byte data")?;
        if mode.retain() {
            changes.push(ChangelogStateChange {
                key_group,
                data: Bytes::from(data),
            });
        }
    }
    let handle_id = r.read_utf("changelog byte handle id")?;
    Ok(KeyedStateHandle::ChangelogByteIncrement(
        ChangelogByteIncrementHandle {
            tag,
            start_key_group,
            num_key_groups,
            from_seq,
            to_seq,
            changes,
            handle_id,
        },
    ))
}

fn read_changelog_file_increment<R: Read>(
    r: &mut ByteReader<R>,
    tag: u8,
    mode: DecodeMode,
) -> MetadataResult<KeyedStateHandle> {
    let start_key_group = r.read_i32("changelog file start key group")?;
    let num_key_groups = r.read_i32("changelog file key group count")?;
    let stream_count = r.read_count("changelog file stream count")?;
    let mut offsets = Vec::with_capacity(stream_count);
    for _ in 0..stream_count {
        let offset = r.read_i64("changelog file offset")?;
        let handle = read_stream_state_handle(r, mode)?;
        offsets.push(ChangelogStreamOffset { offset, handle });
    }
    let state_size = r.read_i64("changelog file state size")?;
    let checkpointed_size = r.read_i64("changelog file checkpointed size")?;
    let handle_id = r.read_utf("changelog file handle id")?;
    let storage_id = if tag == TAG_CHANGELOG_FILE_INCREMENT_WITH_STORAGE {
        r.read_utf("changelog file storage id")?
    } else {
        DEFAULT_CHANGELOG_STORAGE.to_string()
    };
    Ok(KeyedStateHandle::ChangelogFileIncrement(
        ChangelogFileIncrementHandle {
            tag,
            start_key_group,
            num_key_groups,
            offsets,
            state_size,
            checkpointed_size,
            handle_id,
            storage_id,
        },
    ))
}
