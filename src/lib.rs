#![forbid(unsafe_code)]

//! Decoder for Apache Flink checkpoint `_metadata` files.

#[cfg(feature = "cli")]
pub mod cli;
pub mod metadata;
pub mod telemetry;

pub use metadata::{
    ChannelStateHandle, CheckpointMetadata, CheckpointProperties, CheckpointSummary, DecodeMode,
    KeyedStateHandle, MasterState, MetadataError, OperatorId, OperatorState, OperatorSummary,
    ParseOptions, StreamStateHandle, SubtaskState, parse, parse_file, parse_file_summary,
    parse_summary,
};

pub type Result<T> = std::result::Result<T, MetadataError>;
