//! Best-effort probe of the trailing `CheckpointProperties` blob.
//!
//! The trailing bytes are a Java object stream. Rather than parse that
//! format, the probe checks the stream magic and records which of a few
//! known class-name tokens appear. Absence of all tokens yields no
//! properties; the probe never fails.

use serde::Serialize;

const JAVA_STREAM_MAGIC: [u8; 2] = [0xAC, 0xED];
const JAVA_STREAM_VERSION: [u8; 2] = [0x00, 0x05];

const TOKEN_CHECKPOINT_TYPE: &str = "CheckpointType";
const TOKEN_SHARING_STRATEGY: &str = "SharingFilesStrategy";
const TOKEN_SOURCE: &str = "CheckpointProperties";

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CheckpointProperties {
    pub checkpoint_type: Option<String>,
    pub sharing_files_strategy: Option<String>,
    pub source: Option<String>,
}

pub(crate) fn probe_properties(raw: &[u8]) -> Option<CheckpointProperties> {
    if raw.len() < 4 || raw[0..2] != JAVA_STREAM_MAGIC || raw[2..4] != JAVA_STREAM_VERSION {
        return None;
    }

    let token = |needle: &str| {
        contains_token(raw, needle.as_bytes()).then(|| needle.to_string())
    };
    let properties = CheckpointProperties {
        checkpoint_type: token(TOKEN_CHECKPOINT_TYPE),
        sharing_files_strategy: token(TOKEN_SHARING_STRATEGY),
        source: token(TOKEN_SOURCE),
    };

    if properties == CheckpointProperties::default() {
        return None;
    }
    Some(properties)
}

fn contains_token(raw: &[u8], token: &[u8]) -> bool {
    raw.windows(token.len()).any(|window| window == token)
}
