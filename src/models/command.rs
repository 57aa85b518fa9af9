//! Structured commands forwarded to a running worker.

use serde::{Deserialize, Serialize};

/// Command name that switches the collection used for retrieval.
pub const UPDATE_QUERYING_COLLECTION: &str = "update_querying_collection";

/// Routing header understood by the worker runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandHeader {
    /// Command name.
    pub name: String,
    /// Message kind; always `cmd` for control commands.
    #[serde(rename = "type")]
    pub kind: String,
}

/// A control command delivered over the worker's callback port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerCommand {
    /// Correlation id of the originating request.
    pub request_id: String,
    /// Channel the worker serves.
    pub channel_name: String,
    /// Target collection, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Source file name, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Local file path, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Routing header.
    pub rte: CommandHeader,
}

impl WorkerCommand {
    /// Build a bare command with the given name.
    #[must_use]
    pub fn new(name: &str, request_id: &str, channel_name: &str) -> Self {
        Self {
            request_id: request_id.to_owned(),
            channel_name: channel_name.to_owned(),
            collection: None,
            file_name: None,
            path: None,
            rte: CommandHeader {
                name: name.to_owned(),
                kind: "cmd".to_owned(),
            },
        }
    }

    /// Point the worker's retrieval stage at another collection.
    #[must_use]
    pub fn update_querying_collection(
        request_id: &str,
        channel_name: &str,
        collection: &str,
        file_name: &str,
    ) -> Self {
        Self {
            collection: Some(collection.to_owned()),
            file_name: Some(file_name.to_owned()),
            ..Self::new(UPDATE_QUERYING_COLLECTION, request_id, channel_name)
        }
    }
}
