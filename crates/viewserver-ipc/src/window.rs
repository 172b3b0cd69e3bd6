use std::fmt;

use serde::Serialize;

use crate::protocol::encode_hash;

pub const FOCUSED_WINDOW_TITLE: &str = "<Focused Window>";
/// Hash code of the synthetic focused-window entry.
pub const FOCUSED_WINDOW_HASH: i32 = -1;

/// A window listed by the view server.
///
/// Equality is hash code plus device serial, so a window re-listed after a
/// refresh compares equal to the previous instance.
#[derive(Debug, Clone, Serialize)]
pub struct Window {
    device: String,
    title: String,
    hash_code: i32,
}

impl Window {
    pub fn new(device: impl Into<String>, title: impl Into<String>, hash_code: i32) -> Self {
        Self {
            device: device.into(),
            title: title.into(),
            hash_code,
        }
    }

    /// Entry standing for "whatever window has focus" on servers that cannot
    /// push focus changes.
    pub fn focused(device: impl Into<String>) -> Self {
        Self::new(device, FOCUSED_WINDOW_TITLE, FOCUSED_WINDOW_HASH)
    }

    pub fn is_focused_sentinel(&self) -> bool {
        self.hash_code == FOCUSED_WINDOW_HASH
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn hash_code(&self) -> i32 {
        self.hash_code
    }

    pub fn encode(&self) -> String {
        encode_hash(self.hash_code)
    }
}

impl PartialEq for Window {
    fn eq(&self, other: &Self) -> bool {
        self.hash_code == other.hash_code && self.device == other.device
    }
}

impl Eq for Window {}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Versions reported by a device's view server; `-1` marks a failed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewServerInfo {
    pub server_version: i32,
    pub protocol_version: i32,
}

impl ViewServerInfo {
    pub fn new(server_version: i32, protocol_version: i32) -> Self {
        Self {
            server_version,
            protocol_version,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.server_version != -1 && self.protocol_version != -1
    }

    /// `AUTOLIST` and `GET_FOCUS` arrived with protocol version 3.
    pub fn supports_change_notifications(&self) -> bool {
        self.protocol_version >= 3
    }
}
