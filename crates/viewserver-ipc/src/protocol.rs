//! Commands and response markers of the view server's line protocol.

use std::fmt;

/// Terminates `LIST` and `DUMP` responses.
pub const DONE: &str = "DONE.";
pub const LIST_UPDATE: &str = "LIST UPDATE";
pub const FOCUS_UPDATE: &str = "FOCUS UPDATE";

/// One request line. Each connection carries exactly one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Server,
    Protocol,
    List,
    GetFocus,
    AutoList,
    Dump { window: i32 },
    Profile { window: i32, node: &'a str },
    Invalidate { window: i32, node: &'a str },
    RequestLayout { window: i32, node: &'a str },
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Server => write!(f, "SERVER"),
            Command::Protocol => write!(f, "PROTOCOL"),
            Command::List => write!(f, "LIST"),
            Command::GetFocus => write!(f, "GET_FOCUS"),
            Command::AutoList => write!(f, "AUTOLIST"),
            Command::Dump { window } => write!(f, "DUMP {}", encode_hash(*window)),
            Command::Profile { window, node } => {
                write!(f, "PROFILE {} {}", encode_hash(*window), node)
            }
            Command::Invalidate { window, node } => {
                write!(f, "INVALIDATE {} {}", encode_hash(*window), node)
            }
            Command::RequestLayout { window, node } => {
                write!(f, "REQUEST_LAYOUT {} {}", encode_hash(*window), node)
            }
        }
    }
}

/// Lower-case hex of the hash code's 32 bits (`-1` encodes as `ffffffff`).
pub fn encode_hash(hash_code: i32) -> String {
    format!("{:x}", hash_code)
}

pub fn is_done(line: &str) -> bool {
    line.eq_ignore_ascii_case(DONE)
}

/// Parses a window id from `LIST`.
///
/// Servers newer than version 2 may send 64-bit ids, which are narrowed to
/// the low 32 bits.
pub fn parse_window_id(hex: &str, server_version: i32) -> Option<i32> {
    if server_version > 2 {
        u64::from_str_radix(hex, 16).ok().map(|id| id as u32 as i32)
    } else {
        i32::from_str_radix(hex, 16).ok()
    }
}

/// Parses the `GET_FOCUS` response: the hex id up to the first space.
pub fn parse_focus_line(line: &str) -> Option<i32> {
    let hex = line.split(' ').next().unwrap_or_default();
    if hex.is_empty() {
        return None;
    }
    u64::from_str_radix(hex, 16).ok().map(|id| id as u32 as i32)
}

pub fn parse_version(line: &str) -> Option<i32> {
    line.trim().parse().ok()
}
