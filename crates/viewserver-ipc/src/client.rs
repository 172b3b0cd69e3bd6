use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use tracing::debug;
use tracing::warn;
use viewserver_common::mutex_lock_or_recover;
use viewserver_core::NodeId;
use viewserver_core::TreeBuilder;
use viewserver_core::ViewNode;
use viewserver_core::ViewTree;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::ClientError;
use crate::forward::PortForwardingTable;
use crate::protocol;
use crate::protocol::Command;
use crate::window::ViewServerInfo;
use crate::window::Window;

/// Protocol version that introduced `AUTOLIST` and `GET_FOCUS`.
pub const CHANGE_NOTIFICATION_PROTOCOL: i32 = 3;

/// Issues view server commands over the devices' port forwards.
///
/// Every command opens its own connection. Server versions are cached per
/// device once both probes succeed.
pub struct ViewServerClient {
    forwards: Arc<PortForwardingTable>,
    config: ClientConfig,
    server_info: Mutex<HashMap<String, ViewServerInfo>>,
}

impl ViewServerClient {
    pub fn new(forwards: Arc<PortForwardingTable>, config: ClientConfig) -> Self {
        Self {
            forwards,
            config,
            server_info: Mutex::new(HashMap::new()),
        }
    }

    pub fn forwards(&self) -> &Arc<PortForwardingTable> {
        &self.forwards
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn open(&self, serial: &str) -> Result<Connection, ClientError> {
        Connection::open(&self.forwards, serial, &self.config)
    }

    fn query_version(&self, serial: &str, command: Command<'_>) -> Result<i32, ClientError> {
        let mut conn = self.open(serial)?;
        conn.send_command(&command.to_string())?;
        let line = conn
            .read_line()?
            .ok_or_else(|| ClientError::Protocol(format!("no reply to {}", command)))?;
        protocol::parse_version(&line)
            .ok_or_else(|| ClientError::Protocol(format!("bad {} reply '{}'", command, line)))
    }

    /// Probes `SERVER` and `PROTOCOL`, each on its own connection.
    ///
    /// A failed probe reads as `-1`. Only when both fail is an error
    /// returned, the one from the `SERVER` probe. The result is cached only
    /// when both succeed.
    pub fn load_server_info(&self, serial: &str) -> Result<ViewServerInfo, ClientError> {
        let server = self.query_version(serial, Command::Server);
        let protocol = self.query_version(serial, Command::Protocol);

        let info = match (server, protocol) {
            (Err(e), Err(_)) => {
                warn!(device = serial, error = %e, "Unable to get view server info");
                return Err(e);
            }
            (server, protocol) => ViewServerInfo::new(
                version_or_unknown(serial, Command::Server, server),
                version_or_unknown(serial, Command::Protocol, protocol),
            ),
        };

        if info.is_complete() {
            mutex_lock_or_recover(&self.server_info).insert(serial.to_string(), info);
        }
        debug!(
            device = serial,
            server_version = info.server_version,
            protocol_version = info.protocol_version,
            "Loaded view server info"
        );
        Ok(info)
    }

    /// Cached info, or a fresh probe when none is cached.
    pub fn server_info(&self, serial: &str) -> Result<ViewServerInfo, ClientError> {
        if let Some(info) = self.cached_server_info(serial) {
            return Ok(info);
        }
        self.load_server_info(serial)
    }

    pub fn cached_server_info(&self, serial: &str) -> Option<ViewServerInfo> {
        mutex_lock_or_recover(&self.server_info).get(serial).copied()
    }

    pub fn remove_server_info(&self, serial: &str) {
        mutex_lock_or_recover(&self.server_info).remove(serial);
    }

    /// Lists the device's windows, top of the stack first.
    ///
    /// Devices without focus notifications get the `<Focused Window>` entry
    /// appended last. A malformed line ends the listing and what was read
    /// before it is kept.
    pub fn list_windows(&self, serial: &str) -> Result<Vec<Window>, ClientError> {
        let info = self.server_info(serial)?;
        let mut conn = self.open(serial)?;
        conn.send_command(&Command::List.to_string())?;

        let mut windows = Vec::new();
        while let Some(line) = conn.read_line()? {
            if protocol::is_done(&line) {
                break;
            }
            let Some((id, title)) = line.split_once(' ') else {
                continue;
            };
            let Some(hash_code) = protocol::parse_window_id(id, info.server_version) else {
                warn!(device = serial, line = %line, "Malformed window line");
                break;
            };
            windows.push(Window::new(serial, title, hash_code));
        }
        conn.close();

        windows.reverse();
        if info.protocol_version < CHANGE_NOTIFICATION_PROTOCOL {
            windows.push(Window::focused(serial));
        }
        Ok(windows)
    }

    /// Hash code of the focused window, or `-1` when it cannot be determined.
    pub fn focused_window(&self, serial: &str) -> i32 {
        match self.try_focused_window(serial) {
            Ok(Some(hash_code)) => hash_code,
            Ok(None) => -1,
            Err(e) => {
                debug!(device = serial, error = %e, "Unable to get focused window");
                -1
            }
        }
    }

    fn try_focused_window(&self, serial: &str) -> Result<Option<i32>, ClientError> {
        let mut conn = self.open(serial)?;
        conn.send_command(&Command::GetFocus.to_string())?;
        Ok(conn
            .read_line()?
            .and_then(|line| protocol::parse_focus_line(&line)))
    }

    /// Dumps a window's hierarchy.
    ///
    /// A malformed line or a stream that ends before `DONE.` yields the tree
    /// built so far. `Ok(None)` means no node arrived.
    pub fn dump_window(&self, window: &Window) -> Result<Option<ViewTree>, ClientError> {
        let mut conn = self.open(window.device())?;
        conn.send_command(
            &Command::Dump {
                window: window.hash_code(),
            }
            .to_string(),
        )?;

        let mut builder = TreeBuilder::new();
        while let Some(line) = conn.read_line()? {
            if protocol::is_done(&line) {
                break;
            }
            if let Err(e) = builder.push_line(&line) {
                warn!(
                    device = window.device(),
                    window = %window.encode(),
                    error = %e,
                    "Stopped reading view hierarchy"
                );
                break;
            }
        }
        conn.close();
        debug!(
            device = window.device(),
            window = %window.encode(),
            nodes = builder.len(),
            "Dumped view hierarchy"
        );
        Ok(builder.finish())
    }

    /// Loads timings for the subtree at `node`.
    ///
    /// Returns `Ok(false)` and leaves the tree unchanged when the device
    /// reports a failure or the reply is short or malformed.
    pub fn load_profile(
        &self,
        window: &Window,
        tree: &mut ViewTree,
        node: NodeId,
    ) -> Result<bool, ClientError> {
        let mut conn = self.open(window.device())?;
        let target = tree.node(node).to_string();
        conn.send_command(
            &Command::Profile {
                window: window.hash_code(),
                node: &target,
            }
            .to_string(),
        )?;

        let mut read_error = None;
        let mut lines = std::iter::from_fn(|| match conn.read_line() {
            Ok(line) => line,
            Err(e) => {
                read_error = Some(e);
                None
            }
        });
        let loaded = tree.load_profile_data(node, &mut lines);
        drop(lines);
        conn.close();

        if let Some(e) = read_error {
            return Err(e);
        }
        if !loaded {
            debug!(device = window.device(), node = %target, "Profile data unavailable");
        }
        Ok(loaded)
    }

    pub fn invalidate_view(&self, window: &Window, node: &ViewNode) -> Result<(), ClientError> {
        let target = node.to_string();
        self.send_node_command(
            window,
            Command::Invalidate {
                window: window.hash_code(),
                node: &target,
            },
        )
    }

    pub fn request_layout(&self, window: &Window, node: &ViewNode) -> Result<(), ClientError> {
        let target = node.to_string();
        self.send_node_command(
            window,
            Command::RequestLayout {
                window: window.hash_code(),
                node: &target,
            },
        )
    }

    fn send_node_command(&self, window: &Window, command: Command<'_>) -> Result<(), ClientError> {
        let mut conn = self.open(window.device())?;
        conn.send_command(&command.to_string())?;
        conn.close();
        Ok(())
    }
}

fn version_or_unknown(serial: &str, command: Command<'_>, result: Result<i32, ClientError>) -> i32 {
    result.unwrap_or_else(|e| {
        debug!(device = serial, command = %command, error = %e, "Version probe failed");
        -1
    })
}
