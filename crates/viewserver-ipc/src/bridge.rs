use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use viewserver_core::ViewTree;

use crate::client::ViewServerClient;
use crate::client::CHANGE_NOTIFICATION_PROTOCOL;
use crate::config::ClientConfig;
use crate::device::Device;
use crate::error::ClientError;
use crate::forward::PortForwardingTable;
use crate::notifier::ChangeNotifier;
use crate::notifier::ListenerId;
use crate::notifier::WindowChangeListener;
use crate::service;
use crate::sleeper::Sleeper;
use crate::sleeper::ThreadSleeper;
use crate::window::ViewServerInfo;
use crate::window::Window;

/// State of a device right after it was set up.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub serial: String,
    pub info: ViewServerInfo,
    pub windows: Vec<Window>,
    /// `None` on servers without `GET_FOCUS`.
    pub focused_window: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct LoadedTree {
    pub window: Window,
    pub tree: ViewTree,
    pub profiled: bool,
}

/// Ties forwarding, server control, commands and notifications together for
/// a set of devices.
pub struct DeviceBridge {
    forwards: Arc<PortForwardingTable>,
    client: ViewServerClient,
    notifier: ChangeNotifier,
    sleeper: Arc<dyn Sleeper>,
    start_retry_delay: std::time::Duration,
}

impl DeviceBridge {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_sleeper(config, Arc::new(ThreadSleeper))
    }

    pub fn with_sleeper(config: ClientConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        let forwards = Arc::new(PortForwardingTable::from_config(&config));
        Self {
            client: ViewServerClient::new(Arc::clone(&forwards), config.clone()),
            notifier: ChangeNotifier::new(Arc::clone(&forwards), config.clone()),
            start_retry_delay: config.start_retry_delay,
            forwards,
            sleeper,
        }
    }

    pub fn forwards(&self) -> &Arc<PortForwardingTable> {
        &self.forwards
    }

    pub fn client(&self) -> &ViewServerClient {
        &self.client
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Forwards the device, makes sure its view server runs and loads its
    /// versions and windows.
    ///
    /// A server that is not running gets two start attempts. When both fail
    /// the forward is removed again.
    pub fn device_connected(&self, device: &Arc<dyn Device>) -> Result<DeviceSnapshot, ClientError> {
        let serial = device.serial_number();
        self.forwards.ensure_forward(device)?;

        if !self.ensure_server_running(device.as_ref()) {
            error!(device = serial, "Unable to start the view server");
            self.forwards.remove_forward(serial);
            return Err(ClientError::ServerUnavailable(serial.to_string()));
        }

        self.client.remove_server_info(serial);
        let info = self.client.load_server_info(serial)?;
        if !info.is_complete() {
            return Err(ClientError::ServerUnavailable(serial.to_string()));
        }

        let windows = self.client.list_windows(serial)?;
        let focused_window = info
            .supports_change_notifications()
            .then(|| self.client.focused_window(serial));
        info!(
            device = serial,
            server_version = info.server_version,
            protocol_version = info.protocol_version,
            windows = windows.len(),
            "Device ready"
        );
        Ok(DeviceSnapshot {
            serial: serial.to_string(),
            info,
            windows,
            focused_window,
        })
    }

    fn ensure_server_running(&self, device: &dyn Device) -> bool {
        if service::is_view_server_running(device) {
            return true;
        }
        let port = self.forwards.remote_port();
        if service::start_view_server(device, port) {
            return true;
        }
        debug!(
            device = device.serial_number(),
            delay_ms = self.start_retry_delay.as_millis() as u64,
            "View server did not start, retrying"
        );
        self.sleeper.sleep(self.start_retry_delay);
        service::start_view_server(device, port)
    }

    /// Lists windows again, making one attempt to start a server that has
    /// stopped.
    pub fn refresh_windows(&self, device: &Arc<dyn Device>) -> Result<Vec<Window>, ClientError> {
        let serial = device.serial_number();
        self.forwards.ensure_forward(device)?;
        if !service::is_view_server_running(device.as_ref())
            && !service::start_view_server(device.as_ref(), self.forwards.remote_port())
        {
            return Err(ClientError::ServerUnavailable(serial.to_string()));
        }
        self.client.list_windows(serial)
    }

    /// Subscribes to window and focus changes. Needs protocol version 3.
    pub fn watch(
        &self,
        serial: &str,
        listener: Arc<dyn WindowChangeListener>,
    ) -> Result<ListenerId, ClientError> {
        let info = self.client.server_info(serial)?;
        if !info.supports_change_notifications() {
            return Err(ClientError::Unsupported {
                feature: "window change notifications",
                protocol_version: info.protocol_version,
                required: CHANGE_NOTIFICATION_PROTOCOL,
            });
        }
        self.notifier.subscribe(serial, listener)
    }

    pub fn unwatch(&self, serial: &str, id: ListenerId) {
        self.notifier.unsubscribe(serial, id);
    }

    /// Dumps and profiles a window.
    ///
    /// A failed profile keeps the tree unprofiled. View counts are always
    /// set; ratings only when profiling succeeded.
    pub fn load_view_tree(&self, window: &Window) -> Result<Option<LoadedTree>, ClientError> {
        let Some(mut tree) = self.client.dump_window(window)? else {
            return Ok(None);
        };
        let root = tree.root();
        let profiled = match self.client.load_profile(window, &mut tree, root) {
            Ok(profiled) => profiled,
            Err(e) => {
                warn!(device = window.device(), window = %window.encode(), error = %e, "Profiling failed");
                false
            }
        };
        tree.set_view_count();
        if profiled {
            tree.set_profile_ratings();
        }
        Ok(Some(LoadedTree {
            window: window.clone(),
            tree,
            profiled,
        }))
    }

    /// Forgets everything about a device that went away.
    pub fn device_disconnected(&self, serial: &str) {
        self.notifier.remove_device(serial);
        self.client.remove_server_info(serial);
        self.forwards.remove_forward(serial);
        info!(device = serial, "Device disconnected");
    }

    pub fn shutdown(&self) {
        self.notifier.shutdown();
        self.forwards.remove_all();
    }
}
