use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use tracing::debug;
use tracing::warn;
use viewserver_common::mutex_lock_or_recover;

use crate::config::ClientConfig;
use crate::device::Device;
use crate::error::ClientError;
use crate::error::DeviceError;

struct ForwardEntry {
    device: Arc<dyn Device>,
    local_port: u16,
}

struct ForwardState {
    entries: HashMap<String, ForwardEntry>,
    /// `None` once the port range is used up.
    next_local_port: Option<u16>,
}

/// Local ports forwarded to each device's view server port.
///
/// Local ports are handed out monotonically and never reused within the
/// table's lifetime, so a slow teardown of an old forward cannot collide
/// with a new one.
pub struct PortForwardingTable {
    remote_port: u16,
    state: Mutex<ForwardState>,
}

impl PortForwardingTable {
    pub fn new(first_local_port: u16, remote_port: u16) -> Self {
        Self {
            remote_port,
            state: Mutex::new(ForwardState {
                entries: HashMap::new(),
                next_local_port: Some(first_local_port),
            }),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.first_local_port, config.remote_port)
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Returns the device's local port, creating the forward if needed.
    ///
    /// The lock is held across the device call so two callers cannot set up
    /// two forwards for the same device.
    pub fn ensure_forward(&self, device: &Arc<dyn Device>) -> Result<u16, ClientError> {
        let serial = device.serial_number();
        let mut state = mutex_lock_or_recover(&self.state);
        if let Some(entry) = state.entries.get(serial) {
            return Ok(entry.local_port);
        }
        if !device.is_online() {
            return Err(ClientError::Device(DeviceError::Offline));
        }

        let local_port = state.next_local_port.ok_or_else(|| {
            ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "no local ports left to forward",
            ))
        })?;
        state.next_local_port = local_port.checked_add(1);

        if let Err(e) = device.create_forward(local_port, self.remote_port) {
            warn!(device = serial, port = local_port, error = %e, "Failed to create forward");
            return Err(e.into());
        }
        debug!(device = serial, port = local_port, "Forward created");
        state.entries.insert(
            serial.to_string(),
            ForwardEntry {
                device: Arc::clone(device),
                local_port,
            },
        );
        Ok(local_port)
    }

    /// Removes the device's forward, best effort. Unknown devices are a no-op.
    pub fn remove_forward(&self, serial: &str) {
        let entry = mutex_lock_or_recover(&self.state).entries.remove(serial);
        if let Some(entry) = entry {
            self.teardown(serial, entry);
        }
    }

    /// Removes every forward in the table.
    pub fn remove_all(&self) {
        let entries: Vec<(String, ForwardEntry)> =
            mutex_lock_or_recover(&self.state).entries.drain().collect();
        for (serial, entry) in entries {
            self.teardown(&serial, entry);
        }
    }

    fn teardown(&self, serial: &str, entry: ForwardEntry) {
        match entry.device.remove_forward(entry.local_port, self.remote_port) {
            Ok(()) => debug!(device = serial, port = entry.local_port, "Forward removed"),
            // The device already dropped it (disconnect race).
            Err(DeviceError::Rejected(_)) | Err(DeviceError::Offline) => {}
            Err(e) => warn!(
                device = serial,
                port = entry.local_port,
                error = %e,
                "Failed to remove forward"
            ),
        }
    }

    pub fn local_port(&self, serial: &str) -> Result<u16, ClientError> {
        mutex_lock_or_recover(&self.state)
            .entries
            .get(serial)
            .map(|e| e.local_port)
            .ok_or_else(|| ClientError::NotForwarded(serial.to_string()))
    }

    pub fn forwarded_devices(&self) -> Vec<String> {
        let mut serials: Vec<String> = mutex_lock_or_recover(&self.state)
            .entries
            .keys()
            .cloned()
            .collect();
        serials.sort();
        serials
    }
}
