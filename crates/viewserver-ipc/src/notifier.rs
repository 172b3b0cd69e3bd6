use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;

use tracing::debug;
use tracing::info;
use tracing::warn;
use viewserver_common::mutex_lock_or_recover;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::connection::ConnectionCanceller;
use crate::error::ClientError;
use crate::forward::PortForwardingTable;
use crate::protocol;
use crate::protocol::Command;

/// Receives `AUTOLIST` notifications. Called on the device's listener thread.
pub trait WindowChangeListener: Send + Sync {
    fn windows_changed(&self, device: &str);
    fn focus_changed(&self, device: &str);
}

/// Handle returned by [`ChangeNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowChange {
    WindowsChanged,
    FocusChanged,
}

impl WindowChange {
    pub fn from_line(line: &str) -> Option<Self> {
        if line.eq_ignore_ascii_case(protocol::LIST_UPDATE) {
            Some(WindowChange::WindowsChanged)
        } else if line.eq_ignore_ascii_case(protocol::FOCUS_UPDATE) {
            Some(WindowChange::FocusChanged)
        } else {
            None
        }
    }
}

/// Cancellation shared between a listener task and whoever stops it.
///
/// Cancelling sets the flag and shuts down the armed connection, which
/// unblocks a pending read.
#[derive(Default)]
struct CancelToken {
    cancelled: AtomicBool,
    canceller: Mutex<Option<ConnectionCanceller>>,
}

impl CancelToken {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(canceller) = mutex_lock_or_recover(&self.canceller).take() {
            canceller.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Registers the connection to shut down on cancel. Returns `false` if
    /// cancellation already happened, in which case the caller must stop.
    fn arm(&self, canceller: ConnectionCanceller) -> bool {
        let mut slot = mutex_lock_or_recover(&self.canceller);
        if self.is_cancelled() {
            return false;
        }
        *slot = Some(canceller);
        true
    }
}

struct ListenerTask {
    token: Arc<CancelToken>,
    handle: JoinHandle<()>,
}

impl ListenerTask {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    fn stop(self) {
        self.token.cancel();
        self.join();
    }

    /// Waits for the thread, unless called from the thread itself (a
    /// listener unsubscribing from inside its callback).
    fn join(self) {
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        let name = self.handle.thread().name().map(str::to_string);
        if self.handle.join().is_err() {
            warn!(thread = ?name, "Window change listener panicked");
        }
    }
}

#[derive(Default)]
struct DeviceListeners {
    listeners: Vec<(ListenerId, Arc<dyn WindowChangeListener>)>,
    task: Option<ListenerTask>,
}

type Registry = Arc<Mutex<HashMap<String, DeviceListeners>>>;

/// Fans `AUTOLIST` notifications out to subscribers, with one background
/// listener per device.
///
/// The listener starts with the device's first subscriber and is stopped
/// when the last one leaves. If the stream fails the task ends and the
/// subscribers stay registered; [`restart`](ChangeNotifier::restart) brings
/// it back.
pub struct ChangeNotifier {
    forwards: Arc<PortForwardingTable>,
    config: ClientConfig,
    devices: Registry,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    pub fn new(forwards: Arc<PortForwardingTable>, config: ClientConfig) -> Self {
        Self {
            forwards,
            config,
            devices: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(
        &self,
        serial: &str,
        listener: Arc<dyn WindowChangeListener>,
    ) -> Result<ListenerId, ClientError> {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut devices = mutex_lock_or_recover(&self.devices);
        let entry = devices.entry(serial.to_string()).or_default();
        entry.listeners.push((id, listener));
        if entry.task.is_some() {
            return Ok(id);
        }

        match self.spawn_task(serial) {
            Ok(task) => {
                entry.task = Some(task);
                Ok(id)
            }
            Err(e) => {
                entry.listeners.retain(|(lid, _)| *lid != id);
                if entry.listeners.is_empty() {
                    devices.remove(serial);
                }
                Err(e)
            }
        }
    }

    /// Removes a subscriber; the last one out stops the device's listener.
    /// Unknown ids are ignored.
    pub fn unsubscribe(&self, serial: &str, id: ListenerId) {
        let task = {
            let mut devices = mutex_lock_or_recover(&self.devices);
            let Some(entry) = devices.get_mut(serial) else {
                return;
            };
            entry.listeners.retain(|(lid, _)| *lid != id);
            if !entry.listeners.is_empty() {
                return;
            }
            devices.remove(serial).and_then(|entry| entry.task)
        };
        if let Some(task) = task {
            debug!(device = serial, "Last subscriber left, stopping listener");
            task.stop();
        }
    }

    /// Drops every subscriber of a device and stops its listener.
    pub fn remove_device(&self, serial: &str) {
        let entry = mutex_lock_or_recover(&self.devices).remove(serial);
        if let Some(task) = entry.and_then(|entry| entry.task) {
            task.stop();
        }
    }

    pub fn is_listening(&self, serial: &str) -> bool {
        mutex_lock_or_recover(&self.devices)
            .get(serial)
            .and_then(|entry| entry.task.as_ref())
            .is_some_and(ListenerTask::is_running)
    }

    pub fn listener_count(&self, serial: &str) -> usize {
        mutex_lock_or_recover(&self.devices)
            .get(serial)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Starts a new listener for a device whose previous one has ended.
    ///
    /// Returns `Ok(false)` when the device has no subscribers or its
    /// listener is still running.
    pub fn restart(&self, serial: &str) -> Result<bool, ClientError> {
        let mut devices = mutex_lock_or_recover(&self.devices);
        let Some(entry) = devices.get_mut(serial) else {
            return Ok(false);
        };
        if entry.task.as_ref().is_some_and(ListenerTask::is_running) {
            return Ok(false);
        }
        if let Some(finished) = entry.task.take() {
            finished.join();
        }
        entry.task = Some(self.spawn_task(serial)?);
        info!(device = serial, "Restarted window change listener");
        Ok(true)
    }

    /// Stops every listener and forgets all subscribers.
    pub fn shutdown(&self) {
        let tasks: Vec<ListenerTask> = mutex_lock_or_recover(&self.devices)
            .drain()
            .filter_map(|(_, entry)| entry.task)
            .collect();
        for task in &tasks {
            task.token.cancel();
        }
        for task in tasks {
            task.join();
        }
    }

    fn spawn_task(&self, serial: &str) -> Result<ListenerTask, ClientError> {
        let token = Arc::new(CancelToken::default());
        let monitor = DeviceMonitor {
            serial: serial.to_string(),
            forwards: Arc::clone(&self.forwards),
            config: self.config.clone(),
            devices: Arc::clone(&self.devices),
            token: Arc::clone(&token),
        };
        let handle = thread::Builder::new()
            .name(format!("autolist-{}", serial))
            .spawn(move || monitor.run())?;
        Ok(ListenerTask { token, handle })
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct DeviceMonitor {
    serial: String,
    forwards: Arc<PortForwardingTable>,
    config: ClientConfig,
    devices: Registry,
    token: Arc<CancelToken>,
}

impl DeviceMonitor {
    fn run(self) {
        debug!(device = %self.serial, "Window change listener started");
        match self.listen() {
            Ok(()) => debug!(device = %self.serial, "Window change listener stopped"),
            Err(_) if self.token.is_cancelled() => {
                debug!(device = %self.serial, "Window change listener cancelled")
            }
            Err(e) => warn!(
                device = %self.serial,
                error = %e,
                "Window change listener ended"
            ),
        }
    }

    fn listen(&self) -> Result<(), ClientError> {
        let mut conn = Connection::open(&self.forwards, &self.serial, &self.config)?;
        if !self.token.arm(conn.canceller()?) {
            return Ok(());
        }
        conn.send_command(&Command::AutoList.to_string())?;

        while !self.token.is_cancelled() {
            match conn.read_line() {
                Ok(Some(line)) => match WindowChange::from_line(&line) {
                    Some(change) => self.notify(change),
                    None => debug!(device = %self.serial, line = %line, "Ignoring AUTOLIST line"),
                },
                Ok(None) => break,
                // An idle stream is normal; keep waiting.
                Err(ClientError::Timeout) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn notify(&self, change: WindowChange) {
        let listeners: Vec<Arc<dyn WindowChangeListener>> = mutex_lock_or_recover(&self.devices)
            .get(&self.serial)
            .map(|entry| entry.listeners.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();
        debug!(device = %self.serial, ?change, listeners = listeners.len(), "Window change");

        for listener in listeners {
            if self.token.is_cancelled() {
                break;
            }
            match change {
                WindowChange::WindowsChanged => listener.windows_changed(&self.serial),
                WindowChange::FocusChanged => listener.focus_changed(&self.serial),
            }
        }
    }
}
