use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use viewserver_common::mutex_lock_or_recover;

use crate::device::Device;
use crate::error::DeviceError;

/// Failure a [`MockDevice`] can be told to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Offline,
    Timeout,
    Rejected,
    Io,
}

impl MockFailure {
    fn to_error(self, what: &str) -> DeviceError {
        match self {
            MockFailure::Offline => DeviceError::Offline,
            MockFailure::Timeout => DeviceError::Timeout,
            MockFailure::Rejected => DeviceError::Rejected(format!("{} rejected", what)),
            MockFailure::Io => DeviceError::Io(std::io::Error::other(format!("{} failed", what))),
        }
    }
}

/// A forward request recorded by [`MockDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardCall {
    Create { local: u16, remote: u16 },
    Remove { local: u16, remote: u16 },
}

#[derive(Default)]
struct MockState {
    online: bool,
    shell_responses: HashMap<String, String>,
    queued_shell_responses: HashMap<String, VecDeque<String>>,
    shell_failure: Option<MockFailure>,
    create_forward_failure: Option<MockFailure>,
    remove_forward_failure: Option<MockFailure>,
    shell_calls: Vec<String>,
    forward_calls: Vec<ForwardCall>,
    active_forwards: Vec<(u16, u16)>,
}

/// A scripted [`Device`] for tests.
///
/// Shell commands answer with queued one-shot responses first, then with the
/// fixed response for that command, and with an empty string otherwise. Every
/// call is recorded for assertions.
///
/// ```ignore
/// use viewserver_ipc::MockDevice;
///
/// let device = MockDevice::new("emulator-5554");
/// device.set_shell_response("service call window 3", "Result: Parcel(00000000 00000001   '........')");
/// ```
#[derive(Clone)]
pub struct MockDevice {
    serial: String,
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    /// Creates an online device with no scripted responses.
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            state: Arc::new(Mutex::new(MockState {
                online: true,
                ..MockState::default()
            })),
        }
    }

    pub fn set_online(&self, online: bool) {
        mutex_lock_or_recover(&self.state).online = online;
    }

    /// Sets the response returned every time `command` runs.
    pub fn set_shell_response(&self, command: &str, output: &str) {
        mutex_lock_or_recover(&self.state)
            .shell_responses
            .insert(command.to_string(), output.to_string());
    }

    /// Queues a response used once, before any fixed response.
    pub fn push_shell_response(&self, command: &str, output: &str) {
        mutex_lock_or_recover(&self.state)
            .queued_shell_responses
            .entry(command.to_string())
            .or_default()
            .push_back(output.to_string());
    }

    pub fn fail_shell(&self, failure: Option<MockFailure>) {
        mutex_lock_or_recover(&self.state).shell_failure = failure;
    }

    pub fn fail_create_forward(&self, failure: Option<MockFailure>) {
        mutex_lock_or_recover(&self.state).create_forward_failure = failure;
    }

    pub fn fail_remove_forward(&self, failure: Option<MockFailure>) {
        mutex_lock_or_recover(&self.state).remove_forward_failure = failure;
    }

    pub fn shell_calls(&self) -> Vec<String> {
        mutex_lock_or_recover(&self.state).shell_calls.clone()
    }

    pub fn shell_call_count(&self, command: &str) -> usize {
        mutex_lock_or_recover(&self.state)
            .shell_calls
            .iter()
            .filter(|c| *c == command)
            .count()
    }

    pub fn forward_calls(&self) -> Vec<ForwardCall> {
        mutex_lock_or_recover(&self.state).forward_calls.clone()
    }

    /// Forwards created and not yet removed, as `(local, remote)`.
    pub fn active_forwards(&self) -> Vec<(u16, u16)> {
        mutex_lock_or_recover(&self.state).active_forwards.clone()
    }
}

impl Device for MockDevice {
    fn serial_number(&self) -> &str {
        &self.serial
    }

    fn is_online(&self) -> bool {
        mutex_lock_or_recover(&self.state).online
    }

    fn execute_shell_command(&self, command: &str) -> Result<String, DeviceError> {
        let mut state = mutex_lock_or_recover(&self.state);
        state.shell_calls.push(command.to_string());
        if let Some(failure) = state.shell_failure {
            return Err(failure.to_error(command));
        }
        if let Some(output) = state
            .queued_shell_responses
            .get_mut(command)
            .and_then(VecDeque::pop_front)
        {
            return Ok(output);
        }
        Ok(state
            .shell_responses
            .get(command)
            .cloned()
            .unwrap_or_default())
    }

    fn create_forward(&self, local_port: u16, remote_port: u16) -> Result<(), DeviceError> {
        let mut state = mutex_lock_or_recover(&self.state);
        state.forward_calls.push(ForwardCall::Create {
            local: local_port,
            remote: remote_port,
        });
        if let Some(failure) = state.create_forward_failure {
            return Err(failure.to_error("forward"));
        }
        state.active_forwards.push((local_port, remote_port));
        Ok(())
    }

    fn remove_forward(&self, local_port: u16, remote_port: u16) -> Result<(), DeviceError> {
        let mut state = mutex_lock_or_recover(&self.state);
        state.forward_calls.push(ForwardCall::Remove {
            local: local_port,
            remote: remote_port,
        });
        if let Some(failure) = state.remove_forward_failure {
            return Err(failure.to_error("forward --remove"));
        }
        let before = state.active_forwards.len();
        state
            .active_forwards
            .retain(|f| *f != (local_port, remote_port));
        if state.active_forwards.len() == before {
            return Err(DeviceError::Rejected(format!(
                "listener 'tcp:{}' not found",
                local_port
            )));
        }
        Ok(())
    }
}
