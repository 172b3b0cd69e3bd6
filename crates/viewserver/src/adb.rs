//! [`Device`] backed by the `adb` executable.

use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

use serde::Serialize;
use tracing::debug;
use viewserver_ipc::Device;
use viewserver_ipc::DeviceError;

/// One line of `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdbDeviceEntry {
    pub serial: String,
    /// `device`, `offline`, `unauthorized`, ...
    pub state: String,
}

impl AdbDeviceEntry {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

pub fn parse_adb_devices(output: &str) -> Vec<AdbDeviceEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let serial = fields.next()?;
            let state = fields.next()?;
            Some(AdbDeviceEntry {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

pub fn list_adb_devices(adb: &Path) -> Result<Vec<AdbDeviceEntry>, DeviceError> {
    run_adb(adb, None, &["devices"]).map(|out| parse_adb_devices(&out))
}

/// Runs adb and returns its stdout. A non-zero exit becomes an error
/// carrying stderr.
pub fn run_adb(adb: &Path, serial: Option<&str>, args: &[&str]) -> Result<String, DeviceError> {
    let mut command = Command::new(adb);
    if let Some(serial) = serial {
        command.args(["-s", serial]);
    }
    command.args(args);
    debug!(adb = %adb.display(), serial, args = ?args, "Running adb");

    let output = command.output()?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(classify_failure(&args.join(" "), stderr, output.status.code()))
}

fn classify_failure(command: &str, stderr: String, code: Option<i32>) -> DeviceError {
    if stderr.contains("offline") || (stderr.contains("device '") && stderr.contains("not found")) {
        return DeviceError::Offline;
    }
    if stderr.contains("listener") && stderr.contains("not found") {
        return DeviceError::Rejected(stderr);
    }
    let message = if stderr.is_empty() {
        match code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    } else {
        stderr
    };
    DeviceError::Command {
        command: command.to_string(),
        message,
    }
}

pub struct AdbDevice {
    adb: PathBuf,
    serial: String,
    online: bool,
}

impl AdbDevice {
    pub fn new(adb: impl Into<PathBuf>, entry: &AdbDeviceEntry) -> Self {
        Self {
            adb: adb.into(),
            serial: entry.serial.clone(),
            online: entry.is_online(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, DeviceError> {
        run_adb(&self.adb, Some(&self.serial), args)
    }
}

impl Device for AdbDevice {
    fn serial_number(&self) -> &str {
        &self.serial
    }

    fn is_online(&self) -> bool {
        self.online
    }

    fn execute_shell_command(&self, command: &str) -> Result<String, DeviceError> {
        self.run(&["shell", command])
    }

    fn create_forward(&self, local_port: u16, remote_port: u16) -> Result<(), DeviceError> {
        let local = format!("tcp:{}", local_port);
        let remote = format!("tcp:{}", remote_port);
        self.run(&["forward", &local, &remote]).map(|_| ())
    }

    fn remove_forward(&self, local_port: u16, _remote_port: u16) -> Result<(), DeviceError> {
        let local = format!("tcp:{}", local_port);
        self.run(&["forward", "--remove", &local]).map(|_| ())
    }
}
