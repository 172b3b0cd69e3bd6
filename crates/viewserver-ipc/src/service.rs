//! Starting, stopping and probing the view server through
//! `service call window`.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use tracing::warn;

use crate::device::Device;

const SERVICE_CODE_START_SERVER: u32 = 1;
const SERVICE_CODE_STOP_SERVER: u32 = 2;
const SERVICE_CODE_IS_SERVER_RUNNING: u32 = 3;

fn parcel_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^.*?\([0-9]{8} ([0-9]{8}).*").expect("parcel pattern is valid")
    })
}

/// Reads the boolean out of a `service call` reply such as
/// `Result: Parcel(00000000 00000001   '........')`.
pub fn parse_service_result(output: &str) -> bool {
    let Some(first_line) = output.lines().next() else {
        return false;
    };
    parcel_pattern()
        .captures(first_line)
        .and_then(|caps| caps.get(1))
        .and_then(|value| value.as_str().parse::<u32>().ok())
        .is_some_and(|value| value == 1)
}

pub fn start_server_command(port: u16) -> String {
    format!("service call window {} i32 {}", SERVICE_CODE_START_SERVER, port)
}

pub fn stop_server_command() -> String {
    format!("service call window {}", SERVICE_CODE_STOP_SERVER)
}

pub fn is_server_running_command() -> String {
    format!("service call window {}", SERVICE_CODE_IS_SERVER_RUNNING)
}

fn call(device: &dyn Device, command: &str) -> bool {
    let serial = device.serial_number();
    if !device.is_online() {
        debug!(device = serial, command, "Skipping service call on offline device");
        return false;
    }
    match device.execute_shell_command(command) {
        Ok(output) => {
            let result = parse_service_result(&output);
            debug!(device = serial, command, result, "Service call finished");
            result
        }
        Err(e) => {
            warn!(device = serial, command, error = %e, "Service call failed");
            false
        }
    }
}

pub fn is_view_server_running(device: &dyn Device) -> bool {
    call(device, &is_server_running_command())
}

pub fn start_view_server(device: &dyn Device, port: u16) -> bool {
    call(device, &start_server_command(port))
}

pub fn stop_view_server(device: &dyn Device) -> bool {
    call(device, &stop_server_command())
}
