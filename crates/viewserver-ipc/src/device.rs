use crate::error::DeviceError;

/// What the view server client needs from an attached device.
///
/// Implementations wrap adb (or an emulator bridge); identity is the serial
/// number.
pub trait Device: Send + Sync {
    fn serial_number(&self) -> &str;

    fn is_online(&self) -> bool;

    /// Runs `command` in the device shell and returns its collected output.
    fn execute_shell_command(&self, command: &str) -> Result<String, DeviceError>;

    /// Forwards `local_port` on this machine to `remote_port` on the device.
    fn create_forward(&self, local_port: u16, remote_port: u16) -> Result<(), DeviceError>;

    fn remove_forward(&self, local_port: u16, remote_port: u16) -> Result<(), DeviceError>;
}
