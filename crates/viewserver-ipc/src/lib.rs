//! Device side of viewserver: port forwards, the view server's line protocol
//! and `AUTOLIST` change notifications.

#![deny(clippy::all)]

mod bridge;
mod client;
mod config;
mod connection;
mod device;
mod error;
mod forward;
mod mock_device;
mod notifier;
pub mod protocol;
pub mod service;
mod sleeper;
mod window;

pub use bridge::DeviceBridge;
pub use bridge::DeviceSnapshot;
pub use bridge::LoadedTree;
pub use client::CHANGE_NOTIFICATION_PROTOCOL;
pub use client::ViewServerClient;
pub use config::ClientConfig;
pub use config::DEFAULT_SERVER_PORT;
pub use connection::Connection;
pub use connection::ConnectionCanceller;
pub use device::Device;
pub use error::ClientError;
pub use error::DeviceError;
pub use error::ErrorCategory;
pub use forward::PortForwardingTable;
pub use mock_device::ForwardCall;
pub use mock_device::MockDevice;
pub use mock_device::MockFailure;
pub use notifier::ChangeNotifier;
pub use notifier::ListenerId;
pub use notifier::WindowChange;
pub use notifier::WindowChangeListener;
pub use sleeper::MockSleeper;
pub use sleeper::Sleeper;
pub use sleeper::ThreadSleeper;
pub use window::FOCUSED_WINDOW_HASH;
pub use window::FOCUSED_WINDOW_TITLE;
pub use window::ViewServerInfo;
pub use window::Window;

pub type Result<T> = std::result::Result<T, ClientError>;
