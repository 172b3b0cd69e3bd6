mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeResponse;
use common::FakeViewServer;
use common::SERIAL;
use viewserver_core::ProfileRating;
use viewserver_ipc::ClientError;
use viewserver_ipc::Device;
use viewserver_ipc::DeviceBridge;
use viewserver_ipc::MockDevice;
use viewserver_ipc::MockSleeper;
use viewserver_ipc::ViewServerInfo;
use viewserver_ipc::WindowChangeListener;
use viewserver_ipc::service;

const TRUE_PARCEL: &str = "Result: Parcel(00000000 00000001   '........')";
const FALSE_PARCEL: &str = "Result: Parcel(00000000 00000000   '........')";

struct Setup {
    bridge: DeviceBridge,
    sleeper: Arc<MockSleeper>,
    mock: MockDevice,
    device: Arc<dyn Device>,
}

fn setup(server: &FakeViewServer) -> Setup {
    let sleeper = Arc::new(MockSleeper::new());
    let config = server
        .config()
        .with_start_retry_delay(Duration::from_secs(2));
    let bridge = DeviceBridge::with_sleeper(config, sleeper.clone());
    let mock = MockDevice::new(SERIAL);
    let device: Arc<dyn Device> = Arc::new(mock.clone());
    Setup {
        bridge,
        sleeper,
        mock,
        device,
    }
}

fn serve_windows(server: &FakeViewServer) {
    server.respond(
        "LIST",
        FakeResponse::lines(&["1a2b3c MyWindow", "4d5e6f StatusBar", "DONE."]),
    );
    server.respond("GET_FOCUS", FakeResponse::lines(&["1a2b3c MyWindow"]));
}

#[test]
fn test_device_connected_with_running_server() {
    let server = FakeViewServer::with_versions(4, 3);
    serve_windows(&server);
    let s = setup(&server);
    s.mock
        .set_shell_response(&service::is_server_running_command(), TRUE_PARCEL);

    let snapshot = s.bridge.device_connected(&s.device).unwrap();
    assert_eq!(snapshot.serial, SERIAL);
    assert_eq!(snapshot.info, ViewServerInfo::new(4, 3));
    assert_eq!(snapshot.windows.len(), 2);
    assert_eq!(snapshot.windows[0].title(), "StatusBar");
    assert_eq!(snapshot.focused_window, Some(0x1a2b3c));

    assert_eq!(s.mock.active_forwards(), vec![(server.port(), 4939)]);
    assert_eq!(s.mock.shell_call_count(&service::start_server_command(4939)), 0);
    assert_eq!(s.sleeper.call_count(), 0);
}

#[test]
fn test_device_connected_retries_server_start() {
    let server = FakeViewServer::with_versions(2, 2);
    serve_windows(&server);
    let s = setup(&server);
    let start = service::start_server_command(4939);
    s.mock.push_shell_response(&start, FALSE_PARCEL);
    s.mock.set_shell_response(&start, TRUE_PARCEL);

    let snapshot = s.bridge.device_connected(&s.device).unwrap();
    assert_eq!(s.mock.shell_call_count(&start), 2);
    assert_eq!(s.sleeper.durations(), vec![Duration::from_secs(2)]);
    assert_eq!(snapshot.focused_window, None);
    assert!(snapshot.windows.last().unwrap().is_focused_sentinel());
    assert_eq!(server.command_count("GET_FOCUS"), 0);
}

#[test]
fn test_device_connected_gives_up_after_two_starts() {
    let server = FakeViewServer::with_versions(4, 3);
    let s = setup(&server);

    let err = s.bridge.device_connected(&s.device).unwrap_err();
    assert!(matches!(err, ClientError::ServerUnavailable(ref serial) if serial == SERIAL));
    assert_eq!(
        s.mock.shell_call_count(&service::start_server_command(4939)),
        2
    );
    assert!(s.mock.active_forwards().is_empty());
    assert!(s.bridge.forwards().forwarded_devices().is_empty());
    assert!(server.commands().is_empty());
}

#[test]
fn test_device_connected_offline() {
    let server = FakeViewServer::with_versions(4, 3);
    let s = setup(&server);
    s.mock.set_online(false);
    assert!(s.bridge.device_connected(&s.device).is_err());
    assert!(s.mock.shell_calls().is_empty());
}

struct Ignore;

impl WindowChangeListener for Ignore {
    fn windows_changed(&self, _device: &str) {}
    fn focus_changed(&self, _device: &str) {}
}

#[test]
fn test_watch_requires_protocol_3() {
    let server = FakeViewServer::with_versions(2, 2);
    serve_windows(&server);
    server.respond("AUTOLIST", FakeResponse::Subscribe);
    let s = setup(&server);
    s.mock
        .set_shell_response(&service::is_server_running_command(), TRUE_PARCEL);
    s.bridge.device_connected(&s.device).unwrap();

    let err = s.bridge.watch(SERIAL, Arc::new(Ignore)).unwrap_err();
    assert!(matches!(
        err,
        ClientError::Unsupported {
            protocol_version: 2,
            required: 3,
            ..
        }
    ));
    assert_eq!(server.command_count("AUTOLIST"), 0);
}

#[test]
fn test_watch_and_disconnect() {
    let server = FakeViewServer::with_versions(4, 3);
    serve_windows(&server);
    server.respond("AUTOLIST", FakeResponse::Subscribe);
    let s = setup(&server);
    s.mock
        .set_shell_response(&service::is_server_running_command(), TRUE_PARCEL);
    s.bridge.device_connected(&s.device).unwrap();

    s.bridge.watch(SERIAL, Arc::new(Ignore)).unwrap();
    assert!(common::wait_until(|| server.subscriptions_opened() == 1));
    assert!(s.bridge.notifier().is_listening(SERIAL));

    s.bridge.device_disconnected(SERIAL);
    assert!(!s.bridge.notifier().is_listening(SERIAL));
    assert!(s.bridge.client().cached_server_info(SERIAL).is_none());
    assert!(s.mock.active_forwards().is_empty());
    assert!(common::wait_until(|| server.subscriptions_closed() == 1));
}

#[test]
fn test_load_view_tree_counts_and_rates() {
    let server = FakeViewServer::start();
    server.respond(
        "DUMP",
        FakeResponse::lines(&[
            "android.widget.LinearLayout@10 mID=7,id/list",
            " android.widget.TextView@11 mID=5,NO_ID",
            " android.widget.ImageView@12 mID=5,NO_ID",
            "  android.view.View@13 mID=5,NO_ID",
            "DONE.",
        ]),
    );
    server.respond(
        "PROFILE",
        FakeResponse::lines(&[
            "0 0 0",
            "9000000 1000000 4000000",
            "1000000 1000000 6000000",
            "1000 1000 1000",
        ]),
    );
    let s = setup(&server);
    s.bridge.forwards().ensure_forward(&s.device).unwrap();
    let window = viewserver_ipc::Window::new(SERIAL, "List", 0x99);

    let loaded = s.bridge.load_view_tree(&window).unwrap().unwrap();
    assert!(loaded.profiled);
    let tree = &loaded.tree;
    let root = tree.node(tree.root());
    assert_eq!(root.view_count, 4);

    let text = tree.node(root.children()[0]);
    let image = tree.node(root.children()[1]);
    assert_eq!(image.view_count, 2);
    assert_eq!(text.measure_rating, ProfileRating::Red);
    assert_eq!(image.measure_rating, ProfileRating::Green);
    assert_eq!(text.layout_rating, ProfileRating::Yellow);
    assert_eq!(image.draw_rating, ProfileRating::Yellow);
    assert_eq!(root.measure_rating, ProfileRating::None);
}

#[test]
fn test_load_view_tree_without_profile() {
    let server = FakeViewServer::start();
    server.respond(
        "DUMP",
        FakeResponse::lines(&["a.Root@1 mID=5,NO_ID", " a.Leaf@2 mID=5,NO_ID", "DONE."]),
    );
    server.respond("PROFILE", FakeResponse::lines(&["-1 -1 -1"]));
    let s = setup(&server);
    s.bridge.forwards().ensure_forward(&s.device).unwrap();
    let window = viewserver_ipc::Window::new(SERIAL, "W", 0x5);

    let loaded = s.bridge.load_view_tree(&window).unwrap().unwrap();
    assert!(!loaded.profiled);
    assert_eq!(loaded.tree.node(loaded.tree.root()).view_count, 2);
}

#[test]
fn test_refresh_windows_starts_server_once() {
    let server = FakeViewServer::with_versions(4, 3);
    serve_windows(&server);
    let s = setup(&server);
    let start = service::start_server_command(4939);

    assert!(matches!(
        s.bridge.refresh_windows(&s.device),
        Err(ClientError::ServerUnavailable(_))
    ));
    assert_eq!(s.mock.shell_call_count(&start), 1);
    assert_eq!(s.sleeper.call_count(), 0);

    s.mock.set_shell_response(&start, TRUE_PARCEL);
    assert_eq!(s.bridge.refresh_windows(&s.device).unwrap().len(), 2);
}
