use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use tracing::warn;
use viewserver_common::Colors;
use viewserver_core::ViewTree;
use viewserver_ipc::CHANGE_NOTIFICATION_PROTOCOL;
use viewserver_ipc::ClientError;
use viewserver_ipc::Device;
use viewserver_ipc::DeviceBridge;
use viewserver_ipc::DeviceSnapshot;
use viewserver_ipc::FOCUSED_WINDOW_HASH;
use viewserver_ipc::Window;
use viewserver_ipc::WindowChangeListener;
use viewserver_ipc::service;

use crate::adb::AdbDevice;
use crate::adb::list_adb_devices;
use crate::commands::OutputFormat;
use crate::dto::DumpDto;
use crate::dto::ViewNodeDto;
use crate::dto::WatchEvent;
use crate::dto::WatchEventDto;
use crate::dto::WindowDto;
use crate::dto::WindowListDto;
use crate::error::CliError;
use crate::presenter::Presenter;
use crate::presenter::create_presenter;
use crate::presenter::render_tree;

pub type HandlerResult = Result<(), Box<dyn std::error::Error>>;

const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(100);
const WATCH_RESTART_DELAY: Duration = Duration::from_secs(1);
const WATCH_MAX_RESTARTS: u32 = 3;
/// A stream that stays up this long resets the restart count.
const WATCH_HEALTHY_PERIOD: Duration = Duration::from_secs(30);

pub struct HandlerContext {
    pub bridge: DeviceBridge,
    pub adb: PathBuf,
    pub serial: Option<String>,
    pub format: OutputFormat,
    presenter: Box<dyn Presenter>,
}

impl HandlerContext {
    pub fn new(
        bridge: DeviceBridge,
        adb: PathBuf,
        serial: Option<String>,
        format: OutputFormat,
    ) -> Self {
        Self {
            bridge,
            adb,
            serial,
            format,
            presenter: create_presenter(format),
        }
    }

    pub fn presenter(&self) -> &dyn Presenter {
        self.presenter.as_ref()
    }

    fn output_json_or<T, F>(&self, value: &T, text_fn: F) -> HandlerResult
    where
        T: Serialize,
        F: FnOnce(&dyn Presenter),
    {
        match self.format {
            OutputFormat::Json => self.presenter.present_value(&serde_json::to_value(value)?),
            OutputFormat::Text => text_fn(self.presenter()),
        }
        Ok(())
    }

    /// The device named by `--serial`, or the only online device.
    fn resolve_device(&self) -> Result<Arc<dyn Device>, CliError> {
        let devices = list_adb_devices(&self.adb)?;
        let entry = match &self.serial {
            Some(serial) => devices
                .into_iter()
                .find(|d| &d.serial == serial)
                .ok_or_else(|| CliError::DeviceNotFound(serial.clone()))?,
            None => {
                let mut online: Vec<_> = devices.into_iter().filter(|d| d.is_online()).collect();
                match online.len() {
                    0 => return Err(CliError::NoDevice),
                    1 => online.remove(0),
                    _ => {
                        return Err(CliError::MultipleDevices(
                            online.into_iter().map(|d| d.serial).collect(),
                        ));
                    }
                }
            }
        };
        Ok(Arc::new(AdbDevice::new(&self.adb, &entry)))
    }

    fn connect(&self) -> Result<DeviceSnapshot, Box<dyn std::error::Error>> {
        let device = self.resolve_device()?;
        Ok(self.bridge.device_connected(&device)?)
    }
}

/// Parses a window argument: hex hash code, optionally `0x`-prefixed, or
/// `focused`.
pub fn parse_window_arg(arg: &str) -> Result<Option<i32>, CliError> {
    if arg.eq_ignore_ascii_case("focused") {
        return Ok(None);
    }
    let hex = arg
        .strip_prefix("0x")
        .or_else(|| arg.strip_prefix("0X"))
        .unwrap_or(arg);
    if hex.is_empty() || hex.len() > 16 {
        return Err(CliError::InvalidWindow(arg.to_string()));
    }
    u64::from_str_radix(hex, 16)
        .map(|id| Some(id as u32 as i32))
        .map_err(|_| CliError::InvalidWindow(arg.to_string()))
}

/// Picks the listed window for `arg`, or builds one for an unlisted hash.
pub fn resolve_window(snapshot: &DeviceSnapshot, arg: &str) -> Result<Window, CliError> {
    let hash_code = match parse_window_arg(arg)? {
        Some(hash_code) => hash_code,
        None => match snapshot.focused_window {
            Some(hash_code) if hash_code != FOCUSED_WINDOW_HASH => hash_code,
            _ => return Ok(Window::focused(&snapshot.serial)),
        },
    };
    Ok(snapshot
        .windows
        .iter()
        .find(|w| w.hash_code() == hash_code)
        .cloned()
        .unwrap_or_else(|| Window::new(&snapshot.serial, arg, hash_code)))
}

pub fn handle_devices(ctx: &HandlerContext) -> HandlerResult {
    let devices = list_adb_devices(&ctx.adb).map_err(CliError::from)?;
    ctx.output_json_or(&devices, |p| {
        if devices.is_empty() {
            p.present_info("No devices attached");
            return;
        }
        p.present_list_header("Attached devices:");
        for device in &devices {
            let state = if device.is_online() {
                Colors::success(&device.state)
            } else {
                Colors::warning(&device.state)
            };
            p.present_list_item(&format!("{}  {}", Colors::bold(&device.serial), state));
        }
    })
}

pub fn handle_server_status(ctx: &HandlerContext) -> HandlerResult {
    let device = ctx.resolve_device()?;
    let running = service::is_view_server_running(device.as_ref());
    let status = serde_json::json!({
        "device": device.serial_number(),
        "running": running,
    });
    ctx.output_json_or(&status, |p| {
        let state = if running {
            Colors::success("running")
        } else {
            Colors::error("not running")
        };
        p.present_raw(&format!("View server on {}: {}", device.serial_number(), state));
    })
}

pub fn handle_server_start(ctx: &HandlerContext, port: u16) -> HandlerResult {
    let device = ctx.resolve_device()?;
    let serial = device.serial_number();
    if !service::start_view_server(device.as_ref(), port) {
        return Err(ClientError::ServerUnavailable(serial.to_string()).into());
    }
    ctx.presenter()
        .present_success(&format!("View server started on {} (port {})", serial, port), None);
    Ok(())
}

pub fn handle_server_stop(ctx: &HandlerContext) -> HandlerResult {
    let device = ctx.resolve_device()?;
    let serial = device.serial_number();
    if service::stop_view_server(device.as_ref()) {
        ctx.presenter()
            .present_success(&format!("View server stopped on {}", serial), None);
    } else {
        ctx.presenter()
            .present_info(&format!("View server on {} was not running", serial));
    }
    Ok(())
}

pub fn handle_windows(ctx: &HandlerContext) -> HandlerResult {
    let snapshot = ctx.connect()?;
    let dto = WindowListDto {
        device: snapshot.serial.clone(),
        server: snapshot.info,
        windows: snapshot.windows.iter().map(WindowDto::from).collect(),
        focused_window: snapshot
            .focused_window
            .filter(|h| *h != FOCUSED_WINDOW_HASH)
            .map(viewserver_ipc::protocol::encode_hash),
    };
    ctx.output_json_or(&dto, |p| {
        p.present_list_header(&format!(
            "Windows on {} (server v{}, protocol v{}):",
            snapshot.serial, snapshot.info.server_version, snapshot.info.protocol_version
        ));
        for window in &snapshot.windows {
            let marker = if snapshot.focused_window == Some(window.hash_code())
                && !window.is_focused_sentinel()
            {
                Colors::info(" (focused)")
            } else {
                String::new()
            };
            p.present_list_item(&format!(
                "{:>8}  {}{}",
                Colors::window_id(&window.encode()),
                window.title(),
                marker
            ));
        }
    })
}

pub fn handle_focus(ctx: &HandlerContext) -> HandlerResult {
    let snapshot = ctx.connect()?;
    let Some(hash_code) = snapshot.focused_window else {
        return Err(ClientError::Unsupported {
            feature: "focus queries",
            protocol_version: snapshot.info.protocol_version,
            required: CHANGE_NOTIFICATION_PROTOCOL,
        }
        .into());
    };
    if hash_code == FOCUSED_WINDOW_HASH {
        ctx.presenter().present_info("No window has focus");
        return Ok(());
    }
    let window = resolve_window(&snapshot, &viewserver_ipc::protocol::encode_hash(hash_code))?;
    let dto = WindowDto::from(&window);
    ctx.output_json_or(&dto, |p| {
        p.present_raw(&format!(
            "{}  {}",
            Colors::window_id(&window.encode()),
            window.title()
        ));
    })
}

fn load_tree(
    ctx: &HandlerContext,
    window: &Window,
    profile: bool,
) -> Result<(ViewTree, bool), Box<dyn std::error::Error>> {
    let loaded = if profile {
        ctx.bridge
            .load_view_tree(window)?
            .map(|loaded| (loaded.tree, loaded.profiled))
    } else {
        ctx.bridge.client().dump_window(window)?.map(|mut tree| {
            tree.set_view_count();
            (tree, false)
        })
    };
    loaded.ok_or_else(|| CliError::EmptyWindow(window.encode()).into())
}

pub fn handle_dump(
    ctx: &HandlerContext,
    window: String,
    profile: bool,
    filter: Option<String>,
) -> HandlerResult {
    parse_window_arg(&window)?;
    let snapshot = ctx.connect()?;
    let window = resolve_window(&snapshot, &window)?;
    let (mut tree, profiled) = load_tree(ctx, &window, profile)?;
    if let Some(filter) = &filter {
        tree.filter(filter);
    }
    present_tree(ctx, &snapshot.serial, &window, &tree, profiled, true)?;
    if profile && !profiled {
        warn!(window = %window.encode(), "No profiling data returned");
    }
    Ok(())
}

pub fn handle_profile(ctx: &HandlerContext, window: String) -> HandlerResult {
    parse_window_arg(&window)?;
    let snapshot = ctx.connect()?;
    let window = resolve_window(&snapshot, &window)?;
    let (tree, profiled) = load_tree(ctx, &window, true)?;
    if !profiled {
        ctx.presenter()
            .present_error("The device returned no profiling data for this window");
    }
    present_tree(ctx, &snapshot.serial, &window, &tree, profiled, false)
}

fn present_tree(
    ctx: &HandlerContext,
    serial: &str,
    window: &Window,
    tree: &ViewTree,
    profiled: bool,
    with_properties: bool,
) -> HandlerResult {
    let dto = DumpDto {
        device: serial.to_string(),
        window: WindowDto::from(window),
        profiled,
        root: ViewNodeDto::from_tree(tree, tree.root(), with_properties),
    };
    ctx.output_json_or(&dto, |p| {
        for line in render_tree(tree, profiled) {
            p.present_raw(&line);
        }
    })
}

#[derive(Debug, Clone, Copy)]
pub enum NodeAction {
    Invalidate,
    RequestLayout,
}

pub fn handle_node_command(
    ctx: &HandlerContext,
    action: NodeAction,
    window: String,
    node: String,
) -> HandlerResult {
    parse_window_arg(&window)?;
    let snapshot = ctx.connect()?;
    let window = resolve_window(&snapshot, &window)?;
    let tree = ctx
        .bridge
        .client()
        .dump_window(&window)?
        .ok_or_else(|| CliError::EmptyWindow(window.encode()))?;
    let node_id = tree
        .find_by_hash(&node)
        .ok_or_else(|| CliError::NodeNotFound(node.clone()))?;
    let target = tree.node(node_id);

    let verb = match action {
        NodeAction::Invalidate => {
            ctx.bridge.client().invalidate_view(&window, target)?;
            "Invalidated"
        }
        NodeAction::RequestLayout => {
            ctx.bridge.client().request_layout(&window, target)?;
            "Requested layout of"
        }
    };
    ctx.presenter()
        .present_success(&format!("{} {}", verb, target), None);
    Ok(())
}

/// Prints one line per notification, as text or NDJSON.
struct EventPrinter {
    format: OutputFormat,
}

impl EventPrinter {
    fn print(&self, event: WatchEvent, device: &str) {
        let line = match self.format {
            OutputFormat::Json => {
                serde_json::to_string(&WatchEventDto { event, device }).unwrap_or_default()
            }
            OutputFormat::Text => match event {
                WatchEvent::WindowsChanged => format!("windows-changed {}", device),
                WatchEvent::FocusChanged => format!("focus-changed {}", device),
            },
        };
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", line);
        let _ = stdout.flush();
    }
}

impl WindowChangeListener for EventPrinter {
    fn windows_changed(&self, device: &str) {
        self.print(WatchEvent::WindowsChanged, device);
    }

    fn focus_changed(&self, device: &str) {
        self.print(WatchEvent::FocusChanged, device);
    }
}

/// Bounds how often a dying change stream is restarted before giving up.
struct RestartBudget {
    max_attempts: u32,
    healthy_after: Duration,
    attempts: u32,
    last_restart: Option<Instant>,
}

impl RestartBudget {
    fn new(max_attempts: u32, healthy_after: Duration) -> Self {
        Self {
            max_attempts,
            healthy_after,
            attempts: 0,
            last_restart: None,
        }
    }

    /// Records a lost stream at `now`. Returns `false` once the budget is spent.
    fn try_restart(&mut self, now: Instant) -> bool {
        if self
            .last_restart
            .is_some_and(|at| now.duration_since(at) >= self.healthy_after)
        {
            self.attempts = 0;
        }
        if self.attempts >= self.max_attempts {
            return false;
        }
        self.attempts += 1;
        self.last_restart = Some(now);
        true
    }
}

pub fn handle_watch(ctx: &HandlerContext) -> HandlerResult {
    let snapshot = ctx.connect()?;
    let serial = snapshot.serial.as_str();
    let shutdown = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    crate::signal::install(Arc::clone(&shutdown))?;

    let id = ctx
        .bridge
        .watch(serial, Arc::new(EventPrinter { format: ctx.format }))?;
    if ctx.format == OutputFormat::Text {
        eprintln!(
            "{}",
            Colors::dim(&format!("Watching {} (Ctrl-C to stop)", serial))
        );
    }

    let notifier = ctx.bridge.notifier();
    let mut budget = RestartBudget::new(WATCH_MAX_RESTARTS, WATCH_HEALTHY_PERIOD);
    let mut outcome: HandlerResult = Ok(());
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(WATCH_POLL_INTERVAL);
        if notifier.is_listening(serial) {
            continue;
        }
        if !budget.try_restart(Instant::now()) {
            outcome = Err(CliError::StreamLost {
                serial: serial.to_string(),
                attempts: WATCH_MAX_RESTARTS,
            }
            .into());
            break;
        }
        warn!(
            device = serial,
            attempt = budget.attempts,
            "Change stream ended, reconnecting"
        );
        std::thread::sleep(WATCH_RESTART_DELAY);
        if let Err(e) = notifier.restart(serial) {
            warn!(device = serial, error = %e, "Failed to restart change stream");
        }
    }

    ctx.bridge.unwatch(serial, id);
    outcome
}
