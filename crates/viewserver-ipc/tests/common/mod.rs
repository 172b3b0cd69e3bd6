//! Scripted view server for integration tests.
//!
//! Listens on an ephemeral loopback port and answers each connection's single
//! command with the response registered for its keyword (`LIST`, `DUMP`, ...).
//! Commands are recorded for assertions. `AUTOLIST` connections stay open and
//! receive whatever the test pushes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Write;
use std::net::TcpListener;
use std::net::TcpStream;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use viewserver_ipc::ClientConfig;
use viewserver_ipc::Device;
use viewserver_ipc::MockDevice;
use viewserver_ipc::PortForwardingTable;

pub const SERIAL: &str = "emulator-5554";

#[derive(Debug, Clone)]
pub enum FakeResponse {
    /// Writes each line with a trailing newline, then closes.
    Lines(Vec<String>),
    /// Keeps the connection open until the client closes it.
    Hang,
    /// Closes without answering.
    Disconnect,
    /// Keeps the connection open for [`FakeViewServer::push`].
    Subscribe,
}

impl FakeResponse {
    pub fn lines(lines: &[&str]) -> Self {
        FakeResponse::Lines(lines.iter().map(|l| l.to_string()).collect())
    }
}

#[derive(Default)]
struct Shared {
    responses: Mutex<HashMap<String, FakeResponse>>,
    commands: Mutex<Vec<String>>,
    subscribers: Mutex<Vec<TcpStream>>,
    subscriptions_opened: AtomicUsize,
    subscriptions_closed: AtomicUsize,
    stopped: AtomicBool,
}

pub struct FakeViewServer {
    port: u16,
    shared: Arc<Shared>,
}

impl FakeViewServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake view server");
        let port = listener.local_addr().expect("local addr").port();
        let shared = Arc::new(Shared::default());

        let accept_shared = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_shared.stopped.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                let shared = Arc::clone(&accept_shared);
                thread::spawn(move || serve(stream, shared));
            }
        });

        Self { port, shared }
    }

    /// A server answering `SERVER` and `PROTOCOL` with the given versions.
    pub fn with_versions(server_version: i32, protocol_version: i32) -> Self {
        let server = Self::start();
        server.respond("SERVER", FakeResponse::lines(&[&server_version.to_string()]));
        server.respond(
            "PROTOCOL",
            FakeResponse::lines(&[&protocol_version.to_string()]),
        );
        server
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn respond(&self, keyword: &str, response: FakeResponse) {
        self.shared
            .responses
            .lock()
            .unwrap()
            .insert(keyword.to_string(), response);
    }

    pub fn commands(&self) -> Vec<String> {
        self.shared.commands.lock().unwrap().clone()
    }

    pub fn command_count(&self, keyword: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| keyword_of(c) == keyword)
            .count()
    }

    /// Sends `line` to every open `AUTOLIST` connection.
    pub fn push(&self, line: &str) {
        let mut subscribers = self.shared.subscribers.lock().unwrap();
        subscribers.retain_mut(|stream| stream.write_all(format!("{}\n", line).as_bytes()).is_ok());
    }

    /// Closes every open `AUTOLIST` connection from the server side.
    pub fn drop_subscribers(&self) {
        for stream in self.shared.subscribers.lock().unwrap().drain(..) {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    pub fn subscriptions_opened(&self) -> usize {
        self.shared.subscriptions_opened.load(Ordering::SeqCst)
    }

    pub fn subscriptions_closed(&self) -> usize {
        self.shared.subscriptions_closed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_first_local_port(self.port)
            .with_connect_timeout(Duration::from_secs(2))
            .with_read_timeout(Duration::from_secs(2))
            .with_start_retry_delay(Duration::ZERO)
    }

    /// A forwarding table with [`SERIAL`] forwarded to this server.
    pub fn forwards(&self) -> (MockDevice, Arc<PortForwardingTable>) {
        let mock = MockDevice::new(SERIAL);
        let device: Arc<dyn Device> = Arc::new(mock.clone());
        let forwards = Arc::new(PortForwardingTable::from_config(&self.config()));
        forwards.ensure_forward(&device).expect("forward to fake server");
        (mock, forwards)
    }
}

impl Drop for FakeViewServer {
    fn drop(&mut self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.drop_subscribers();
        let _ = TcpStream::connect(("127.0.0.1", self.port));
    }
}

fn keyword_of(command: &str) -> &str {
    command.split(' ').next().unwrap_or_default()
}

fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut command = String::new();
    if reader.read_line(&mut command).unwrap_or(0) == 0 {
        return;
    }
    let command = command.trim_end().to_string();
    shared.commands.lock().unwrap().push(command.clone());

    let response = shared
        .responses
        .lock()
        .unwrap()
        .get(keyword_of(&command))
        .cloned()
        .unwrap_or(FakeResponse::Disconnect);

    let mut stream = stream;
    match response {
        FakeResponse::Lines(lines) => {
            for line in lines {
                if stream.write_all(format!("{}\n", line).as_bytes()).is_err() {
                    return;
                }
            }
        }
        FakeResponse::Disconnect => {}
        FakeResponse::Hang => wait_for_close(&mut reader),
        FakeResponse::Subscribe => {
            shared
                .subscribers
                .lock()
                .unwrap()
                .push(stream.try_clone().expect("clone stream"));
            shared.subscriptions_opened.fetch_add(1, Ordering::SeqCst);
            wait_for_close(&mut reader);
            shared.subscriptions_closed.fetch_add(1, Ordering::SeqCst);
        }
    }
    let _ = stream.shutdown(std::net::Shutdown::Both);
}

fn wait_for_close(reader: &mut BufReader<TcpStream>) {
    let mut buf = [0u8; 64];
    loop {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// Polls `condition` until it holds or five seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
