use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::net::Shutdown;
use std::net::SocketAddr;
use std::net::TcpStream;

use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::forward::PortForwardingTable;

/// One TCP session with a device's view server, reached through its forward.
///
/// Reads block for at most the configured read timeout. The socket is closed
/// on [`close`](Connection::close) or drop, whichever comes first.
pub struct Connection {
    port: u16,
    reader: Option<BufReader<TcpStream>>,
    writer: Option<TcpStream>,
    /// Bytes of a line interrupted by a read timeout.
    partial: String,
}

impl Connection {
    pub fn open(
        forwards: &PortForwardingTable,
        serial: &str,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let port = forwards.local_port(serial)?;
        Self::connect(SocketAddr::new(config.host, port), config)
    }

    pub fn connect(addr: SocketAddr, config: &ClientConfig) -> Result<Self, ClientError> {
        let port = addr.port();
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)
            .map_err(|source| ClientError::Connect { port, source })?;
        stream.set_read_timeout(Some(config.read_timeout))?;
        let writer = stream.try_clone()?;
        debug!(port, "Connected to view server");
        Ok(Self {
            port,
            reader: Some(BufReader::new(stream)),
            writer: Some(writer),
            partial: String::new(),
        })
    }

    pub fn local_port(&self) -> u16 {
        self.port
    }

    /// Writes `command` followed by a newline and flushes.
    pub fn send_command(&mut self, command: &str) -> Result<(), ClientError> {
        let writer = self.writer.as_mut().ok_or(ClientError::Closed)?;
        debug!(port = self.port, command, "Sending command");
        writer
            .write_all(command.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush())
            .map_err(ClientError::from_io)
    }

    /// Reads the next line without its terminator. `Ok(None)` is end of stream.
    pub fn read_line(&mut self) -> Result<Option<String>, ClientError> {
        let reader = self.reader.as_mut().ok_or(ClientError::Closed)?;
        match reader.read_line(&mut self.partial) {
            Ok(0) if self.partial.is_empty() => Ok(None),
            Ok(_) => {
                let mut line = std::mem::take(&mut self.partial);
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Ok(Some(line))
            }
            Err(e) => Err(ClientError::from_io(e)),
        }
    }

    /// A handle that can abort a read blocked on this connection from
    /// another thread.
    pub fn canceller(&self) -> Result<ConnectionCanceller, ClientError> {
        let writer = self.writer.as_ref().ok_or(ClientError::Closed)?;
        Ok(ConnectionCanceller {
            stream: writer.try_clone()?,
        })
    }

    /// Shuts down both directions. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.get_ref().shutdown(Shutdown::Read) {
                debug!(port = self.port, error = %e, "Failed to shut down read side");
            }
        }
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.shutdown(Shutdown::Write) {
                debug!(port = self.port, error = %e, "Failed to shut down write side");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Aborts a blocked [`Connection::read_line`]: the read returns end of stream
/// or an error.
pub struct ConnectionCanceller {
    stream: TcpStream,
}

impl ConnectionCanceller {
    pub fn cancel(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(error = %e, "Connection already shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;
    use std::time::Instant;

    fn config() -> ClientConfig {
        ClientConfig::default()
            .with_connect_timeout(Duration::from_secs(2))
            .with_read_timeout(Duration::from_secs(2))
    }

    #[test]
    fn test_send_and_read_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut command = String::new();
            reader.read_line(&mut command).unwrap();
            stream.write_all(b"first\r\nsecond\nlast").unwrap();
            command
        });

        let mut conn = Connection::connect(addr, &config()).unwrap();
        conn.send_command("LIST").unwrap();
        assert_eq!(conn.read_line().unwrap().as_deref(), Some("first"));
        assert_eq!(conn.read_line().unwrap().as_deref(), Some("second"));
        assert_eq!(conn.read_line().unwrap().as_deref(), Some("last"));
        assert_eq!(conn.read_line().unwrap(), None);
        assert_eq!(server.join().unwrap(), "LIST\n");
    }

    #[test]
    fn test_read_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 16];
            let _ = stream.read(&mut buf);
        });

        let config = config().with_read_timeout(Duration::from_millis(100));
        let mut conn = Connection::connect(addr, &config).unwrap();
        assert!(matches!(conn.read_line(), Err(ClientError::Timeout)));
        conn.close();
        server.join().unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut conn = Connection::connect(addr, &config()).unwrap();
        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert!(matches!(conn.send_command("LIST"), Err(ClientError::Closed)));
        assert!(matches!(conn.read_line(), Err(ClientError::Closed)));
    }

    #[test]
    fn test_canceller_unblocks_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let config = config().with_read_timeout(Duration::from_secs(30));
        let mut conn = Connection::connect(addr, &config).unwrap();
        let (_held, _) = listener.accept().unwrap();
        let canceller = conn.canceller().unwrap();

        let started = Instant::now();
        let reader = thread::spawn(move || conn.read_line());
        thread::sleep(Duration::from_millis(100));
        canceller.cancel();

        let result = reader.join().unwrap();
        assert!(matches!(result, Ok(None) | Err(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(matches!(
            Connection::connect(addr, &config()),
            Err(ClientError::Connect { port, .. }) if port == addr.port()
        ));
    }
}
