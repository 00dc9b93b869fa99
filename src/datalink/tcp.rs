//! TCP streaming transport.
//!
//! The reception thread performs blocking reads with a short timeout so it
//! can observe a `running` flag, keeps an `Option<JoinHandle<_>>` joined on
//! stop, and a `Drop` impl stops the thread before releasing anything else.
//! A dropped connection is handed off to the reconnect supervisor, which
//! retries with capped exponential backoff.

use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use socket2::{Domain, Socket, TcpKeepalive, Type};

use crate::config::TcpLinkConfig;
use crate::control::{ControlChannel, DeviceCommands};
use crate::error::{Error, Result};
use crate::handle::DeviceHandle;
use crate::reconnect::ReconnectSupervisor;
use crate::scan::Scan;

use super::{DataLink, DataLinkCore};

const RECEPTION_BUFFER_SIZE: usize = 4096;
const SOCKET_READ_TIMEOUT: Duration = Duration::from_millis(200);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// A TCP streaming session: negotiates a handle, maintains a reconnecting
/// socket, and republishes complete scans through [`super::DataLinkCore`].
pub struct TcpLink {
    core: Arc<DataLinkCore>,
    running: Arc<AtomicBool>,
    reception_thread: Mutex<Option<JoinHandle<()>>>,
    reconnect: Arc<Mutex<Option<ReconnectSupervisor>>>,
}

impl super::private::Sealed for TcpLink {}

impl TcpLink {
    /// Request a TCP handle, start scanning, and spawn the reception and
    /// watchdog threads. The reconnect supervisor is not spawned here; it
    /// is spawned automatically by the reception thread the first time the
    /// connection drops, and re-spawned the same way on every subsequent
    /// drop for as long as the link is alive.
    pub fn connect(channel: Arc<dyn ControlChannel>, config: TcpLinkConfig) -> Result<Self> {
        let commands = DeviceCommands::new(channel.as_ref());
        let watchdog_enabled = if config.watchdog.enabled { "1" } else { "0" };
        let watchdog_timeout_ms = config.watchdog.timeout.as_millis().to_string();
        let start_angle = config.start_angle.to_string();
        let packet_type = match config.packet_type {
            crate::header::PacketType::A => "A",
            crate::header::PacketType::B => "B",
            crate::header::PacketType::C => "C",
        };
        let params = [
            ("watchdog", watchdog_enabled),
            ("watchdogtimeout", watchdog_timeout_ms.as_str()),
            ("startangle", start_angle.as_str()),
            ("packettype", packet_type),
        ];
        let (handle_str, port) = commands.request_tcp_handle(&params)?;
        let handle = DeviceHandle::new(
            handle_str.clone(),
            config.device_address,
            port,
            config.watchdog.enabled,
            config.watchdog.timeout,
        );

        if let Err(err) = commands.start_scan(&handle_str) {
            let _ = commands.release_handle(&handle_str);
            return Err(Error::FatalSetup(err.to_string()));
        }

        let core = Arc::new(DataLinkCore::new(handle, Arc::clone(&channel)));
        core.alive.store(true, Ordering::Release);
        core.start_watchdog_if_enabled();

        let running = Arc::new(AtomicBool::new(true));
        let reconnect: Arc<Mutex<Option<ReconnectSupervisor>>> = Arc::new(Mutex::new(None));
        let target = SocketAddr::new(config.device_address, port);

        let reception_thread = {
            let core = Arc::clone(&core);
            let running = Arc::clone(&running);
            let reconnect = Arc::clone(&reconnect);
            Some(thread::spawn(move || reception_loop(core, running, reconnect, target)))
        };

        let link = Self {
            core,
            running,
            reception_thread: Mutex::new(reception_thread),
            reconnect,
        };
        Ok(link)
    }
}

fn try_connect_once(target: SocketAddr) -> std::io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(target), Type::STREAM, None)?;
    socket.set_nodelay(true)?;
    socket.set_keepalive(true)?;
    let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(30));
    let _ = socket.set_tcp_keepalive(&keepalive);
    socket.connect_timeout(&target.into(), CONNECT_TIMEOUT)?;
    socket.set_read_timeout(Some(SOCKET_READ_TIMEOUT))?;
    Ok(socket.into())
}

/// Spawn a [`ReconnectSupervisor`] that retries `target` with capped
/// exponential backoff and, on success, starts a fresh reception thread on
/// the new stream. A no-op if the link is already being torn down.
fn spawn_reconnect_supervisor(
    core: Arc<DataLinkCore>,
    running: Arc<AtomicBool>,
    reconnect: Arc<Mutex<Option<ReconnectSupervisor>>>,
    target: SocketAddr,
) {
    if !running.load(Ordering::Acquire) {
        return;
    }
    let supervisor = {
        let core = Arc::clone(&core);
        let running = Arc::clone(&running);
        let reconnect = Arc::clone(&reconnect);
        ReconnectSupervisor::spawn(move || {
            if !running.load(Ordering::Acquire) {
                return true; // stop retrying; link is being torn down
            }
            match try_connect_once(target) {
                Ok(stream) => {
                    core.alive.store(true, Ordering::Release);
                    let core = Arc::clone(&core);
                    let running = Arc::clone(&running);
                    let reconnect = Arc::clone(&reconnect);
                    thread::spawn(move || {
                        reception_loop_on_stream(core, running, reconnect, target, stream)
                    });
                    true
                }
                Err(err) => {
                    log::warn!("tcp reconnect attempt failed: {err}");
                    false
                }
            }
        })
    };
    *reconnect.lock() = Some(supervisor);
}

fn reception_loop(
    core: Arc<DataLinkCore>,
    running: Arc<AtomicBool>,
    reconnect: Arc<Mutex<Option<ReconnectSupervisor>>>,
    target: SocketAddr,
) {
    let stream = match try_connect_once(target) {
        Ok(stream) => stream,
        Err(err) => {
            log::error!("initial tcp connect failed: {err}");
            core.alive.store(false, Ordering::Release);
            spawn_reconnect_supervisor(core, running, reconnect, target);
            return;
        }
    };
    reception_loop_on_stream(core, running, reconnect, target, stream);
}

fn reception_loop_on_stream(
    core: Arc<DataLinkCore>,
    running: Arc<AtomicBool>,
    reconnect: Arc<Mutex<Option<ReconnectSupervisor>>>,
    target: SocketAddr,
    mut stream: TcpStream,
) {
    let mut buf = vec![0u8; RECEPTION_BUFFER_SIZE];

    while running.load(Ordering::Acquire) {
        match stream.read(&mut buf) {
            Ok(0) => {
                // Peer closed the connection (eof). The device re-issues
                // headers on reconnect, so this is not a fatal error on
                // its own; let the caller decide whether to reconnect.
                log::debug!("tcp stream reached eof");
                break;
            }
            Ok(n) => {
                let needed = core.on_bytes_received(&buf[..n]);
                // Grow the read buffer to fit the next packet the
                // extractor told us about, capped to avoid unbounded
                // growth on a misbehaving peer.
                if needed > buf.len() && needed <= 8 * RECEPTION_BUFFER_SIZE {
                    buf.resize(needed, 0);
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                log::warn!("tcp read error: {e}");
                break;
            }
        }
    }

    if running.load(Ordering::Acquire) {
        core.alive.store(false, Ordering::Release);
        spawn_reconnect_supervisor(core, running, reconnect, target);
    }
}

impl DataLink for TcpLink {
    fn is_alive(&self) -> bool {
        self.core.alive.load(Ordering::Acquire)
    }

    fn is_stalled(&self) -> bool {
        self.core.is_stalled(self.core.staleness_threshold())
    }

    fn add_on_new_scan_available(&self, callback: impl Fn(&Scan) + Send + 'static) {
        self.core.callbacks.lock().push(Box::new(callback));
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.reconnect.lock().take();
        if let Some(thread) = self.reception_thread.lock().take() {
            let _ = thread.join();
        }
        self.core.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Tree;
    use std::net::{IpAddr, Ipv4Addr, TcpListener};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct StubChannel {
        port: u16,
        calls: AtomicUsize,
    }

    impl ControlChannel for StubChannel {
        fn send_command(&self, name: &'static str, _params: &[(&str, &str)]) -> Result<Tree> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match name {
                "request_tcp_handle" => Ok(serde_json::json!({
                    "error_code": 0, "handle": "h1", "port": self.port,
                })),
                _ => Ok(serde_json::json!({"error_code": 0})),
            }
        }
    }

    #[test]
    fn connect_streams_a_complete_scan() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            use crate::header::{HeaderBuilder, PacketType};
            let (mut stream, _) = listener.accept().unwrap();
            let header = HeaderBuilder::new(PacketType::C, 1, 1)
                .num_points_scan(1)
                .num_points_packet(1)
                .build();
            let mut buf = vec![0u8; header.header_size as usize];
            header.encode(&mut buf);
            buf.extend_from_slice(&[5, 0, 50, 0]);
            use std::io::Write;
            let _ = stream.write_all(&buf);
            thread::sleep(Duration::from_millis(200));
        });

        let channel: Arc<dyn ControlChannel> = Arc::new(StubChannel {
            port,
            calls: AtomicUsize::new(0),
        });
        let config = TcpLinkConfig {
            device_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            packet_type: crate::header::PacketType::C,
            start_angle: 0,
            watchdog: crate::config::WatchdogConfig::disabled(),
        };

        let link = TcpLink::connect(channel, config).expect("connect succeeds");
        assert!(link.is_alive());

        let handoff_check_start = Instant::now();
        let mut seen = None;
        while handoff_check_start.elapsed() < Duration::from_secs(2) {
            if let Some(scan) = link.core.handoff.latest() {
                seen = Some(scan);
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        let scan = seen.expect("scan published within timeout");
        assert_eq!(scan.distances(), &[5]);

        drop(link);
        server.join().unwrap();
    }

    fn write_scan(stream: &mut TcpStream, scan_number: u16, distance: u16) {
        use crate::header::{HeaderBuilder, PacketType};
        use std::io::Write;
        let header = HeaderBuilder::new(PacketType::C, scan_number, 1)
            .num_points_scan(1)
            .num_points_packet(1)
            .build();
        let mut buf = vec![0u8; header.header_size as usize];
        header.encode(&mut buf);
        buf.extend_from_slice(&distance.to_le_bytes());
        buf.extend_from_slice(&50u16.to_le_bytes());
        let _ = stream.write_all(&buf);
    }

    #[test]
    fn reconnects_automatically_without_enable_call() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut first, _) = listener.accept().unwrap();
            write_scan(&mut first, 1, 11);
            thread::sleep(Duration::from_millis(50));
            drop(first); // unexpected disconnect; nothing tells the link to stop

            let (mut second, _) = listener.accept().unwrap();
            write_scan(&mut second, 2, 22);
            thread::sleep(Duration::from_millis(300));
        });

        let channel: Arc<dyn ControlChannel> = Arc::new(StubChannel {
            port,
            calls: AtomicUsize::new(0),
        });
        let config = TcpLinkConfig {
            device_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            packet_type: crate::header::PacketType::C,
            start_angle: 0,
            watchdog: crate::config::WatchdogConfig::disabled(),
        };

        // No call to any "enable reconnect" method: reconnection after the
        // first connection drops must happen on its own.
        let link = TcpLink::connect(channel, config).expect("connect succeeds");

        let start = Instant::now();
        let mut last_distance = None;
        while start.elapsed() < Duration::from_secs(5) {
            if let Some(scan) = link.core.handoff.latest() {
                if scan.distances() == [22] {
                    last_distance = Some(22);
                    break;
                }
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(
            last_distance,
            Some(22),
            "expected the second scan to arrive after an automatic reconnect"
        );

        drop(link);
        server.join().unwrap();
    }
}
