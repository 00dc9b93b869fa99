//! UDP streaming transport.
//!
//! Simpler than [`super::TcpLink`]: no reconnect supervisor (a datagram
//! socket has no connection to lose) and no buffer growth (each datagram
//! is consumed whole).

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use socket2::{Domain, Socket, Type};

use crate::config::UdpLinkConfig;
use crate::control::{ControlChannel, DeviceCommands};
use crate::error::{Error, Result};
use crate::handle::DeviceHandle;
use crate::scan::Scan;

use super::{DataLink, DataLinkCore};

const DATAGRAM_BUFFER_SIZE: usize = 1500;
const SOCKET_READ_TIMEOUT: Duration = Duration::from_millis(200);

pub struct UdpLink {
    core: Arc<DataLinkCore>,
    running: Arc<AtomicBool>,
    reception_thread: Mutex<Option<JoinHandle<()>>>,
}

impl super::private::Sealed for UdpLink {}

impl UdpLink {
    pub fn connect(channel: Arc<dyn ControlChannel>, config: UdpLinkConfig) -> Result<Self> {
        let commands = DeviceCommands::new(channel.as_ref());
        let address = config.listener_address.to_string();
        let port_str = config.listener_port.to_string();
        let watchdog_enabled = if config.watchdog.enabled { "1" } else { "0" };
        let watchdog_timeout_ms = config.watchdog.timeout.as_millis().to_string();
        let start_angle = config.start_angle.to_string();
        let packet_type = match config.packet_type {
            crate::header::PacketType::A => "A",
            crate::header::PacketType::B => "B",
            crate::header::PacketType::C => "C",
        };
        let params = [
            ("address", address.as_str()),
            ("port", port_str.as_str()),
            ("watchdog", watchdog_enabled),
            ("watchdogtimeout", watchdog_timeout_ms.as_str()),
            ("startangle", start_angle.as_str()),
            ("packettype", packet_type),
        ];
        let (handle_str, port) = commands.request_udp_handle(&params)?;
        let handle = DeviceHandle::new(
            handle_str.clone(),
            config.device_address,
            port,
            config.watchdog.enabled,
            config.watchdog.timeout,
        );

        let socket = open_listener(config.listener_address, config.listener_port)
            .map_err(|e| Error::FatalSetup(format!("failed to open udp listener: {e}")))?;

        if let Err(err) = commands.start_scan(&handle_str) {
            let _ = commands.release_handle(&handle_str);
            return Err(Error::FatalSetup(err.to_string()));
        }

        let core = Arc::new(DataLinkCore::new(handle, Arc::clone(&channel)));
        core.alive.store(true, Ordering::Release);
        core.start_watchdog_if_enabled();

        let running = Arc::new(AtomicBool::new(true));
        let reception_thread = {
            let core = Arc::clone(&core);
            let running = Arc::clone(&running);
            Some(thread::spawn(move || reception_loop(core, running, socket)))
        };

        Ok(Self {
            core,
            running,
            reception_thread: Mutex::new(reception_thread),
        })
    }
}

fn open_listener(address: std::net::IpAddr, port: u16) -> std::io::Result<UdpSocket> {
    let domain = Domain::for_address(SocketAddr::new(address, port));
    let socket = Socket::new(domain, Type::DGRAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::new(address, port).into())?;
    socket.set_read_timeout(Some(SOCKET_READ_TIMEOUT))?;
    Ok(socket.into())
}

fn reception_loop(core: Arc<DataLinkCore>, running: Arc<AtomicBool>, socket: UdpSocket) {
    let mut buf = vec![0u8; DATAGRAM_BUFFER_SIZE];

    while running.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((n, _from)) => {
                // Each datagram may be truncated relative to a packet; a
                // nonzero `bytes_needed` is simply awaited on the next
                // datagram rather than acted on immediately.
                let _ = core.on_bytes_received(&buf[..n]);
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                log::warn!("udp recv error: {e}");
                break;
            }
        }
    }

    if running.load(Ordering::Acquire) {
        core.alive.store(false, Ordering::Release);
    }
}

impl DataLink for UdpLink {
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

impl Drop for UdpLink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.reception_thread.lock().take() {
            let _ = thread.join();
        }
        self.core.teardown();
    }
}
