//! Illustrates connecting a `TcpLink` against a stubbed control channel and
//! printing every completed scan. Not part of the library's public
//! contract, a real host crate supplies a `ControlChannel` backed by HTTP
//! and a device that actually speaks the wire protocol on the returned
//! port.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scanlink::config::{TcpLinkConfig, WatchdogConfig};
use scanlink::control::{ControlChannel, Tree};
use scanlink::header::PacketType;
use scanlink::{DataLink, TcpLink};

struct StubChannel {
    port: u16,
}

impl ControlChannel for StubChannel {
    fn send_command(&self, name: &'static str, _params: &[(&str, &str)]) -> scanlink::Result<Tree> {
        match name {
            "request_tcp_handle" => Ok(serde_json::json!({
                "error_code": 0,
                "handle": "demo-handle",
                "port": self.port,
            })),
            _ => Ok(serde_json::json!({"error_code": 0})),
        }
    }
}

fn main() {
    env_logger::init();

    let config = TcpLinkConfig {
        device_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        packet_type: PacketType::C,
        start_angle: 0,
        watchdog: WatchdogConfig::enabled(Duration::from_secs(5)),
    };
    let channel: Arc<dyn ControlChannel> = Arc::new(StubChannel { port: 8080 });

    let link = match TcpLink::connect(channel, config) {
        Ok(link) => link,
        Err(err) => {
            eprintln!("failed to connect: {err}");
            return;
        }
    };
    link.add_on_new_scan_available(|scan| {
        println!(
            "scan: {} points, complete={}",
            scan.distances().len(),
            scan.is_complete()
        );
    });
    thread::sleep(Duration::from_secs(10));
}
