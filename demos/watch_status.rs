//! Illustrates wiring a `StatusWatcher` to a stubbed control channel and
//! printing every status snapshot as it arrives. Not part of the library's
//! public contract, a real host crate supplies its own `ControlChannel`
//! backed by HTTP.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scanlink::control::{ControlChannel, Tree};
use scanlink::status::StatusWatcher;

struct StubChannel;

impl ControlChannel for StubChannel {
    fn send_command(&self, _name: &'static str, _params: &[(&str, &str)]) -> scanlink::Result<Tree> {
        Ok(serde_json::json!({
            "error_code": 0,
            "load_indication": 12,
            "system_time_raw": 0,
            "up_time": 3600,
            "power_cycles": 4,
            "operation_time": 123456,
            "operation_time_scaled": 123,
            "current_temperature": 38,
            "minimal_temperature": 15,
            "maximal_temperature": 55,
            "status_flags": 0,
        }))
    }
}

fn main() {
    env_logger::init();
    let channel: Arc<dyn ControlChannel> = Arc::new(StubChannel);
    let watcher = StatusWatcher::spawn(Duration::from_secs(5), 3, channel);

    watcher.add_on_status_available(|status| {
        println!("+ Cpu load: {}", status.cpu_load);
        println!("+ Current temperature: {}", status.current_temperature);
        println!("+ Operation time: {}", status.operation_time);
        println!("+ Raw system time: {}", status.raw_system_time);
    });
    watcher.add_on_device_connected(|| println!("device connected"));
    watcher.add_on_device_disconnected(|| println!("device disconnected"));

    thread::sleep(Duration::from_secs(15));
}
