//! The narrow seam between the streaming core and the device's HTTP control
//! API. The HTTP transport itself (framing, auth, retries) is out of scope
//! for this crate; a host crate implements [`ControlChannel`] against it.

use crate::error::{Error, Result};

/// A JSON value as returned by a control command.
pub type Tree = serde_json::Value;

/// Issues a named command with string parameters and returns its parsed
/// JSON reply. Implemented by the host crate's HTTP transport.
pub trait ControlChannel: Send + Sync {
    fn send_command(&self, name: &'static str, params: &[(&str, &str)]) -> Result<Tree>;
}

fn check_error_code(name: &'static str, reply: &Tree) -> Result<()> {
    let code = reply.get("error_code").and_then(Tree::as_i64).unwrap_or(0);
    if code != 0 {
        let text = reply
            .get("error_text")
            .and_then(Tree::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(Error::Control { name, code, text });
    }
    Ok(())
}

fn field_str<'a>(name: &'static str, reply: &'a Tree, field: &'static str) -> Result<&'a str> {
    reply.get(field).and_then(Tree::as_str).ok_or_else(|| Error::MalformedReply {
        name,
        reason: format!("missing or non-string field `{field}`"),
    })
}

fn field_u64(name: &'static str, reply: &Tree, field: &'static str) -> Result<u64> {
    reply.get(field).and_then(Tree::as_u64).ok_or_else(|| Error::MalformedReply {
        name,
        reason: format!("missing or non-numeric field `{field}`"),
    })
}

/// The seven device verbs the streaming core and status watcher consume.
/// A thin facade over [`ControlChannel`]: maps verbs to their JSON shape
/// and interprets `error_code`/`error_text`, nothing more.
pub struct DeviceCommands<'a> {
    channel: &'a dyn ControlChannel,
}

impl<'a> DeviceCommands<'a> {
    pub fn new(channel: &'a dyn ControlChannel) -> Self {
        Self { channel }
    }

    pub fn start_scan(&self, handle: &str) -> Result<()> {
        let reply = self.channel.send_command("start_scan", &[("handle", handle)])?;
        check_error_code("start_scan", &reply)
    }

    pub fn stop_scan(&self, handle: &str) -> Result<()> {
        let reply = self.channel.send_command("stop_scan", &[("handle", handle)])?;
        check_error_code("stop_scan", &reply)
    }

    pub fn release_handle(&self, handle: &str) -> Result<()> {
        let reply = self.channel.send_command("release_handle", &[("handle", handle)])?;
        check_error_code("release_handle", &reply)
    }

    pub fn feed_watchdog(&self, handle: &str) -> Result<()> {
        let reply = self.channel.send_command("feed_watchdog", &[("handle", handle)])?;
        check_error_code("feed_watchdog", &reply)
    }

    /// Requests a TCP streaming handle; returns `(handle, port)`.
    pub fn request_tcp_handle(&self, params: &[(&str, &str)]) -> Result<(String, u16)> {
        let reply = self.channel.send_command("request_tcp_handle", params)?;
        check_error_code("request_tcp_handle", &reply)?;
        let handle = field_str("request_tcp_handle", &reply, "handle")?.to_string();
        let port = field_u64("request_tcp_handle", &reply, "port")? as u16;
        Ok((handle, port))
    }

    /// Requests a UDP streaming handle; returns `(handle, port)`.
    pub fn request_udp_handle(&self, params: &[(&str, &str)]) -> Result<(String, u16)> {
        let reply = self.channel.send_command("request_udp_handle", params)?;
        check_error_code("request_udp_handle", &reply)?;
        let handle = field_str("request_udp_handle", &reply, "handle")?.to_string();
        let port = field_u64("request_udp_handle", &reply, "port")? as u16;
        Ok((handle, port))
    }

    /// Fetches the named parameters as a raw JSON tree; callers interpret
    /// fields themselves (see [`crate::status::DeviceStatus::from_tree`]).
    pub fn get_parameters(&self, names: &[&str]) -> Result<Tree> {
        let joined = names.join(",");
        let reply = self.channel.send_command("get_parameters", &[("list", &joined)])?;
        check_error_code("get_parameters", &reply)?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubChannel {
        reply: Tree,
        calls: Mutex<Vec<String>>,
    }

    impl ControlChannel for StubChannel {
        fn send_command(&self, name: &'static str, _params: &[(&str, &str)]) -> Result<Tree> {
            self.calls.lock().unwrap().push(name.to_string());
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn start_scan_succeeds_on_zero_error_code() {
        let channel = StubChannel {
            reply: serde_json::json!({"error_code": 0, "error_text": "success"}),
            calls: Mutex::new(Vec::new()),
        };
        let commands = DeviceCommands::new(&channel);
        assert!(commands.start_scan("h1").is_ok());
        assert_eq!(channel.calls.lock().unwrap().as_slice(), ["start_scan"]);
    }

    #[test]
    fn start_scan_surfaces_control_error() {
        let channel = StubChannel {
            reply: serde_json::json!({"error_code": 5, "error_text": "busy"}),
            calls: Mutex::new(Vec::new()),
        };
        let commands = DeviceCommands::new(&channel);
        let err = commands.start_scan("h1").unwrap_err();
        match err {
            Error::Control { name, code, text } => {
                assert_eq!(name, "start_scan");
                assert_eq!(code, 5);
                assert_eq!(text, "busy");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn request_tcp_handle_parses_handle_and_port() {
        let channel = StubChannel {
            reply: serde_json::json!({"error_code": 0, "handle": "abc123", "port": 45000}),
            calls: Mutex::new(Vec::new()),
        };
        let commands = DeviceCommands::new(&channel);
        let (handle, port) = commands.request_tcp_handle(&[]).unwrap();
        assert_eq!(handle, "abc123");
        assert_eq!(port, 45000);
    }

    #[test]
    fn request_tcp_handle_rejects_missing_field() {
        let channel = StubChannel {
            reply: serde_json::json!({"error_code": 0, "port": 45000}),
            calls: Mutex::new(Vec::new()),
        };
        let commands = DeviceCommands::new(&channel);
        assert!(matches!(
            commands.request_tcp_handle(&[]).unwrap_err(),
            Error::MalformedReply { .. }
        ));
    }
}
