//! The opaque streaming handle negotiated with the device over HTTP.

use std::net::IpAddr;
use std::time::Duration;

/// A streaming session handle as returned by `request_tcp_handle`/
/// `request_udp_handle`.
///
/// Created by the builder on a successful handle request; torn down by
/// [`crate::datalink::DataLink`], which issues `stop_scan` and
/// `release_handle` against it during `Drop`.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    handle: String,
    address: IpAddr,
    port: u16,
    watchdog_enabled: bool,
    watchdog_timeout: Duration,
}

impl DeviceHandle {
    pub fn new(
        handle: impl Into<String>,
        address: IpAddr,
        port: u16,
        watchdog_enabled: bool,
        watchdog_timeout: Duration,
    ) -> Self {
        Self {
            handle: handle.into(),
            address,
            port,
            watchdog_enabled,
            watchdog_timeout,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn watchdog_enabled(&self) -> bool {
        self.watchdog_enabled
    }

    pub fn watchdog_timeout(&self) -> Duration {
        self.watchdog_timeout
    }
}
