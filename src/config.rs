//! Typed configuration for link builders.
//!
//! The device's handle-request API takes a string-keyed parameter map.
//! This crate keeps that map confined to the `ControlChannel` boundary
//! (see [`crate::control`]) and exposes typed structs everywhere else.

use std::net::IpAddr;
use std::time::Duration;

use crate::header::PacketType;

/// Default watchdog period sentinel used by the device when the watchdog
/// is disabled. Never serialised back to the device by this crate; kept
/// only so `WatchdogConfig::disabled()` round-trips through the same type
/// as an enabled configuration.
pub const DISABLED_WATCHDOG_TIMEOUT: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone, Copy)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub timeout: Duration,
}

impl WatchdogConfig {
    pub fn enabled(timeout: Duration) -> Self {
        Self {
            enabled: true,
            timeout,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            timeout: DISABLED_WATCHDOG_TIMEOUT,
        }
    }
}

/// Configuration for a [`crate::datalink::TcpLink`].
#[derive(Debug, Clone)]
pub struct TcpLinkConfig {
    pub device_address: IpAddr,
    pub packet_type: PacketType,
    pub start_angle: i32,
    pub watchdog: WatchdogConfig,
}

/// Configuration for a [`crate::datalink::UdpLink`].
#[derive(Debug, Clone)]
pub struct UdpLinkConfig {
    pub device_address: IpAddr,
    pub listener_address: IpAddr,
    pub listener_port: u16,
    pub packet_type: PacketType,
    pub start_angle: i32,
    pub watchdog: WatchdogConfig,
}
