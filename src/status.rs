//! Periodic device status polling with connect/disconnect edge detection.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::control::{ControlChannel, DeviceCommands, Tree};

/// The fixed parameter set polled on every status tick.
const PARAMETERS: &[&str] = &[
    "load_indication",
    "system_time_raw",
    "up_time",
    "power_cycles",
    "operation_time",
    "operation_time_scaled",
    "current_temperature",
    "minimal_temperature",
    "maximal_temperature",
    "status_flags",
];

/// A decoded status snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceStatus {
    pub cpu_load: u32,
    pub raw_system_time: u64,
    pub up_time: u64,
    pub power_cycles: u32,
    pub operation_time: u64,
    pub operation_time_scaled: u64,
    pub current_temperature: i32,
    pub minimal_temperature: i32,
    pub maximal_temperature: i32,
    pub status_flags: u32,
}

impl DeviceStatus {
    /// Decode a status snapshot from a `get_parameters` reply tree.
    pub fn from_tree(tree: &Tree) -> Option<Self> {
        let u = |field: &str| tree.get(field).and_then(Tree::as_u64);
        let i = |field: &str| tree.get(field).and_then(Tree::as_i64);
        Some(Self {
            cpu_load: u("load_indication")? as u32,
            raw_system_time: u("system_time_raw")?,
            up_time: u("up_time")?,
            power_cycles: u("power_cycles")? as u32,
            operation_time: u("operation_time")?,
            operation_time_scaled: u("operation_time_scaled")?,
            current_temperature: i("current_temperature")? as i32,
            minimal_temperature: i("minimal_temperature")? as i32,
            maximal_temperature: i("maximal_temperature")? as i32,
            status_flags: u("status_flags")? as u32,
        })
    }

    pub fn flags(&self) -> StatusFlagInterpreter {
        StatusFlagInterpreter::new(self.status_flags)
    }
}

/// Pure decode of the 32-bit status flags field into named booleans.
///
/// Bit layout fixed for this implementation (least-significant bit first):
/// unassigned bits decode as `false`.
#[derive(Debug, Clone, Copy)]
pub struct StatusFlagInterpreter {
    flags: u32,
}

impl StatusFlagInterpreter {
    pub fn new(flags: u32) -> Self {
        Self { flags }
    }

    fn bit(&self, n: u32) -> bool {
        (self.flags >> n) & 1 != 0
    }

    pub fn device_error(&self) -> bool {
        self.bit(0)
    }
    pub fn device_warning(&self) -> bool {
        self.bit(1)
    }
    pub fn temperature_warning(&self) -> bool {
        self.bit(2)
    }
    pub fn temperature_error(&self) -> bool {
        self.bit(3)
    }
    pub fn head_busy(&self) -> bool {
        self.bit(4)
    }
    pub fn motor_error(&self) -> bool {
        self.bit(5)
    }
    pub fn internal_communication_error(&self) -> bool {
        self.bit(6)
    }
    pub fn dsp_error(&self) -> bool {
        self.bit(7)
    }
    pub fn config_error(&self) -> bool {
        self.bit(8)
    }
    pub fn laser_failure(&self) -> bool {
        self.bit(9)
    }
}

struct Callbacks {
    on_status: Vec<Box<dyn Fn(&DeviceStatus) + Send>>,
    on_connected: Vec<Box<dyn Fn() + Send>>,
    on_disconnected: Vec<Box<dyn Fn() + Send>>,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            on_status: Vec::new(),
            on_connected: Vec::new(),
            on_disconnected: Vec::new(),
        }
    }
}

/// Polls [`DeviceStatus`] on a fixed period, debouncing transient failures
/// before firing connect/disconnect edge callbacks.
///
/// A single background task requests a fixed parameter list, resets a
/// failure counter on success, and only fires a disconnection event once
/// consecutive failures cross `disconnection_trigger_threshold` (never on
/// the first failure, to ride out transient network hiccups).
pub struct StatusWatcher {
    interrupt: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
    callbacks: Arc<Mutex<Callbacks>>,
    is_connected: Arc<AtomicBool>,
}

impl StatusWatcher {
    pub fn spawn(
        period: Duration,
        disconnection_trigger_threshold: u32,
        channel: Arc<dyn ControlChannel>,
    ) -> Self {
        let interrupt = Arc::new((Mutex::new(false), Condvar::new()));
        let callbacks: Arc<Mutex<Callbacks>> = Arc::new(Mutex::new(Callbacks::default()));
        let is_connected = Arc::new(AtomicBool::new(false));
        let threshold = Arc::new(AtomicU32::new(disconnection_trigger_threshold));

        let interrupt_clone = Arc::clone(&interrupt);
        let callbacks_clone = Arc::clone(&callbacks);
        let is_connected_clone = Arc::clone(&is_connected);
        let threshold_clone = Arc::clone(&threshold);

        let thread = thread::spawn(move || {
            let (lock, cvar) = &*interrupt_clone;
            let mut disconnection_hit_count = 0u32;

            loop {
                {
                    let stopped = lock.lock();
                    if *stopped {
                        return;
                    }
                }

                let commands = DeviceCommands::new(channel.as_ref());
                match commands.get_parameters(PARAMETERS).ok().and_then(|t| DeviceStatus::from_tree(&t)) {
                    Some(status) => {
                        disconnection_hit_count = 0;
                        let cbs = callbacks_clone.lock();
                        for cb in &cbs.on_status {
                            cb(&status);
                        }
                        let was_connected = is_connected_clone.swap(true, Ordering::AcqRel);
                        if !was_connected {
                            for cb in &cbs.on_connected {
                                cb();
                            }
                        }
                    }
                    None => {
                        disconnection_hit_count += 1;
                        if disconnection_hit_count >= threshold_clone.load(Ordering::Acquire) {
                            let was_connected = is_connected_clone.swap(false, Ordering::AcqRel);
                            if was_connected {
                                let cbs = callbacks_clone.lock();
                                for cb in &cbs.on_disconnected {
                                    cb();
                                }
                            }
                        }
                    }
                }

                let mut stopped = lock.lock();
                if *stopped {
                    return;
                }
                cvar.wait_for(&mut stopped, period);
                if *stopped {
                    return;
                }
            }
        });

        Self {
            interrupt,
            thread: Some(thread),
            callbacks,
            is_connected,
        }
    }

    pub fn add_on_status_available(&self, callback: impl Fn(&DeviceStatus) + Send + 'static) {
        self.callbacks.lock().on_status.push(Box::new(callback));
    }

    pub fn add_on_device_connected(&self, callback: impl Fn() + Send + 'static) {
        self.callbacks.lock().on_connected.push(Box::new(callback));
    }

    pub fn add_on_device_disconnected(&self, callback: impl Fn() + Send + 'static) {
        self.callbacks.lock().on_disconnected.push(Box::new(callback));
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Acquire)
    }

    pub fn stop(&mut self) {
        {
            let (lock, cvar) = &*self.interrupt;
            *lock.lock() = true;
            cvar.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for StatusWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
