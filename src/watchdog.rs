//! Periodic keep-alive task run alongside a streaming link.
//!
//! A background thread with an `Arc<AtomicBool>` stop flag, joined on
//! `stop`. There is no socket to block on here, so the interruptible sleep
//! uses a `parking_lot::Condvar` rather than a `recv` timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::control::DeviceCommands;

/// Runs `feed_watchdog` at half the handle's timeout, writing the outcome
/// to a shared connectivity flag. Exits promptly on [`Watchdog::stop`].
pub struct Watchdog {
    interrupt: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Spawn the watchdog thread. `is_connected` is written `true`/`false`
    /// after every feed attempt; `send_command` issues the feed itself
    /// (kept generic over `ControlChannel` via a closure so the thread does
    /// not need a lifetime-bound reference into the caller's borrow).
    pub fn spawn(
        period: Duration,
        handle: String,
        is_connected: Arc<AtomicBool>,
        feed: impl Fn(&str) -> bool + Send + 'static,
    ) -> Self {
        let interrupt = Arc::new((Mutex::new(false), Condvar::new()));
        let interrupt_clone = Arc::clone(&interrupt);

        let thread = thread::spawn(move || {
            let (lock, cvar) = &*interrupt_clone;
            loop {
                let ok = feed(&handle);
                is_connected.store(ok, Ordering::Release);

                let mut stopped = lock.lock();
                if *stopped {
                    break;
                }
                cvar.wait_for(&mut stopped, period);
                if *stopped {
                    break;
                }
            }
        });

        Self {
            interrupt,
            thread: Some(thread),
        }
    }

    /// Signal the watchdog thread to exit and join it. Idempotent.
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

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build the feed closure a [`Watchdog`] uses, from a `DeviceCommands`
/// facade. Kept separate from `spawn` so the thread closure does not need
/// to capture a `DeviceCommands<'_>` borrow (the facade only borrows a
/// `dyn ControlChannel` for the duration of one call).
pub fn feed_fn<'a>(commands: &'a DeviceCommands<'a>) -> impl Fn(&str) -> bool + 'a {
    move |handle: &str| commands.feed_watchdog(handle).is_ok()
}
