//! Exponential-backoff reconnect supervisor for TCP links.
//!
//! UDP has no equivalent: a connectionless socket does not fail
//! connectively, so `UdpLink` has no supervisor, only a dead-link flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(20);

/// Doubles `current` towards [`MAX_BACKOFF`], starting from
/// [`INITIAL_BACKOFF`] when `current` is `None`.
fn next_backoff(current: Option<Duration>) -> Duration {
    match current {
        None => INITIAL_BACKOFF,
        Some(d) => (d * 2).min(MAX_BACKOFF),
    }
}

/// Runs `try_connect` in a capped-exponential-backoff loop until it
/// succeeds or the supervisor is stopped. Attempts are unbounded in count;
/// only the inter-attempt delay is capped.
pub struct ReconnectSupervisor {
    interrupt: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl ReconnectSupervisor {
    pub fn spawn(try_connect: impl Fn() -> bool + Send + 'static) -> Self {
        let interrupt = Arc::new((Mutex::new(false), Condvar::new()));
        let interrupt_clone = Arc::clone(&interrupt);

        let thread = thread::spawn(move || {
            let (lock, cvar) = &*interrupt_clone;
            let mut backoff: Option<Duration> = None;

            loop {
                {
                    let stopped = lock.lock();
                    if *stopped {
                        return;
                    }
                }

                if try_connect() {
                    return;
                }

                let delay = next_backoff(backoff);
                backoff = Some(delay);

                let mut stopped = lock.lock();
                if *stopped {
                    return;
                }
                cvar.wait_for(&mut stopped, delay);
                if *stopped {
                    return;
                }
            }
        });

        Self {
            interrupt,
            thread: Some(thread),
        }
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

impl Drop for ReconnectSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Shared dead/alive flag flipped by the reception thread on an
/// unrecoverable transport error, read by the reconnect supervisor and by
/// [`crate::datalink::DataLink::is_alive`].
pub type AliveFlag = Arc<AtomicBool>;

pub fn new_alive_flag(initial: bool) -> AliveFlag {
    Arc::new(AtomicBool::new(initial))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut delay = None;
        let mut seen = Vec::new();
        for _ in 0..12 {
            delay = Some(next_backoff(delay));
            seen.push(delay.unwrap());
        }
        assert_eq!(seen[0], Duration::from_millis(100));
        assert_eq!(seen[1], Duration::from_millis(200));
        assert_eq!(seen[2], Duration::from_millis(400));
        assert!(seen.iter().all(|d| *d <= MAX_BACKOFF));
        assert_eq!(*seen.last().unwrap(), MAX_BACKOFF);
    }

    #[test]
    fn retries_with_growing_delay_until_success() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let mut supervisor = ReconnectSupervisor::spawn(move || {
            let n = attempts_clone.fetch_add(1, Ordering::SeqCst);
            n >= 2 // fail twice, succeed on the third attempt
        });

        let start = Instant::now();
        while attempts.load(Ordering::SeqCst) < 3 && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(10));
        }
        supervisor.stop();
        assert!(attempts.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn stop_is_prompt_during_backoff_wait() {
        let mut supervisor = ReconnectSupervisor::spawn(|| false);
        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        supervisor.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
