//! The `DataLink` abstraction and its two concrete transports.
//!
//! Modelled as a small sealed trait with exactly two implementors
//! (`TcpLink`, `UdpLink`) over a shared [`DataLinkCore`], rather than an
//! open inheritance hierarchy, there is no third transport and no
//! expectation of one.

mod tcp;
mod udp;

pub use tcp::TcpLink;
pub use udp::UdpLink;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::control::ControlChannel;
use crate::handle::DeviceHandle;
use crate::handoff::RealtimeHandoff;
use crate::packet::PacketExtractor;
use crate::scan::{Scan, ScanAssembler};
use crate::reconnect::new_alive_flag;
use crate::watchdog::Watchdog;

mod private {
    pub trait Sealed {}
}

/// Shared lifecycle surface of a streaming session, regardless of
/// transport. Sealed: only [`TcpLink`] and [`UdpLink`] may implement it.
pub trait DataLink: private::Sealed {
    /// `true` once the session started successfully and has not hit a
    /// fatal teardown path. Monotonically `false` after any fatal path.
    fn is_alive(&self) -> bool;

    /// `true` when no complete scan has been published within an
    /// implementation-defined staleness threshold (2x the watchdog
    /// timeout, or a fixed fallback when the watchdog is disabled).
    fn is_stalled(&self) -> bool;

    /// Register a callback fired from the I/O thread with a reference to
    /// every newly published scan. Must be non-blocking and bounded-time.
    fn add_on_new_scan_available(&self, callback: impl Fn(&Scan) + Send + 'static)
    where
        Self: Sized;
}

type ScanCallback = Box<dyn Fn(&Scan) + Send>;

/// State shared by both transports: the negotiated handle, the extraction
/// pipeline, the realtime handoff, the alive flag, the optional watchdog,
/// and the registered scan callbacks.
pub(crate) struct DataLinkCore {
    pub(crate) handle: DeviceHandle,
    pub(crate) channel: Arc<dyn ControlChannel>,
    pub(crate) extraction_buffer: Mutex<Vec<u8>>,
    pub(crate) assembler: Mutex<ScanAssembler>,
    pub(crate) handoff: RealtimeHandoff,
    pub(crate) alive: Arc<AtomicBool>,
    pub(crate) last_scan_at_millis: AtomicU64,
    pub(crate) started_at: Instant,
    pub(crate) watchdog: Mutex<Option<Watchdog>>,
    pub(crate) callbacks: Mutex<Vec<ScanCallback>>,
}

impl DataLinkCore {
    pub(crate) fn new(handle: DeviceHandle, channel: Arc<dyn ControlChannel>) -> Self {
        Self {
            handle,
            channel,
            extraction_buffer: Mutex::new(Vec::new()),
            assembler: Mutex::new(ScanAssembler::new()),
            handoff: RealtimeHandoff::new(),
            alive: new_alive_flag(false),
            last_scan_at_millis: AtomicU64::new(0),
            started_at: Instant::now(),
            watchdog: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Start the watchdog task if the handle has it enabled.
    pub(crate) fn start_watchdog_if_enabled(self: &Arc<Self>) {
        if !self.handle.watchdog_enabled() {
            return;
        }
        let period = self.handle.watchdog_timeout() / 2;
        let handle_str = self.handle.handle().to_string();
        let is_connected = Arc::clone(&self.alive);
        let channel = Arc::clone(&self.channel);

        let watchdog = Watchdog::spawn(period, handle_str, is_connected, move |handle| {
            let commands = crate::control::DeviceCommands::new(channel.as_ref());
            commands.feed_watchdog(handle).is_ok()
        });
        *self.watchdog.lock() = Some(watchdog);
    }

    /// Feed newly-received bytes through the extractor/assembler,
    /// publishing and firing callbacks for every completed scan. Returns
    /// the number of additional bytes the caller should read next, or `0`
    /// for "whatever is available".
    pub(crate) fn on_bytes_received(&self, data: &[u8]) -> usize {
        let mut buffer = self.extraction_buffer.lock();
        buffer.extend_from_slice(data);

        let mut assembler = self.assembler.lock();
        loop {
            let outcome = PacketExtractor::extract(&buffer, &mut assembler);
            buffer.drain(..outcome.new_start);

            if assembler.is_complete() {
                let scan = assembler.take();
                self.last_scan_at_millis
                    .store(self.started_at.elapsed().as_millis() as u64, Ordering::Release);
                let published = self.handoff.publish(scan);
                for cb in self.callbacks.lock().iter() {
                    cb(&published);
                }
                if outcome.had_enough_bytes {
                    continue;
                }
            }

            return outcome.bytes_needed;
        }
    }

    pub(crate) fn is_stalled(&self, staleness_threshold: Duration) -> bool {
        let last = self.last_scan_at_millis.load(Ordering::Acquire);
        if last == 0 {
            return self.started_at.elapsed() >= staleness_threshold;
        }
        let last_at = Duration::from_millis(last);
        self.started_at.elapsed().saturating_sub(last_at) >= staleness_threshold
    }

    pub(crate) fn staleness_threshold(&self) -> Duration {
        if self.handle.watchdog_enabled() {
            self.handle.watchdog_timeout() * 2
        } else {
            Duration::from_secs(10)
        }
    }

    /// Best-effort teardown: stop the watchdog, then `stop_scan` and
    /// `release_handle`. Failures are logged, never propagated, mirrors
    /// the original's destructor, which cannot itself return a `Result`.
    pub(crate) fn teardown(&self) {
        self.alive.store(false, Ordering::Release);
        self.watchdog.lock().take();

        let commands = crate::control::DeviceCommands::new(self.channel.as_ref());
        if let Err(err) = commands.stop_scan(self.handle.handle()) {
            log::warn!("stop_scan failed during teardown: {err}");
        }
        if let Err(err) = commands.release_handle(self.handle.handle()) {
            log::warn!("release_handle failed during teardown: {err}");
        }
    }
}
