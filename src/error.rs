//! Error taxonomy for the streaming data-link and status subsystems.

use std::io;

/// Errors surfaced by [`crate::datalink`], [`crate::watchdog`], [`crate::status`]
/// and the [`crate::control`] seam.
///
/// Parse/resync failures inside the extractor and assembler are not part of
/// this enum: they are handled locally (see `PacketExtractor`/`ScanAssembler`)
/// and never cross a thread boundary as an `Error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket open/bind/connect/read failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The device rejected a control command.
    #[error("control command {name} failed: {code} {text}")]
    Control {
        name: &'static str,
        code: i64,
        text: String,
    },

    /// An async control command exceeded its deadline.
    #[error("control command {0} timed out")]
    Timeout(&'static str),

    /// Construction failed before the link became usable (e.g. `start_scan`
    /// was rejected). The link is inert: `is_alive()` returns `false` and
    /// teardown still runs to release any partially-acquired resources.
    #[error("failed to start streaming session: {0}")]
    FatalSetup(String),

    /// A reply from the control channel did not have the expected shape.
    #[error("malformed control reply for {name}: {reason}")]
    MalformedReply { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
