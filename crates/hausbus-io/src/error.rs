//! Link fault type.

use thiserror::Error;

/// A condition that tears an endpoint down.
///
/// Faults are not recoverable at the link level: the scheduler removes the
/// endpoint and reports the fault in the tick result. Reattaching is the
/// caller's decision.
#[derive(Debug, Error)]
pub enum LinkFault {
    /// Nothing arrived from the peer within the receive timeout.
    #[error("no data received for {timeout_s} seconds")]
    ReceiveTimeout {
        /// The timeout that expired, in seconds.
        timeout_s: f64,
    },

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A write was permitted by the rate limiter but moved zero bytes.
    #[error("write made no progress with {pending} bytes queued")]
    WriteStalled {
        /// Bytes still queued for the endpoint.
        pending: usize,
    },
}
