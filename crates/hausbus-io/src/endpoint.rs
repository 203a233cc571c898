//! Endpoints: a transport, its outbound queue, and an optional rate limiter.

use std::collections::VecDeque;
use std::io;

use crate::error::LinkFault;
use crate::time::BusTime;

/// A non-blocking byte transport.
///
/// Both methods must return immediately. `try_read` returns `Ok(0)` when no
/// data is available right now; `try_write` returns how many bytes the
/// transport accepted, possibly fewer than offered.
pub trait Transport {
    /// Read available bytes into `buf` without blocking.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as much of `data` as the transport accepts without blocking.
    fn try_write(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// A sliding-window byte budget for slow peers.
///
/// Some radios drop frames when fed faster than their airtime allows; capping
/// the bytes written per window spaces transmissions out without blocking the
/// tick loop.
#[derive(Debug)]
pub struct RateLimiter {
    /// Byte budget per window.
    limit: usize,
    /// Window length in seconds.
    window_s: f64,
    /// Recent sends as `(time, bytes)`, oldest first.
    sends: VecDeque<(BusTime, usize)>,
}

impl RateLimiter {
    /// Create a limiter allowing `limit` bytes per `window_s` seconds.
    pub fn new(limit: usize, window_s: f64) -> Self {
        RateLimiter {
            limit,
            window_s,
            sends: VecDeque::new(),
        }
    }

    /// Forget sends that have aged out of the window.
    fn prune(&mut self, now: BusTime) {
        while let Some(&(at, _)) = self.sends.front() {
            if now.since(at) >= self.window_s {
                self.sends.pop_front();
            } else {
                break;
            }
        }
    }

    /// Bytes that may be sent at `now` without exceeding the budget.
    pub fn allowance(&mut self, now: BusTime) -> usize {
        self.prune(now);
        let spent: usize = self.sends.iter().map(|&(_, n)| n).sum();
        self.limit.saturating_sub(spent)
    }

    /// Record that `bytes` were sent at `now`.
    pub fn record(&mut self, now: BusTime, bytes: usize) {
        if bytes > 0 {
            self.sends.push_back((now, bytes));
        }
    }
}

/// Bytes queued for an endpoint but not yet written to its transport.
///
/// Handlers never write to a transport directly; they queue here and the
/// scheduler drains the queue in its write phase, under the endpoint's rate
/// limit.
#[derive(Debug, Default)]
pub struct Outbox {
    queued: Vec<u8>,
}

impl Outbox {
    /// Queue bytes for sending. Empty slices queue nothing.
    pub fn push(&mut self, bytes: &[u8]) {
        self.queued.extend_from_slice(bytes);
    }

    /// Number of queued bytes.
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// The queued bytes, oldest first.
    pub fn as_slice(&self) -> &[u8] {
        &self.queued
    }

    /// Take every queued byte, leaving the queue empty.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.queued)
    }

    /// Drop the first `n` bytes after a partial write.
    fn consume(&mut self, n: usize) {
        self.queued.drain(..n);
    }
}

/// One registered transport with its queue and limiter.
pub(crate) struct Endpoint {
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) outbox: Outbox,
    limiter: Option<RateLimiter>,
}

impl Endpoint {
    pub(crate) fn new(transport: Box<dyn Transport>, limiter: Option<RateLimiter>) -> Self {
        Endpoint {
            transport,
            outbox: Outbox::default(),
            limiter,
        }
    }

    /// Write as much queued data as the limiter and transport allow.
    ///
    /// A zero-byte write with budget available means the peer stopped taking
    /// data; that is a fault, not a retry.
    pub(crate) fn flush(&mut self, now: BusTime) -> Result<usize, LinkFault> {
        if self.outbox.is_empty() {
            return Ok(0);
        }
        let budget = match &mut self.limiter {
            Some(limiter) => limiter.allowance(now),
            None => self.outbox.len(),
        };
        if budget == 0 {
            return Ok(0);
        }

        let n = budget.min(self.outbox.len());
        let sent = self.transport.try_write(&self.outbox.as_slice()[..n])?;
        if sent == 0 {
            return Err(LinkFault::WriteStalled {
                pending: self.outbox.len(),
            });
        }
        self.outbox.consume(sent);
        if let Some(limiter) = &mut self.limiter {
            limiter.record(now, sent);
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pipe;

    #[test]
    fn test_rate_limiter_sliding_window() {
        let mut limiter = RateLimiter::new(10, 1.0);
        let t0 = BusTime::ZERO;

        assert_eq!(limiter.allowance(t0), 10);
        limiter.record(t0, 10);
        assert_eq!(limiter.allowance(t0), 0);
        assert_eq!(limiter.allowance(t0.plus(0.5)), 0);

        // The budget comes back once the send ages out of the window.
        assert_eq!(limiter.allowance(t0.plus(1.0)), 10);
    }

    #[test]
    fn test_rate_limiter_partial_spend() {
        let mut limiter = RateLimiter::new(10, 1.0);
        limiter.record(BusTime::ZERO, 4);
        limiter.record(BusTime::from_secs(0.5), 3);
        assert_eq!(limiter.allowance(BusTime::from_secs(0.9)), 3);
        // The first send expires, the second is still in the window.
        assert_eq!(limiter.allowance(BusTime::from_secs(1.2)), 7);
    }

    #[test]
    fn test_flush_respects_budget() {
        // 100 bytes queued, 10 per second allowed.
        let (ours, mut theirs) = pipe();
        let mut endpoint = Endpoint::new(Box::new(ours), Some(RateLimiter::new(10, 1.0)));
        endpoint.outbox.push(&[0xAB; 100]);

        assert_eq!(endpoint.flush(BusTime::ZERO).unwrap(), 10);
        assert_eq!(endpoint.flush(BusTime::from_secs(0.5)).unwrap(), 0);
        assert_eq!(endpoint.flush(BusTime::from_secs(1.1)).unwrap(), 10);
        assert_eq!(endpoint.outbox.len(), 80);

        let mut buf = [0u8; 128];
        assert_eq!(theirs.try_read(&mut buf).unwrap(), 20);
    }

    #[test]
    fn test_flush_unlimited_drains_everything() {
        let (ours, mut theirs) = pipe();
        let mut endpoint = Endpoint::new(Box::new(ours), None);
        endpoint.outbox.push(&[1, 2, 3]);
        endpoint.outbox.push(&[4]);

        assert_eq!(endpoint.flush(BusTime::ZERO).unwrap(), 4);
        assert!(endpoint.outbox.is_empty());

        let mut buf = [0u8; 8];
        let n = theirs.try_read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3, 4]);
    }
}
