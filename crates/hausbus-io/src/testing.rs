//! Test transports.
//!
//! A [`pipe`] is a pair of in-memory transports wired back to back: bytes
//! written to one end are read from the other. Tests keep one end and hand
//! the other to the scheduler, playing the role of the board or radio.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use crate::endpoint::Transport;

/// One end of an in-memory transport pair.
pub struct PipeTransport {
    rx: Rc<RefCell<VecDeque<u8>>>,
    tx: Rc<RefCell<VecDeque<u8>>>,
    closed: Rc<Cell<bool>>,
}

/// Create a connected transport pair.
pub fn pipe() -> (PipeTransport, PipeTransport) {
    let a_to_b = Rc::new(RefCell::new(VecDeque::new()));
    let b_to_a = Rc::new(RefCell::new(VecDeque::new()));
    let closed = Rc::new(Cell::new(false));
    (
        PipeTransport {
            rx: Rc::clone(&b_to_a),
            tx: Rc::clone(&a_to_b),
            closed: Rc::clone(&closed),
        },
        PipeTransport {
            rx: a_to_b,
            tx: b_to_a,
            closed,
        },
    )
}

impl PipeTransport {
    /// Close the pipe; both ends fail from here on.
    pub fn close(&self) {
        self.closed.set(true);
    }

    /// Read everything currently buffered on this end.
    pub fn drain(&mut self) -> Vec<u8> {
        self.rx.borrow_mut().drain(..).collect()
    }
}

impl Transport for PipeTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed.get() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        let mut queue = self.rx.borrow_mut();
        let n = buf.len().min(queue.len());
        for slot in buf.iter_mut().take(n) {
            *slot = queue.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.closed.get() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        self.tx.borrow_mut().extend(data);
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_carries_bytes_both_ways() {
        let (mut a, mut b) = pipe();
        a.try_write(&[1, 2, 3]).unwrap();
        b.try_write(&[9]).unwrap();

        assert_eq!(b.drain(), vec![1, 2, 3]);
        let mut buf = [0u8; 4];
        assert_eq!(a.try_read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 9);
        // Reads with nothing buffered return zero, not an error.
        assert_eq!(a.try_read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_closed_pipe_errors_on_both_ends() {
        let (mut a, b) = pipe();
        b.close();
        assert!(a.try_write(&[1]).is_err());
        assert!(a.try_read(&mut [0u8; 1]).is_err());
    }
}
