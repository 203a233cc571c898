//! Outbound transaction bookkeeping.
//!
//! Every transmit frame carries a frame id from a rotating 1-byte counter
//! (zero is reserved). The ledger remembers the raw wire frame for each id in
//! flight so a failed transmit can be resent byte-identical, and parks
//! messages in a FIFO when all 255 ids are busy. Retries are bounded: a
//! message that exhausts them is dropped, there is no higher-level
//! redelivery.

use std::collections::{HashMap, VecDeque};

use crate::addresses::ShortAddress;
use crate::api::TxRequest;
use crate::constants::FRAME_ID_NONE;
use crate::frame::encode_frame;

/// One transmit awaiting its status reply.
#[derive(Debug, Clone)]
struct Transaction {
    /// Destination short address.
    dest: ShortAddress,
    /// Transmit attempts left before the message is dropped.
    retries_left: u8,
    /// The complete wire frame, resent verbatim on failure.
    frame: Vec<u8>,
}

/// What to do after a transmit-status reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    /// The frame was delivered. If a deferred message was waiting for a free
    /// frame id, `followup` is its wire frame, ready to send.
    Delivered {
        /// Next deferred message released by this completion, if any.
        followup: Option<Vec<u8>>,
    },
    /// The frame failed but has retries left; resend this wire frame.
    Retransmit(Vec<u8>),
    /// The frame failed with no retries left; the message is dropped.
    Dropped {
        /// Destination the message was addressed to.
        dest: ShortAddress,
    },
    /// The status did not match any transaction in flight.
    Unknown,
}

/// Bookkeeping for outbound mesh transactions.
#[derive(Debug)]
pub struct TransactionLedger {
    /// Transactions in flight, keyed by frame id.
    in_flight: HashMap<u8, Transaction>,
    /// Messages deferred for lack of a free frame id, oldest first.
    deferred: VecDeque<(ShortAddress, Vec<u8>)>,
    /// Next frame id candidate.
    next_id: u8,
    /// Retry budget given to each new transaction.
    retries: u8,
}

impl TransactionLedger {
    /// Create a ledger granting `retries` retransmit attempts per message.
    pub fn new(retries: u8) -> Self {
        TransactionLedger {
            in_flight: HashMap::new(),
            deferred: VecDeque::new(),
            next_id: 1,
            retries,
        }
    }

    /// Number of transactions in flight.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of deferred messages.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Allocate the next free frame id, rotating past ids still in flight.
    fn alloc_frame_id(&mut self) -> Option<u8> {
        if self.in_flight.len() >= 255 {
            return None;
        }
        loop {
            let id = self.next_id;
            self.next_id = if self.next_id == u8::MAX {
                FRAME_ID_NONE + 1
            } else {
                self.next_id + 1
            };
            if !self.in_flight.contains_key(&id) {
                return Some(id);
            }
        }
    }

    /// Build the wire frame for a payload and put it in flight.
    fn dispatch(&mut self, id: u8, dest: ShortAddress, payload: Vec<u8>) -> Vec<u8> {
        let body = TxRequest {
            frame_id: id,
            dest,
            payload,
        }
        .encode_body();
        let frame = encode_frame(&body);
        self.in_flight.insert(
            id,
            Transaction {
                dest,
                retries_left: self.retries,
                frame: frame.clone(),
            },
        );
        frame
    }

    /// Start a transmit of `payload` to `dest`.
    ///
    /// Returns the wire frame to send now, or `None` when every frame id is
    /// in flight and the message was queued in the deferred FIFO instead.
    pub fn begin(&mut self, dest: ShortAddress, payload: Vec<u8>) -> Option<Vec<u8>> {
        match self.alloc_frame_id() {
            Some(id) => Some(self.dispatch(id, dest, payload)),
            None => {
                self.deferred.push_back((dest, payload));
                None
            }
        }
    }

    /// Record a transmit-status reply for `frame_id`.
    pub fn on_tx_status(&mut self, frame_id: u8, success: bool) -> TxOutcome {
        let Some(mut txn) = self.in_flight.remove(&frame_id) else {
            return TxOutcome::Unknown;
        };

        if success {
            let followup = self
                .deferred
                .pop_front()
                .map(|(dest, payload)| match self.alloc_frame_id() {
                    // An id is always free here: we just released one.
                    Some(id) => self.dispatch(id, dest, payload),
                    None => unreachable!("frame id freed by completed transaction"),
                });
            return TxOutcome::Delivered { followup };
        }

        if txn.retries_left > 0 {
            txn.retries_left -= 1;
            let frame = txn.frame.clone();
            self.in_flight.insert(frame_id, txn);
            return TxOutcome::Retransmit(frame);
        }

        TxOutcome::Dropped { dest: txn.dest }
    }

    /// Drop every in-flight transaction and deferred message addressed to
    /// `dest`. Used when a remote link is torn down.
    pub fn purge_dest(&mut self, dest: ShortAddress) {
        self.in_flight.retain(|_, txn| txn.dest != dest);
        self.deferred.retain(|(d, _)| *d != dest);
    }
}
