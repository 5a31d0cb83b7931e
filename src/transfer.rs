//! # Transfers-in-progress
//!
//! A per-connection, per-direction record of an object currently being
//! sent or received (design document §3). [`OutgoingTransfer`] tracks
//! the sender's bookkeeping (used by the serialisation/transmit stages
//! and by `break_transfer`); the receiver's equivalent lives in
//! [`crate::assembler`] since its shape differs enough (temp file vs. a
//! growing in-memory buffer) to not share one struct profitably.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::wire::Priority;

/// Whether a transfer carries an in-memory object or streams a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Data,
    File,
}

/// Sender-side bookkeeping for one in-flight logical object. Stays in
/// the connection's `outgoing_transfers` table from the moment its
/// first parcel is produced until its last parcel has actually left the
/// wire (or, for files, until the receiver's CONFIRM arrives) — not
/// merely until the streaming loop has finished handing parcels to the
/// priority queue, since under tempo pacing that queue can still be
/// draining them for a long time afterwards and `break_transfer` must
/// be able to find the transfer throughout that window.
pub struct OutgoingTransfer {
    pub object_id: u64,
    pub priority: Priority,
    pub kind: TransferKind,
    pub total_bytes: u64,
    pub total_parcels: u32,
    pub source_path: Option<PathBuf>,
    pub remote_path: Option<String>,
    sent_parcels: AtomicU32,
    /// Shared with the `SendOrder` that spawned this transfer, so
    /// `break_transfer`/incoming BREAK-FAIL handling actually reaches the
    /// streaming loop instead of only flipping a flag nothing reads.
    cancel: Arc<AtomicBool>,
}

impl OutgoingTransfer {
    pub fn new(
        object_id: u64,
        priority: Priority,
        kind: TransferKind,
        total_bytes: u64,
        total_parcels: u32,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        OutgoingTransfer {
            object_id,
            priority,
            kind,
            total_bytes,
            total_parcels,
            source_path: None,
            remote_path: None,
            sent_parcels: AtomicU32::new(0),
            cancel,
        }
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Record that one more of this object's parcels has actually left
    /// the wire. Returns `true` once every parcel has been sent, so the
    /// transmit stage knows it can retire the record (for `Data`
    /// transfers; `File` transfers retire on CONFIRM instead).
    pub fn mark_parcel_sent(&self) -> bool {
        self.sent_parcels.fetch_add(1, Ordering::SeqCst) + 1 >= self.total_parcels
    }
}
