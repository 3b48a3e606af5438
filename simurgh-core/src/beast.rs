//! Split a raw receiver byte stream into Beast-format messages.
//!
//! Each message starts with a one-byte type marker and is terminated by the
//! framing byte `0x1A`:
//!
//! ```text
//! <type> <6-byte timestamp> <1-byte signal> <payload> 0x1A
//! ```
//!
//! `0x1A` can also appear inside a message, so a terminator only marks a real
//! boundary when the byte after it is one of the four type markers. Anything
//! else means the `0x1A` was payload and accumulation continues. A payload
//! that happens to contain `0x1A` followed by a marker byte is split in the
//! wrong place; the truncated piece then fails length validation and is
//! dropped. No resynchronisation beyond that is attempted.
//!
//! The framer is a pure state machine: feed it chunks of any size with
//! [`Framer::push`] and it yields every message whose boundary has been
//! confirmed so far. Chunk boundaries never affect the result.

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::timestamp::{decode_timestamp_near, ReceiverTime};

/// Framing byte that terminates every message.
pub const FRAME_END: u8 = 0x1A;

/// Bytes preceding the payload: type marker, timestamp, signal level.
pub const HEADER_LEN: usize = 8;

/// Bytes held for one unconfirmed candidate before it is dropped as
/// unsynchronised input. Several times the longest message with every
/// terminator doubled.
pub const MAX_CANDIDATE: usize = 256;

/// Message type, selected by the leading marker byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `0x31`: Mode-A/C reply (2 payload bytes).
    ModeAc,
    /// `0x32`: Mode-S short reply (7 payload bytes).
    ModeSShort,
    /// `0x33`: Mode-S long reply (14 payload bytes).
    ModeSLong,
    /// `0x34`: receiver status frame.
    Status,
}

impl MessageKind {
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            0x31 => Some(MessageKind::ModeAc),
            0x32 => Some(MessageKind::ModeSShort),
            0x33 => Some(MessageKind::ModeSLong),
            0x34 => Some(MessageKind::Status),
            _ => None,
        }
    }

    pub fn marker(self) -> u8 {
        match self {
            MessageKind::ModeAc => 0x31,
            MessageKind::ModeSShort => 0x32,
            MessageKind::ModeSLong => 0x33,
            MessageKind::Status => 0x34,
        }
    }

    /// Minimum message length in bytes, header included.
    pub fn min_len(self) -> usize {
        match self {
            MessageKind::ModeAc => HEADER_LEN + 2,
            MessageKind::ModeSShort => HEADER_LEN + 7,
            MessageKind::ModeSLong => HEADER_LEN + 14,
            MessageKind::Status => 10,
        }
    }

    /// Fixed payload length, if the kind has one.
    fn payload_len(self) -> Option<usize> {
        match self {
            MessageKind::ModeAc => Some(2),
            MessageKind::ModeSShort => Some(7),
            MessageKind::ModeSLong => Some(14),
            MessageKind::Status => None,
        }
    }

    pub fn is_mode_s(self) -> bool {
        matches!(self, MessageKind::ModeSShort | MessageKind::ModeSLong)
    }
}

/// A complete, length-validated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeastMessage {
    pub kind: MessageKind,
    /// Packed 48-bit receiver timestamp, undecoded.
    pub timestamp: [u8; 6],
    pub signal: u8,
    pub payload: Vec<u8>,
}

impl BeastMessage {
    /// Validate a candidate message (marker byte first, terminator stripped).
    ///
    /// Returns `None` for unknown markers and for candidates shorter than
    /// the minimum length of their kind.
    pub fn from_candidate(candidate: &[u8]) -> Option<Self> {
        let kind = MessageKind::from_marker(*candidate.first()?)?;
        if candidate.len() < kind.min_len() {
            return None;
        }

        let mut timestamp = [0u8; 6];
        timestamp.copy_from_slice(&candidate[1..7]);
        let body = &candidate[HEADER_LEN..];
        let payload = match kind.payload_len() {
            Some(n) => body[..n].to_vec(),
            None => body.to_vec(),
        };

        Some(BeastMessage {
            kind,
            timestamp,
            signal: candidate[7],
            payload,
        })
    }

    /// Decode the receiver timestamp on the UTC day closest to `arrival`.
    pub fn receiver_time_near(&self, arrival: DateTime<Utc>) -> Option<ReceiverTime> {
        decode_timestamp_near(&self.timestamp, arrival)
    }
}

/// Framer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    /// Bytes pushed into the framer.
    pub bytes: u64,
    /// Messages that passed validation.
    pub messages: u64,
    /// Candidates dropped for an unknown marker, a short length or
    /// exceeding [`MAX_CANDIDATE`].
    pub discarded: u64,
}

/// Incremental message framer. One instance per connection.
#[derive(Debug, Default)]
pub struct Framer {
    buf: Vec<u8>,
    // A 0x1A has been read and the next byte decides whether it was a boundary.
    pending_end: bool,
    stats: FramerStats,
}

impl Framer {
    pub fn new() -> Self {
        Framer::default()
    }

    /// Feed a chunk of the stream, returning every message completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<BeastMessage> {
        self.stats.bytes += chunk.len() as u64;
        let mut out = Vec::new();

        for &byte in chunk {
            if self.pending_end {
                self.pending_end = false;
                if MessageKind::from_marker(byte).is_some() {
                    if let Some(msg) = self.take_candidate() {
                        out.push(msg);
                    }
                    self.store(byte);
                    continue;
                }
                // The terminator was payload after all.
                self.store(FRAME_END);
            }

            if byte == FRAME_END {
                self.pending_end = true;
            } else {
                self.store(byte);
            }
        }

        out
    }

    /// Bytes accumulated for a message whose boundary is not yet confirmed.
    pub fn buffered(&self) -> usize {
        self.buf.len() + usize::from(self.pending_end)
    }

    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    fn store(&mut self, byte: u8) {
        if self.buf.len() >= MAX_CANDIDATE {
            self.stats.discarded += 1;
            debug!(len = self.buf.len(), "discarding oversized candidate");
            self.buf.clear();
        }
        self.buf.push(byte);
    }

    fn take_candidate(&mut self) -> Option<BeastMessage> {
        let candidate = std::mem::take(&mut self.buf);
        if candidate.is_empty() {
            // Stream start: nothing precedes the first terminator.
            return None;
        }

        match BeastMessage::from_candidate(&candidate) {
            Some(msg) => {
                self.stats.messages += 1;
                trace!(kind = ?msg.kind, len = candidate.len(), "framed message");
                Some(msg)
            }
            None => {
                self.stats.discarded += 1;
                debug!(
                    marker = candidate[0],
                    len = candidate.len(),
                    "discarding malformed candidate"
                );
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
