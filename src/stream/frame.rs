//! Record reassembly across transport chunk boundaries.
//!
//! The stream body separates records with a carriage return; newlines are
//! keep-alive padding and may also appear inside a record. Chunks split
//! records at arbitrary byte positions, so the extractor carries the
//! unterminated suffix of each chunk into the next call.

use bytes::{Bytes, BytesMut};
use serde_json::Value;

const RECORD_SEPARATOR: u8 = b'\r';

/// A terminated segment that failed JSON decoding.
#[derive(Debug)]
pub struct InvalidJson {
    /// The offending segment, separator stripped.
    pub segment: Bytes,
    /// The decoder error.
    pub error: serde_json::Error,
}

/// Output of one [`FrameExtractor::consume`] call.
#[derive(Debug, Default)]
pub struct Extracted {
    /// Fully decoded records, in wire order.
    pub records: Vec<Value>,
    /// Terminated segments that failed to decode. Surviving records of the
    /// same chunk are still present in `records`.
    pub invalid: Vec<InvalidJson>,
}

/// Stateful decoder turning raw chunks into complete JSON records.
///
/// Invariant: the carried buffer never contains a record separator; every
/// terminated record has been decoded and handed out.
#[derive(Debug, Default)]
pub struct FrameExtractor {
    pending: BytesMut,
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops any partial record, e.g. when a new request becomes active.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Number of buffered bytes awaiting a record separator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Consumes one transport chunk and yields every complete record.
    ///
    /// The unterminated final segment of a chunk is decoded eagerly because
    /// the last record of a stream is allowed to arrive without its
    /// separator; a suffix that does not yet decode is carried forward
    /// instead. Feeding a byte sequence in one call or split across many
    /// calls yields the same records.
    pub fn consume(&mut self, chunk: &[u8]) -> Extracted {
        let mut out = Extracted::default();
        if chunk.is_empty() || chunk == b"\n" {
            return out;
        }
        if !chunk.contains(&RECORD_SEPARATOR) {
            self.pending.extend_from_slice(chunk);
            return out;
        }

        let mut segments = chunk.split(|byte| *byte == RECORD_SEPARATOR);
        // The chunk contains a separator, so there are at least two segments.
        let first = segments.next().unwrap_or_default();
        let mut terminated: Vec<&[u8]> = segments.collect();
        let unterminated = terminated.pop().unwrap_or_default();

        let mut head = self.pending.split();
        head.extend_from_slice(first);
        decode_terminated(&head, &mut out);
        for segment in terminated {
            decode_terminated(segment, &mut out);
        }

        if !unterminated.is_empty() && unterminated != b"\n" {
            match serde_json::from_slice::<Value>(unterminated) {
                Ok(record) => out.records.push(record),
                Err(_) => self.pending.extend_from_slice(unterminated),
            }
        }
        out
    }
}

fn decode_terminated(segment: &[u8], out: &mut Extracted) {
    if segment.is_empty() || segment == b"\n" {
        return;
    }
    match serde_json::from_slice::<Value>(segment) {
        Ok(record) => out.records.push(record),
        Err(error) => out.invalid.push(InvalidJson {
            segment: Bytes::copy_from_slice(segment),
            error,
        }),
    }
}
