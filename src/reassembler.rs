//! Reassembles an in-order byte stream from arbitrary, out-of-order,
//! overlapping fragments, bounded by the downstream `ByteStream`'s
//! capacity.

use std::collections::BTreeMap;

use crate::byte_stream::ByteStream;

/// Holds the set of bytes received but not yet assembled, as a sparse
/// set of disjoint, non-adjacent `(start_index -> bytes)` intervals, all
/// strictly at or above `first_unassembled`.
#[derive(Debug)]
pub struct StreamReassembler {
    capacity: usize,
    output: ByteStream,
    pending: BTreeMap<u64, Vec<u8>>,
    first_unassembled: u64,
    eof_index: Option<u64>,
}

impl StreamReassembler {
    pub fn new(capacity: usize) -> Self {
        StreamReassembler {
            capacity,
            output: ByteStream::new(capacity),
            pending: BTreeMap::new(),
            first_unassembled: 0,
            eof_index: None,
        }
    }

    pub fn stream_out(&self) -> &ByteStream {
        &self.output
    }

    pub fn stream_out_mut(&mut self) -> &mut ByteStream {
        &mut self.output
    }

    pub fn unassembled_bytes(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn empty(&self) -> bool {
        self.unassembled_bytes() == 0
    }

    /// Admits `data`, known to start at absolute stream index
    /// `first_index`. `eof` marks that the byte just past the end of
    /// `data` is the stream's final byte.
    pub fn push_substring(&mut self, data: &[u8], first_index: u64, eof: bool) {
        if eof {
            let candidate = first_index + data.len() as u64;
            self.eof_index = Some(self.eof_index.map_or(candidate, |e| e.max(candidate)));
        }

        let window_start = self.first_unassembled;
        let window_len = self.capacity - self.output.buffer_size();
        let window_end = window_start + window_len as u64;

        let data_start = first_index;
        let data_end = first_index + data.len() as u64;
        let clipped_start = data_start.max(window_start);
        let clipped_end = data_end.min(window_end);

        if clipped_start < clipped_end {
            let lo = (clipped_start - data_start) as usize;
            let hi = (clipped_end - data_start) as usize;
            self.insert(clipped_start, &data[lo..hi]);
        }

        self.assemble();
        self.check_eof();
    }

    /// Merges `data` (starting at absolute index `start`) into the
    /// pending set, combining it with any interval it overlaps or
    /// touches so the set stays disjoint.
    fn insert(&mut self, start: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let end = start + data.len() as u64;

        let mut merged_start = start;
        let mut merged_end = end;
        let mut overlapping = Vec::new();
        for (&k, v) in self.pending.iter() {
            let k_end = k + v.len() as u64;
            if k_end < start || k > end {
                continue;
            }
            merged_start = merged_start.min(k);
            merged_end = merged_end.max(k_end);
            overlapping.push(k);
        }

        let mut merged = vec![0u8; (merged_end - merged_start) as usize];
        for k in overlapping {
            if let Some(v) = self.pending.remove(&k) {
                let off = (k - merged_start) as usize;
                merged[off..off + v.len()].copy_from_slice(&v);
            }
        }
        let off = (start - merged_start) as usize;
        merged[off..off + data.len()].copy_from_slice(data);
        self.pending.insert(merged_start, merged);
    }

    /// Writes the contiguous prefix of `pending` into the downstream
    /// stream, advancing `first_unassembled`.
    fn assemble(&mut self) {
        loop {
            let front = self
                .pending
                .iter()
                .next()
                .map(|(&k, v)| (k, v.clone()));
            let Some((start, bytes)) = front else {
                break;
            };
            if start > self.first_unassembled {
                break;
            }
            self.pending.remove(&start);
            let skip = (self.first_unassembled - start) as usize;
            let to_write = &bytes[skip.min(bytes.len())..];
            let written = self.output.write(to_write);
            self.first_unassembled += written as u64;
            if written < to_write.len() {
                let remainder = &to_write[written..];
                if !remainder.is_empty() {
                    self.insert(self.first_unassembled, remainder);
                }
                break;
            }
        }
    }

    fn check_eof(&mut self) {
        if let Some(eof_index) = self.eof_index {
            if self.first_unassembled >= eof_index && !self.output.input_ended() {
                self.output.end_input();
            }
        }
    }
}
