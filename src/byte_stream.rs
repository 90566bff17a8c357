//! A finite-capacity FIFO byte stream shared between one writer and one
//! reader. This is the primitive the TCP sender writes into (outbound)
//! and the receiver's reassembler writes out of (inbound).

use std::collections::VecDeque;

#[derive(Debug)]
pub struct ByteStream {
    capacity: usize,
    buffer: VecDeque<u8>,
    bytes_written: u64,
    bytes_read: u64,
    input_ended: bool,
    error: bool,
}

impl ByteStream {
    pub fn new(capacity: usize) -> Self {
        ByteStream {
            capacity,
            buffer: VecDeque::new(),
            bytes_written: 0,
            bytes_read: 0,
            input_ended: false,
            error: false,
        }
    }

    /// Writes as much of `data` as fits. Returns the number of bytes
    /// actually written. A no-op (returns 0) once input has ended or the
    /// stream is in error.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if data.is_empty() || self.error || self.input_ended {
            return 0;
        }
        let space = self.capacity - self.buffer.len();
        let n = data.len().min(space);
        self.buffer.extend(&data[..n]);
        self.bytes_written += n as u64;
        n
    }

    /// Returns up to `len` bytes from the front of the buffer without
    /// consuming them.
    pub fn peek_output(&self, len: usize) -> Vec<u8> {
        if len == 0 || self.buffer.is_empty() || self.error {
            return Vec::new();
        }
        let n = len.min(self.buffer.len());
        self.buffer.iter().take(n).copied().collect()
    }

    /// Discards up to `len` bytes from the front of the buffer.
    pub fn pop_output(&mut self, len: usize) {
        if len == 0 || self.eof() || self.error {
            return;
        }
        let n = len.min(self.buffer.len());
        self.buffer.drain(..n);
        self.bytes_read += n as u64;
    }

    /// Convenience combination of `peek_output` followed by `pop_output`.
    pub fn read(&mut self, len: usize) -> Vec<u8> {
        let out = self.peek_output(len);
        self.pop_output(out.len());
        out
    }

    pub fn end_input(&mut self) {
        self.input_ended = true;
    }

    pub fn set_error(&mut self) {
        self.error = true;
    }

    pub fn error(&self) -> bool {
        self.error
    }

    pub fn input_ended(&self) -> bool {
        self.input_ended
    }

    /// True once input has ended and every written byte has been read.
    pub fn eof(&self) -> bool {
        self.input_ended() && self.buffer_empty()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_control_scenario() {
        // capacity 2; write("cat") -> 2, returns "ca"; read 2; write("t")
        // -> 1; read 1; end_input; eof = true.
        let mut s = ByteStream::new(2);
        assert_eq!(s.write(b"cat"), 2);
        assert_eq!(s.peek_output(2), b"ca");
        assert_eq!(s.read(2), b"ca");
        assert_eq!(s.write(b"t"), 1);
        assert_eq!(s.read(1), b"t");
        s.end_input();
        assert!(s.eof());
    }

    #[test]
    fn invariant_written_minus_read_equals_buffered() {
        let mut s = ByteStream::new(5);
        s.write(b"hello");
        s.read(2);
        assert_eq!(s.bytes_written() - s.bytes_read(), s.buffer_size() as u64);
        assert!(s.buffer_size() <= s.capacity());
    }

    #[test]
    fn error_silences_reads_and_writes() {
        let mut s = ByteStream::new(5);
        s.write(b"abc");
        s.set_error();
        assert_eq!(s.write(b"def"), 0);
        assert_eq!(s.peek_output(5), Vec::<u8>::new());
        assert!(!s.eof());
    }

    #[test]
    fn no_writes_after_end_input() {
        let mut s = ByteStream::new(5);
        s.end_input();
        assert_eq!(s.write(b"abc"), 0);
    }
}
