//! Chunked transfer-encoding framing for request bodies.
//!
//! `spec.md` §9 notes that responses never emit chunked encoding (the
//! fallback is connection-close framing), but requests may still
//! arrive chunked, so the wire format has to be parsed on the way in.
//! Kept close to the teacher's `chunked.rs`: it scans chunk-size lines
//! out of a byte buffer in place, leaving only contiguous body bytes
//! at the front, which is exactly the shape `Request::feed` needs.
use httparse::{parse_chunk_size, InvalidChunkSize};
use netbuf::Buf;

/// Tracks how much of a chunked body has been unwrapped into
/// contiguous bytes (`buffered`) versus how much of the current
/// chunk is still pending (`pending`).
#[derive(Debug, Clone)]
pub struct ChunkedState {
    buffered: usize,
    pending: usize,
    done: bool,
}

impl ChunkedState {
    pub fn new() -> ChunkedState {
        ChunkedState { buffered: 0, pending: 0, done: false }
    }

    /// Strips chunk-size lines out of `buf`, advancing `buffered` to
    /// cover any newly revealed contiguous body bytes.
    pub fn parse(&mut self, buf: &mut Buf) -> Result<(), InvalidChunkSize> {
        let ChunkedState { ref mut buffered, ref mut pending, ref mut done } = *self;
        while *buffered < buf.len() {
            if *pending == 0 {
                use httparse::Status::*;
                match parse_chunk_size(&buf[*buffered..])? {
                    Complete((bytes, 0)) => {
                        buf.remove_range(*buffered..*buffered + bytes);
                        *done = true;
                    }
                    Complete((bytes, chunk_size)) => {
                        buf.remove_range(*buffered..*buffered + bytes);
                        *pending = chunk_size as usize;
                    }
                    Partial => return Ok(()),
                }
            } else if *buffered + *pending <= buf.len() {
                *buffered += *pending;
                *pending = 0;
            } else {
                *pending -= buf.len() - *buffered;
                *buffered = buf.len();
            }
        }
        Ok(())
    }

    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn consume(&mut self, n: usize) {
        assert!(self.buffered >= n);
        self.buffered -= n;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_chunk() {
        let mut buf = Buf::new();
        buf.extend(b"5\r\nhello\r\n0\r\n\r\n");
        let mut st = ChunkedState::new();
        st.parse(&mut buf).unwrap();
        assert_eq!(st.buffered(), 5);
        assert!(st.is_done());
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn partial_chunk_header() {
        let mut buf = Buf::new();
        buf.extend(b"5\r\nhel");
        let mut st = ChunkedState::new();
        st.parse(&mut buf).unwrap();
        assert_eq!(st.buffered(), 3);
        assert!(!st.is_done());
    }
}
