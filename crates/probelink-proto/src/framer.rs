//! Brace-depth stream framing
//!
//! Agents speak JSON over a raw TCP stream with no transport-level message
//! boundaries. A frame is the substring between the first unmatched `{` and
//! the `}` that returns the brace depth to zero. Depth is tracked per byte,
//! not per JSON token, so a `{` or `}` inside a string literal desynchronizes
//! the counter; senders escape string fields before framing, which keeps such
//! bytes off the wire. This is a known limitation of the wire format, kept
//! for compatibility.

use bytes::{Bytes, BytesMut};

/// Buffer ceiling. Exceeding it without completing a frame discards the
/// buffer and resets framing state, bounding memory against a malformed or
/// mid-message-reset peer.
pub const MAX_BUFFER: usize = 1024 * 1024;

/// Incremental frame extractor over an append-only byte buffer.
///
/// Feed arbitrarily sized chunks with [`feed`](StreamFramer::feed), then
/// drain completed frames with [`next_frame`](StreamFramer::next_frame).
/// The scan position carries across calls, so no byte is examined twice.
#[derive(Debug, Default)]
pub struct StreamFramer {
    /// Unconsumed bytes
    buf: BytesMut,
    /// Scan cursor into `buf`
    pos: usize,
    /// Signed brace depth
    depth: i32,
    /// Whether a frame start has been seen
    in_message: bool,
    /// Offset of the current frame's opening brace
    start: usize,
    /// Set when the overflow valve fired; cleared by `take_overflow`
    overflowed: bool,
}

impl StreamFramer {
    /// Create a new framer with empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw bytes to the buffer
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Extract the next complete frame, if any.
    ///
    /// Returns frames in stream order. When no complete frame is buffered
    /// and the buffer exceeds [`MAX_BUFFER`], the entire buffer is dropped
    /// and depth/flag state reset.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        while self.pos < self.buf.len() {
            match self.buf[self.pos] {
                b'{' => {
                    if self.depth == 0 {
                        self.in_message = true;
                        self.start = self.pos;
                    }
                    self.depth += 1;
                }
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 && self.in_message {
                        let start = self.start;
                        let end = self.pos + 1;
                        let consumed = self.buf.split_to(end).freeze();
                        self.pos = 0;
                        self.start = 0;
                        self.in_message = false;
                        return Some(consumed.slice(start..end));
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }

        if self.buf.len() > MAX_BUFFER {
            self.buf.clear();
            self.pos = 0;
            self.depth = 0;
            self.in_message = false;
            self.start = 0;
            self.overflowed = true;
        }

        None
    }

    /// Current number of unconsumed buffered bytes
    pub fn buffer_len(&self) -> usize {
        self.buf.len()
    }

    /// Report and clear the overflow flag set when the buffer ceiling fired
    pub fn take_overflow(&mut self) -> bool {
        std::mem::take(&mut self.overflowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(framer: &mut StreamFramer) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = framer.next_frame() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_single_frame() {
        let mut framer = StreamFramer::new();
        framer.feed(b"{\"type\":\"log\"}");
        let frames = drain(&mut framer);
        assert_eq!(frames, vec![Bytes::from_static(b"{\"type\":\"log\"}")]);
        assert_eq!(framer.buffer_len(), 0);
    }

    #[test]
    fn test_nested_braces() {
        let mut framer = StreamFramer::new();
        framer.feed(b"{\"a\":{\"b\":{}}}");
        let frames = drain(&mut framer);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"{\"a\":{\"b\":{}}}");
    }

    #[test]
    fn test_multiple_frames_one_chunk() {
        let mut framer = StreamFramer::new();
        framer.feed(b"{\"a\":1}\n{\"b\":2}\n");
        let frames = drain(&mut framer);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"{\"a\":1}");
        assert_eq!(&frames[1][..], b"{\"b\":2}");
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut framer = StreamFramer::new();
        framer.feed(b"{\"mess");
        assert!(framer.next_frame().is_none());
        framer.feed(b"age\":\"hi\"}");
        let frames = drain(&mut framer);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"{\"message\":\"hi\"}");
    }

    #[test]
    fn test_inter_frame_noise_ignored() {
        let mut framer = StreamFramer::new();
        framer.feed(b"\r\n  {\"a\":1}  garbage  {\"b\":2}");
        let frames = drain(&mut framer);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"{\"a\":1}");
        assert_eq!(&frames[1][..], b"{\"b\":2}");
    }

    #[test]
    fn test_byte_at_a_time() {
        let data = b"{\"type\":\"device_info\",\"data\":{\"id\":\"d1\"}}{\"x\":[1,2]}";
        let mut framer = StreamFramer::new();
        let mut frames = Vec::new();
        for byte in data.iter() {
            framer.feed(std::slice::from_ref(byte));
            frames.extend(drain(&mut framer));
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &data[..42]);
        assert_eq!(&frames[1][..], &data[42..]);
    }

    #[test]
    fn test_overflow_resets_state() {
        let mut framer = StreamFramer::new();
        // Open a frame that never closes, past the ceiling.
        framer.feed(b"{");
        framer.feed(&vec![b' '; MAX_BUFFER + 1]);
        assert!(framer.next_frame().is_none());
        assert!(framer.take_overflow());
        assert_eq!(framer.buffer_len(), 0);
        // State is fully reset: a fresh frame parses normally.
        framer.feed(b"{\"ok\":true}");
        let frames = drain(&mut framer);
        assert_eq!(frames.len(), 1);
        assert!(!framer.take_overflow());
    }

    #[test]
    fn test_no_overflow_below_ceiling() {
        let mut framer = StreamFramer::new();
        framer.feed(b"{");
        framer.feed(&vec![b' '; 1024]);
        assert!(framer.next_frame().is_none());
        assert!(!framer.take_overflow());
        framer.feed(b"}");
        assert_eq!(drain(&mut framer).len(), 1);
    }

    /// JSON-ish frame bodies without brace bytes in payload positions, so
    /// depth tracking stays balanced.
    fn frame_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-z0-9\",:\\[\\] ]{0,20}", 1..4).prop_map(|parts| {
            let mut s = String::from("{");
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    s.push('{');
                }
                s.push_str(part);
            }
            for _ in 1..parts.len() {
                s.push('}');
            }
            s.push('}');
            s
        })
    }

    proptest! {
        #[test]
        fn test_chunking_equivalence(
            frames in prop::collection::vec(frame_strategy(), 0..8),
            chunk_sizes in prop::collection::vec(1usize..7, 0..64),
        ) {
            let stream: Vec<u8> = frames.iter().flat_map(|f| f.bytes()).collect();

            // Whole stream as one chunk.
            let mut whole = StreamFramer::new();
            whole.feed(&stream);
            let expected = drain(&mut whole);

            // Same stream in arbitrary small chunks.
            let mut chunked = StreamFramer::new();
            let mut got = Vec::new();
            let mut offset = 0;
            let mut sizes = chunk_sizes.into_iter().cycle();
            while offset < stream.len() {
                let size = sizes.next().unwrap_or(1).min(stream.len() - offset);
                chunked.feed(&stream[offset..offset + size]);
                got.extend(drain(&mut chunked));
                offset += size;
            }

            prop_assert_eq!(expected, got);
        }
    }
}
