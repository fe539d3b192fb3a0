//! Streaming message framer.
//!
//! The telemetry source writes JSON objects back to back on a TCP stream with
//! no delimiter. [`StreamBuffer`] accumulates the bytes and cuts complete
//! objects off the front by tracking bracket depth, ignoring brackets inside
//! quoted strings.
//!
//! The buffer never tries to repair a damaged stream. Anything that cannot be
//! the start of an object, a closing bracket that does not match, a partial
//! message that sits around for too long, or a buffer that grows past its cap
//! throws away everything buffered and starts over with the next byte.
//!
//! The scan state is kept between pushes so feeding a message one byte at a
//! time does not rescan the prefix.

use serde::Serialize;

/// Why the buffer was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscardReason {
    /// First non-whitespace byte is not `{`
    Garbage,
    /// Closing bracket without a matching opener
    Unbalanced,
    /// Partial message older than the staleness window
    Stale,
    /// Buffered bytes exceed the size cap
    Overflow,
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscardReason::Garbage => write!(f, "garbage prefix"),
            DiscardReason::Unbalanced => write!(f, "unbalanced bracket"),
            DiscardReason::Stale => write!(f, "stale partial message"),
            DiscardReason::Overflow => write!(f, "buffer overflow"),
        }
    }
}

/// Output of the framer, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One complete message, brackets included
    Message(Vec<u8>),
    /// Buffered bytes were dropped
    Discarded { reason: DiscardReason, bytes: usize },
}

/// Framer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FramingStats {
    pub messages: u64,
    pub discards: u64,
    pub bytes_discarded: u64,
}

#[derive(Debug, Default, Clone)]
struct ScanState {
    /// Next byte to look at
    pos: usize,
    /// Open brackets, innermost last
    stack: Vec<u8>,
    in_string: bool,
    escaped: bool,
}

enum Scan {
    Complete(usize),
    Incomplete,
    Unbalanced,
}

/// Accumulates stream bytes and extracts complete messages.
#[derive(Debug)]
pub struct StreamBuffer {
    buf: Vec<u8>,
    scan: ScanState,
    /// Start of the staleness window
    since_ms: u64,
    stale_ms: u64,
    max_bytes: usize,
    stats: FramingStats,
}

impl StreamBuffer {
    pub fn new(stale_ms: u64, max_bytes: usize) -> Self {
        StreamBuffer {
            buf: Vec::new(),
            scan: ScanState::default(),
            since_ms: 0,
            stale_ms,
            max_bytes,
            stats: FramingStats::default(),
        }
    }

    /// Bytes waiting for the rest of their message.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn stats(&self) -> FramingStats {
        self.stats
    }

    /// Append `data` and extract every message that is now complete.
    pub fn push(&mut self, data: &[u8], now_ms: u64) -> Vec<Frame> {
        let mut frames = Vec::new();
        if data.is_empty() {
            return frames;
        }
        if self.buf.is_empty() {
            self.since_ms = now_ms;
        }
        self.buf.extend_from_slice(data);

        loop {
            self.skip_whitespace();
            if self.buf.is_empty() {
                break;
            }
            if self.buf[0] != b'{' {
                frames.push(self.discard(DiscardReason::Garbage, now_ms));
                break;
            }
            match self.scan() {
                Scan::Complete(end) => {
                    let message: Vec<u8> = self.buf.drain(..end).collect();
                    self.scan = ScanState::default();
                    self.since_ms = now_ms;
                    self.stats.messages += 1;
                    frames.push(Frame::Message(message));
                }
                Scan::Unbalanced => {
                    frames.push(self.discard(DiscardReason::Unbalanced, now_ms));
                    break;
                }
                Scan::Incomplete => break,
            }
        }

        if self.buf.len() > self.max_bytes {
            frames.push(self.discard(DiscardReason::Overflow, now_ms));
        }
        frames
    }

    /// Drop a partial message that has been waiting too long.
    pub fn check_staleness(&mut self, now_ms: u64) -> Option<Frame> {
        if !self.buf.is_empty() && now_ms.saturating_sub(self.since_ms) >= self.stale_ms {
            return Some(self.discard(DiscardReason::Stale, now_ms));
        }
        None
    }

    /// Forget buffered bytes without counting a discard.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.scan = ScanState::default();
    }

    fn discard(&mut self, reason: DiscardReason, now_ms: u64) -> Frame {
        let bytes = self.buf.len();
        self.clear();
        self.since_ms = now_ms;
        self.stats.discards += 1;
        self.stats.bytes_discarded += bytes as u64;
        Frame::Discarded { reason, bytes }
    }

    fn skip_whitespace(&mut self) {
        if self.scan.pos != 0 {
            return;
        }
        let n = self
            .buf
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        if n > 0 {
            self.buf.drain(..n);
        }
    }

    fn scan(&mut self) -> Scan {
        let s = &mut self.scan;
        while s.pos < self.buf.len() {
            let b = self.buf[s.pos];
            s.pos += 1;

            if s.in_string {
                if s.escaped {
                    s.escaped = false;
                } else if b == b'\\' {
                    s.escaped = true;
                } else if b == b'"' {
                    s.in_string = false;
                }
                continue;
            }

            match b {
                b'"' => s.in_string = true,
                b'{' | b'[' => s.stack.push(b),
                b'}' | b']' => {
                    let opener = if b == b'}' { b'{' } else { b'[' };
                    if s.stack.pop() != Some(opener) {
                        return Scan::Unbalanced;
                    }
                    if s.stack.is_empty() {
                        return Scan::Complete(s.pos);
                    }
                }
                _ => {}
            }
        }
        Scan::Incomplete
    }
}
