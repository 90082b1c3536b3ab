//!
//! Server-sent event framer.
//!
//! Buffers raw upstream bytes and cuts them into logical events at blank-line
//! terminators (`\n\n`, `\r\r` or `\r\n\r\n`). Network chunk boundaries carry
//! no meaning here: the same byte sequence yields the same events however it
//! is split, including splits inside multi-byte characters.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- types ----------------------------------------------------------------------------------- */

///
/// One logical event cut from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedEvent {
    /** `data:` lines joined with `\n`; `None` when the block had no data lines */
    pub payload: Option<String>,
    /** block text without its terminator */
    pub raw: String,
    /** false for the remainder flushed at end of stream */
    pub terminated: bool,
}

///
/// Incremental event framer.
#[derive(Debug, Default)]
pub struct EventFramer {
    /** bytes received but not yet part of a complete event */
    buffer: Vec<u8>,
    /** buffer prefix already searched for a terminator */
    scanned: usize,
}

/* --- constants ------------------------------------------------------------------------------ */

/** event terminators, longest first so `\r\n\r\n` wins over its prefixes */
const TERMINATORS: [&[u8]; 3] = [b"\r\n\r\n", b"\n\n", b"\r\r"];

/** a terminator may start this many bytes before the end of a searched prefix */
const TERMINATOR_OVERLAP: usize = 3;

/* --- start of code -------------------------------------------------------------------------- */

impl EventFramer {
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Feed a network chunk.
    ///
    /// # Arguments
    ///  * `chunk` - raw bytes as received
    ///
    /// # Returns
    ///  * every event completed by this chunk, in stream order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<FramedEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let from = self.scanned.saturating_sub(TERMINATOR_OVERLAP);
        let mut found = find_terminator(&self.buffer, from);
        while let Some((at, len)) = found {
            let block: Vec<u8> = self.buffer.drain(..at + len).take(at).collect();
            if let Some(event) = parse_block(&block, true) {
                events.push(event);
            }
            found = find_terminator(&self.buffer, 0);
        }
        self.scanned = self.buffer.len();
        events
    }

    ///
    /// Flush whatever is left once the upstream closes.
    ///
    /// # Returns
    ///  * the unterminated remainder, if it holds anything but whitespace
    pub fn finish(&mut self) -> Option<FramedEvent> {
        let block = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if block.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        parse_block(&block, false)
    }

    /// Bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/* --- utility functions ---------------------------------------------------------------------- */

///
/// Earliest terminator in the buffer at or after `from`.
///
/// # Returns
///  * (offset, terminator length), or `None` when no event is complete yet
fn find_terminator(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buffer.len()).find_map(|at| {
        TERMINATORS.iter().find(|t| buffer[at..].starts_with(t)).map(|t| (at, t.len()))
    })
}

fn parse_block(block: &[u8], terminated: bool) -> Option<FramedEvent> {
    if block.is_empty() {
        return None;
    }

    let raw = String::from_utf8_lossy(block).into_owned();
    let data: Vec<&str> = raw
        .split(['\n', '\r'])
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    let payload = (!data.is_empty()).then(|| data.join("\n"));
    Some(FramedEvent { payload, raw, terminated })
}

/* --- tests ------------------------------------------------------------------------------- */
