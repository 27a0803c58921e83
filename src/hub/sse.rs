//! Server-Sent Events frame decoder.
//!
//! Frame format:
//! ```text
//! : comment line (ignored)
//! id: <ignored>
//! data: {"type":"ping"}      ┐ data lines accumulate,
//! data: ...                  ┘ joined with '\n'
//! <blank line>               → frame complete, payload emitted
//! ```
//! Lines end in `\n`; a trailing `\r` is stripped. Chunks may split lines and
//! frames anywhere, so the decoder buffers across `feed` calls.

/// Incremental SSE decoder yielding one payload per complete frame.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    /// Size of the payload `data` would join into.
    data_bytes: usize,
    /// Set once the current frame overflowed; cleared by the blank line.
    discarding: bool,
    max_frame_bytes: usize,
}

impl SseDecoder {
    /// `max_frame_bytes` caps both a single buffered line and the payload of
    /// one frame; an oversized frame is discarded up to its blank line.
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            data: Vec::new(),
            data_bytes: 0,
            discarding: false,
            max_frame_bytes,
        }
    }

    /// Feed one body chunk; returns the payloads of every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.len() > self.max_frame_bytes {
                tracing::warn!("Dropping oversized event line: {} bytes", line.len());
                self.discard_frame();
                continue;
            }
            if let Some(payload) = self.process_line(&String::from_utf8_lossy(&line)) {
                payloads.push(payload);
            }
        }

        if self.buffer.len() > self.max_frame_bytes {
            tracing::warn!(
                "Event line exceeds {} bytes without terminator, discarding",
                self.max_frame_bytes
            );
            self.buffer.clear();
            self.discard_frame();
        }

        payloads
    }

    fn discard_frame(&mut self) {
        self.data.clear();
        self.data_bytes = 0;
        self.discarding = true;
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if std::mem::take(&mut self.discarding) || self.data.is_empty() {
                return None;
            }
            let payload = self.data.join("\n");
            self.data.clear();
            self.data_bytes = 0;
            return Some(payload);
        }
        if line.starts_with(':') || self.discarding {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            let added = value.len() + usize::from(!self.data.is_empty());
            if self.data_bytes + added > self.max_frame_bytes {
                tracing::warn!("Event frame exceeds {} bytes, discarding", self.max_frame_bytes);
                self.discard_frame();
                return None;
            }
            self.data_bytes += added;
            self.data.push(value.to_string());
        }
        None
    }
}
