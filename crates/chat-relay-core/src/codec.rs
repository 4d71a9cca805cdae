//! Frame codec shared by the server emitter and the client reader.
//!
//! A frame is one SSE event whose `data:` field carries the base64 encoding of
//! the JSON-serialized [`StreamEvent`]. Base64 keeps model text (which may
//! contain newlines and blank lines) from ever producing a frame delimiter.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;

use crate::stream::StreamEvent;

/// Fields of one SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Byte-level reassembly buffer for blank-line delimited frames.
///
/// Network reads do not line up with frames: a chunk may hold several frames,
/// half a frame, or split a multi-byte UTF-8 sequence. Bytes stay buffered
/// until their frame delimiter arrives.
#[derive(Default, Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    /// Bytes before this offset are known to hold no delimiter.
    scanned: usize,
}

impl FrameBuffer {
    /// Appends a chunk and returns every frame completed by it, in order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf, self.scanned) {
            let frame = String::from_utf8_lossy(&self.buf[..idx]).into_owned();
            self.buf.drain(..idx + delim_len);
            self.scanned = 0;
            if !frame.trim().is_empty() {
                frames.push(frame);
            }
        }
        // A delimiter may straddle the next chunk; keep its first three bytes in range.
        self.scanned = self.buf.len().saturating_sub(3);
        frames
    }

    /// Returns the trailing fragment left without a delimiter, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        let text = String::from_utf8_lossy(&rest);
        if text.trim().is_empty() {
            None
        } else {
            Some(text.into_owned())
        }
    }
}

fn find_frame_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len()
            && buf[i] == b'\r'
            && buf[i + 1] == b'\n'
            && buf[i + 2] == b'\r'
            && buf[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

/// Parses the `event:` and `data:` fields of one raw frame.
///
/// Comment lines (`:` prefix, used for keep-alives) and unknown fields are
/// ignored. Returns `None` when the frame carries neither field.
pub fn parse_sse_fields(frame: &str) -> Option<SseFrame> {
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in frame.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start());
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Encodes an event into the delimiter-free payload placed after `data:`.
pub fn encode_payload(event: &StreamEvent) -> String {
    // Serializing a plain enum of strings into a Vec cannot fail.
    let json = serde_json::to_vec(event).unwrap_or_default();
    BASE64_STANDARD.encode(json)
}

/// Encodes an event as a complete frame, delimiter included.
pub fn encode(event: &StreamEvent) -> String {
    format!("data: {}\n\n", encode_payload(event))
}

/// Decodes one raw frame.
///
/// Returns `None` for anything that is not a well-formed event: comment-only
/// frames, bad base64, invalid JSON, or a missing/unknown `type` tag. Callers
/// treat `None` as "no event, keep reading".
pub fn decode(frame: &str) -> Option<StreamEvent> {
    let fields = parse_sse_fields(frame)?;
    let payload: String = fields.data.split('\n').map(str::trim).collect();
    if payload.is_empty() {
        return None;
    }
    let json = BASE64_STANDARD.decode(payload.as_bytes()).ok()?;
    serde_json::from_slice(&json).ok()
}
