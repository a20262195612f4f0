//! Splits interpreter stdout into plain text and input-prompt frames.
//!
//! A prompt frame is `FRAME_START + prompt + FRAME_END`. The stream arrives in
//! arbitrary chunks, so a frame (or a multi-byte character) may be split
//! across reads; incomplete tails are held back until the next chunk.

pub const FRAME_START: &[u8] = b"\x1e__codebuddy_input__\x1f";
pub const FRAME_END: u8 = 0x1e;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Prompt(String),
}

#[derive(Debug, Default)]
pub struct FrameScanner {
    pending: Vec<u8>,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of raw stdout and collect every complete segment.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Segment> {
        self.pending.extend_from_slice(chunk);
        let mut segments = Vec::new();

        loop {
            match find(&self.pending, FRAME_START) {
                Some(start) => {
                    let body_start = start + FRAME_START.len();
                    let Some(end_offset) =
                        self.pending[body_start..].iter().position(|b| *b == FRAME_END)
                    else {
                        // Frame not finished yet; flush the text before it.
                        self.emit_text(start, &mut segments);
                        break;
                    };
                    if start > 0 {
                        let text: Vec<u8> = self.pending.drain(..start).collect();
                        segments.push(Segment::Text(String::from_utf8_lossy(&text).into_owned()));
                    }
                    let body_end = FRAME_START.len() + end_offset;
                    let prompt = String::from_utf8_lossy(&self.pending[FRAME_START.len()..body_end])
                        .into_owned();
                    self.pending.drain(..=body_end);
                    segments.push(Segment::Prompt(prompt));
                }
                None => {
                    let keep = partial_marker_len(&self.pending);
                    let text_end = self.pending.len() - keep;
                    self.emit_text(text_end, &mut segments);
                    break;
                }
            }
        }
        segments
    }

    /// Flush whatever is left once the stream has closed.
    pub fn finish(&mut self) -> Option<Segment> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(Segment::Text(String::from_utf8_lossy(&rest).into_owned()))
    }

    /// Emit `pending[..end]` as text, keeping an incomplete UTF-8 tail.
    fn emit_text(&mut self, end: usize, segments: &mut Vec<Segment>) {
        let valid = match std::str::from_utf8(&self.pending[..end]) {
            Ok(_) => end,
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => end,
        };
        if valid == 0 {
            return;
        }
        let bytes: Vec<u8> = self.pending.drain(..valid).collect();
        segments.push(Segment::Text(String::from_utf8_lossy(&bytes).into_owned()));
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Length of the longest suffix of `buf` that is a proper prefix of the marker.
fn partial_marker_len(buf: &[u8]) -> usize {
    (1..FRAME_START.len().min(buf.len() + 1))
        .rev()
        .find(|&n| buf.ends_with(&FRAME_START[..n]))
        .unwrap_or(0)
}
